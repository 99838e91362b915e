use crate::config::Config;
use crate::errors::{Result, QuoteHubError};
use crate::models::instrument::{Instrument, Market};
use crate::models::quote::{RawExchangeFields, RawQuoteFields};
use crate::scrapers::base::QuotePageSource;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const BASE_URL: &str = "https://finance.naver.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0 Safari/537.36";

// 页面未声明字符集时按 EUC-KR 解码
const DEFAULT_CHARSET: &str = "euc-kr";

/// Naver 财经行情页面抓取器
pub struct NaverScraper {
    client: Client,
    base_url: String,
    request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NaverScraper {
    /// 创建新的抓取器，HTTP 会话在整个生命周期内复用
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(QuoteHubError::RequestError)?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            request_interval: config.request_interval,
            last_request: Mutex::new(None),
        })
    }

    /// 保证两次请求之间的最小间隔
    async fn wait_for_rate_limit(&self) {
        let now = Instant::now();
        let should_wait = {
            let mut last = self
                .last_request
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let should_wait = (*last)
                .map(|instant| instant.elapsed())
                .filter(|elapsed| *elapsed < self.request_interval)
                .map(|elapsed| self.request_interval - elapsed);
            *last = Some(now);
            should_wait
        };

        if let Some(wait_time) = should_wait {
            debug!("等待 {:?} 以保持请求间隔", wait_time);
            tokio::time::sleep(wait_time).await;
        }
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.wait_for_rate_limit().await;

        let response = self.client.get(url).send().await?.error_for_status()?;
        let html = response.text_with_charset(DEFAULT_CHARSET).await?;
        debug!("Fetched {} ({} bytes)", url, html.len());
        Ok(html)
    }
}

#[async_trait]
impl QuotePageSource for NaverScraper {
    fn source_name(&self) -> &'static str {
        "naver"
    }

    async fn fetch_quote_fields(&self, code: &str) -> Result<RawQuoteFields> {
        info!("获取标的 {} 的行情页面", code);
        let url = format!("{}/item/main.naver?code={}", self.base_url, code);
        let html = self.fetch_html(&url).await?;
        Ok(locate_quote_fields(&html))
    }

    async fn fetch_exchange_fields(&self) -> Result<RawExchangeFields> {
        info!("获取汇率页面");
        let url = format!("{}/marketindex/", self.base_url);
        let html = self.fetch_html(&url).await?;
        Ok(locate_exchange_fields(&html))
    }

    async fn fetch_listing_page(&self, market: Market, page: u32) -> Result<Vec<Instrument>> {
        debug!("获取 {:?} 上市列表第 {} 页", market, page);
        let url = format!(
            "{}/sise/sise_market_sum.naver?sosok={}&page={}",
            self.base_url,
            market.sosok(),
            page
        );
        let html = self.fetch_html(&url).await?;
        Ok(locate_listing(&html, market))
    }
}

fn first_element<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    let element = document.select(&selector).next();
    element
}

fn has_class(element: ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// 元素内全部文本，连续空白压缩为一个空格
fn visible_text(element: ElementRef) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    first_element(document, css).and_then(visible_text)
}

/// 数字控件里 `span.blind` 保存完整数值，其余 span 是逐位拆开的显示用数字
fn blind_text(element: ElementRef) -> Option<String> {
    if let Ok(selector) = Selector::parse("span.blind") {
        if let Some(text) = element.select(&selector).find_map(visible_text) {
            return Some(text);
        }
    }
    visible_text(element)
}

fn with_percent(text: String) -> String {
    if text.ends_with('%') {
        text
    } else {
        format!("{}%", text)
    }
}

/// 从个股行情页面定位原始片段
pub fn locate_quote_fields(html: &str) -> RawQuoteFields {
    let document = Html::parse_document(html);
    let mut fields = RawQuoteFields {
        name: first_text(&document, ".wrap_company h2 a"),
        as_of_date: first_text(&document, ".description .date"),
        ..Default::default()
    };

    // 平盘时没有 no_up/no_down，按上涨分支处理（不加负号）
    if let Some(em) = first_element(&document, ".no_today em") {
        let price = blind_text(em);
        if has_class(em, "no_down") {
            fields.price_down = price;
        } else {
            fields.price_up = price;
        }
    }

    // 第一个 em 是涨跌金额，第二个是涨跌幅
    if let Ok(selector) = Selector::parse(".no_exday em") {
        for (index, em) in document.select(&selector).take(2).enumerate() {
            let falling = has_class(em, "no_down");
            let Some(text) = blind_text(em) else { continue };
            match (index, falling) {
                (0, false) => fields.change_amount_up = Some(text),
                (0, true) => fields.change_amount_down = Some(text),
                (_, false) => fields.change_percent_up = Some(with_percent(text)),
                (_, true) => fields.change_percent_down = Some(with_percent(text)),
            }
        }
    }

    if let Ok(selector) = Selector::parse(".no_exday em span") {
        let combined: String = document
            .select(&selector)
            .filter(|span| !has_class(*span, "blind"))
            .flat_map(|span| span.text())
            .map(str::trim)
            .collect();
        if !combined.is_empty() {
            fields.combined_change = Some(combined);
        }
    }

    if let Ok(selector) = Selector::parse("table.no_info td") {
        fields.volume = document
            .select(&selector)
            .find(|td| td.text().any(|t| t.contains("거래량")))
            .and_then(|td| {
                let em = Selector::parse("em").ok()?;
                let value = td.select(&em).next().and_then(blind_text);
                value
            });
    }

    fields
}

/// 从汇率页面定位原始片段，方向取自变动值后面的兄弟元素
pub fn locate_exchange_fields(html: &str) -> RawExchangeFields {
    let document = Html::parse_document(html);
    let change_element = first_element(&document, "#exchangeList .change");

    let direction = change_element
        .and_then(|change| change.next_siblings().find_map(ElementRef::wrap))
        .and_then(visible_text)
        .or_else(|| {
            let head = first_element(&document, "#exchangeList .head_info")?;
            if has_class(head, "point_dn") {
                Some("하락".to_string())
            } else if has_class(head, "point_up") {
                Some("상승".to_string())
            } else {
                None
            }
        });

    RawExchangeFields {
        rate: first_text(&document, "#exchangeList .value"),
        change: change_element.and_then(visible_text),
        direction,
    }
}

fn code_from_href(href: &str) -> Option<String> {
    let rest = href.split("code=").nth(1)?;
    let code = rest.split('&').next().unwrap_or(rest).trim();
    (!code.is_empty()).then(|| code.to_string())
}

/// 从市值排行列表页解析 名称 -> 代码
pub fn locate_listing(html: &str, market: Market) -> Vec<Instrument> {
    let document = Html::parse_document(html);
    let mut instruments = Vec::new();

    if let Ok(selector) = Selector::parse("table.type_2 a.tltle") {
        for link in document.select(&selector) {
            let name = visible_text(link);
            let code = link.value().attr("href").and_then(code_from_href);
            if let (Some(name), Some(code)) = (name, code) {
                instruments.push(Instrument { name, code, market });
            }
        }
    }

    instruments
}

#[cfg(test)]
mod tests {
    use super::*;

    const RISING_PAGE: &str = r##"
        <div class="wrap_company"><h2><a href="#">삼성전자</a></h2></div>
        <div class="description"><p class="date">2025.03.14 16:10 <span>기준(장마감)</span></p></div>
        <p class="no_today">
            <em class="no_up"><span class="no5">5</span><span class="no5">5</span><span class="shim">,</span>
            <span class="no2">2</span><span class="no0">0</span><span class="no0">0</span><span class="blind">55,200</span></em>
        </p>
        <p class="no_exday">
            <em class="no_up"><span class="ico up">상승</span><span class="no1">1</span><span class="shim">,</span>
            <span class="no9">9</span><span class="no0">0</span><span class="no0">0</span><span class="blind">1,900</span></em>
            <em class="no_up"><span class="ico plus">+</span><span class="no3">3</span><span class="jum">.</span>
            <span class="no5">5</span><span class="no4">4</span><span class="blind">3.54</span><span class="per">%</span></em>
        </p>
        <table class="no_info"><tr>
            <td><span class="sptxt sp_txt2">전일</span><em><span class="blind">53,300</span></em></td>
            <td><span class="sptxt sp_txt9">거래량</span><em><span class="blind">12,345,678</span></em></td>
        </tr></table>
    "##;

    const FALLING_PAGE: &str = r##"
        <div class="wrap_company"><h2><a href="#">SK하이닉스</a></h2></div>
        <p class="no_today"><em class="no_down"><span class="blind">190,100</span></em></p>
        <p class="no_exday">
            <em class="no_down"><span class="ico down">하락</span><span class="no9">9</span><span class="no0">0</span><span class="no0">0</span><span class="blind">900</span></em>
            <em class="no_down"><span class="ico minus">-</span><span class="no2">2</span><span class="jum">.</span><span class="no4">4</span><span class="no5">5</span><span class="blind">2.45</span><span class="per">%</span></em>
        </p>
    "##;

    #[test]
    fn locates_rising_quote_fragments() {
        let fields = locate_quote_fields(RISING_PAGE);
        assert_eq!(fields.name.as_deref(), Some("삼성전자"));
        assert_eq!(fields.as_of_date.as_deref(), Some("2025.03.14 16:10 기준(장마감)"));
        assert_eq!(fields.price_up.as_deref(), Some("55,200"));
        assert_eq!(fields.price_down, None);
        assert_eq!(fields.change_amount_up.as_deref(), Some("1,900"));
        assert_eq!(fields.change_percent_up.as_deref(), Some("3.54%"));
        assert_eq!(fields.volume.as_deref(), Some("12,345,678"));
        assert_eq!(fields.combined_change.as_deref(), Some("상승1,900+3.54%"));
    }

    #[test]
    fn locates_falling_quote_fragments() {
        let fields = locate_quote_fields(FALLING_PAGE);
        assert_eq!(fields.price_down.as_deref(), Some("190,100"));
        assert_eq!(fields.change_amount_down.as_deref(), Some("900"));
        assert_eq!(fields.change_percent_down.as_deref(), Some("2.45%"));
        assert_eq!(fields.combined_change.as_deref(), Some("하락900-2.45%"));
        assert_eq!(fields.volume, None);
        assert_eq!(fields.as_of_date, None);
    }

    #[test]
    fn unlisted_page_has_no_name() {
        let fields = locate_quote_fields("<html><body><p>존재하지 않는 종목입니다</p></body></html>");
        assert_eq!(fields, RawQuoteFields::default());
    }

    #[test]
    fn locates_exchange_direction_from_sibling() {
        let html = r#"
            <div id="exchangeList"><a class="head usd"><div class="head_info point_dn">
                <span class="value">1,450.50</span><span class="txt_krw"><span class="blind">원</span></span>
                <span class="change"> 3.50</span><span class="blind">하락</span>
            </div></a></div>
        "#;
        let fields = locate_exchange_fields(html);
        assert_eq!(fields.rate.as_deref(), Some("1,450.50"));
        assert_eq!(fields.change.as_deref(), Some("3.50"));
        assert_eq!(fields.direction.as_deref(), Some("하락"));
    }

    #[test]
    fn exchange_direction_falls_back_to_head_class() {
        let html = r#"
            <div id="exchangeList"><div class="head_info point_up">
                <span class="value">1,450.50</span><span class="change">3.50</span>
            </div></div>
        "#;
        let fields = locate_exchange_fields(html);
        assert_eq!(fields.direction.as_deref(), Some("상승"));
    }

    #[test]
    fn locates_listing_entries() {
        let html = r#"
            <table class="type_2"><tbody>
                <tr><td><a href="/item/main.naver?code=005930" class="tltle">삼성전자</a></td></tr>
                <tr><td><a href="/item/main.naver?code=000660&amp;x=1" class="tltle">SK하이닉스</a></td></tr>
                <tr><td><a href="/item/board.naver" class="tltle">토론실</a></td></tr>
            </tbody></table>
        "#;
        let listing = locate_listing(html, Market::Kospi);
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].code, "005930");
        assert_eq!(listing[1].name, "SK하이닉스");
        assert_eq!(listing[1].code, "000660");
        assert_eq!(listing[1].market, Market::Kospi);
    }
}
