//! 行情与汇率文本的提取和规范化
//!
//! 输入是页面上已定位到的原始文本片段，输出是字段齐全的记录。
//! 缺失的字段写入 `N/A`，只有标的名称缺失时整个标的被跳过。

use crate::models::quote::{
    ExchangeRateRecord, Extraction, QuoteRecord, RawExchangeFields, RawQuoteFields, NOT_AVAILABLE,
};
use crate::util;
use log::{debug, warn};
use std::fmt;
use std::str::FromStr;

/// 涨跌数据的来源形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    /// 涨跌金额和百分比混在一段文本中，用正则分离
    TextPattern,
    /// 涨跌金额和百分比按上涨/下跌分别给出
    #[default]
    StructuredFragment,
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "text-pattern" => Ok(ExtractionMode::TextPattern),
            "structured" | "structured-fragment" => Ok(ExtractionMode::StructuredFragment),
            other => Err(format!("Unknown extraction mode: {}", other)),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::TextPattern => write!(f, "text"),
            ExtractionMode::StructuredFragment => write!(f, "structured"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

// 页面上表示下跌的关键字
const FALLING_KEYWORD: &str = "하락";
const RISING_KEYWORD: &str = "상승";

/// 选择上涨片段，没有则选择下跌片段
fn select_direction<'a>(up: &'a Option<String>, down: &'a Option<String>) -> Option<(Direction, &'a str)> {
    util::fragment(up)
        .map(|text| (Direction::Up, text))
        .or_else(|| util::fragment(down).map(|text| (Direction::Down, text)))
}

fn signed_amount(direction: Direction, text: &str) -> String {
    match direction {
        Direction::Up => util::strip_sign(text).to_string(),
        Direction::Down => format!("-{}", util::strip_sign(text)),
    }
}

fn signed_percent(direction: Direction, text: &str) -> String {
    match direction {
        Direction::Up => format!("+{}", util::strip_sign(text)),
        Direction::Down => format!("-{}", util::strip_sign(text)),
    }
}

fn or_missing(value: Option<String>, column: &'static str, missing: &mut Vec<&'static str>) -> String {
    value.unwrap_or_else(|| {
        missing.push(column);
        NOT_AVAILABLE.to_string()
    })
}

fn change_from_fragments(fields: &RawQuoteFields) -> (Option<String>, Option<String>) {
    let up_present = util::fragment(&fields.change_amount_up).is_some()
        || util::fragment(&fields.change_percent_up).is_some();
    let down_present = util::fragment(&fields.change_amount_down).is_some()
        || util::fragment(&fields.change_percent_down).is_some();

    let (direction, amount, percent) = if up_present {
        (Direction::Up, &fields.change_amount_up, &fields.change_percent_up)
    } else if down_present {
        (Direction::Down, &fields.change_amount_down, &fields.change_percent_down)
    } else {
        return (None, None);
    };

    (
        util::fragment(amount).map(|a| signed_amount(direction, a)),
        util::fragment(percent).map(|p| signed_percent(direction, p)),
    )
}

fn change_from_text(fields: &RawQuoteFields) -> (Option<String>, Option<String>) {
    let Some(text) = util::fragment(&fields.combined_change) else {
        return (None, None);
    };

    let (amount, percent) = util::isolate_change(text);
    let falling = text.contains(FALLING_KEYWORD)
        || percent.as_deref().is_some_and(|p| p.starts_with('-'));
    let direction = if falling { Direction::Down } else { Direction::Up };

    (
        amount.map(|a| signed_amount(direction, &a)),
        percent.map(|p| signed_percent(direction, &p)),
    )
}

/// 从原始片段中提取一条行情记录
pub fn extract_quote(fields: &RawQuoteFields, mode: ExtractionMode) -> Extraction<QuoteRecord> {
    let Some(name) = util::fragment(&fields.name) else {
        warn!("Instrument name not found on page, skipping instrument");
        return Extraction::Skipped("instrument name not found".to_string());
    };

    let mut missing = Vec::new();

    let as_of_date = util::fragment(&fields.as_of_date).map(str::to_string);
    let current_price = select_direction(&fields.price_up, &fields.price_down)
        .map(|(_, text)| text.to_string());
    let (change_amount, change_percent) = match mode {
        ExtractionMode::TextPattern => change_from_text(fields),
        ExtractionMode::StructuredFragment => change_from_fragments(fields),
    };
    let volume = util::fragment(&fields.volume).map(str::to_string);

    let record = QuoteRecord {
        as_of_date: or_missing(as_of_date, "asOfDate", &mut missing),
        name: name.to_string(),
        current_price: or_missing(current_price, "currentPrice", &mut missing),
        change_amount: or_missing(change_amount, "changeAmount", &mut missing),
        change_percent: or_missing(change_percent, "changePercent", &mut missing),
        volume: or_missing(volume, "volume", &mut missing),
    };

    if missing.is_empty() {
        debug!("Extracted quote for {}: {:?}", record.name, record);
    } else {
        warn!("Quote for {} is missing fields: {}", record.name, missing.join(", "));
    }

    Extraction::from_parts(record, missing)
}

/// 从原始片段中提取一条汇率记录
///
/// 变动值的符号只由方向文字决定：下跌加 `-`，上涨加 `+`，无法判断时保留原文。
pub fn extract_exchange_rate(fields: &RawExchangeFields, currency_pair: &str) -> Extraction<ExchangeRateRecord> {
    let Some(rate) = util::fragment(&fields.rate) else {
        warn!("Exchange rate for {} not found on page", currency_pair);
        return Extraction::Skipped(format!("exchange rate for {} not found", currency_pair));
    };

    let mut missing = Vec::new();
    let direction = util::fragment(&fields.direction).and_then(|d| {
        let lower = d.to_lowercase();
        if d.contains(FALLING_KEYWORD) || lower.contains("down") {
            Some(Direction::Down)
        } else if d.contains(RISING_KEYWORD) || lower.contains("up") {
            Some(Direction::Up)
        } else {
            None
        }
    });

    let change_text = util::fragment(&fields.change).map(|change| match direction {
        Some(Direction::Down) => format!("-{}", util::strip_sign(change)),
        Some(Direction::Up) => format!("+{}", util::strip_sign(change)),
        None => {
            debug!("No direction for {} change, keeping {:?} verbatim", currency_pair, change);
            change.to_string()
        }
    });

    let record = ExchangeRateRecord {
        currency_pair: currency_pair.to_string(),
        rate: rate.to_string(),
        change_text: or_missing(change_text, "changeText", &mut missing),
    };

    Extraction::from_parts(record, missing)
}
