use async_trait::async_trait;
use quote_ledger::config::Config;
use quote_ledger::data_provider::Resolution;
use quote_ledger::errors::{QuoteHubError, Result};
use quote_ledger::ledger::read_ledger;
use quote_ledger::models::instrument::{Instrument, Market};
use quote_ledger::models::quote::{RawExchangeFields, RawQuoteFields, NOT_AVAILABLE};
use quote_ledger::scrapers::base::QuotePageSource;
use quote_ledger::services::quote_service::QuoteService;
use quote_ledger::services::scheduler::CrawlScheduler;
use chrono::{NaiveTime, Utc};
use chrono_tz::Asia::Seoul;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// 内存中的页面数据源
#[derive(Default)]
struct FakeSource {
    quotes: HashMap<String, RawQuoteFields>,
    exchange: Option<RawExchangeFields>,
    listing: Vec<Instrument>,
    // 每次抓取行情页的耗时
    delay: Duration,
    exchange_requests: AtomicUsize,
    quote_requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSource {
    fn with_quote(mut self, code: &str, fields: RawQuoteFields) -> Self {
        self.quotes.insert(code.to_string(), fields);
        self
    }
}

#[async_trait]
impl QuotePageSource for FakeSource {
    fn source_name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_quote_fields(&self, code: &str) -> Result<RawQuoteFields> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.quote_requests.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.quotes
            .get(code)
            .cloned()
            .ok_or_else(|| QuoteHubError::DataError(format!("no page for {}", code)))
    }

    async fn fetch_exchange_fields(&self) -> Result<RawExchangeFields> {
        self.exchange_requests.fetch_add(1, Ordering::SeqCst);
        self.exchange
            .clone()
            .ok_or_else(|| QuoteHubError::DataError("exchange page unavailable".to_string()))
    }

    async fn fetch_listing_page(&self, market: Market, page: u32) -> Result<Vec<Instrument>> {
        // 超出范围时重复返回最后一页
        let entries: Vec<Instrument> = self.listing.iter().filter(|i| i.market == market).cloned().collect();
        let start = ((page as usize - 1) * 2).min(entries.len().saturating_sub(2));
        Ok(entries.into_iter().skip(start).take(2).collect())
    }
}

fn some(s: &str) -> Option<String> {
    Some(s.to_string())
}

fn rising(name: &str, price: &str) -> RawQuoteFields {
    RawQuoteFields {
        name: some(name),
        as_of_date: some("2025.03.14 16:10"),
        price_up: some(price),
        change_amount_up: some("1,900"),
        change_percent_up: some("3.54%"),
        volume: some("12,345"),
        ..Default::default()
    }
}

fn usd_krw() -> RawExchangeFields {
    RawExchangeFields {
        rate: some("1,450.50"),
        change: some("3.50"),
        direction: some("하락"),
    }
}

fn instrument(name: &str, code: &str, market: Market) -> Instrument {
    Instrument { name: name.to_string(), code: code.to_string(), market }
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

#[tokio::test]
async fn batch_writes_one_row_per_collected_quote() {
    let dir = tempdir().unwrap();
    let config = Config::new().with_data_dir(dir.path().to_str().unwrap());
    let source = FakeSource {
        exchange: Some(usd_krw()),
        ..Default::default()
    }
    .with_quote("005930", rising("삼성전자", "55,200"))
    .with_quote("000660", rising("SK하이닉스", "190,100"))
    .with_quote("999999", RawQuoteFields::default());
    let source = Arc::new(source);
    let service = QuoteService::new(config, source.clone());

    let report = service
        .run_batch(&codes(&["005930", "999999", "000660", "123456"]))
        .await
        .unwrap();

    assert_eq!(report.requested, 4);
    assert_eq!(report.complete, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 1);
    assert!(report.exchange_collected);
    assert_eq!(report.rows_written, 2);
    assert_eq!(source.exchange_requests.load(Ordering::SeqCst), 1);

    let rows = read_ledger(service.ledger_path()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some("삼성전자"));
    assert_eq!(rows[1].get("name"), Some("SK하이닉스"));
    assert_eq!(rows[0].get("changeText"), Some("-3.50"));
    assert_eq!(rows[0].get("changeText"), rows[1].get("changeText"));
    assert_eq!(rows[0].get("changePercent"), Some("+3.54%"));
}

#[tokio::test]
async fn missing_exchange_rate_still_writes_quotes() {
    let dir = tempdir().unwrap();
    let config = Config::new().with_data_dir(dir.path().to_str().unwrap());
    let fields = RawQuoteFields {
        volume: None,
        ..rising("카카오", "41,000")
    };
    let source = FakeSource::default().with_quote("035720", fields);
    let service = QuoteService::new(config, Arc::new(source));

    let report = service.run_batch(&codes(&["035720"])).await.unwrap();
    assert_eq!(report.partial, 1);
    assert!(!report.exchange_collected);

    let rows = read_ledger(service.ledger_path()).unwrap();
    assert_eq!(rows[0].get("volume"), Some(NOT_AVAILABLE));
    assert_eq!(rows[0].get("rate"), None);
}

#[tokio::test]
async fn failed_write_keeps_batch_for_retry() {
    let dir = tempdir().unwrap();
    let config = Config::new()
        .with_data_dir(dir.path().to_str().unwrap())
        .with_collect_exchange(false);
    let service = QuoteService::new(
        config,
        Arc::new(FakeSource::default().with_quote("005930", rising("삼성전자", "55,200"))),
    );

    // 台账路径被目录占用，写入必然失败
    std::fs::create_dir_all(service.ledger_path()).unwrap();
    assert!(service.run_batch(&codes(&["005930"])).await.is_err());
    assert_eq!(service.pending_rows().await, 1);

    std::fs::remove_dir(service.ledger_path()).unwrap();
    let report = service.run_batch(&codes(&["005930"])).await.unwrap();
    assert_eq!(report.carried_over, 1);
    assert_eq!(report.rows_written, 2);
    assert_eq!(service.pending_rows().await, 0);
    assert_eq!(read_ledger(service.ledger_path()).unwrap().len(), 2);
}

#[tokio::test]
async fn codes_file_drives_the_batch() {
    let dir = tempdir().unwrap();
    let config = Config::new()
        .with_data_dir(dir.path().to_str().unwrap())
        .with_collect_exchange(false);
    std::fs::write(config.codes_path(), "005930\n\n000660\n").unwrap();
    let source = FakeSource::default()
        .with_quote("005930", rising("삼성전자", "55,200"))
        .with_quote("000660", rising("SK하이닉스", "190,100"));
    let service = QuoteService::new(config, Arc::new(source));

    let report = service.run_codes_file().await.unwrap();
    assert_eq!(report.requested, 2);
    assert_eq!(report.rows_written, 2);
}

#[tokio::test]
async fn directory_is_crawled_once_and_search_runs_unique_match() {
    let dir = tempdir().unwrap();
    let config = Config::new()
        .with_data_dir(dir.path().to_str().unwrap())
        .with_collect_exchange(false);
    let source = FakeSource {
        listing: vec![
            instrument("삼성전자", "005930", Market::Kospi),
            instrument("삼성전자우", "005935", Market::Kospi),
            instrument("SK하이닉스", "000660", Market::Kospi),
            instrument("에코프로비엠", "247540", Market::Kosdaq),
        ],
        ..Default::default()
    }
    .with_quote("247540", rising("에코프로비엠", "120,000"));
    let service = QuoteService::new(config, Arc::new(source));

    let directory = service.load_directory(false).await.unwrap();
    assert_eq!(directory.len(), 4);
    assert!(service.config().directory_path().exists());

    let (resolution, report) = service.search_and_run("에코프로").await.unwrap();
    assert!(matches!(resolution, Resolution::Unique(ref i) if i.code == "247540"));
    assert_eq!(report.unwrap().rows_written, 1);

    let (resolution, report) = service.search_and_run("삼성").await.unwrap();
    assert!(matches!(resolution, Resolution::Ambiguous(ref found) if found.len() == 2));
    assert!(report.is_none());
}

#[tokio::test]
async fn scheduler_stops_without_running_a_tick() {
    let dir = tempdir().unwrap();
    let config = Config::new().with_data_dir(dir.path().to_str().unwrap());
    let service = Arc::new(QuoteService::new(config, Arc::new(FakeSource::default())));

    let times = vec![NaiveTime::from_hms_opt(3, 0, 0).unwrap(), NaiveTime::from_hms_opt(4, 0, 0).unwrap()];
    let scheduler = CrawlScheduler::new(times, Seoul).unwrap();
    let handle = scheduler.start(service.clone());

    let ticks = handle.stop().await;
    assert_eq!(ticks, 0);
    assert!(!service.ledger_path().exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_batches_are_serialized() {
    let dir = tempdir().unwrap();
    let config = Config::new()
        .with_data_dir(dir.path().to_str().unwrap())
        .with_collect_exchange(false);
    let source = FakeSource {
        delay: Duration::from_millis(50),
        ..Default::default()
    }
    .with_quote("005930", rising("삼성전자", "55,200"))
    .with_quote("000660", rising("SK하이닉스", "190,100"))
    .with_quote("035720", rising("카카오", "41,000"));
    let source = Arc::new(source);
    let service = Arc::new(QuoteService::new(config, source.clone()));

    let first = tokio::spawn({
        let service = service.clone();
        async move { service.run_batch(&codes(&["005930", "000660"])).await }
    });
    let second = tokio::spawn({
        let service = service.clone();
        async move { service.run_batch(&codes(&["035720"])).await }
    });
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap().unwrap().rows_written, 2);
    assert_eq!(second.unwrap().unwrap().rows_written, 1);
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(read_ledger(service.ledger_path()).unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_during_scheduled_crawl_lets_it_finish() {
    let dir = tempdir().unwrap();
    let config = Config::new()
        .with_data_dir(dir.path().to_str().unwrap())
        .with_collect_exchange(false);
    std::fs::write(config.codes_path(), "005930\n000660\n").unwrap();
    let source = FakeSource {
        delay: Duration::from_millis(200),
        ..Default::default()
    }
    .with_quote("005930", rising("삼성전자", "55,200"))
    .with_quote("000660", rising("SK하이닉스", "190,100"))
    .with_quote("035720", rising("카카오", "41,000"));
    let source = Arc::new(source);
    let service = Arc::new(QuoteService::new(config, source.clone()));

    // 一秒后触发一次，下一次在明天
    let fire_at = (Utc::now().with_timezone(&Seoul) + chrono::Duration::seconds(1)).time();
    let handle = CrawlScheduler::new(vec![fire_at], Seoul).unwrap().start(service.clone());

    tokio::time::timeout(Duration::from_secs(5), async {
        while source.quote_requests.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scheduled crawl did not start");

    // 定时抓取进行中，交互式批次必须等待
    let interactive = tokio::spawn({
        let service = service.clone();
        async move { service.run_batch(&codes(&["035720"])).await }
    });

    let ticks = handle.stop().await;
    assert_eq!(ticks, 1);
    assert_eq!(interactive.await.unwrap().unwrap().rows_written, 1);
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);

    let rows = read_ledger(service.ledger_path()).unwrap();
    let names: Vec<_> = rows.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec!["삼성전자", "SK하이닉스", "카카오"]);
}

#[tokio::test]
async fn damaged_directory_file_is_rebuilt_from_listing() {
    let dir = tempdir().unwrap();
    let config = Config::new().with_data_dir(dir.path().to_str().unwrap());
    std::fs::write(config.directory_path(), "name,code,market\n삼성전자,005930,NYSE\n").unwrap();
    let source = FakeSource {
        listing: vec![
            instrument("삼성전자", "005930", Market::Kospi),
            instrument("에코프로비엠", "247540", Market::Kosdaq),
        ],
        ..Default::default()
    };
    let service = QuoteService::new(config, Arc::new(source));

    let directory = service.load_directory(false).await.unwrap();
    assert_eq!(directory.len(), 2);

    // 重建后的文件可以正常读取
    let directory = service.load_directory(false).await.unwrap();
    assert!(directory.get_by_code("247540").is_some());
}
