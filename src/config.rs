use crate::extractor::ExtractionMode;
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

// 默认的每日定时抓取时间（首尔时间）
const DEFAULT_SCHEDULE: [(u32, u32); 5] = [(9, 5), (11, 0), (13, 0), (15, 35), (18, 0)];

pub struct Config {
    pub data_dir: String,
    pub ledger_file: String,
    pub codes_file: String,
    pub directory_file: String,
    pub currency_pair: String,
    pub extraction_mode: ExtractionMode,
    pub collect_exchange: bool,
    pub request_interval: Duration,
    pub request_timeout: Duration,
    pub schedule_times: Vec<NaiveTime>,
    pub schedule_timezone: Tz,
    pub listing_max_pages: u32,
}

impl Config {
    pub fn new() -> Self {
        Self {
            data_dir: "data".to_string(),
            ledger_file: "stock_exchange_data.csv".to_string(),
            codes_file: "stocks.txt".to_string(),
            directory_file: "stock_codes.csv".to_string(),
            currency_pair: "USD/KRW".to_string(),
            extraction_mode: ExtractionMode::StructuredFragment,
            collect_exchange: true,
            request_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            schedule_times: DEFAULT_SCHEDULE
                .iter()
                .filter_map(|&(h, m)| NaiveTime::from_hms_opt(h, m, 0))
                .collect(),
            schedule_timezone: chrono_tz::Asia::Seoul,
            listing_max_pages: 50,
        }
    }

    pub fn with_data_dir(mut self, dir: &str) -> Self {
        self.data_dir = dir.to_string();
        self
    }

    pub fn with_ledger_file(mut self, file: &str) -> Self {
        self.ledger_file = file.to_string();
        self
    }

    pub fn with_codes_file(mut self, file: &str) -> Self {
        self.codes_file = file.to_string();
        self
    }

    pub fn with_directory_file(mut self, file: &str) -> Self {
        self.directory_file = file.to_string();
        self
    }

    pub fn with_currency_pair(mut self, pair: &str) -> Self {
        self.currency_pair = pair.to_string();
        self
    }

    pub fn with_extraction_mode(mut self, mode: ExtractionMode) -> Self {
        self.extraction_mode = mode;
        self
    }

    pub fn with_collect_exchange(mut self, collect: bool) -> Self {
        self.collect_exchange = collect;
        self
    }

    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_schedule_times(mut self, times: Vec<NaiveTime>) -> Self {
        self.schedule_times = times;
        self
    }

    pub fn with_schedule_timezone(mut self, tz: Tz) -> Self {
        self.schedule_timezone = tz;
        self
    }

    pub fn with_listing_max_pages(mut self, pages: u32) -> Self {
        self.listing_max_pages = pages;
        self
    }

    /// 台账文件路径
    pub fn ledger_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.ledger_file)
    }

    /// 标的代码列表文件路径（相对路径以数据目录为基准）
    pub fn codes_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.codes_file)
    }

    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.directory_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
