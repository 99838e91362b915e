use crate::config::Config;
use crate::data_provider::{InstrumentDirectory, Resolution};
use crate::errors::{Result, QuoteHubError};
use crate::extractor::{self, ExtractionMode};
use crate::ledger::{self, AppendOutcome};
use crate::models::instrument::Market;
use crate::models::quote::{ExchangeRateRecord, Extraction, LedgerRow, QuoteRecord};
use crate::scrapers::base::QuotePageSource;
use crate::util;
use log::{error, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// 一次批处理的统计结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub requested: usize,
    pub complete: usize,
    pub partial: usize,
    pub skipped: usize,
    /// 页面请求失败的标的数
    pub failed: usize,
    pub exchange_collected: bool,
    /// 上次写入失败后保留下来的行数
    pub carried_over: usize,
    pub rows_written: usize,
}

/// 行情服务：抓取、提取、写入台账
pub struct QuoteService {
    config: Config,
    source: Arc<dyn QuotePageSource + Send + Sync>,
    ledger_path: PathBuf,
    // 待写入的行。整个批处理期间持有该锁，定时任务与手动调用不会交错
    pending: Mutex<Vec<LedgerRow>>,
}

impl QuoteService {
    /// 创建新的行情服务实例
    pub fn new(config: Config, source: Arc<dyn QuotePageSource + Send + Sync>) -> Self {
        let ledger_path = config.ledger_path();
        Self {
            config,
            source,
            ledger_path,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 获取台账文件路径
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// 尚未成功写入台账的行数
    pub async fn pending_rows(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn collect_quote(&self, code: &str, mode: ExtractionMode, report: &mut BatchReport) -> Option<QuoteRecord> {
        let fields = match self.source.fetch_quote_fields(code).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Failed to fetch quote page for {} from {}: {}", code, self.source.source_name(), e);
                report.failed += 1;
                return None;
            }
        };

        match extractor::extract_quote(&fields, mode) {
            Extraction::Complete(record) => {
                report.complete += 1;
                Some(record)
            }
            Extraction::Partial { record, missing } => {
                info!("Quote {} ({}) saved with N/A for: {}", record.name, code, missing.join(", "));
                report.partial += 1;
                Some(record)
            }
            Extraction::Skipped(reason) => {
                warn!("Skipping instrument {}: {}", code, reason);
                report.skipped += 1;
                None
            }
        }
    }

    async fn collect_exchange_rate(&self) -> Option<ExchangeRateRecord> {
        let fields = match self.source.fetch_exchange_fields().await {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Failed to fetch exchange rate page: {}", e);
                return None;
            }
        };

        let extraction = extractor::extract_exchange_rate(&fields, &self.config.currency_pair);
        if let Extraction::Skipped(reason) = &extraction {
            warn!("Exchange rate not collected: {}", reason);
        }
        extraction.into_record()
    }

    /// 处理一批标的代码并写入台账
    ///
    /// 汇率每批只抓取一次，附加到本批的每一行。单个标的失败只会跳过该标的；
    /// 只有台账写入失败会返回错误，此时本批数据保留在内存中，下次调用时一并写入。
    pub async fn run_batch(&self, codes: &[String]) -> Result<BatchReport> {
        let mut pending = self.pending.lock().await;
        let mut report = BatchReport {
            requested: codes.len(),
            carried_over: pending.len(),
            ..Default::default()
        };

        if codes.is_empty() && pending.is_empty() {
            warn!("No instrument codes to process");
            return Ok(report);
        }

        info!("Processing {} instruments", codes.len());
        let mode = self.config.extraction_mode;
        let mut quotes = Vec::new();
        for code in codes {
            if let Some(quote) = self.collect_quote(code, mode, &mut report).await {
                quotes.push(quote);
            }
        }

        let exchange = if self.config.collect_exchange && !quotes.is_empty() {
            self.collect_exchange_rate().await
        } else {
            None
        };
        report.exchange_collected = exchange.is_some();

        pending.extend(quotes.iter().map(|q| LedgerRow::from_quote(q, exchange.as_ref())));

        match ledger::append_records(&self.ledger_path, &pending) {
            Ok(outcome) => {
                report.rows_written = outcome.rows_written();
                if let AppendOutcome::Written { recovered: true, .. } = outcome {
                    warn!("Ledger {} was rebuilt from the current batch", self.ledger_path.display());
                }
                pending.clear();
            }
            Err(e) => {
                error!(
                    "Failed to write ledger {}: {} ({} rows kept for retry)",
                    self.ledger_path.display(),
                    e,
                    pending.len()
                );
                return Err(e);
            }
        }

        info!(
            "Batch done: {} complete, {} partial, {} skipped, {} failed, {} rows written",
            report.complete, report.partial, report.skipped, report.failed, report.rows_written
        );
        Ok(report)
    }

    /// 读取代码列表文件并处理
    pub async fn run_codes_file(&self) -> Result<BatchReport> {
        let path = self.config.codes_path();
        let codes = util::read_codes_file(&path)?;
        info!("Read {} codes from {}", codes.len(), path.display());
        self.run_batch(&codes).await
    }

    /// 加载标的代码目录，文件不存在、为空或要求重建时重新抓取
    pub async fn load_directory(&self, rebuild: bool) -> Result<InstrumentDirectory> {
        let path = self.config.directory_path();
        if !rebuild && path.exists() {
            match InstrumentDirectory::load_from_file(&path) {
                Ok(directory) if !directory.is_empty() => return Ok(directory),
                Ok(_) => warn!("Instrument directory {} is empty, rebuilding", path.display()),
                Err(e) => warn!("Instrument directory {} is damaged ({}), rebuilding", path.display(), e),
            }
        }

        let directory = self.crawl_directory().await?;
        directory.save_to_file(&path)?;
        Ok(directory)
    }

    async fn crawl_directory(&self) -> Result<InstrumentDirectory> {
        info!("Building instrument directory from {} listing", self.source.source_name());
        let mut instruments = Vec::new();
        let mut seen = HashSet::new();

        for market in Market::all() {
            for page in 1..=self.config.listing_max_pages {
                let entries = match self.source.fetch_listing_page(market, page).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!("Failed to fetch {:?} listing page {}: {}", market, page, e);
                        break;
                    }
                };

                // 超出最后一页时站点会重复返回最后一页
                let before = instruments.len();
                for entry in entries {
                    if seen.insert(entry.code.clone()) {
                        instruments.push(entry);
                    }
                }
                if instruments.len() == before {
                    break;
                }
            }
            info!("Collected {} instruments after {:?}", instruments.len(), market);
        }

        if instruments.is_empty() {
            return Err(QuoteHubError::DataError("Listing crawl returned no instruments".to_string()));
        }

        Ok(InstrumentDirectory::new_with_data(instruments))
    }

    /// 按名称搜索标的，唯一匹配时立即抓取
    pub async fn search_and_run(&self, query: &str) -> Result<(Resolution, Option<BatchReport>)> {
        let directory = self.load_directory(false).await?;
        let resolution = directory.search(query);

        let report = match &resolution {
            Resolution::Unique(instrument) => {
                info!("Resolved {:?} to {} ({})", query, instrument.name, instrument.code);
                Some(self.run_batch(&[instrument.code.clone()]).await?)
            }
            Resolution::Ambiguous(matches) => {
                info!("{:?} matches {} instruments", query, matches.len());
                None
            }
            Resolution::NotFound => {
                info!("No instrument matches {:?}", query);
                None
            }
        };

        Ok((resolution, report))
    }
}
