// 公开导出的模块，供外部使用
pub mod models;
pub mod extractor;
pub mod ledger;
pub mod data_provider;
pub mod errors;

// 为了支持主程序，暂时保持这些模块公开
#[doc(hidden)]
pub mod scrapers;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod services;
#[doc(hidden)]
pub mod util;

// 重新导出常用类型，方便使用
pub use models::quote::{QuoteRecord, ExchangeRateRecord, LedgerRow, Extraction, RawQuoteFields, RawExchangeFields};
pub use extractor::{extract_quote, extract_exchange_rate, ExtractionMode};
pub use ledger::{append_records, AppendOutcome};
pub use data_provider::{InstrumentDirectory, Resolution};
pub use errors::{Result, QuoteHubError};
