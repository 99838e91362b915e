use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuoteHubError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    #[error("Selector error: {0}")]
    SelectorError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, QuoteHubError>;

// 用于从字符串创建错误
impl From<String> for QuoteHubError {
    fn from(s: String) -> Self {
        QuoteHubError::Unknown(s)
    }
}

impl From<&str> for QuoteHubError {
    fn from(s: &str) -> Self {
        QuoteHubError::Unknown(s.to_string())
    }
}
