use serde::{Deserialize, Serialize};

/// 无法提取字段时写入的占位值
pub const NOT_AVAILABLE: &str = "N/A";

/// 台账中行情部分的列名，按写入顺序排列
pub const QUOTE_COLUMNS: [&str; 6] = [
    "asOfDate",
    "name",
    "currentPrice",
    "changeAmount",
    "changePercent",
    "volume",
];

/// 台账中汇率部分的列名
pub const EXCHANGE_COLUMNS: [&str; 3] = ["currencyPair", "rate", "changeText"];

/// 从行情页面定位到的原始文本片段
///
/// 上涨/下跌两组字段一般只有一组有值。空字符串与 `None` 等价。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawQuoteFields {
    pub name: Option<String>,
    pub as_of_date: Option<String>,
    pub price_up: Option<String>,
    pub price_down: Option<String>,
    pub change_amount_up: Option<String>,
    pub change_amount_down: Option<String>,
    pub change_percent_up: Option<String>,
    pub change_percent_down: Option<String>,
    pub volume: Option<String>,
    /// 文本模式下的整段涨跌文本，例如 `상승1,900+3.54%`
    pub combined_change: Option<String>,
}

/// 从汇率页面定位到的原始文本片段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExchangeFields {
    pub rate: Option<String>,
    pub change: Option<String>,
    pub direction: Option<String>,
}

/// 单个标的在某一时刻的行情记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
    pub as_of_date: String,
    pub name: String,
    pub current_price: String,
    pub change_amount: String,
    pub change_percent: String,
    pub volume: String,
}

/// 单个货币对的汇率记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRateRecord {
    pub currency_pair: String,
    pub rate: String,
    pub change_text: String,
}

/// 提取结果。区分完整记录、含占位值的部分记录和被跳过的标的
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction<T> {
    Complete(T),
    Partial { record: T, missing: Vec<&'static str> },
    Skipped(String),
}

impl<T> Extraction<T> {
    pub(crate) fn from_parts(record: T, missing: Vec<&'static str>) -> Self {
        if missing.is_empty() {
            Extraction::Complete(record)
        } else {
            Extraction::Partial { record, missing }
        }
    }

    pub fn record(&self) -> Option<&T> {
        match self {
            Extraction::Complete(record) | Extraction::Partial { record, .. } => Some(record),
            Extraction::Skipped(_) => None,
        }
    }

    pub fn into_record(self) -> Option<T> {
        match self {
            Extraction::Complete(record) | Extraction::Partial { record, .. } => Some(record),
            Extraction::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Extraction::Skipped(_))
    }
}

/// 台账中的一行：保持插入顺序的 列名 -> 值 映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRow {
    cells: Vec<(String, String)>,
}

impl LedgerRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个单元格，列已存在时覆盖原值但保留位置
    pub fn insert(&mut self, column: &str, value: &str) {
        match self.cells.iter_mut().find(|(c, _)| c == column) {
            Some(cell) => cell.1 = value.to_string(),
            None => self.cells.push((column.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 将行情记录与批次级的汇率记录合并为一行
    pub fn from_quote(quote: &QuoteRecord, exchange: Option<&ExchangeRateRecord>) -> Self {
        let mut row = Self::new();
        let values = [
            &quote.as_of_date,
            &quote.name,
            &quote.current_price,
            &quote.change_amount,
            &quote.change_percent,
            &quote.volume,
        ];
        for (column, value) in QUOTE_COLUMNS.iter().zip(values) {
            row.insert(column, value);
        }

        if let Some(exchange) = exchange {
            let values = [&exchange.currency_pair, &exchange.rate, &exchange.change_text];
            for (column, value) in EXCHANGE_COLUMNS.iter().zip(values) {
                row.insert(column, value);
            }
        }

        row
    }
}

impl FromIterator<(String, String)> for LedgerRow {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (column, value) in iter {
            row.insert(&column, &value);
        }
        row
    }
}
