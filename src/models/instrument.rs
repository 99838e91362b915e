use serde::{Deserialize, Serialize};

/// 上市市场
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    /// 行情站点列表页使用的市场参数
    pub fn sosok(&self) -> u8 {
        match self {
            Market::Kospi => 0,
            Market::Kosdaq => 1,
        }
    }

    pub fn all() -> [Market; 2] {
        [Market::Kospi, Market::Kosdaq]
    }
}

/// Instrument directory entry: display name mapped to its code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub code: String,
    pub market: Market,
}
