use chrono::NaiveTime;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use crate::errors::{Result, QuoteHubError};

// 千分位分组的金额，例如 1,900
static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{1,3}(?:,\d{3})*").expect("amount pattern is valid")
});

// 带符号的百分比，例如 +3.54%
static PERCENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-+]?\d+\.\d+%").expect("percent pattern is valid")
});

/// 取出去除首尾空白后的非空片段
pub fn fragment(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// 去掉页面自带的正负号
pub fn strip_sign(text: &str) -> &str {
    text.trim().trim_start_matches(['+', '-'])
}

/// 从整段涨跌文本中分别提取金额和百分比
///
/// 任一模式匹配失败时该项返回 `None`，另一项不受影响。
pub fn isolate_change(text: &str) -> (Option<String>, Option<String>) {
    let amount = AMOUNT_PATTERN.find(text).map(|m| m.as_str().to_string());
    let percent = PERCENT_PATTERN.find(text).map(|m| m.as_str().to_string());
    debug!("Isolated change from {:?}: amount={:?} percent={:?}", text, amount, percent);
    (amount, percent)
}

/// 解析 HH:MM 格式的定时时间
pub fn parse_schedule_time(text: &str) -> Result<NaiveTime> {
    Ok(NaiveTime::parse_from_str(text.trim(), "%H:%M")?)
}

/// 命令行传入的路径按当前工作目录解析，不拼接到数据目录下
pub fn resolve_from_cwd(path: &str) -> Result<PathBuf> {
    let path = Path::new(path);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// 解析标的代码列表：每行一个代码，忽略空行
pub fn parse_codes<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut codes = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        codes.push(trimmed.to_string());
    }
    Ok(codes)
}

pub fn read_codes_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        QuoteHubError::ConfigError(format!("Cannot open codes file {}: {}", path.display(), e))
    })?;
    parse_codes(BufReader::new(file))
}

// CSV读写工具
pub mod csv_utils {
    use super::*;
    use std::fs;
    use std::io::Write;

    /// UTF-8 字节序标记，保证表格软件正确识别韩文
    pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

    /// 内存中的表格：表头与按顺序排列的数据行
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct CsvTable {
        pub headers: Vec<String>,
        pub rows: Vec<Vec<String>>,
    }

    impl CsvTable {
        pub fn column_index(&self, column: &str) -> Option<usize> {
            self.headers.iter().position(|h| h == column)
        }
    }

    /// 读取带表头的CSV文件
    ///
    /// 空文件、缺少表头、行长度不一致或非 UTF-8 内容都返回错误。
    pub fn read_table<P: AsRef<Path>>(path: P) -> Result<CsvTable> {
        let bytes = fs::read(path.as_ref())?;
        read_table_from_memory(&bytes)
    }

    pub fn read_table_from_memory(data: &[u8]) -> Result<CsvTable> {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
        if data.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(QuoteHubError::DataError("CSV file is empty".to_string()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(data);

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(QuoteHubError::DataError("CSV header row is empty".to_string()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(CsvTable { headers, rows })
    }

    /// 整体覆盖写入CSV文件（BOM + 表头 + 数据行）
    pub fn write_table<P: AsRef<Path>>(path: P, table: &CsvTable) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = File::create(path)?;
        file.write_all(UTF8_BOM)?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        Ok(())
    }
}
