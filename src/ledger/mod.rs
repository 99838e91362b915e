//! CSV台账：把一批记录追加到已有文件末尾
//!
//! 已有文件按原顺序保留，新行接在后面，然后整体覆盖写回。已有文件为空、
//! 无法解析或被截断时视为不存在，只写入本批数据。写入不是原子操作，
//! 调用方需要保证同一时刻只有一个写入者。

use crate::errors::Result;
use crate::models::quote::LedgerRow;
use crate::util::csv_utils::{self, CsvTable};
use log::{info, warn};
use std::path::Path;

/// 一次追加的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// 没有可写入的记录，文件未改动
    Empty,
    Written {
        prior_rows: usize,
        new_rows: usize,
        /// 已有文件损坏，被丢弃后重新创建
        recovered: bool,
    },
}

impl AppendOutcome {
    pub fn rows_written(&self) -> usize {
        match self {
            AppendOutcome::Empty => 0,
            AppendOutcome::Written { new_rows, .. } => *new_rows,
        }
    }
}

/// 加载已有台账；文件不存在或损坏时返回 `None`
fn load_prior(path: &Path) -> (Option<CsvTable>, bool) {
    if !path.exists() {
        info!("No existing ledger at {}, creating new file", path.display());
        return (None, false);
    }

    match csv_utils::read_table(path) {
        Ok(table) => (Some(table), false),
        Err(e) => {
            warn!(
                "Existing ledger {} is empty or damaged ({}), starting a new file",
                path.display(),
                e
            );
            (None, true)
        }
    }
}

/// 将记录追加到台账文件
pub fn append_records<P: AsRef<Path>>(path: P, records: &[LedgerRow]) -> Result<AppendOutcome> {
    let path = path.as_ref();
    if records.is_empty() {
        warn!("No records to save to {}", path.display());
        return Ok(AppendOutcome::Empty);
    }

    let (prior, recovered) = load_prior(path);
    let mut table = prior.unwrap_or_default();
    let prior_rows = table.rows.len();

    // 新批次中出现但已有表头中没有的列追加到末尾，旧行补空值
    for row in records {
        for column in row.columns() {
            if table.column_index(column).is_none() {
                table.headers.push(column.to_string());
                for existing in table.rows.iter_mut() {
                    existing.push(String::new());
                }
            }
        }
    }

    for row in records {
        let values = table
            .headers
            .iter()
            .map(|h| row.get(h).unwrap_or_default().to_string())
            .collect();
        table.rows.push(values);
    }

    csv_utils::write_table(path, &table)?;
    info!(
        "Saved {} rows to {} ({} existing rows kept)",
        records.len(),
        path.display(),
        prior_rows
    );

    Ok(AppendOutcome::Written {
        prior_rows,
        new_rows: records.len(),
        recovered,
    })
}

/// 读取台账中的全部行
pub fn read_ledger<P: AsRef<Path>>(path: P) -> Result<Vec<LedgerRow>> {
    let table = csv_utils::read_table(path)?;
    let rows = table
        .rows
        .into_iter()
        .map(|values| {
            table
                .headers
                .iter()
                .cloned()
                .zip(values)
                .collect::<LedgerRow>()
        })
        .collect();
    Ok(rows)
}
