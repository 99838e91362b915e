use log::info;

use crate::models::instrument::Instrument;
use crate::errors::Result;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// 名称搜索的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    NotFound,
    Unique(Instrument),
    Ambiguous(Vec<Instrument>),
}

/// 标的代码目录，名称 -> 代码
pub struct InstrumentDirectory {
    data: Vec<Instrument>,
    // 索引用于快速查找
    name_index: HashMap<String, usize>,
    code_index: HashMap<String, usize>,
}

impl InstrumentDirectory {
    /// 使用提供的数据创建目录，重复代码只保留第一条
    pub fn new_with_data(data: Vec<Instrument>) -> Self {
        let mut seen = HashSet::new();
        let data = data
            .into_iter()
            .filter(|i| seen.insert(i.code.clone()))
            .collect();

        let mut directory = Self {
            data,
            name_index: HashMap::new(),
            code_index: HashMap::new(),
        };
        directory.rebuild_indices();
        directory
    }

    /// 从CSV文件加载目录
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = if path.exists() {
            let mut reader = csv::Reader::from_path(path)?;
            let mut data = Vec::new();
            for record in reader.deserialize() {
                let instrument: Instrument = record?;
                data.push(instrument);
            }
            data
        } else {
            Vec::new()
        };

        info!("Loaded {} instruments from {}", data.len(), path.display());
        Ok(Self::new_with_data(data))
    }

    /// 保存目录到CSV文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path)?;
        for instrument in &self.data {
            writer.serialize(instrument)?;
        }
        writer.flush()?;

        info!("Saved {} instruments to {}", self.data.len(), path.display());
        Ok(())
    }

    pub fn get_all(&self) -> &[Instrument] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get_by_code(&self, code: &str) -> Option<&Instrument> {
        self.code_index.get(code).map(|&idx| &self.data[idx])
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Instrument> {
        self.name_index.get(name).map(|&idx| &self.data[idx])
    }

    /// 按名称自由文本搜索
    ///
    /// 名称或代码完全一致时直接返回该标的，否则按不区分大小写的子串匹配。
    pub fn search(&self, query: &str) -> Resolution {
        let query = query.trim();
        if query.is_empty() {
            return Resolution::NotFound;
        }

        if let Some(instrument) = self.get_by_name(query).or_else(|| self.get_by_code(query)) {
            return Resolution::Unique(instrument.clone());
        }

        let needle = query.to_lowercase();
        let mut matches: Vec<Instrument> = self
            .data
            .iter()
            .filter(|i| i.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();

        match matches.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Unique(matches.remove(0)),
            _ => Resolution::Ambiguous(matches),
        }
    }

    fn rebuild_indices(&mut self) {
        self.name_index.clear();
        self.code_index.clear();

        for (i, instrument) in self.data.iter().enumerate() {
            self.name_index.entry(instrument.name.clone()).or_insert(i);
            self.code_index.insert(instrument.code.clone(), i);
        }
    }
}
