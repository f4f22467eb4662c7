use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 进程风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Caution,
    Critical,
}

/// 推荐处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Keep,
    AutoStop,
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendedAction::Keep => write!(f, "keep"),
            RecommendedAction::AutoStop => write!(f, "auto_stop"),
        }
    }
}

/// 目录分类
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCategory {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub order: usize,
}

/// 目录条目（解析后不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCatalogEntry {
    /// 规范化标识（小写、去掉 .exe）
    pub identifier: String,
    /// 原始显示名称
    pub display_name: String,
    pub category_key: String,
    pub risk_level: RiskLevel,
    pub recommended_action: RecommendedAction,
    /// 行尾注释提取出的说明
    pub rationale: Option<String>,
    /// 含通配符的条目不映射到可控服务
    pub is_pattern: bool,
    pub service_identifier: Option<String>,
    pub order: usize,
}

/// 解析结果快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub source_path: String,
    pub categories: Vec<CatalogCategory>,
    pub entries: Vec<ProcessCatalogEntry>,
}

impl CatalogSnapshot {
    /// 按规范化标识查找条目
    pub fn find_entry(&self, identifier: &str) -> Option<&ProcessCatalogEntry> {
        let key = crate::modules::common::utils::normalize_process_identifier(identifier);
        self.entries.iter().find(|e| e.identifier == key)
    }

    /// 按分类键收集条目
    pub fn entries_by_category(&self) -> HashMap<&str, Vec<&ProcessCatalogEntry>> {
        let mut map: HashMap<&str, Vec<&ProcessCatalogEntry>> = HashMap::new();
        for entry in &self.entries {
            map.entry(entry.category_key.as_str()).or_default().push(entry);
        }
        map
    }
}
