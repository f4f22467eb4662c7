use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 名称匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatchMode {
    Contains,
    StartsWith,
    EndsWith,
    Exact,
}

/// 名称过滤器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameFilter {
    pub pattern: String,
    pub mode: NameMatchMode,
    pub case_sensitive: bool,
}

impl NameFilter {
    /// 判断文件名是否通过过滤
    pub fn matches(&self, name: &str) -> bool {
        let (name, pattern) = if self.case_sensitive {
            (name.to_string(), self.pattern.clone())
        } else {
            (name.to_lowercase(), self.pattern.to_lowercase())
        };

        match self.mode {
            NameMatchMode::Contains => name.contains(&pattern),
            NameMatchMode::StartsWith => name.starts_with(&pattern),
            NameMatchMode::EndsWith => name.ends_with(&pattern),
            NameMatchMode::Exact => name == pattern,
        }
    }
}

/// 深度扫描请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepScanRequest {
    pub root: PathBuf,
    /// 返回的最大条目数（有界堆容量）
    pub max_items: usize,
    /// 最小大小过滤（字节）
    pub minimum_size_bytes: u64,
    pub include_files: bool,
    pub include_directories: bool,
    #[serde(default)]
    pub name_filter: Option<NameFilter>,
    pub skip_hidden: bool,
    pub skip_system: bool,
    pub skip_reparse_points: bool,
}

impl Default for DeepScanRequest {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            max_items: 50,
            minimum_size_bytes: 0,
            include_files: true,
            include_directories: false,
            name_filter: None,
            skip_hidden: true,
            skip_system: true,
            skip_reparse_points: true,
        }
    }
}

/// 启发式分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FindingCategory {
    System,
    Applications,
    Games,
    AppData,
    CloudSync,
    Downloads,
    Documents,
    Desktop,
    Pictures,
    Videos,
    Music,
    Cache,
    Archives,
    Databases,
    Logs,
    Other,
}

impl std::fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FindingCategory::System => "System",
            FindingCategory::Applications => "Applications",
            FindingCategory::Games => "Games",
            FindingCategory::AppData => "App Data",
            FindingCategory::CloudSync => "Cloud Sync",
            FindingCategory::Downloads => "Downloads",
            FindingCategory::Documents => "Documents",
            FindingCategory::Desktop => "Desktop",
            FindingCategory::Pictures => "Pictures",
            FindingCategory::Videos => "Videos",
            FindingCategory::Music => "Music",
            FindingCategory::Cache => "Cache",
            FindingCategory::Archives => "Archives",
            FindingCategory::Databases => "Databases",
            FindingCategory::Logs => "Logs",
            FindingCategory::Other => "Other",
        };
        write!(f, "{}", label)
    }
}

/// 单条扫描结果（每次请求临时产生，不单独持久化）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepScanFinding {
    pub path: String,
    pub name: String,
    pub parent: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub extension: String,
    pub is_directory: bool,
    pub category: FindingCategory,
}

/// 扫描统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepScanStats {
    pub scanned_files: u64,
    pub scanned_directories: u64,
    /// 非关键文件系统错误被逐条吞掉的次数
    pub skipped_entries: u64,
}

impl DeepScanStats {
    pub fn merge(&mut self, other: &DeepScanStats) {
        self.scanned_files += other.scanned_files;
        self.scanned_directories += other.scanned_directories;
        self.skipped_entries += other.skipped_entries;
    }
}

/// 扫描总结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepScanResult {
    pub root: String,
    /// 按大小降序排列的前 N 项
    pub findings: Vec<DeepScanFinding>,
    pub stats: DeepScanStats,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_filter_modes() {
        let filter = NameFilter {
            pattern: "setup".to_string(),
            mode: NameMatchMode::Contains,
            case_sensitive: false,
        };
        assert!(filter.matches("MySetup.exe"));
        assert!(!filter.matches("installer.exe"));

        let filter = NameFilter {
            pattern: ".iso".to_string(),
            mode: NameMatchMode::EndsWith,
            case_sensitive: false,
        };
        assert!(filter.matches("win11.ISO"));

        let filter = NameFilter {
            pattern: "Backup".to_string(),
            mode: NameMatchMode::Exact,
            case_sensitive: true,
        };
        assert!(filter.matches("Backup"));
        assert!(!filter.matches("backup"));
    }
}
