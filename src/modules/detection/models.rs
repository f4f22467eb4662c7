use serde::{Deserialize, Serialize};

/// 外部进程枚举协作方提供的运行进程快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningProcessSnapshot {
    pub pid: u32,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub command_line: Option<String>,
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub grandparent_name: Option<String>,
    #[serde(default)]
    pub is_elevated: bool,
}

/// 外部启动项清单协作方提供的启动条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupEntry {
    pub path: String,
    pub process_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// 单次检测请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub processes: Vec<RunningProcessSnapshot>,
    #[serde(default)]
    pub startup_entries: Vec<StartupEntry>,
}

/// 检测选项：各层可单独开关，哈希查询有预算上限
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionOptions {
    pub enable_behavior_layer: bool,
    pub enable_user_location_layer: bool,
    pub enable_intel_layer: bool,
    /// 单次扫描允许的 SHA-256 计算次数
    pub max_hash_lookups: u32,
    /// 参与命中 id 的种子，区分不同部署
    #[serde(default)]
    pub seed: String,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            enable_behavior_layer: true,
            enable_user_location_layer: true,
            enable_intel_layer: false,
            max_hash_lookups: 25,
            seed: String::new(),
        }
    }
}

/// 威胁情报查询结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntelVerdict {
    Unknown,
    Clean,
    Suspicious,
    KnownBad,
}

/// 威胁情报提供方
///
/// 契约要求：实现必须自行吞掉传输/解析错误并返回 `Unknown`，
/// 不得向检测管线抛出错误。
pub trait ThreatIntelProvider: Send + Sync {
    fn name(&self) -> &str;

    fn lookup(&self, sha256: &str) -> IntelVerdict;
}

/// 检测报告：命中加计数器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionReport {
    pub hits: Vec<crate::modules::store::SuspiciousProcessHit>,
    pub trusted_count: u64,
    pub whitelisted_count: u64,
    pub hash_lookups: u64,
    pub intel_matches: u64,
}
