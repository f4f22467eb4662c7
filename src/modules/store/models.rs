use crate::modules::catalog::RecommendedAction;
use crate::modules::common::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 持久化文档当前版本
pub const SCHEMA_VERSION: u32 = 2;

/// 偏好来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceSource {
    Questionnaire,
    UserOverride,
    SystemDefault,
    #[default]
    Unknown,
}

/// 进程偏好
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPreference {
    /// 规范化进程标识
    pub identifier: String,
    pub action: RecommendedAction,
    pub source: PreferenceSource,
    pub updated_at_utc: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub service_identifier: Option<String>,
}

/// 白名单条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitelistKind {
    Directory,
    FileHash,
    ProcessName,
}

impl std::fmt::Display for WhitelistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WhitelistKind::Directory => write!(f, "directory"),
            WhitelistKind::FileHash => write!(f, "file_hash"),
            WhitelistKind::ProcessName => write!(f, "process_name"),
        }
    }
}

/// 反检测白名单条目：用户创建的硬抑制
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiSystemWhitelistEntry {
    /// 确定性 id：`{kind}:{规范化值}`
    pub id: String,
    pub kind: WhitelistKind,
    /// 规范化值：目录以分隔符结尾，哈希/进程名小写
    pub value: String,
    pub created_at_utc: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AntiSystemWhitelistEntry {
    /// 目录白名单（前缀匹配）
    pub fn directory(value: &str) -> Option<Self> {
        let mut normalized = utils::normalize_path_key(value)?;
        if !normalized.ends_with('\\') {
            normalized.push('\\');
        }
        Some(Self::build(WhitelistKind::Directory, normalized))
    }

    /// 文件哈希白名单（精确匹配）
    pub fn file_hash(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        Some(Self::build(WhitelistKind::FileHash, normalized))
    }

    /// 进程名白名单（精确匹配）
    pub fn process_name(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        Some(Self::build(WhitelistKind::ProcessName, normalized))
    }

    fn build(kind: WhitelistKind, value: String) -> Self {
        Self {
            id: format!("{}:{}", kind, value),
            kind,
            value,
            created_at_utc: Utc::now(),
            notes: None,
        }
    }

    /// 判断条目是否命中给定的路径键/哈希/进程名
    pub fn matches(
        &self,
        path_key: Option<&str>,
        sha256: Option<&str>,
        process_name: Option<&str>,
    ) -> bool {
        match self.kind {
            WhitelistKind::Directory => path_key
                .map(|p| p.starts_with(self.value.as_str()))
                .unwrap_or(false),
            WhitelistKind::FileHash => sha256
                .map(|h| h.eq_ignore_ascii_case(&self.value))
                .unwrap_or(false),
            WhitelistKind::ProcessName => process_name
                .map(|n| n.eq_ignore_ascii_case(&self.value))
                .unwrap_or(false),
        }
    }
}

/// 可疑等级（序号越大越严重）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SuspicionLevel {
    #[default]
    Green,
    Yellow,
    Orange,
    Red,
}

impl std::fmt::Display for SuspicionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuspicionLevel::Green => write!(f, "Green"),
            SuspicionLevel::Yellow => write!(f, "Yellow"),
            SuspicionLevel::Orange => write!(f, "Orange"),
            SuspicionLevel::Red => write!(f, "Red"),
        }
    }
}

/// 可疑进程命中记录（按确定性 id 覆盖写入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousProcessHit {
    pub id: String,
    pub process_name: String,
    pub file_path: String,
    pub level: SuspicionLevel,
    /// 命中规则 id（保持顺序、去重）
    pub matched_rules: Vec<String>,
    pub observed_at_utc: DateTime<Utc>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// 问卷快照（每次提交整体替换）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireSnapshot {
    pub completed_at_utc: DateTime<Utc>,
    pub answers: BTreeMap<String, String>,
    pub auto_stop_identifiers: Vec<String>,
}

/// 持久化文档整体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub preferences: BTreeMap<String, ProcessPreference>,
    #[serde(default)]
    pub whitelist: BTreeMap<String, AntiSystemWhitelistEntry>,
    #[serde(default)]
    pub suspicious_hits: BTreeMap<String, SuspiciousProcessHit>,
    #[serde(default)]
    pub questionnaire: Option<QuestionnaireSnapshot>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            preferences: BTreeMap::new(),
            whitelist: BTreeMap::new(),
            suspicious_hits: BTreeMap::new(),
            questionnaire: None,
        }
    }
}
