//! 状态存储模块
//!
//! 单一 JSON 文档保存偏好、白名单、可疑命中历史与问卷快照，
//! 写入采用临时文件 + 原子重命名，损坏时降级为空文档而不是阻塞启动。

pub mod models;

pub use models::{
    AntiSystemWhitelistEntry, PreferenceSource, ProcessPreference, QuestionnaireSnapshot,
    StateDocument, SuspicionLevel, SuspiciousProcessHit, WhitelistKind, SCHEMA_VERSION,
};

use crate::modules::common::error::TidyError;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 状态目录环境变量
pub const STATE_DIR_ENV: &str = "TIDYWINDOW_STATE_DIR";

const STATE_FILE_NAME: &str = "state.json";

/// 线程安全的状态存储（单内部锁）
pub struct StateStore {
    file_path: PathBuf,
    document: Mutex<StateDocument>,
}

impl StateStore {
    /// 打开默认位置的存储；损坏或缺失时从空文档开始
    pub fn open() -> Self {
        Self::open_at(&resolve_state_dir())
    }

    /// 打开指定目录下的存储
    pub fn open_at(dir: &Path) -> Self {
        let file_path = dir.join(STATE_FILE_NAME);
        let document = load_document(&file_path);
        Self {
            file_path,
            document: Mutex::new(document),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    // ---- 偏好 ----

    /// 新增或替换偏好
    pub fn upsert_preference(&self, preference: ProcessPreference) -> Result<(), TidyError> {
        self.mutate(|doc| {
            doc.preferences
                .insert(preference.identifier.clone(), preference);
        })
    }

    /// 删除偏好；返回是否存在
    pub fn remove_preference(&self, identifier: &str) -> Result<bool, TidyError> {
        let mut removed = false;
        self.mutate(|doc| {
            removed = doc.preferences.remove(identifier).is_some();
        })?;
        Ok(removed)
    }

    pub fn get_preference(&self, identifier: &str) -> Option<ProcessPreference> {
        self.read(|doc| doc.preferences.get(identifier).cloned())
    }

    pub fn list_preferences(&self) -> Vec<ProcessPreference> {
        self.read(|doc| doc.preferences.values().cloned().collect())
    }

    // ---- 白名单 ----

    pub fn add_whitelist_entry(&self, entry: AntiSystemWhitelistEntry) -> Result<(), TidyError> {
        self.mutate(|doc| {
            doc.whitelist.insert(entry.id.clone(), entry);
        })
    }

    pub fn remove_whitelist_entry(&self, id: &str) -> Result<bool, TidyError> {
        let mut removed = false;
        self.mutate(|doc| {
            removed = doc.whitelist.remove(id).is_some();
        })?;
        Ok(removed)
    }

    pub fn list_whitelist(&self) -> Vec<AntiSystemWhitelistEntry> {
        self.read(|doc| doc.whitelist.values().cloned().collect())
    }

    /// 白名单匹配查询：目录前缀 / 精确哈希 / 精确进程名
    pub fn match_whitelist(
        &self,
        path_key: Option<&str>,
        sha256: Option<&str>,
        process_name: Option<&str>,
    ) -> Option<AntiSystemWhitelistEntry> {
        self.read(|doc| {
            doc.whitelist
                .values()
                .find(|entry| entry.matches(path_key, sha256, process_name))
                .cloned()
        })
    }

    // ---- 可疑命中 ----

    /// 记录命中：同 id 覆盖而不是累积
    pub fn record_hits(&self, hits: &[SuspiciousProcessHit]) -> Result<(), TidyError> {
        if hits.is_empty() {
            return Ok(());
        }
        self.mutate(|doc| {
            for hit in hits {
                doc.suspicious_hits.insert(hit.id.clone(), hit.clone());
            }
        })
    }

    pub fn list_hits(&self) -> Vec<SuspiciousProcessHit> {
        self.read(|doc| doc.suspicious_hits.values().cloned().collect())
    }

    pub fn remove_hit(&self, id: &str) -> Result<bool, TidyError> {
        let mut removed = false;
        self.mutate(|doc| {
            removed = doc.suspicious_hits.remove(id).is_some();
        })?;
        Ok(removed)
    }

    pub fn clear_hits(&self) -> Result<(), TidyError> {
        self.mutate(|doc| doc.suspicious_hits.clear())
    }

    // ---- 问卷 ----

    pub fn questionnaire_snapshot(&self) -> Option<QuestionnaireSnapshot> {
        self.read(|doc| doc.questionnaire.clone())
    }

    /// 整体替换问卷快照
    pub fn save_questionnaire_snapshot(
        &self,
        snapshot: QuestionnaireSnapshot,
    ) -> Result<(), TidyError> {
        self.mutate(|doc| doc.questionnaire = Some(snapshot))
    }

    // ---- 内部 ----

    fn read<T>(&self, f: impl FnOnce(&StateDocument) -> T) -> T {
        let guard = self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    fn mutate(&self, f: impl FnOnce(&mut StateDocument)) -> Result<(), TidyError> {
        let mut guard = self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
        persist_document(&self.file_path, &guard)
    }
}

/// 解析状态目录：环境变量覆盖 → 用户数据目录默认值
pub fn resolve_state_dir() -> PathBuf {
    if let Ok(value) = std::env::var(STATE_DIR_ENV) {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tidywindow")
}

/// 读取并升级文档；任何失败都降级为空文档
fn load_document(path: &Path) -> StateDocument {
    if !path.exists() {
        return StateDocument::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            tracing::warn!("读取状态文件失败，使用空文档: {}", error);
            return StateDocument::default();
        }
    };

    match serde_json::from_str::<StateDocument>(&content) {
        Ok(mut document) => {
            // 版本单调：新版本钳制、旧版本就地升级
            if document.schema_version != SCHEMA_VERSION {
                tracing::info!(
                    "状态文档版本 {} -> {}",
                    document.schema_version,
                    SCHEMA_VERSION
                );
                document.schema_version = SCHEMA_VERSION;
            }
            document
        }
        Err(error) => {
            tracing::warn!("状态文件格式无效，使用空文档: {}", error);
            StateDocument::default()
        }
    }
}

/// 写入临时文件后原子重命名，避免部分写入
fn persist_document(path: &Path, document: &StateDocument) -> Result<(), TidyError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(document)
        .map_err(|e| TidyError::Serde(e.to_string()))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::catalog::RecommendedAction;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_store_dir(test_name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tidywindow-store-test-{}-{}-{}",
            test_name,
            std::process::id(),
            TEST_DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    fn sample_preference(identifier: &str) -> ProcessPreference {
        ProcessPreference {
            identifier: identifier.to_string(),
            action: RecommendedAction::AutoStop,
            source: PreferenceSource::Questionnaire,
            updated_at_utc: Utc::now(),
            notes: None,
            service_identifier: None,
        }
    }

    fn sample_hit(id: &str) -> SuspiciousProcessHit {
        SuspiciousProcessHit {
            id: id.to_string(),
            process_name: "svchost.exe".to_string(),
            file_path: r"C:\Users\Public\svchost.exe".to_string(),
            level: SuspicionLevel::Red,
            matched_rules: vec!["critical-process-path".to_string()],
            observed_at_utc: Utc::now(),
            sha256: None,
            source: None,
            notes: None,
        }
    }

    #[test]
    fn preferences_round_trip_through_file() {
        let dir = temp_store_dir("prefs");
        {
            let store = StateStore::open_at(&dir);
            store.upsert_preference(sample_preference("xblgamesave")).unwrap();
        }
        let reopened = StateStore::open_at(&dir);
        let loaded = reopened.get_preference("xblgamesave").unwrap();
        assert_eq!(loaded.identifier, "xblgamesave");
        assert_eq!(loaded.source, PreferenceSource::Questionnaire);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_state_file_degrades_to_empty_document() {
        let dir = temp_store_dir("corrupt");
        let _ = std::fs::create_dir_all(&dir);
        std::fs::write(dir.join(STATE_FILE_NAME), "{ not valid json").unwrap();

        let store = StateStore::open_at(&dir);
        assert!(store.list_preferences().is_empty());
        assert!(store.list_whitelist().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn newer_schema_version_is_clamped_on_load() {
        let dir = temp_store_dir("version");
        let _ = std::fs::create_dir_all(&dir);
        std::fs::write(
            dir.join(STATE_FILE_NAME),
            format!(r#"{{ "schema_version": {} }}"#, SCHEMA_VERSION + 5),
        )
        .unwrap();

        let store = StateStore::open_at(&dir);
        // 触发一次写入后文件应落回当前版本
        store.upsert_preference(sample_preference("spooler")).unwrap();
        let content = std::fs::read_to_string(store.file_path()).unwrap();
        let document: StateDocument = serde_json::from_str(&content).unwrap();
        assert_eq!(document.schema_version, SCHEMA_VERSION);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn record_hits_overwrites_same_id() {
        let dir = temp_store_dir("hits");
        let store = StateStore::open_at(&dir);

        store.record_hits(&[sample_hit("hit-1")]).unwrap();
        let mut updated = sample_hit("hit-1");
        updated.level = SuspicionLevel::Orange;
        store.record_hits(&[updated]).unwrap();

        let hits = store.list_hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].level, SuspicionLevel::Orange);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn match_whitelist_returns_first_matching_entry() {
        let dir = temp_store_dir("whitelist");
        let store = StateStore::open_at(&dir);

        let entry = AntiSystemWhitelistEntry::directory(r"C:\Tools\Safe").unwrap();
        store.add_whitelist_entry(entry).unwrap();

        let matched = store.match_whitelist(Some(r"c:\tools\safe\bin\app.exe"), None, None);
        assert!(matched.is_some());
        let missed = store.match_whitelist(Some(r"c:\other\app.exe"), None, None);
        assert!(missed.is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_tmp_file_left_behind_after_write() {
        let dir = temp_store_dir("atomic");
        let store = StateStore::open_at(&dir);
        store.upsert_preference(sample_preference("fax")).unwrap();

        assert!(store.file_path().exists());
        assert!(!store.file_path().with_extension("json.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
