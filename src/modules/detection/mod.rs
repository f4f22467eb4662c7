//! 反检测管线
//!
//! 对运行进程快照（及可选启动项）做严格短路级联：
//! 受信任根 → 用户白名单 → 四个启发式检测层 → 可选哈希/威胁情报查询。
//! 命中 id 是内容哈希，同一工件重复上报收敛为一条持久化记录。

pub mod layers;
pub mod models;
pub mod trusted;

pub use models::{
    DetectionOptions, DetectionReport, DetectionRequest, IntelVerdict, RunningProcessSnapshot,
    StartupEntry, ThreatIntelProvider,
};
pub use trusted::TrustedRoots;

use crate::modules::common::error::TidyError;
use crate::modules::common::utils::{normalize_path_key, CancelToken};
use crate::modules::store::{StateStore, SuspicionLevel, SuspiciousProcessHit};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::sync::Arc;

/// 检测服务：根目录清单在构造时计算一次，生命周期内不可变
pub struct DetectionService {
    options: DetectionOptions,
    roots: TrustedRoots,
    providers: Vec<Box<dyn ThreatIntelProvider>>,
    store: Arc<StateStore>,
}

impl DetectionService {
    pub fn new(options: DetectionOptions, store: Arc<StateStore>) -> Self {
        Self::with_roots(options, TrustedRoots::from_environment(), store)
    }

    pub fn with_roots(
        options: DetectionOptions,
        roots: TrustedRoots,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            options,
            roots,
            providers: Vec::new(),
            store,
        }
    }

    pub fn add_provider(&mut self, provider: Box<dyn ThreatIntelProvider>) {
        self.providers.push(provider);
    }

    /// 扫描一批进程快照与启动项；命中写入状态存储
    pub async fn run_scan(
        &self,
        request: &DetectionRequest,
        cancel: &CancelToken,
    ) -> Result<DetectionReport, TidyError> {
        let mut report = DetectionReport::default();
        // 哈希查询预算在整次扫描内共享
        let mut hash_budget = self.options.max_hash_lookups;

        for process in &request.processes {
            if cancel.is_cancelled() {
                return Err(TidyError::Cancelled);
            }
            if let Some(hit) = self.evaluate_process(process, &mut report, &mut hash_budget) {
                report.hits.push(hit);
            }
        }

        for entry in &request.startup_entries {
            if cancel.is_cancelled() {
                return Err(TidyError::Cancelled);
            }
            if let Some(hit) = self.evaluate_startup(entry, &mut report) {
                report.hits.push(hit);
            }
        }

        self.store.record_hits(&report.hits)?;

        tracing::info!(
            "检测完成: {} 命中, {} 受信任, {} 白名单, {} 哈希查询, {} 情报命中",
            report.hits.len(),
            report.trusted_count,
            report.whitelisted_count,
            report.hash_lookups,
            report.intel_matches
        );

        Ok(report)
    }

    fn evaluate_process(
        &self,
        process: &RunningProcessSnapshot,
        report: &mut DetectionReport,
        hash_budget: &mut u32,
    ) -> Option<SuspiciousProcessHit> {
        // 1. 路径为空直接跳过
        let path_key = normalize_path_key(&process.path)?;

        // 2. 受信任根之下不再评估
        if self.roots.is_trusted(&path_key) {
            report.trusted_count += 1;
            return None;
        }

        // 3. 用户白名单是硬抑制
        let process_name = process.name.trim().to_lowercase();
        if self
            .store
            .match_whitelist(Some(&path_key), None, Some(&process_name))
            .is_some()
        {
            report.whitelisted_count += 1;
            return None;
        }

        // 4. 检测层，按规则 id 去重
        let mut rules: Vec<(String, SuspicionLevel)> = Vec::new();

        if let Some((rule, level)) = layers::critical_process_layer(process, &path_key, &self.roots)
        {
            push_rule(&mut rules, rule, level);
        }

        if self.options.enable_behavior_layer {
            for (rule, level) in layers::behavior_layer(process, &path_key, &self.roots) {
                push_rule(&mut rules, rule, level);
            }
        }

        if self.options.enable_user_location_layer {
            if let Some((rule, level)) = layers::user_location_layer(&path_key, &self.roots) {
                push_rule(&mut rules, rule, level);
            }
        }

        let mut sha256: Option<String> = None;
        if self.options.enable_intel_layer && !self.providers.is_empty() && *hash_budget > 0 {
            let file_exists = std::fs::metadata(&process.path)
                .map(|m| m.is_file())
                .unwrap_or(false);
            if file_exists {
                *hash_budget -= 1;
                report.hash_lookups += 1;

                // 哈希失败按"无哈希可用"处理，跳过情报层
                if let Some(hash) = hash_file(&process.path) {
                    // 查询前按哈希再查一次白名单
                    if self
                        .store
                        .match_whitelist(None, Some(&hash), None)
                        .is_some()
                    {
                        report.whitelisted_count += 1;
                        return None;
                    }

                    for provider in &self.providers {
                        let verdict = provider.lookup(&hash);
                        if verdict == IntelVerdict::Unknown {
                            continue;
                        }
                        report.intel_matches += 1;
                        match verdict {
                            IntelVerdict::KnownBad => {
                                // KnownBad 无条件升级为 Red
                                push_rule(
                                    &mut rules,
                                    layers::RULE_INTEL_KNOWN_BAD,
                                    SuspicionLevel::Red,
                                );
                            }
                            IntelVerdict::Suspicious => {
                                push_rule(
                                    &mut rules,
                                    layers::RULE_INTEL_SUSPICIOUS,
                                    SuspicionLevel::Orange,
                                );
                            }
                            IntelVerdict::Clean | IntelVerdict::Unknown => {}
                        }
                        // 首个非 Unknown 结论生效
                        break;
                    }
                    sha256 = Some(hash);
                }
            }
        }

        // 5. 总体等级取最大；Green 不上报
        let level = rules.iter().map(|(_, level)| *level).max()?;
        if level == SuspicionLevel::Green {
            return None;
        }

        // 6. 确定性命中 id
        let id = compute_hit_id(
            "process",
            &path_key,
            process.pid,
            sha256.as_deref(),
            &self.options.seed,
        );

        Some(SuspiciousProcessHit {
            id,
            process_name: process.name.clone(),
            file_path: process.path.clone(),
            level,
            matched_rules: rules.into_iter().map(|(rule, _)| rule).collect(),
            observed_at_utc: Utc::now(),
            sha256,
            source: Some("process".to_string()),
            notes: None,
        })
    }

    fn evaluate_startup(
        &self,
        entry: &StartupEntry,
        report: &mut DetectionReport,
    ) -> Option<SuspiciousProcessHit> {
        let path_key = normalize_path_key(&entry.path)?;

        if self.roots.is_trusted(&path_key) {
            report.trusted_count += 1;
            return None;
        }

        let process_name = entry.process_name.trim().to_lowercase();
        if self
            .store
            .match_whitelist(Some(&path_key), None, Some(&process_name))
            .is_some()
        {
            report.whitelisted_count += 1;
            return None;
        }

        let (rule, level) = layers::startup_layer(&path_key, &self.roots)?;

        let id = compute_hit_id("startup", &path_key, 0, None, &self.options.seed);

        Some(SuspiciousProcessHit {
            id,
            process_name: entry.process_name.clone(),
            file_path: entry.path.clone(),
            level,
            matched_rules: vec![rule.to_string()],
            observed_at_utc: Utc::now(),
            sha256: None,
            source: entry.source.clone().or_else(|| Some("startup".to_string())),
            notes: entry.description.clone(),
        })
    }
}

/// 保持顺序、按规则 id 去重
fn push_rule(rules: &mut Vec<(String, SuspicionLevel)>, rule: &str, level: SuspicionLevel) {
    if !rules.iter().any(|(existing, _)| existing == rule) {
        rules.push((rule.to_string(), level));
    }
}

/// 命中 id：scope + 规范化路径 + 数字令牌 + 哈希 + 种子的 SHA-256
pub fn compute_hit_id(
    scope: &str,
    path_key: &str,
    numeric_token: u32,
    sha256: Option<&str>,
    seed: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b"|");
    hasher.update(path_key.as_bytes());
    hasher.update(b"|");
    hasher.update(numeric_token.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(sha256.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(seed.as_bytes());
    hex_string(&hasher.finalize())
}

/// 计算文件 SHA-256；任何失败都按"无哈希"处理
pub fn hash_file(path: &str) -> Option<String> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).ok()?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Some(hex_string(&hasher.finalize()))
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::store::AntiSystemWhitelistEntry;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_dir(test_name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tidywindow-detection-test-{}-{}-{}",
            test_name,
            std::process::id(),
            TEST_DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    fn sample_roots() -> TrustedRoots {
        TrustedRoots {
            trusted: vec![r"c:\program files\".to_string()],
            system: vec![
                r"c:\windows\system32\".to_string(),
                r"c:\windows\syswow64\".to_string(),
                r"c:\windows\".to_string(),
            ],
            temp: vec![r"c:\users\test\appdata\local\temp\".to_string()],
            user_profile: Some(r"c:\users\test\".to_string()),
            downloads: Some(r"c:\users\test\downloads\".to_string()),
            appdata: vec![r"c:\users\test\appdata\".to_string()],
        }
    }

    fn service(dir: &PathBuf, options: DetectionOptions) -> DetectionService {
        let store = Arc::new(StateStore::open_at(dir));
        DetectionService::with_roots(options, sample_roots(), store)
    }

    fn process(pid: u32, name: &str, path: &str) -> RunningProcessSnapshot {
        RunningProcessSnapshot {
            pid,
            name: name.to_string(),
            path: path.to_string(),
            command_line: None,
            parent_name: None,
            grandparent_name: None,
            is_elevated: false,
        }
    }

    struct FixedVerdictProvider {
        verdict: IntelVerdict,
    }

    impl ThreatIntelProvider for FixedVerdictProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn lookup(&self, _sha256: &str) -> IntelVerdict {
            self.verdict
        }
    }

    #[tokio::test]
    async fn misplaced_svchost_is_red_and_system32_copy_is_clean() {
        let dir = temp_dir("svchost");
        let svc = service(&dir, DetectionOptions::default());

        let request = DetectionRequest {
            processes: vec![
                process(100, "svchost.exe", r"C:\Users\Public\svchost.exe"),
                process(101, "svchost.exe", r"C:\Windows\System32\svchost.exe"),
            ],
            startup_entries: Vec::new(),
        };

        let report = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        assert_eq!(report.hits.len(), 1);
        let hit = &report.hits[0];
        assert_eq!(hit.level, SuspicionLevel::Red);
        assert!(hit
            .matched_rules
            .contains(&layers::RULE_CRITICAL_PROCESS_PATH.to_string()));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn trusted_root_short_circuits_all_layers() {
        let dir = temp_dir("trusted");
        let svc = service(&dir, DetectionOptions::default());

        let request = DetectionRequest {
            processes: vec![process(1, "svchost.exe", r"C:\Program Files\Fake\svchost.exe")],
            startup_entries: Vec::new(),
        };

        let report = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        assert!(report.hits.is_empty());
        assert_eq!(report.trusted_count, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn whitelisted_process_emits_no_hit_and_counts_once() {
        let dir = temp_dir("whitelist");
        let store = Arc::new(StateStore::open_at(&dir));
        store
            .add_whitelist_entry(AntiSystemWhitelistEntry::process_name("svchost.exe").unwrap())
            .unwrap();
        let svc =
            DetectionService::with_roots(DetectionOptions::default(), sample_roots(), store);

        let request = DetectionRequest {
            processes: vec![process(7, "svchost.exe", r"C:\Users\Public\svchost.exe")],
            startup_entries: Vec::new(),
        };

        let report = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        assert!(report.hits.is_empty());
        assert_eq!(report.whitelisted_count, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_path_is_skipped_entirely() {
        let dir = temp_dir("empty");
        let svc = service(&dir, DetectionOptions::default());

        let request = DetectionRequest {
            processes: vec![process(8, "ghost.exe", "")],
            startup_entries: Vec::new(),
        };

        let report = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        assert!(report.hits.is_empty());
        assert_eq!(report.trusted_count, 0);
        assert_eq!(report.whitelisted_count, 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn hit_ids_are_deterministic_across_runs() {
        let dir = temp_dir("deterministic");
        let svc = service(&dir, DetectionOptions::default());

        let request = DetectionRequest {
            processes: vec![process(42, "svchost.exe", r"C:\Users\Public\svchost.exe")],
            startup_entries: Vec::new(),
        };

        let first = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        let second = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        assert_eq!(first.hits[0].id, second.hits[0].id);

        // 持久化历史不会因重复扫描而增长
        assert_eq!(svc.store.list_hits().len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn known_bad_verdict_escalates_to_red() {
        let dir = temp_dir("intel");
        let binary = dir.join("payload.exe");
        std::fs::write(&binary, b"not really a binary").unwrap();

        let mut options = DetectionOptions::default();
        options.enable_intel_layer = true;
        let mut svc = service(&dir, options);
        svc.add_provider(Box::new(FixedVerdictProvider {
            verdict: IntelVerdict::KnownBad,
        }));

        // 路径位于用户工作区之外，其它层不会命中
        let request = DetectionRequest {
            processes: vec![process(9, "payload.exe", &binary.to_string_lossy())],
            startup_entries: Vec::new(),
        };

        let report = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        assert_eq!(report.hash_lookups, 1);
        assert_eq!(report.intel_matches, 1);
        assert_eq!(report.hits.len(), 1);
        assert_eq!(report.hits[0].level, SuspicionLevel::Red);
        assert!(report.hits[0].sha256.is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn hash_budget_limits_lookups() {
        let dir = temp_dir("budget");
        let first = dir.join("one.exe");
        let second = dir.join("two.exe");
        std::fs::write(&first, b"one").unwrap();
        std::fs::write(&second, b"two").unwrap();

        let mut options = DetectionOptions::default();
        options.enable_intel_layer = true;
        options.max_hash_lookups = 1;
        let mut svc = service(&dir, options);
        svc.add_provider(Box::new(FixedVerdictProvider {
            verdict: IntelVerdict::Clean,
        }));

        let request = DetectionRequest {
            processes: vec![
                process(1, "one.exe", &first.to_string_lossy()),
                process(2, "two.exe", &second.to_string_lossy()),
            ],
            startup_entries: Vec::new(),
        };

        let report = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        assert_eq!(report.hash_lookups, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn hash_whitelist_suppresses_before_provider_query() {
        let dir = temp_dir("hashwl");
        let binary = dir.join("allowed.exe");
        std::fs::write(&binary, b"allowed contents").unwrap();
        let expected = hash_file(&binary.to_string_lossy()).unwrap();

        let store = Arc::new(StateStore::open_at(&dir));
        store
            .add_whitelist_entry(AntiSystemWhitelistEntry::file_hash(&expected).unwrap())
            .unwrap();

        let mut options = DetectionOptions::default();
        options.enable_intel_layer = true;
        let mut svc =
            DetectionService::with_roots(options, sample_roots(), store);
        svc.add_provider(Box::new(FixedVerdictProvider {
            verdict: IntelVerdict::KnownBad,
        }));

        let request = DetectionRequest {
            processes: vec![process(3, "allowed.exe", &binary.to_string_lossy())],
            startup_entries: Vec::new(),
        };

        let report = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        assert!(report.hits.is_empty());
        assert_eq!(report.whitelisted_count, 1);
        assert_eq!(report.intel_matches, 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn startup_entries_use_narrow_rule_set() {
        let dir = temp_dir("startup");
        let svc = service(&dir, DetectionOptions::default());

        let request = DetectionRequest {
            processes: Vec::new(),
            startup_entries: vec![
                StartupEntry {
                    path: r"C:\Users\Test\AppData\Local\Temp\boot.exe".to_string(),
                    process_name: "boot.exe".to_string(),
                    description: None,
                    source: Some("registry-run".to_string()),
                },
                StartupEntry {
                    path: r"C:\Users\Test\Desktop\helper.exe".to_string(),
                    process_name: "helper.exe".to_string(),
                    description: None,
                    source: None,
                },
                StartupEntry {
                    path: r"C:\Program Files\App\app.exe".to_string(),
                    process_name: "app.exe".to_string(),
                    description: None,
                    source: None,
                },
            ],
        };

        let report = svc.run_scan(&request, &CancelToken::new()).await.unwrap();
        assert_eq!(report.hits.len(), 2);
        assert_eq!(report.hits[0].level, SuspicionLevel::Red);
        assert_eq!(report.hits[1].level, SuspicionLevel::Yellow);
        assert_eq!(report.trusted_count, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
