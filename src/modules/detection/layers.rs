use super::models::RunningProcessSnapshot;
use super::trusted::TrustedRoots;
use crate::modules::common::utils::normalize_process_identifier;
use crate::modules::store::SuspicionLevel;

pub const RULE_CRITICAL_PROCESS_PATH: &str = "critical-process-path";
pub const RULE_SVCHOST_OUTSIDE_SYSTEM32: &str = "svchost-outside-system32";
pub const RULE_SVCHOST_UNDER_APPDATA: &str = "svchost-under-appdata";
pub const RULE_LOLBIN_NET_CHAIN: &str = "lolbin-net-cmd-explorer";
pub const RULE_TEMP_RANDOM_NAME: &str = "temp-random-name";
pub const RULE_USER_PROFILE_EXECUTABLE: &str = "user-profile-executable";
pub const RULE_DOWNLOADS_EXECUTABLE: &str = "downloads-executable";
pub const RULE_INTEL_SUSPICIOUS: &str = "intel-suspicious";
pub const RULE_INTEL_KNOWN_BAD: &str = "intel-known-bad";
pub const RULE_STARTUP_TEMP_PATH: &str = "startup-temp-path";
pub const RULE_STARTUP_USER_PATH: &str = "startup-user-path";

/// OS 关键进程封闭清单（规范化标识，不含 .exe）
const CRITICAL_PROCESSES: &[&str] = &[
    "svchost", "lsass", "csrss", "winlogon", "services", "smss", "wininit", "explorer",
    "taskhostw", "dwm",
];

pub type RuleMatch = (&'static str, SuspicionLevel);

/// 关键进程层：关键进程名出现在系统根之外 → Red
pub fn critical_process_layer(
    process: &RunningProcessSnapshot,
    path_key: &str,
    roots: &TrustedRoots,
) -> Option<RuleMatch> {
    let identifier = normalize_process_identifier(&process.name);
    if !CRITICAL_PROCESSES.contains(&identifier.as_str()) {
        return None;
    }
    if roots.is_under_system_root(path_key) {
        return None;
    }
    Some((RULE_CRITICAL_PROCESS_PATH, SuspicionLevel::Red))
}

/// 行为层：svchost 错位、LOLBin 链、临时目录随机文件名
pub fn behavior_layer(
    process: &RunningProcessSnapshot,
    path_key: &str,
    roots: &TrustedRoots,
) -> Vec<RuleMatch> {
    let mut matches = Vec::new();
    let identifier = normalize_process_identifier(&process.name);

    if identifier == "svchost" {
        if !path_key.contains(r"\system32\") {
            matches.push((RULE_SVCHOST_OUTSIDE_SYSTEM32, SuspicionLevel::Orange));
        }
        if roots.is_under_appdata(path_key) {
            matches.push((RULE_SVCHOST_UNDER_APPDATA, SuspicionLevel::Orange));
        }
    }

    // net.exe ← cmd.exe ← explorer.exe 的调用链
    if identifier == "net" {
        let parent = process
            .parent_name
            .as_deref()
            .map(normalize_process_identifier)
            .unwrap_or_default();
        let grandparent = process
            .grandparent_name
            .as_deref()
            .map(normalize_process_identifier)
            .unwrap_or_default();
        if parent == "cmd" && grandparent == "explorer" {
            matches.push((RULE_LOLBIN_NET_CHAIN, SuspicionLevel::Orange));
        }
    }

    if roots.is_under_temp_root(path_key) && has_random_looking_stem(path_key) {
        matches.push((RULE_TEMP_RANDOM_NAME, SuspicionLevel::Orange));
    }

    matches
}

/// 用户位置层：主目录直下或下载目录中的可执行文件 → Yellow
pub fn user_location_layer(path_key: &str, roots: &TrustedRoots) -> Option<RuleMatch> {
    if roots.is_directly_under_user_profile(path_key) {
        return Some((RULE_USER_PROFILE_EXECUTABLE, SuspicionLevel::Yellow));
    }
    if roots.is_under_downloads(path_key) {
        return Some((RULE_DOWNLOADS_EXECUTABLE, SuspicionLevel::Yellow));
    }
    None
}

/// 启动项层：临时目录 → Red，用户工作区 → Yellow
pub fn startup_layer(path_key: &str, roots: &TrustedRoots) -> Option<RuleMatch> {
    if roots.is_under_temp_root(path_key) {
        return Some((RULE_STARTUP_TEMP_PATH, SuspicionLevel::Red));
    }
    if roots.is_in_user_workspace(path_key) {
        return Some((RULE_STARTUP_USER_PATH, SuspicionLevel::Yellow));
    }
    None
}

/// 8 位字母数字且至少含一个数字的文件名主干视为随机命名
fn has_random_looking_stem(path_key: &str) -> bool {
    let file_name = path_key.rsplit('\\').next().unwrap_or(path_key);
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);

    stem.len() == 8
        && stem.chars().all(|c| c.is_ascii_alphanumeric())
        && stem.chars().any(|c| c.is_ascii_digit())
}
