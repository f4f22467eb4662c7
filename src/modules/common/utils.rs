use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 协作式取消令牌，在递归/迭代边界检查
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// 规范化为匹配键（小写、去除 \\?\ 前缀、统一反斜杠）
pub fn normalize_path_key(path: &str) -> Option<String> {
    let mut normalized = path.trim().trim_matches('"').to_lowercase();
    if let Some(stripped) = normalized.strip_prefix("\\\\?\\") {
        normalized = stripped.to_string();
    }
    normalized = normalized.replace('/', "\\");
    while normalized.contains("\\\\") {
        normalized = normalized.replace("\\\\", "\\");
    }
    if normalized.is_empty() {
        return None;
    }
    Some(normalized)
}

/// 规范化进程标识（小写、去掉 .exe 后缀）
pub fn normalize_process_identifier(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    lower
        .strip_suffix(".exe")
        .map(|s| s.to_string())
        .unwrap_or(lower)
}

/// 获取模糊匹配分数
pub fn fuzzy_score(text: &str, pattern: &str) -> i64 {
    let matcher = SkimMatcherV2::default();
    matcher.fuzzy_match(text, pattern).unwrap_or(0)
}

/// 格式化文件大小
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// 按引号感知规则拆分命令行
///
/// 返回 (程序, 参数列表)；空字符串返回 None
pub fn split_command_line(command: &str) -> Option<(String, Vec<String>)> {
    let raw = command.trim();
    if raw.is_empty() {
        return None;
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in raw.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    let mut iter = tokens.into_iter();
    let program = iter.next()?;
    Some((program, iter.collect()))
}

/// 获取 Program Files 根目录
pub fn program_files_roots() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(program_files) = std::env::var("ProgramFiles") {
        dirs.push(PathBuf::from(program_files));
    }

    if let Ok(program_files_x86) = std::env::var("ProgramFiles(x86)") {
        dirs.push(PathBuf::from(program_files_x86));
    }

    if let Ok(program_w6432) = std::env::var("ProgramW6432") {
        dirs.push(PathBuf::from(program_w6432));
    }

    dirs
}

/// 获取 Windows 系统根目录 (System32/SysWOW64)
pub fn system_roots() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(system_root) = std::env::var("SystemRoot") {
        let system_root = PathBuf::from(system_root);
        dirs.push(system_root.join("System32"));
        dirs.push(system_root.join("SysWOW64"));
    }

    dirs
}

/// 获取临时目录根
pub fn temp_roots() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    for var in ["TEMP", "TMP"] {
        if let Ok(value) = std::env::var(var) {
            let path = PathBuf::from(value);
            if !dirs.contains(&path) {
                dirs.push(path);
            }
        }
    }

    if let Ok(system_root) = std::env::var("SystemRoot") {
        dirs.push(PathBuf::from(system_root).join("Temp"));
    }

    dirs
}

/// 获取用户主目录
pub fn user_profile_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// 获取下载目录
pub fn downloads_dir() -> Option<PathBuf> {
    dirs::download_dir().or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
}

/// 获取 AppData 目录 (Roaming/Local)
pub fn appdata_dirs() -> Vec<PathBuf> {
    let mut dirs_out = Vec::new();

    if let Some(roaming) = dirs::data_dir() {
        dirs_out.push(roaming);
    }
    if let Some(local) = dirs::data_local_dir() {
        dirs_out.push(local);
    }

    dirs_out
}
