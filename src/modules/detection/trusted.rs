use crate::modules::common::utils;
use std::path::Path;

/// 构造时计算一次的根目录清单，服务生命周期内不可变
#[derive(Debug, Clone, Default)]
pub struct TrustedRoots {
    /// 受信任根：位于其下的二进制不再进入检测层
    pub trusted: Vec<String>,
    /// 识别为系统目录的根（关键进程的合法位置）
    pub system: Vec<String>,
    /// 临时目录根
    pub temp: Vec<String>,
    /// 用户主目录
    pub user_profile: Option<String>,
    /// 下载目录
    pub downloads: Option<String>,
    /// AppData 根 (Roaming/Local)
    pub appdata: Vec<String>,
}

impl TrustedRoots {
    /// 从当前环境推导全部根目录
    pub fn from_environment() -> Self {
        let mut trusted: Vec<String> = Vec::new();

        for dir in utils::program_files_roots() {
            push_dir_key(&mut trusted, &dir);
        }
        // 常见工具安装位置
        if let Ok(program_data) = std::env::var("ProgramData") {
            push_dir_key(&mut trusted, &Path::new(&program_data).join("chocolatey"));
        }
        if let Some(home) = utils::user_profile_dir() {
            push_dir_key(&mut trusted, &home.join("scoop"));
            push_dir_key(
                &mut trusted,
                &home.join("AppData").join("Local").join("Programs"),
            );
        }

        let mut system: Vec<String> = Vec::new();
        for dir in utils::system_roots() {
            push_dir_key(&mut system, &dir);
        }
        if let Ok(system_root) = std::env::var("SystemRoot") {
            push_dir_key(&mut system, Path::new(&system_root));
        }

        let mut temp: Vec<String> = Vec::new();
        for dir in utils::temp_roots() {
            push_dir_key(&mut temp, &dir);
        }

        let mut appdata: Vec<String> = Vec::new();
        for dir in utils::appdata_dirs() {
            push_dir_key(&mut appdata, &dir);
        }

        Self {
            trusted,
            system,
            temp,
            user_profile: utils::user_profile_dir()
                .and_then(|p| dir_key(&p)),
            downloads: utils::downloads_dir().and_then(|p| dir_key(&p)),
            appdata,
        }
    }

    pub fn is_trusted(&self, path_key: &str) -> bool {
        prefix_match(&self.trusted, path_key)
    }

    pub fn is_under_system_root(&self, path_key: &str) -> bool {
        prefix_match(&self.system, path_key)
    }

    pub fn is_under_temp_root(&self, path_key: &str) -> bool {
        prefix_match(&self.temp, path_key)
    }

    pub fn is_under_appdata(&self, path_key: &str) -> bool {
        prefix_match(&self.appdata, path_key)
    }

    /// 文件直接位于用户主目录下（排除 AppData 子树）
    pub fn is_directly_under_user_profile(&self, path_key: &str) -> bool {
        let Some(profile) = &self.user_profile else {
            return false;
        };
        if !path_key.starts_with(profile.as_str()) || self.is_under_appdata(path_key) {
            return false;
        }
        // 去掉前缀后不含目录分隔符才算"直接位于"
        let remainder = &path_key[profile.len()..];
        !remainder.trim_end_matches('\\').contains('\\')
    }

    pub fn is_under_downloads(&self, path_key: &str) -> bool {
        self.downloads
            .as_ref()
            .map(|d| path_key.starts_with(d.as_str()))
            .unwrap_or(false)
    }

    /// 用户工作区：主目录或下载目录之下（启动项规则使用）
    pub fn is_in_user_workspace(&self, path_key: &str) -> bool {
        self.is_under_downloads(path_key)
            || self
                .user_profile
                .as_ref()
                .map(|p| path_key.starts_with(p.as_str()) && !self.is_under_appdata(path_key))
                .unwrap_or(false)
    }
}

fn prefix_match(roots: &[String], path_key: &str) -> bool {
    roots.iter().any(|root| path_key.starts_with(root.as_str()))
}

fn dir_key(path: &Path) -> Option<String> {
    let mut key = utils::normalize_path_key(&path.to_string_lossy())?;
    if !key.ends_with('\\') {
        key.push('\\');
    }
    Some(key)
}

fn push_dir_key(target: &mut Vec<String>, path: &Path) {
    if let Some(key) = dir_key(path) {
        if !target.contains(&key) {
            target.push(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn trusted_prefix_matches() {
        let roots = sample_roots();
        assert!(roots.is_trusted(r"c:\program files\app\run.exe"));
        assert!(!roots.is_trusted(r"c:\program filesx\app\run.exe"));
    }

    #[test]
    fn directly_under_profile_excludes_subdirs_and_appdata() {
        let roots = sample_roots();
        assert!(roots.is_directly_under_user_profile(r"c:\users\test\evil.exe"));
        assert!(!roots.is_directly_under_user_profile(r"c:\users\test\docs\tool.exe"));
        assert!(!roots.is_directly_under_user_profile(
            r"c:\users\test\appdata\roaming\tool.exe"
        ));
    }

    #[test]
    fn downloads_and_workspace_checks() {
        let roots = sample_roots();
        assert!(roots.is_under_downloads(r"c:\users\test\downloads\setup.exe"));
        assert!(roots.is_in_user_workspace(r"c:\users\test\desktop\run.exe"));
        assert!(!roots.is_in_user_workspace(r"c:\users\test\appdata\local\x.exe"));
    }
}
