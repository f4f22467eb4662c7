//! 已安装应用清单（注册表来源）
//!
//! 读取三个 Uninstall 注册表根生成 `InstalledApp` 记录，
//! 供 CLI 按名称发起卸载；外部提供的 JSON 记录仍是首选契约。

use crate::modules::common::error::TidyError;
use crate::modules::common::utils;
use crate::modules::uninstall::InstalledApp;

/// 列出已安装应用
pub fn list_installed_apps() -> Result<Vec<InstalledApp>, TidyError> {
    #[cfg(windows)]
    {
        list_installed_apps_impl()
    }

    #[cfg(not(windows))]
    {
        Ok(Vec::new())
    }
}

/// 按名称查找应用：先精确子串，再回退模糊匹配
pub fn find_app(name: &str) -> Result<Option<InstalledApp>, TidyError> {
    let apps = list_installed_apps()?;
    let query = name.trim().to_lowercase();
    if query.is_empty() {
        return Ok(None);
    }

    if let Some(app) = apps
        .iter()
        .find(|app| app.name.to_lowercase().contains(&query))
    {
        return Ok(Some(app.clone()));
    }

    let best = apps
        .into_iter()
        .map(|app| {
            let score = utils::fuzzy_score(&app.name.to_lowercase(), &query);
            (score, app)
        })
        .filter(|(score, _)| *score > 0)
        .max_by_key(|(score, _)| *score)
        .map(|(_, app)| app);

    Ok(best)
}

#[cfg(windows)]
fn list_installed_apps_impl() -> Result<Vec<InstalledApp>, TidyError> {
    use winreg::enums::*;
    use winreg::RegKey;

    let mut apps = Vec::new();

    // 注册表路径列表
    let roots = [
        (
            HKEY_LOCAL_MACHINE,
            "HKLM",
            r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
            "Machine",
        ),
        (
            HKEY_LOCAL_MACHINE,
            "HKLM",
            r"SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
            "Machine",
        ),
        (
            HKEY_CURRENT_USER,
            "HKCU",
            r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
            "User",
        ),
    ];

    for (hkey, hive_name, path, source_tag) in &roots {
        match RegKey::predef(*hkey).open_subkey(path) {
            Ok(key) => {
                for name in key.enum_keys().filter_map(|k| k.ok()) {
                    if let Ok(subkey) = key.open_subkey(&name) {
                        let registry_key = format!("{}\\{}\\{}", hive_name, path, name);
                        if let Some(app) =
                            parse_registry_entry(&subkey, &name, registry_key, source_tag)
                        {
                            apps.push(app);
                        }
                    }
                }
            }
            Err(error) => {
                tracing::debug!("无法打开注册表路径 {}: {}", path, error);
            }
        }
    }

    Ok(apps)
}

#[cfg(windows)]
fn parse_registry_entry(
    subkey: &winreg::RegKey,
    key_name: &str,
    registry_key: String,
    source_tag: &str,
) -> Option<InstalledApp> {
    // 必须有 DisplayName
    let name: String = subkey.get_value("DisplayName").ok()?;

    // 跳过以 KB 开头的补丁
    if name.starts_with("KB") || name.to_lowercase().contains("security update") {
        return None;
    }

    let uninstall_string: Option<String> = subkey.get_value("UninstallString").ok();
    let quiet_uninstall_string: Option<String> = subkey.get_value("QuietUninstallString").ok();

    let windows_installer = subkey
        .get_value::<u32, _>("WindowsInstaller")
        .map(|v| v == 1)
        .unwrap_or(false);
    let msi_shaped_key = key_name.starts_with('{') && key_name.ends_with('}');
    let is_msi = windows_installer
        || msi_shaped_key
        || uninstall_string
            .as_deref()
            .map(|s| s.to_lowercase().contains("msiexec"))
            .unwrap_or(false);

    let is_system_component = subkey
        .get_value::<u32, _>("SystemComponent")
        .map(|v| v == 1)
        .unwrap_or(false);

    Some(InstalledApp {
        name,
        version: subkey.get_value("DisplayVersion").ok(),
        publisher: subkey.get_value("Publisher").ok(),
        install_location: subkey.get_value("InstallLocation").ok(),
        uninstall_string,
        quiet_uninstall_string,
        is_msi,
        msi_product_code: if msi_shaped_key {
            Some(key_name.to_string())
        } else {
            None
        },
        installer_hints: Vec::new(),
        source_tags: vec![source_tag.to_string()],
        registry_key: Some(registry_key),
        is_system_component,
        winget_id: None,
    })
}
