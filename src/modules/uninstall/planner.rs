use super::models::{
    CommandKind, InstalledApp, InstallerFamily, PlannedCommand, UninstallOptions, WingetMode,
};
use crate::modules::common::error::TidyError;
use crate::modules::common::utils::split_command_line;
use regex::Regex;

/// 禁止作为命令目标的解释器：卸载命令必须直接调用可执行文件
const FORBIDDEN_INTERPRETERS: &[&str] = &["cmd", "powershell", "pwsh"];

/// Inno Setup 静默参数
const INNO_SILENT_FLAGS: &[&str] = &["/VERYSILENT", "/SUPPRESSMSGBOXES", "/NORESTART", "/SP-"];
/// NSIS 静默参数
const NSIS_SILENT_FLAGS: &[&str] = &["/S"];
/// InstallShield 静默参数
const INSTALLSHIELD_SILENT_FLAGS: &[&str] = &["/s"];

/// 卸载计划：构造时完成守护检查，此后不可变
#[derive(Debug, Clone)]
pub struct UninstallPlan {
    pub app_name: String,
    pub commands: Vec<PlannedCommand>,
    pub requires_elevation: bool,
    _guarded: (),
}

impl UninstallPlan {
    /// 构造计划并执行守护检查；违规立即失败，早于任何副作用
    pub fn new(
        app_name: String,
        commands: Vec<PlannedCommand>,
        requires_elevation: bool,
    ) -> Result<Self, TidyError> {
        for command in &commands {
            guard_command_target(&command.program)?;
        }
        Ok(Self {
            app_name,
            commands,
            requires_elevation,
            _guarded: (),
        })
    }

    /// 从应用记录构造计划
    ///
    /// 首个可用项作为主步骤：MSI 产品码 → 静默卸载串 → 标准卸载串；
    /// 请求 winget 时追加 winget 步骤。
    pub fn build(app: &InstalledApp, options: &UninstallOptions) -> Result<Self, TidyError> {
        let mut commands: Vec<PlannedCommand> = Vec::new();

        if options.winget_mode != WingetMode::Only {
            if let Some(primary) = build_primary_command(app) {
                commands.push(primary);
            }
        }

        let winget_requested = options.winget_mode != WingetMode::Off;
        if winget_requested {
            if let Some(winget) = build_winget_command(app) {
                commands.push(winget);
            }
        }

        if commands.is_empty() {
            return Err(TidyError::NoUninstallStrategy(format!(
                "应用 {} 没有 MSI 产品码、卸载命令或 winget 标识",
                app.name
            )));
        }

        Self::new(app.name.clone(), commands, requires_elevation(app))
    }
}

/// 主步骤：MSI → 静默串 → 标准串
fn build_primary_command(app: &InstalledApp) -> Option<PlannedCommand> {
    if let Some(product_code) = extract_msi_product_code(app) {
        return Some(PlannedCommand {
            kind: CommandKind::Msi,
            program: "msiexec".to_string(),
            args: vec![
                "/x".to_string(),
                product_code,
                "/qn".to_string(),
                "/norestart".to_string(),
            ],
        });
    }

    if let Some(quiet) = app.quiet_uninstall_string.as_deref() {
        if let Some(command) = build_string_command(app, quiet, CommandKind::QuietString) {
            return Some(command);
        }
    }

    if let Some(standard) = app.uninstall_string.as_deref() {
        if let Some(command) = build_string_command(app, standard, CommandKind::UninstallString) {
            return Some(command);
        }
    }

    None
}

/// 从卸载串构造命令并补充家族静默参数
fn build_string_command(
    app: &InstalledApp,
    raw: &str,
    kind: CommandKind,
) -> Option<PlannedCommand> {
    let (program, mut args) = split_command_line(raw)?;

    let family = detect_installer_family(app, &program);
    let silent_flags = silent_flags_for(family);

    // 大小写不敏感的子串检查，避免重复追加
    let existing = format!("{} {}", program, args.join(" ")).to_lowercase();
    for flag in silent_flags {
        if !existing.contains(&flag.to_lowercase()) {
            args.push(flag.to_string());
        }
    }

    Some(PlannedCommand {
        kind,
        program,
        args,
    })
}

fn build_winget_command(app: &InstalledApp) -> Option<PlannedCommand> {
    let id = app.winget_id.as_deref()?.trim();
    if id.is_empty() {
        return None;
    }
    Some(PlannedCommand {
        kind: CommandKind::Winget,
        program: "winget".to_string(),
        args: vec![
            "uninstall".to_string(),
            "--id".to_string(),
            id.to_string(),
            "-e".to_string(),
            "--silent".to_string(),
            "--accept-source-agreements".to_string(),
            "--accept-package-agreements".to_string(),
        ],
    })
}

/// 从产品码字段或卸载串提取 MSI GUID
fn extract_msi_product_code(app: &InstalledApp) -> Option<String> {
    let Ok(guid_re) =
        Regex::new(r"\{[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}\}")
    else {
        return None;
    };

    if let Some(code) = app.msi_product_code.as_deref() {
        if let Some(m) = guid_re.find(code) {
            return Some(m.as_str().to_uppercase());
        }
    }

    if app.is_msi {
        if let Some(raw) = app.uninstall_string.as_deref() {
            if raw.to_lowercase().contains("msiexec") {
                if let Some(m) = guid_re.find(raw) {
                    return Some(m.as_str().to_uppercase());
                }
            }
        }
    }

    None
}

/// 安装器家族：先看类型提示，再按 unins 前缀约定回退
fn detect_installer_family(app: &InstalledApp, uninstall_binary: &str) -> InstallerFamily {
    for hint in &app.installer_hints {
        let hint = hint.trim().to_lowercase();
        if hint.contains("inno") {
            return InstallerFamily::Inno;
        }
        if hint.contains("nsis") || hint.contains("nullsoft") {
            return InstallerFamily::Nsis;
        }
        if hint.contains("installshield") {
            return InstallerFamily::InstallShield;
        }
        if hint.contains("msi") {
            return InstallerFamily::Msi;
        }
    }

    // Inno Setup 的卸载器命名约定 unins***.exe
    let file_name = uninstall_binary
        .replace('/', "\\")
        .rsplit('\\')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if file_name.starts_with("unins") {
        return InstallerFamily::Inno;
    }

    InstallerFamily::Unknown
}

fn silent_flags_for(family: InstallerFamily) -> &'static [&'static str] {
    match family {
        InstallerFamily::Inno => INNO_SILENT_FLAGS,
        InstallerFamily::Nsis => NSIS_SILENT_FLAGS,
        InstallerFamily::InstallShield => INSTALLSHIELD_SILENT_FLAGS,
        InstallerFamily::Msi | InstallerFamily::Unknown => &[],
    }
}

/// 需要提权：除非按用户安装或注册表键位于 HKCU
fn requires_elevation(app: &InstalledApp) -> bool {
    let user_scoped = app
        .source_tags
        .iter()
        .any(|tag| tag.eq_ignore_ascii_case("user"));
    if user_scoped {
        return false;
    }

    if let Some(key) = app.registry_key.as_deref() {
        let upper = key.trim().to_uppercase();
        if upper.starts_with("HKCU") || upper.starts_with("HKEY_CURRENT_USER") {
            return false;
        }
    }

    true
}

/// 守护检查：禁止 shell/脚本解释器作为命令目标
fn guard_command_target(program: &str) -> Result<(), TidyError> {
    let file_name = program
        .trim()
        .trim_matches('"')
        .replace('/', "\\")
        .rsplit('\\')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let stem = file_name.strip_suffix(".exe").unwrap_or(&file_name);

    if FORBIDDEN_INTERPRETERS.contains(&stem) {
        return Err(TidyError::UnsafeCommand(format!(
            "卸载命令不允许以解释器为目标: {}",
            program
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> InstalledApp {
        InstalledApp {
            name: name.to_string(),
            version: None,
            publisher: None,
            install_location: None,
            uninstall_string: None,
            quiet_uninstall_string: None,
            is_msi: false,
            msi_product_code: None,
            installer_hints: Vec::new(),
            source_tags: Vec::new(),
            registry_key: None,
            is_system_component: false,
            winget_id: None,
        }
    }

    #[test]
    fn msi_product_code_wins_over_uninstall_strings() {
        let mut record = app("Sample");
        record.is_msi = true;
        record.msi_product_code = Some("{12345678-90ab-cdef-1234-567890abcdef}".to_string());
        record.uninstall_string = Some(r"C:\App\uninstall.exe".to_string());

        let plan = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap();
        assert_eq!(plan.commands.len(), 1);
        let step = &plan.commands[0];
        assert_eq!(step.kind, CommandKind::Msi);
        assert_eq!(step.program, "msiexec");
        assert_eq!(
            step.args,
            vec![
                "/x",
                "{12345678-90AB-CDEF-1234-567890ABCDEF}",
                "/qn",
                "/norestart"
            ]
        );
    }

    #[test]
    fn inno_quiet_string_gets_silent_flags_exactly_once() {
        let mut record = app("InnoApp");
        record.quiet_uninstall_string =
            Some(r#""C:\Program Files\InnoApp\unins000.exe""#.to_string());

        // 重复构建计划，参数不会累积
        for _ in 0..2 {
            let plan = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap();
            let step = &plan.commands[0];
            assert_eq!(step.kind, CommandKind::QuietString);

            let display = step.display();
            for flag in ["/VERYSILENT", "/SUPPRESSMSGBOXES", "/NORESTART", "/SP-"] {
                assert_eq!(display.matches(flag).count(), 1, "flag {} 重复", flag);
            }
        }
    }

    #[test]
    fn existing_silent_flags_are_not_duplicated() {
        let mut record = app("InnoApp");
        record.quiet_uninstall_string =
            Some(r#""C:\Apps\unins000.exe" /VERYSILENT /norestart"#.to_string());

        let plan = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap();
        let step = &plan.commands[0];
        let lowered = step.display().to_lowercase();
        assert_eq!(lowered.matches("/verysilent").count(), 1);
        assert_eq!(lowered.matches("/norestart").count(), 1);
        // 缺失的参数仍被补上
        assert!(lowered.contains("/suppressmsgboxes"));
        assert!(lowered.contains("/sp-"));
    }

    #[test]
    fn nsis_hint_appends_single_flag() {
        let mut record = app("NsisApp");
        record.installer_hints = vec!["NSIS".to_string()];
        record.uninstall_string = Some(r"C:\Apps\NsisApp\uninstall.exe".to_string());

        let plan = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap();
        assert_eq!(plan.commands[0].args, vec!["/S"]);
    }

    #[test]
    fn winget_fallback_is_additive() {
        let mut record = app("Dual");
        record.uninstall_string = Some(r"C:\Apps\Dual\remove.exe".to_string());
        record.winget_id = Some("Vendor.Dual".to_string());

        let plan = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap();
        assert_eq!(plan.commands.len(), 2);
        assert_eq!(plan.commands[1].kind, CommandKind::Winget);
        assert!(plan.commands[1]
            .display()
            .contains("--accept-package-agreements"));
    }

    #[test]
    fn winget_only_skips_primary_step() {
        let mut record = app("WgOnly");
        record.uninstall_string = Some(r"C:\Apps\WgOnly\remove.exe".to_string());
        record.winget_id = Some("Vendor.WgOnly".to_string());

        let options = UninstallOptions {
            winget_mode: WingetMode::Only,
            ..UninstallOptions::default()
        };
        let plan = UninstallPlan::build(&record, &options).unwrap();
        assert_eq!(plan.commands.len(), 1);
        assert_eq!(plan.commands[0].kind, CommandKind::Winget);
    }

    #[test]
    fn no_strategy_fails_before_any_side_effect() {
        let record = app("Empty");
        let error = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap_err();
        assert!(matches!(error, TidyError::NoUninstallStrategy(_)));
    }

    #[test]
    fn shell_interpreters_are_rejected_regardless_of_args() {
        for raw in [
            r#"cmd.exe /c "rmdir /s C:\App""#,
            r"C:\Windows\System32\cmd.exe /c del",
            r"powershell.exe -Command Remove-Item",
            r"pwsh -NoProfile -Command x",
        ] {
            let mut record = app("Evil");
            record.quiet_uninstall_string = Some(raw.to_string());
            let error = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap_err();
            assert!(
                matches!(error, TidyError::UnsafeCommand(_)),
                "未拒绝: {}",
                raw
            );
        }
    }

    #[test]
    fn elevation_defaults_on_and_user_scope_disables() {
        let mut record = app("Machine");
        record.uninstall_string = Some(r"C:\Apps\x\remove.exe".to_string());
        let plan = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap();
        assert!(plan.requires_elevation);

        record.source_tags = vec!["User".to_string()];
        let plan = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap();
        assert!(!plan.requires_elevation);

        record.source_tags.clear();
        record.registry_key = Some(
            r"HKEY_CURRENT_USER\Software\Microsoft\Windows\CurrentVersion\Uninstall\x".to_string(),
        );
        let plan = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap();
        assert!(!plan.requires_elevation);
    }

    #[test]
    fn malformed_msi_code_falls_back_to_strings() {
        let mut record = app("BadGuid");
        record.is_msi = true;
        record.msi_product_code = Some("not-a-guid".to_string());
        record.uninstall_string = Some(r"C:\Apps\BadGuid\remove.exe".to_string());

        let plan = UninstallPlan::build(&record, &UninstallOptions::default()).unwrap();
        assert_eq!(plan.commands[0].kind, CommandKind::UninstallString);
    }
}
