use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 外部清单协作方提供的已安装应用记录（对核心只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledApp {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub install_location: Option<String>,
    #[serde(default)]
    pub uninstall_string: Option<String>,
    #[serde(default)]
    pub quiet_uninstall_string: Option<String>,
    #[serde(default)]
    pub is_msi: bool,
    #[serde(default)]
    pub msi_product_code: Option<String>,
    /// 安装器类型提示 (inno/nsis/installshield/msi 等)
    #[serde(default)]
    pub installer_hints: Vec<String>,
    /// 来源标签 (例如 "User" 表示按用户安装)
    #[serde(default)]
    pub source_tags: Vec<String>,
    #[serde(default)]
    pub registry_key: Option<String>,
    #[serde(default)]
    pub is_system_component: bool,
    #[serde(default)]
    pub winget_id: Option<String>,
}

/// 安装器家族，决定补充的静默参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallerFamily {
    Inno,
    Nsis,
    InstallShield,
    Msi,
    Unknown,
}

/// 命令种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Msi,
    QuietString,
    UninstallString,
    Winget,
}

impl CommandKind {
    /// 默认步骤说明
    pub fn description(&self) -> &'static str {
        match self {
            CommandKind::Msi => "MSI 静默卸载",
            CommandKind::QuietString => "注册表静默卸载命令",
            CommandKind::UninstallString => "注册表标准卸载命令",
            CommandKind::Winget => "winget 卸载",
        }
    }
}

/// 计划中的一条具体命令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedCommand {
    pub kind: CommandKind,
    pub program: String,
    pub args: Vec<String>,
}

impl PlannedCommand {
    /// 展示用命令行
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// winget 使用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WingetMode {
    Off,
    #[default]
    Fallback,
    Only,
}

impl std::str::FromStr for WingetMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "off" => Ok(WingetMode::Off),
            "fallback" => Ok(WingetMode::Fallback),
            "only" => Ok(WingetMode::Only),
            other => Err(format!("无法识别的 winget 模式: {}", other)),
        }
    }
}

/// 卸载选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UninstallOptions {
    pub winget_mode: WingetMode,
    pub dry_run: bool,
    /// 单步超时（秒）
    pub timeout_secs: u64,
}

impl Default for UninstallOptions {
    fn default() -> Self {
        Self {
            winget_mode: WingetMode::Fallback,
            dry_run: false,
            timeout_secs: 300,
        }
    }
}

/// 单步执行结局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    DryRun,
    FailedToStart,
}

/// 单步执行快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UninstallCommandSnapshot {
    pub kind: CommandKind,
    pub display: String,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub outcome: StepOutcome,
}

impl UninstallCommandSnapshot {
    /// 退出码 0 或 dry-run 视为成功
    pub fn is_success(&self) -> bool {
        match self.outcome {
            StepOutcome::DryRun => true,
            StepOutcome::FailedToStart => false,
            StepOutcome::Completed => self.exit_code == Some(0),
        }
    }
}

/// 整体卸载结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UninstallReport {
    pub app_name: String,
    pub is_success: bool,
    pub requires_elevation: bool,
    pub steps: Vec<UninstallCommandSnapshot>,
}

/// 遥测记录：必须如实反映实际尝试过的步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UninstallTelemetryRecord {
    pub app_name: String,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    pub planned_steps: usize,
    pub executed_steps: usize,
    pub is_success: bool,
    /// 执行器异常中途退出时为 true
    pub partial: bool,
    pub steps: Vec<UninstallCommandSnapshot>,
}
