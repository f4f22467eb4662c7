//! uninstall 命令 - 卸载已安装的应用

use crate::modules::common::utils::CancelToken;
use crate::modules::inventory;
use crate::modules::uninstall::{
    self, InstalledApp, JsonLinesTelemetrySink, NoopTelemetrySink, UninstallOptions,
    UninstallTelemetrySink, WingetMode,
};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
pub struct UninstallCommand {
    /// 程序名称 (从注册表清单中查找)
    pub target: Option<String>,

    /// 直接使用外部清单导出的应用记录 JSON
    #[arg(long)]
    pub app: Option<PathBuf>,

    /// 只生成计划并伪造执行快照，不派生任何进程
    #[arg(long)]
    pub dry_run: bool,

    /// winget 使用方式 (off/fallback/only)
    #[arg(long, default_value = "fallback")]
    pub winget: WingetMode,

    /// 单步超时 (秒)
    #[arg(long, default_value = "300")]
    pub timeout: u64,

    /// 遥测记录追加写入的 JSON Lines 文件
    #[arg(long)]
    pub telemetry_log: Option<PathBuf>,
}

pub async fn execute(cmd: UninstallCommand) -> Result<()> {
    let app = resolve_app(&cmd)?;

    println!("=== 卸载应用: {} ===\n", app.name);
    if let Some(publisher) = &app.publisher {
        println!("  - 发布者: {}", publisher);
    }
    if let Some(version) = &app.version {
        println!("  - 版本: {}", version);
    }
    if let Some(location) = &app.install_location {
        println!("  - 安装位置: {}", location);
    }

    let options = UninstallOptions {
        winget_mode: cmd.winget,
        dry_run: cmd.dry_run,
        timeout_secs: cmd.timeout,
    };

    let sink: Arc<dyn UninstallTelemetrySink> = match &cmd.telemetry_log {
        Some(path) => Arc::new(JsonLinesTelemetrySink::new(path.clone())),
        None => Arc::new(NoopTelemetrySink),
    };

    let report = uninstall::uninstall_app(&app, &options, sink, &CancelToken::new()).await?;

    if report.requires_elevation && !cmd.dry_run {
        println!("\n  注意: 该应用按机器范围安装，卸载命令可能需要管理员权限");
    }

    println!("\n执行 {} 步:\n", report.steps.len());
    for (index, step) in report.steps.iter().enumerate() {
        let status = if step.is_success() { "成功" } else { "失败" };
        println!("  [{}/{}] {} - {}", index + 1, report.steps.len(), status, step.display);
        if let Some(code) = step.exit_code {
            println!("        退出码: {}", code);
        }
        if !step.stderr.is_empty() {
            println!("        错误输出: {}", step.stderr.trim_end());
        }
    }

    if report.is_success {
        println!("\n=== 卸载完成 ===");
    } else {
        println!("\n=== 卸载未完全成功，请检查各步骤结果 ===");
    }
    Ok(())
}

/// 解析应用记录：--app 文件优先，否则按名称查注册表清单
fn resolve_app(cmd: &UninstallCommand) -> Result<InstalledApp> {
    if let Some(path) = &cmd.app {
        let content = std::fs::read_to_string(path)?;
        let app: InstalledApp = serde_json::from_str(&content)?;
        return Ok(app);
    }

    let Some(target) = &cmd.target else {
        anyhow::bail!("需要指定程序名称或 --app 文件");
    };

    match inventory::find_app(target)? {
        Some(app) => Ok(app),
        None => anyhow::bail!("未找到程序: {}", target),
    }
}
