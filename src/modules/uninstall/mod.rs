//! 卸载计划与沙箱
//!
//! 把一条已安装应用记录变成有序的外部命令序列：
//! MSI 产品码 → 静默卸载串 → 标准卸载串，按需追加 winget 步骤。
//! 守护检查在计划构造时完成；执行交给沙箱逐步落实并上报遥测。

pub mod models;
pub mod planner;
pub mod sandbox;
pub mod telemetry;

pub use models::{
    CommandKind, InstalledApp, InstallerFamily, PlannedCommand, StepOutcome,
    UninstallCommandSnapshot, UninstallOptions, UninstallReport, UninstallTelemetryRecord,
    WingetMode,
};
pub use planner::UninstallPlan;
pub use sandbox::UninstallSandbox;
pub use telemetry::{JsonLinesTelemetrySink, NoopTelemetrySink, UninstallTelemetrySink};

use crate::modules::common::error::TidyError;
use crate::modules::common::utils::CancelToken;
use std::sync::Arc;

/// 构造计划并执行
pub async fn uninstall_app(
    app: &InstalledApp,
    options: &UninstallOptions,
    sink: Arc<dyn UninstallTelemetrySink>,
    cancel: &CancelToken,
) -> Result<UninstallReport, TidyError> {
    let plan = UninstallPlan::build(app, options)?;

    tracing::info!(
        "卸载计划已生成: {} 步, 需要提权: {}",
        plan.commands.len(),
        plan.requires_elevation
    );
    for command in &plan.commands {
        tracing::debug!("计划步骤 [{}]: {}", command.kind.description(), command.display());
    }

    UninstallSandbox::new(sink).execute(&plan, options, cancel).await
}
