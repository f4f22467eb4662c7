use super::models::{
    PlannedCommand, StepOutcome, UninstallCommandSnapshot, UninstallOptions, UninstallReport,
    UninstallTelemetryRecord,
};
use super::planner::UninstallPlan;
use super::telemetry::UninstallTelemetrySink;
use crate::modules::common::error::TidyError;
use crate::modules::common::utils::CancelToken;
use chrono::{DateTime, Utc};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

/// 卸载沙箱：逐步执行计划，每步独立子进程并捕获输出
pub struct UninstallSandbox {
    sink: Arc<dyn UninstallTelemetrySink>,
}

impl UninstallSandbox {
    pub fn new(sink: Arc<dyn UninstallTelemetrySink>) -> Self {
        Self { sink }
    }

    /// 执行计划
    ///
    /// 中途出现取消/超时时，先发布部分遥测记录再传播错误，
    /// 遥测必须如实反映实际尝试过的步骤。
    pub async fn execute(
        &self,
        plan: &UninstallPlan,
        options: &UninstallOptions,
        cancel: &CancelToken,
    ) -> Result<UninstallReport, TidyError> {
        let started_at = Utc::now();
        let mut steps: Vec<UninstallCommandSnapshot> = Vec::new();

        for command in &plan.commands {
            if cancel.is_cancelled() {
                self.publish(plan, started_at, &steps, false, true);
                return Err(TidyError::Cancelled);
            }

            if options.dry_run {
                steps.push(dry_run_snapshot(command));
                continue;
            }

            match run_step(command, options, cancel).await {
                Ok(snapshot) => {
                    tracing::info!(
                        "卸载步骤结束: {} (退出码 {:?})",
                        snapshot.display,
                        snapshot.exit_code
                    );
                    steps.push(snapshot);
                }
                Err(error) => {
                    self.publish(plan, started_at, &steps, false, true);
                    return Err(error);
                }
            }
        }

        let is_success = !steps.is_empty() && steps.iter().all(|s| s.is_success());
        self.publish(plan, started_at, &steps, is_success, false);

        Ok(UninstallReport {
            app_name: plan.app_name.clone(),
            is_success,
            requires_elevation: plan.requires_elevation,
            steps,
        })
    }

    fn publish(
        &self,
        plan: &UninstallPlan,
        started_at: DateTime<Utc>,
        steps: &[UninstallCommandSnapshot],
        is_success: bool,
        partial: bool,
    ) {
        self.sink.publish(&UninstallTelemetryRecord {
            app_name: plan.app_name.clone(),
            started_at_utc: started_at,
            finished_at_utc: Utc::now(),
            planned_steps: plan.commands.len(),
            executed_steps: steps.len(),
            is_success,
            partial,
            steps: steps.to_vec(),
        });
    }
}

/// dry-run 不派生任何进程，只伪造快照
fn dry_run_snapshot(command: &PlannedCommand) -> UninstallCommandSnapshot {
    let now = Utc::now();
    UninstallCommandSnapshot {
        kind: command.kind,
        display: command.display(),
        started_at_utc: now,
        finished_at_utc: now,
        exit_code: None,
        stdout: format!("将执行: {}", command.display()),
        stderr: String::new(),
        outcome: StepOutcome::DryRun,
    }
}

/// 单步执行：重定向输出、协作取消（取消时终止整个进程树）
async fn run_step(
    command: &PlannedCommand,
    options: &UninstallOptions,
    cancel: &CancelToken,
) -> Result<UninstallCommandSnapshot, TidyError> {
    let started_at = Utc::now();

    let mut process = tokio::process::Command::new(&command.program);
    process
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match process.spawn() {
        Ok(child) => child,
        Err(error) => {
            // 启动失败是非致命结果，交由调用方展示
            return Ok(UninstallCommandSnapshot {
                kind: command.kind,
                display: command.display(),
                started_at_utc: started_at,
                finished_at_utc: Utc::now(),
                exit_code: None,
                stdout: String::new(),
                stderr: format!("启动失败: {}", error),
                outcome: StepOutcome::FailedToStart,
            });
        }
    };

    let pid = child.id();
    let stdout_task = drain_stream(child.stdout.take());
    let stderr_task = drain_stream(child.stderr.take());

    // 取消/超时分支按 pid 终止整个进程树；直接子进程由 kill_on_drop 兜底
    let status = tokio::select! {
        status = child.wait() => status,
        _ = wait_for_cancel(cancel) => {
            kill_process_tree(pid).await;
            return Err(TidyError::Cancelled);
        }
        _ = tokio::time::sleep(Duration::from_secs(options.timeout_secs)) => {
            kill_process_tree(pid).await;
            return Err(TidyError::Timeout(format!(
                "卸载步骤超过 {} 秒: {}",
                options.timeout_secs,
                command.display()
            )));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    let (exit_code, extra_error) = match status {
        Ok(status) => (status.code(), None),
        Err(error) => (None, Some(format!("等待进程失败: {}", error))),
    };

    let stderr = match extra_error {
        Some(extra) if stderr.is_empty() => extra,
        Some(extra) => format!("{}\n{}", stderr, extra),
        None => stderr,
    };

    Ok(UninstallCommandSnapshot {
        kind: command.kind,
        display: command.display(),
        started_at_utc: started_at,
        finished_at_utc: Utc::now(),
        exit_code,
        stdout,
        stderr,
        outcome: StepOutcome::Completed,
    })
}

fn drain_stream<R>(stream: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = String::new();
        if let Some(mut stream) = stream {
            use tokio::io::AsyncReadExt;
            let _ = stream.read_to_string(&mut buffer).await;
        }
        buffer
    })
}

async fn wait_for_cancel(cancel: &CancelToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// 终止子进程树
#[cfg(windows)]
async fn kill_process_tree(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let result = tokio::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(error) = result {
        tracing::warn!("taskkill 失败: {}", error);
    }
}

#[cfg(not(windows))]
async fn kill_process_tree(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let _ = tokio::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
}
