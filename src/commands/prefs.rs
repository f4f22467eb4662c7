//! prefs 命令 - 查看或修改进程偏好

use crate::modules::catalog::RecommendedAction;
use crate::modules::store::{PreferenceSource, ProcessPreference, StateStore};
use anyhow::Result;
use chrono::Utc;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct PrefsCommand {
    /// 设置用户覆盖偏好，形如 spooler=keep 或 xblgamesave=auto_stop
    #[arg(long, value_name = "ID=ACTION")]
    pub set: Option<String>,

    /// 删除指定标识的偏好
    #[arg(long, value_name = "ID")]
    pub remove: Option<String>,

    /// 备注（与 --set 一起使用）
    #[arg(long)]
    pub notes: Option<String>,
}

pub async fn execute(cmd: PrefsCommand) -> Result<()> {
    let store = StateStore::open();

    if let Some(raw) = &cmd.set {
        let Some((identifier, action)) = raw.split_once('=') else {
            anyhow::bail!("格式应为 ID=ACTION: {}", raw);
        };
        let action = match action.trim().to_lowercase().as_str() {
            "keep" => RecommendedAction::Keep,
            "auto_stop" | "autostop" | "stop" => RecommendedAction::AutoStop,
            other => anyhow::bail!("无法识别的动作 (keep/auto_stop): {}", other),
        };

        let identifier =
            crate::modules::common::utils::normalize_process_identifier(identifier);
        store.upsert_preference(ProcessPreference {
            identifier: identifier.clone(),
            action,
            source: PreferenceSource::UserOverride,
            updated_at_utc: Utc::now(),
            notes: cmd.notes.clone(),
            service_identifier: None,
        })?;
        println!("已设置用户覆盖: {} -> {}", identifier, action);
        return Ok(());
    }

    if let Some(identifier) = &cmd.remove {
        let identifier =
            crate::modules::common::utils::normalize_process_identifier(identifier);
        if store.remove_preference(&identifier)? {
            println!("已删除偏好: {}", identifier);
        } else {
            println!("偏好不存在: {}", identifier);
        }
        return Ok(());
    }

    let preferences = store.list_preferences();
    if preferences.is_empty() {
        println!("暂无进程偏好");
        return Ok(());
    }

    println!("=== 进程偏好 ({} 项) ===\n", preferences.len());
    for preference in preferences {
        println!(
            "  {:28} {:9} 来源 {:?}  更新于 {}",
            preference.identifier,
            preference.action.to_string(),
            preference.source,
            preference.updated_at_utc.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
