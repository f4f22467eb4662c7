//! whitelist 命令 - 管理反检测白名单

use crate::modules::store::{AntiSystemWhitelistEntry, StateStore};
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct WhitelistCommand {
    /// 添加目录白名单 (前缀匹配)
    #[arg(long, value_name = "DIR")]
    pub add_dir: Option<String>,

    /// 添加文件哈希白名单 (SHA-256)
    #[arg(long, value_name = "HASH")]
    pub add_hash: Option<String>,

    /// 添加进程名白名单
    #[arg(long, value_name = "NAME")]
    pub add_process: Option<String>,

    /// 按 id 删除条目
    #[arg(long, value_name = "ID")]
    pub remove: Option<String>,
}

pub async fn execute(cmd: WhitelistCommand) -> Result<()> {
    let store = StateStore::open();

    let new_entry = if let Some(dir) = &cmd.add_dir {
        AntiSystemWhitelistEntry::directory(dir)
    } else if let Some(hash) = &cmd.add_hash {
        AntiSystemWhitelistEntry::file_hash(hash)
    } else if let Some(process) = &cmd.add_process {
        AntiSystemWhitelistEntry::process_name(process)
    } else {
        None
    };

    if cmd.add_dir.is_some() || cmd.add_hash.is_some() || cmd.add_process.is_some() {
        let Some(entry) = new_entry else {
            anyhow::bail!("白名单值无效 (为空或无法规范化)");
        };
        println!("已添加白名单条目: {}", entry.id);
        store.add_whitelist_entry(entry)?;
        return Ok(());
    }

    if let Some(id) = &cmd.remove {
        if store.remove_whitelist_entry(id)? {
            println!("已删除白名单条目: {}", id);
        } else {
            println!("白名单条目不存在: {}", id);
        }
        return Ok(());
    }

    let entries = store.list_whitelist();
    if entries.is_empty() {
        println!("白名单为空");
        return Ok(());
    }

    println!("=== 白名单 ({} 项) ===\n", entries.len());
    for entry in entries {
        println!(
            "  {:12} {}  (添加于 {})",
            entry.kind.to_string(),
            entry.value,
            entry.created_at_utc.format("%Y-%m-%d")
        );
    }
    Ok(())
}
