//! catalog 命令 - 解析并展示已知进程目录

use crate::modules::catalog;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct CatalogCommand {
    /// 目录文件路径 (不指定则自动解析)
    #[arg(long, env = "TIDYWINDOW_CATALOG_PATH")]
    pub path: Option<PathBuf>,

    /// 输出格式 (table/json)
    #[arg(long, default_value = "table")]
    pub format: String,
}

pub async fn execute(cmd: CatalogCommand) -> Result<()> {
    let snapshot = match &cmd.path {
        Some(path) => catalog::load_snapshot_from(path)?,
        None => catalog::load_snapshot()?,
    };

    if cmd.format == "json" {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("=== 已知进程目录: {} ===\n", snapshot.source_path);

    for category in &snapshot.categories {
        let description = category
            .description
            .as_deref()
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        println!("[{}] {}{}", category.key, category.name, description);

        for entry in snapshot
            .entries
            .iter()
            .filter(|e| e.category_key == category.key)
        {
            let marker = if entry.is_pattern { " [模式]" } else { "" };
            println!(
                "  {:32} {:?}/{}{}",
                entry.display_name, entry.risk_level, entry.recommended_action, marker
            );
        }
        println!();
    }

    println!(
        "共 {} 个分类, {} 个条目",
        snapshot.categories.len(),
        snapshot.entries.len()
    );
    Ok(())
}
