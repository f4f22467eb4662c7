//! scan 命令 - 深度扫描最大文件与目录

use crate::modules::common::utils::{self, CancelToken};
use crate::modules::deepscan::{
    self, DeepScanRequest, NameFilter, NameMatchMode,
};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct ScanCommand {
    /// 扫描根 (文件或目录)
    pub root: PathBuf,

    /// 返回的最大条目数
    #[arg(long, default_value = "50")]
    pub max_items: usize,

    /// 最小大小 (MB)
    #[arg(long, default_value = "100")]
    pub min_size_mb: u64,

    /// 把目录也作为候选
    #[arg(long)]
    pub include_dirs: bool,

    /// 不把文件作为候选 (仅目录)
    #[arg(long)]
    pub dirs_only: bool,

    /// 名称过滤模式串
    #[arg(long)]
    pub filter: Option<String>,

    /// 名称匹配方式 (contains/starts_with/ends_with/exact)
    #[arg(long, default_value = "contains")]
    pub filter_mode: String,

    /// 名称匹配区分大小写
    #[arg(long)]
    pub case_sensitive: bool,

    /// 包含隐藏文件
    #[arg(long)]
    pub include_hidden: bool,

    /// 包含系统文件
    #[arg(long)]
    pub include_system: bool,

    /// 输出格式 (table/json)
    #[arg(long, default_value = "table")]
    pub format: String,
}

pub async fn execute(cmd: ScanCommand) -> Result<()> {
    let name_filter = match &cmd.filter {
        Some(pattern) => {
            let mode = match cmd.filter_mode.to_lowercase().as_str() {
                "contains" => NameMatchMode::Contains,
                "starts_with" => NameMatchMode::StartsWith,
                "ends_with" => NameMatchMode::EndsWith,
                "exact" => NameMatchMode::Exact,
                other => anyhow::bail!("无法识别的匹配方式: {}", other),
            };
            Some(NameFilter {
                pattern: pattern.clone(),
                mode,
                case_sensitive: cmd.case_sensitive,
            })
        }
        None => None,
    };

    let request = DeepScanRequest {
        root: cmd.root.clone(),
        max_items: cmd.max_items,
        minimum_size_bytes: cmd.min_size_mb * 1024 * 1024,
        include_files: !cmd.dirs_only,
        include_directories: cmd.include_dirs || cmd.dirs_only,
        name_filter,
        skip_hidden: !cmd.include_hidden,
        skip_system: !cmd.include_system,
        skip_reparse_points: true,
    };

    println!("正在扫描 {} ...", cmd.root.display());
    let result = deepscan::run_scan(request, CancelToken::new()).await?;

    if cmd.format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "\n扫描完成: {} 个文件 / {} 个目录, 跳过 {} 项, 耗时 {} ms\n",
        result.stats.scanned_files,
        result.stats.scanned_directories,
        result.stats.skipped_entries,
        result.duration_ms
    );

    if result.findings.is_empty() {
        println!("没有满足条件的条目");
        return Ok(());
    }

    println!("最大的 {} 项:\n", result.findings.len());
    for (index, finding) in result.findings.iter().enumerate() {
        let kind = if finding.is_directory { "目录" } else { "文件" };
        println!(
            "  [{:2}] {:>10}  {:4}  {:12}  {}",
            index + 1,
            utils::format_size(finding.size_bytes),
            kind,
            finding.category.to_string(),
            finding.path
        );
    }

    let unique = deepscan::calculate_unique_size(&result.findings);
    println!("\n去重后合计: {}", utils::format_size(unique));

    let mut totals: Vec<_> = deepscan::calculate_category_totals(&result.findings)
        .into_iter()
        .collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    println!("\n按分类合计:");
    for (category, total) in totals {
        println!("  {:12} {}", category.to_string(), utils::format_size(total));
    }

    Ok(())
}
