//! detect 命令 - 对进程快照执行可疑进程检测

use crate::modules::common::utils::CancelToken;
use crate::modules::detection::{
    DetectionOptions, DetectionRequest, DetectionService, RunningProcessSnapshot, StartupEntry,
};
use crate::modules::store::StateStore;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
pub struct DetectCommand {
    /// 运行进程快照 JSON 文件 (外部枚举协作方输出)
    #[arg(long)]
    pub input: PathBuf,

    /// 启动项 JSON 文件 (可选)
    #[arg(long)]
    pub startup: Option<PathBuf>,

    /// 关闭行为检测层
    #[arg(long)]
    pub no_behavior: bool,

    /// 关闭用户位置检测层
    #[arg(long)]
    pub no_user_location: bool,

    /// 启用威胁情报层 (需要配置提供方)
    #[arg(long)]
    pub intel: bool,

    /// 单次扫描的哈希查询预算
    #[arg(long, default_value = "25")]
    pub max_hash_lookups: u32,

    /// 命中 id 种子
    #[arg(long, default_value = "", env = "TIDYWINDOW_DETECTION_SEED")]
    pub seed: String,

    /// 输出格式 (table/json)
    #[arg(long, default_value = "table")]
    pub format: String,
}

pub async fn execute(cmd: DetectCommand) -> Result<()> {
    let content = std::fs::read_to_string(&cmd.input)?;
    let processes: Vec<RunningProcessSnapshot> = serde_json::from_str(&content)?;

    let startup_entries: Vec<StartupEntry> = match &cmd.startup {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        }
        None => Vec::new(),
    };

    let request = DetectionRequest {
        processes,
        startup_entries,
    };

    let options = DetectionOptions {
        enable_behavior_layer: !cmd.no_behavior,
        enable_user_location_layer: !cmd.no_user_location,
        enable_intel_layer: cmd.intel,
        max_hash_lookups: cmd.max_hash_lookups,
        seed: cmd.seed.clone(),
    };

    let store = Arc::new(StateStore::open());
    let service = DetectionService::new(options, store);
    let report = service.run_scan(&request, &CancelToken::new()).await?;

    if cmd.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== 检测结果 ===\n");
    println!("评估进程: {} 个", request.processes.len());
    println!("受信任跳过: {}", report.trusted_count);
    println!("白名单跳过: {}", report.whitelisted_count);
    println!("哈希查询: {}", report.hash_lookups);
    println!("情报命中: {}\n", report.intel_matches);

    if report.hits.is_empty() {
        println!("未发现可疑进程");
        return Ok(());
    }

    println!("命中 {} 项 (已写入状态存储):\n", report.hits.len());
    for hit in &report.hits {
        println!("  [{}] {}", hit.level, hit.process_name);
        println!("      路径: {}", hit.file_path);
        println!("      规则: {}", hit.matched_rules.join(", "));
        if let Some(sha256) = &hit.sha256 {
            println!("      SHA-256: {}", sha256);
        }
        println!();
    }

    Ok(())
}
