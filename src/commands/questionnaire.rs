//! questionnaire 命令 - 提交使用习惯问卷

use crate::modules::{catalog, questionnaire, store::StateStore};
use anyhow::Result;
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct QuestionnaireCommand {
    /// 单条答案，形如 usage.gaming=no (可多次指定)
    #[arg(long = "answer", value_name = "KEY=VALUE")]
    pub answers: Vec<String>,

    /// 从 JSON 文件读取答案映射
    #[arg(long)]
    pub answers_file: Option<PathBuf>,

    /// 列出必答问题后退出
    #[arg(long)]
    pub list_questions: bool,
}

pub async fn execute(cmd: QuestionnaireCommand) -> Result<()> {
    if cmd.list_questions {
        println!("必答问题 (回答 yes/no):");
        for id in questionnaire::rules::required_question_ids() {
            println!("  {}", id);
        }
        return Ok(());
    }

    let mut answers: BTreeMap<String, String> = BTreeMap::new();

    if let Some(path) = &cmd.answers_file {
        let content = std::fs::read_to_string(path)?;
        let from_file: BTreeMap<String, String> = serde_json::from_str(&content)?;
        answers.extend(from_file);
    }

    for raw in &cmd.answers {
        let Some((key, value)) = raw.split_once('=') else {
            anyhow::bail!("答案格式应为 KEY=VALUE: {}", raw);
        };
        answers.insert(key.to_string(), value.to_string());
    }

    if answers.is_empty() {
        anyhow::bail!("未提供任何答案 (使用 --answer 或 --answers-file)");
    }

    let snapshot = catalog::load_snapshot()?;
    let store = StateStore::open();
    let outcome = questionnaire::evaluate_and_apply(&answers, &snapshot, &store)?;

    println!("=== 问卷评估结果 ===\n");
    println!("推荐自动停止 {} 项:", outcome.recommended.len());
    for identifier in &outcome.recommended {
        println!("  {}", identifier);
    }

    if !outcome.applied.is_empty() {
        println!("\n新写入偏好 {} 项:", outcome.applied.len());
        for preference in &outcome.applied {
            println!("  {} -> {}", preference.identifier, preference.action);
        }
    }

    if !outcome.removed.is_empty() {
        println!("\n不再推荐、已删除 {} 项:", outcome.removed.len());
        for identifier in &outcome.removed {
            println!("  {}", identifier);
        }
    }

    Ok(())
}
