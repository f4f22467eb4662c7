//! 问卷引擎
//!
//! 把固定的使用习惯问答映射为自动停止偏好，并与状态存储对账。
//! 对账是幂等的：相同答案重复提交不会改变最终偏好集合。

pub mod models;
pub mod rules;

pub use models::QuestionnaireOutcome;

use crate::modules::catalog::{CatalogSnapshot, RecommendedAction};
use crate::modules::common::error::TidyError;
use crate::modules::store::{
    PreferenceSource, ProcessPreference, QuestionnaireSnapshot, StateStore,
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

/// 评估答案并应用到状态存储
pub fn evaluate_and_apply(
    answers: &BTreeMap<String, String>,
    catalog: &CatalogSnapshot,
    store: &StateStore,
) -> Result<QuestionnaireOutcome, TidyError> {
    let normalized = normalize_answers(answers)?;
    validate_required(&normalized)?;

    let recommended = resolve_recommended(&normalized, catalog);

    let mut applied: Vec<ProcessPreference> = Vec::new();
    let mut removed: Vec<String> = Vec::new();

    // 不再推荐的问卷来源偏好删除；用户覆盖永不触碰
    for existing in store.list_preferences() {
        if existing.source == PreferenceSource::Questionnaire
            && !recommended.contains(&existing.identifier)
        {
            store.remove_preference(&existing.identifier)?;
            removed.push(existing.identifier);
        }
    }

    // 新推荐的标识写入问卷来源偏好
    for identifier in &recommended {
        match store.get_preference(identifier) {
            Some(existing) if existing.source == PreferenceSource::UserOverride => {
                // 用户手动设置的偏好保持原样
                continue;
            }
            Some(existing)
                if existing.source == PreferenceSource::Questionnaire
                    && existing.action == RecommendedAction::AutoStop =>
            {
                // 已有等价偏好，保持幂等
                continue;
            }
            _ => {}
        }

        let service_identifier = catalog
            .find_entry(identifier)
            .and_then(|entry| entry.service_identifier.clone());

        let preference = ProcessPreference {
            identifier: identifier.clone(),
            action: RecommendedAction::AutoStop,
            source: PreferenceSource::Questionnaire,
            updated_at_utc: Utc::now(),
            notes: None,
            service_identifier,
        };
        store.upsert_preference(preference.clone())?;
        applied.push(preference);
    }

    let snapshot = QuestionnaireSnapshot {
        completed_at_utc: Utc::now(),
        answers: normalized,
        auto_stop_identifiers: recommended.iter().cloned().collect(),
    };
    store.save_questionnaire_snapshot(snapshot.clone())?;

    tracing::info!(
        "问卷已应用: 推荐 {} 项, 新增 {} 项, 删除 {} 项",
        recommended.len(),
        applied.len(),
        removed.len()
    );

    Ok(QuestionnaireOutcome {
        snapshot,
        recommended,
        applied,
        removed,
    })
}

/// 规范化答案键值；无法识别的取值直接报错
fn normalize_answers(
    answers: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, TidyError> {
    let mut normalized = BTreeMap::new();

    for (key, value) in answers {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }

        let value = match value.trim().to_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => "yes",
            "no" | "n" | "false" | "0" => "no",
            other => {
                return Err(TidyError::InvalidOperation(format!(
                    "问题 {} 的答案无法识别: {}",
                    key, other
                )));
            }
        };

        normalized.insert(key, value.to_string());
    }

    Ok(normalized)
}

/// 校验所有必答问题均已回答
fn validate_required(normalized: &BTreeMap<String, String>) -> Result<(), TidyError> {
    let missing: Vec<&str> = rules::required_question_ids()
        .into_iter()
        .filter(|id| !normalized.contains_key(*id))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(TidyError::InvalidOperation(format!(
            "缺少必答问题: {}",
            missing.join(", ")
        )))
    }
}

/// 规则表展开：分类键 → AutoStop 非通配条目；显式标识必须存在于目录
fn resolve_recommended(
    normalized: &BTreeMap<String, String>,
    catalog: &CatalogSnapshot,
) -> BTreeSet<String> {
    let mut recommended = BTreeSet::new();
    let by_category = catalog.entries_by_category();

    for rule in rules::RULES {
        let Some(answer) = normalized.get(rule.question_id) else {
            continue;
        };
        if answer != rule.answer {
            continue;
        }

        for key in rule.category_keys {
            if let Some(entries) = by_category.get(key) {
                for entry in entries {
                    if entry.recommended_action == RecommendedAction::AutoStop
                        && !entry.is_pattern
                    {
                        recommended.insert(entry.identifier.clone());
                    }
                }
            }
        }

        for identifier in rule.identifiers {
            if let Some(entry) = catalog.find_entry(identifier) {
                if !entry.is_pattern {
                    recommended.insert(entry.identifier.clone());
                }
            }
        }
    }

    recommended
}
