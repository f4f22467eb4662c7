use crate::modules::store::{ProcessPreference, QuestionnaireSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 问卷评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireOutcome {
    pub snapshot: QuestionnaireSnapshot,
    /// 最终推荐自动停止的标识集合
    pub recommended: BTreeSet<String>,
    /// 本次实际写入的偏好
    pub applied: Vec<ProcessPreference>,
    /// 本次删除的问卷来源偏好标识
    pub removed: Vec<String>,
}
