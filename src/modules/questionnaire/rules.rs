/// 单条问卷规则：(问题, 答案) → 分类键与显式标识
pub struct QuestionRule {
    pub question_id: &'static str,
    /// 命中该规则的答案（规范化后 yes/no）
    pub answer: &'static str,
    /// 展开到目录分类（仅 AutoStop 且非通配条目生效）
    pub category_keys: &'static [&'static str],
    /// 直接点名的进程标识（必须存在于目录）
    pub identifiers: &'static [&'static str],
}

/// 静态规则表：进程启动时构建一次，运行期不修改
///
/// 分类键对应内置 data/listofknown.txt 的分区
pub const RULES: &[QuestionRule] = &[
    QuestionRule {
        question_id: "usage.gaming",
        answer: "no",
        category_keys: &["A"],
        identifiers: &["gamebarpresencewriter"],
    },
    QuestionRule {
        question_id: "usage.printing",
        answer: "no",
        category_keys: &["B"],
        identifiers: &[],
    },
    QuestionRule {
        question_id: "usage.remote_desktop",
        answer: "no",
        category_keys: &["C"],
        identifiers: &[],
    },
    QuestionRule {
        question_id: "usage.biometrics",
        answer: "no",
        category_keys: &["D"],
        identifiers: &[],
    },
    QuestionRule {
        question_id: "usage.touch_pen",
        answer: "no",
        category_keys: &["E"],
        identifiers: &[],
    },
    QuestionRule {
        question_id: "usage.xbox_features",
        answer: "no",
        category_keys: &["F"],
        identifiers: &["xblauthmanager"],
    },
    QuestionRule {
        question_id: "usage.phone_link",
        answer: "no",
        category_keys: &["G"],
        identifiers: &[],
    },
    QuestionRule {
        question_id: "usage.offline_maps",
        answer: "no",
        category_keys: &["H"],
        identifiers: &["mapsbroker"],
    },
];

/// 全部必答问题 id（去重且保持出现顺序）
pub fn required_question_ids() -> Vec<&'static str> {
    let mut ids: Vec<&'static str> = Vec::new();
    for rule in RULES {
        if !ids.contains(&rule.question_id) {
            ids.push(rule.question_id);
        }
    }
    ids
}
