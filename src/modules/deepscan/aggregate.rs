use super::models::{DeepScanFinding, FindingCategory};
use crate::modules::common::utils::normalize_path_key;
use std::collections::HashMap;

/// 去重后的总大小：已接受目录的后代不再计入
///
/// 按大小降序遍历（同尺寸目录优先），保证父目录先于其内容被接受。
pub fn calculate_unique_size(findings: &[DeepScanFinding]) -> u64 {
    deduplicated(findings).iter().map(|f| f.size_bytes).sum()
}

/// 去重后的分类合计
pub fn calculate_category_totals(
    findings: &[DeepScanFinding],
) -> HashMap<FindingCategory, u64> {
    let mut totals: HashMap<FindingCategory, u64> = HashMap::new();
    for finding in deduplicated(findings) {
        *totals.entry(finding.category).or_insert(0) += finding.size_bytes;
    }
    totals
}

/// 过滤掉已接受目录的后代条目
fn deduplicated(findings: &[DeepScanFinding]) -> Vec<&DeepScanFinding> {
    let mut ordered: Vec<&DeepScanFinding> = findings.iter().collect();
    ordered.sort_by(|a, b| {
        b.size_bytes
            .cmp(&a.size_bytes)
            .then_with(|| b.is_directory.cmp(&a.is_directory))
            .then_with(|| a.path.len().cmp(&b.path.len()))
    });

    let mut accepted: Vec<&DeepScanFinding> = Vec::new();
    let mut accepted_dirs: Vec<String> = Vec::new();

    for finding in ordered {
        let Some(key) = normalize_path_key(&finding.path) else {
            continue;
        };

        if accepted_dirs.iter().any(|dir| key.starts_with(dir.as_str())) {
            continue;
        }

        if finding.is_directory {
            let mut dir_key = key.clone();
            if !dir_key.ends_with('\\') {
                dir_key.push('\\');
            }
            accepted_dirs.push(dir_key);
        }
        accepted.push(finding);
    }

    accepted
}
