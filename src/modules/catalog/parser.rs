use super::models::{
    CatalogCategory, CatalogSnapshot, ProcessCatalogEntry, RecommendedAction, RiskLevel,
};
use crate::modules::common::error::TidyError;
use crate::modules::common::utils;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// 目录文件路径环境变量
pub const CATALOG_PATH_ENV: &str = "TIDYWINDOW_CATALOG_PATH";

/// 目录文件名
pub const CATALOG_FILE_NAME: &str = "listofknown.txt";

/// 谨慎区标记行（标记之后的条目默认保留）
const CAUTION_MARKER: &str = "--- caution ---";

/// 解析目录文件并返回快照
pub fn load_snapshot() -> Result<CatalogSnapshot, TidyError> {
    let path = resolve_catalog_path()?;
    load_snapshot_from(&path)
}

/// 从指定路径解析目录文件
pub fn load_snapshot_from(path: &Path) -> Result<CatalogSnapshot, TidyError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_catalog(&content, &path.to_string_lossy()))
}

/// 解析目录路径：环境变量 → 应用相对候选 → 目录遍历搜索
pub fn resolve_catalog_path() -> Result<PathBuf, TidyError> {
    if let Ok(value) = std::env::var(CATALOG_PATH_ENV) {
        let path = PathBuf::from(&value);
        if path.is_file() {
            return Ok(path);
        }
        tracing::warn!("环境变量 {} 指向的文件不存在: {}", CATALOG_PATH_ENV, value);
    }

    for candidate in candidate_paths() {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    // 最后尝试从可执行文件目录和工作目录向下搜索
    for base in search_bases() {
        for entry in walkdir::WalkDir::new(&base)
            .max_depth(3)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .eq_ignore_ascii_case(CATALOG_FILE_NAME)
            {
                return Ok(entry.path().to_path_buf());
            }
        }
    }

    Err(TidyError::NotFound(format!(
        "未找到目录文件 {}（可通过 {} 指定）",
        CATALOG_FILE_NAME, CATALOG_PATH_ENV
    )))
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    for base in search_bases() {
        candidates.push(base.join(CATALOG_FILE_NAME));
        candidates.push(base.join("data").join(CATALOG_FILE_NAME));
    }

    candidates
}

fn search_bases() -> Vec<PathBuf> {
    let mut bases = Vec::new();

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            bases.push(dir.to_path_buf());
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        if !bases.contains(&cwd) {
            bases.push(cwd);
        }
    }

    bases
}

/// 行级解析：分类头、谨慎标记、`/` 分隔的条目列表
fn parse_catalog(content: &str, source_path: &str) -> CatalogSnapshot {
    // 形如 `A. 名称 (说明)` 的分类头
    let Ok(header_re) = Regex::new(r"^([A-Za-z][A-Za-z0-9]{0,3})\.\s+([^(]+?)\s*(?:\((.+)\))?\s*$")
    else {
        return CatalogSnapshot {
            source_path: source_path.to_string(),
            categories: Vec::new(),
            entries: Vec::new(),
        };
    };

    let mut categories: Vec<CatalogCategory> = Vec::new();
    let mut entries: Vec<ProcessCatalogEntry> = Vec::new();
    let mut seen_identifiers: HashSet<String> = HashSet::new();

    let mut current_category: Option<usize> = None;
    let mut caution_section = false;
    let mut entry_order = 0usize;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if trimmed.eq_ignore_ascii_case(CAUTION_MARKER) {
            caution_section = true;
            continue;
        }

        if let Some(caps) = header_re.captures(trimmed) {
            let key = caps[1].to_uppercase();
            let name = caps[2].trim().to_string();
            let description = caps.get(3).map(|m| m.as_str().trim().to_string());

            // 新分类头结束谨慎区
            caution_section = false;
            categories.push(CatalogCategory {
                key,
                name,
                description,
                order: categories.len(),
            });
            current_category = Some(categories.len() - 1);
            continue;
        }

        let Some(category_index) = current_category else {
            tracing::debug!("忽略分类外的目录行: {}", trimmed);
            continue;
        };

        let (identifiers_part, rationale) = strip_annotation(trimmed);
        let category_key = categories[category_index].key.clone();

        for token in identifiers_part.split('/') {
            let display_name = token.trim();
            if display_name.is_empty() {
                continue;
            }

            let identifier = utils::normalize_process_identifier(display_name);
            if identifier.is_empty() || !seen_identifiers.insert(identifier.clone()) {
                // 重复标识：首次出现生效
                continue;
            }

            let is_pattern = display_name.contains('*')
                || display_name.contains('?')
                || display_name.contains('_');

            let (risk_level, recommended_action) = if caution_section {
                (RiskLevel::Caution, RecommendedAction::Keep)
            } else {
                (RiskLevel::Safe, RecommendedAction::AutoStop)
            };

            entries.push(ProcessCatalogEntry {
                identifier,
                display_name: display_name.to_string(),
                category_key: category_key.clone(),
                risk_level,
                recommended_action,
                rationale: rationale.clone(),
                is_pattern,
                service_identifier: if is_pattern {
                    None
                } else {
                    Some(display_name.to_string())
                },
                order: entry_order,
            });
            entry_order += 1;
        }
    }

    CatalogSnapshot {
        source_path: source_path.to_string(),
        categories,
        entries,
    }
}

/// 提取并剥离行尾注释（`#...`、`— ...` 或末尾括号段）
fn strip_annotation(line: &str) -> (String, Option<String>) {
    let mut body = line;
    let mut annotation: Option<String> = None;

    if let Some(pos) = body.find('#') {
        annotation = Some(body[pos + 1..].trim().to_string());
        body = &body[..pos];
    } else if let Some(pos) = body.find('—') {
        annotation = Some(body[pos + '—'.len_utf8()..].trim().to_string());
        body = &body[..pos];
    } else if body.trim_end().ends_with(')') {
        if let Some(pos) = body.rfind('(') {
            let inner = body.trim_end();
            annotation = Some(inner[pos + 1..inner.len() - 1].trim().to_string());
            body = &body[..pos];
        }
    }

    let annotation = annotation.filter(|a| !a.is_empty());
    (body.trim().to_string(), annotation)
}
