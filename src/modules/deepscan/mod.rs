//! 深度扫描引擎
//!
//! 在给定根下查找最大的文件/目录：递归计算子树大小，
//! 用容量受限的堆保留前 N 个候选，第一层子目录按处理器数（上限 8）并行分摊。

pub mod aggregate;
pub mod category;
pub mod models;
pub mod walker;

pub use aggregate::{calculate_category_totals, calculate_unique_size};
pub use models::{
    DeepScanFinding, DeepScanRequest, DeepScanResult, DeepScanStats, FindingCategory, NameFilter,
    NameMatchMode,
};

use crate::modules::common::error::TidyError;
use crate::modules::common::utils::CancelToken;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use walker::{is_non_critical_fs_error, Walker};

/// 执行一次深度扫描
pub async fn run_scan(
    request: DeepScanRequest,
    cancel: CancelToken,
) -> Result<DeepScanResult, TidyError> {
    let started = std::time::Instant::now();
    let root = request.root.clone();

    if !root.exists() {
        return Err(TidyError::NotFound(format!(
            "扫描根不存在: {}",
            root.display()
        )));
    }

    let root_metadata = fs::metadata(&root)?;
    let request = Arc::new(request);
    let mut walker = Walker::new(request.clone(), cancel.clone());

    if root_metadata.is_file() {
        // 根是单个文件：直接作为唯一候选评估
        walker.stats.scanned_files = 1;
        walker.consider_file(&root, root_metadata.len(), &root_metadata);
        return Ok(finish(root, walker, started));
    }

    // 第一层枚举：文件就地评估，子目录收集后分摊
    let mut sub_dirs: Vec<PathBuf> = Vec::new();
    let mut root_size: u64 = 0;
    walker.stats.scanned_directories += 1;

    for entry in fs::read_dir(&root)? {
        if cancel.is_cancelled() {
            return Err(TidyError::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(error) if is_non_critical_fs_error(&error) => {
                walker.stats.skipped_entries += 1;
                continue;
            }
            Err(error) => return Err(error.into()),
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(error) if is_non_critical_fs_error(&error) => {
                walker.stats.skipped_entries += 1;
                continue;
            }
            Err(error) => return Err(error.into()),
        };

        let path = entry.path();
        if metadata.is_dir() {
            if walker.skip_directory(&path, &metadata) {
                walker.stats.skipped_entries += 1;
            } else {
                sub_dirs.push(path);
            }
        } else if metadata.is_file() {
            let size = metadata.len();
            walker.stats.scanned_files += 1;
            root_size += size;
            if !walker.skip_file(&path, &metadata) {
                walker.consider_file(&path, size, &metadata);
            }
        }
    }

    let degree = parallel_degree(sub_dirs.len());

    if degree <= 1 {
        // 单个子目录或单核时顺序执行，避免过度调度
        for dir in &sub_dirs {
            let metadata = match fs::metadata(dir) {
                Ok(metadata) => metadata,
                Err(error) if is_non_critical_fs_error(&error) => {
                    walker.stats.skipped_entries += 1;
                    continue;
                }
                Err(error) => return Err(error.into()),
            };
            let subtree = walker.walk_directory(dir)?;
            root_size += subtree;
            walker.consider_directory(dir, subtree, &metadata);
        }
    } else {
        // 轮转切分子目录，每个工作单元独立持堆，最后合并
        let mut chunks: Vec<Vec<PathBuf>> = vec![Vec::new(); degree];
        for (index, dir) in sub_dirs.into_iter().enumerate() {
            chunks[index % degree].push(dir);
        }

        let mut handles = Vec::with_capacity(degree);
        for chunk in chunks {
            let request = request.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let mut worker = Walker::new(request, cancel);
                let mut chunk_size: u64 = 0;
                for dir in &chunk {
                    let metadata = match fs::metadata(dir) {
                        Ok(metadata) => metadata,
                        Err(error) if is_non_critical_fs_error(&error) => {
                            worker.stats.skipped_entries += 1;
                            continue;
                        }
                        Err(error) => return Err(TidyError::from(error)),
                    };
                    let subtree = worker.walk_directory(dir)?;
                    chunk_size += subtree;
                    worker.consider_directory(dir, subtree, &metadata);
                }
                Ok((worker.heap.into_sorted_findings(), worker.stats, chunk_size))
            }));
        }

        for handle in handles {
            let (findings, stats, chunk_size) = handle
                .await
                .map_err(|error| TidyError::Other(format!("扫描任务失败: {}", error)))??;
            walker.heap.merge(findings);
            walker.stats.merge(&stats);
            root_size += chunk_size;
        }
    }

    // 扫描根自身最后评估
    walker.consider_directory(&root, root_size, &root_metadata);

    Ok(finish(root, walker, started))
}

fn finish(root: PathBuf, walker: Walker, started: std::time::Instant) -> DeepScanResult {
    let stats = walker.stats.clone();
    DeepScanResult {
        root: root.to_string_lossy().to_string(),
        findings: walker.heap.into_sorted_findings(),
        stats,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// 并行度：处理器数与 8 取小，再受候选数限制
fn parallel_degree(candidates: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cpus.min(8).min(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_scan_dir(test_name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tidywindow-deepscan-test-{}-{}-{}",
            test_name,
            std::process::id(),
            TEST_DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    fn write_file(path: &Path, size: usize) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::write(path, vec![0u8; size]).unwrap();
    }

    fn request(root: &Path) -> DeepScanRequest {
        DeepScanRequest {
            root: root.to_path_buf(),
            max_items: 50,
            minimum_size_bytes: 0,
            include_files: true,
            include_directories: false,
            name_filter: None,
            skip_hidden: true,
            skip_system: true,
            skip_reparse_points: true,
        }
    }

    #[tokio::test]
    async fn returns_exactly_top_n_largest() {
        let root = temp_scan_dir("topn");
        for i in 1..=10u32 {
            write_file(&root.join(format!("sub/f{:02}.bin", i)), (i * 100) as usize);
        }

        let mut req = request(&root);
        req.max_items = 3;
        let result = run_scan(req, CancelToken::new()).await.unwrap();

        let sizes: Vec<u64> = result.findings.iter().map(|f| f.size_bytes).collect();
        assert_eq!(sizes, vec![1000, 900, 800]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn scenario_big_iso_and_sub_directory() {
        // 根含 big.iso (2048) 与 sub/ (合计 3072，其中含一个 1024 的文件)
        let root = temp_scan_dir("scenario");
        write_file(&root.join("big.iso"), 2048);
        write_file(&root.join("sub/inner.bin"), 1024);
        write_file(&root.join("sub/rest.bin"), 2048);

        let mut req = request(&root);
        req.max_items = 5;
        req.minimum_size_bytes = 500;
        req.include_directories = true;
        let result = run_scan(req, CancelToken::new()).await.unwrap();

        let names: Vec<&str> = result.findings.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"big.iso"));
        assert!(names.contains(&"sub"));

        // 去重合计 2048 + 3072，而不是把 sub 内的文件再算一遍
        let unique = calculate_unique_size(&result.findings);
        assert_eq!(unique, 2048 + 3072);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn directories_require_flag_and_minimum_size() {
        let root = temp_scan_dir("dirflag");
        write_file(&root.join("small/one.bin"), 100);
        write_file(&root.join("large/one.bin"), 5000);

        let mut req = request(&root);
        req.include_files = false;
        req.include_directories = true;
        req.minimum_size_bytes = 1000;
        let result = run_scan(req, CancelToken::new()).await.unwrap();

        let names: Vec<&str> = result.findings.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"large"));
        assert!(!names.contains(&"small"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn name_filter_limits_findings() {
        let root = temp_scan_dir("filter");
        write_file(&root.join("keep.iso"), 900);
        write_file(&root.join("drop.bin"), 900);

        let mut req = request(&root);
        req.name_filter = Some(NameFilter {
            pattern: ".iso".to_string(),
            mode: NameMatchMode::EndsWith,
            case_sensitive: false,
        });
        let result = run_scan(req, CancelToken::new()).await.unwrap();

        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].name, "keep.iso");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn scan_root_itself_is_a_candidate() {
        let root = temp_scan_dir("rootcand");
        write_file(&root.join("a/one.bin"), 600);
        write_file(&root.join("b/two.bin"), 600);

        let mut req = request(&root);
        req.include_files = false;
        req.include_directories = true;
        req.minimum_size_bytes = 1000;
        let result = run_scan(req, CancelToken::new()).await.unwrap();

        // 只有根自身（1200 字节）超过阈值
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].size_bytes, 1200);
        assert!(result.findings[0].is_directory);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn file_root_is_evaluated_directly() {
        let root = temp_scan_dir("fileroot");
        let file = root.join("single.bin");
        write_file(&file, 4096);

        let req = request(&file);
        let result = run_scan(req, CancelToken::new()).await.unwrap();

        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].size_bytes, 4096);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_scan() {
        let root = temp_scan_dir("cancel");
        write_file(&root.join("sub/one.bin"), 100);

        let cancel = CancelToken::new();
        cancel.cancel();
        let error = run_scan(request(&root), cancel).await.unwrap_err();
        assert!(matches!(error, TidyError::Cancelled));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn hidden_files_count_toward_size_but_are_not_findings() {
        let root = temp_scan_dir("hidden");
        write_file(&root.join("sub/.hidden.bin"), 700);
        write_file(&root.join("sub/visible.bin"), 600);

        let mut req = request(&root);
        req.include_directories = true;
        req.minimum_size_bytes = 0;
        let result = run_scan(req, CancelToken::new()).await.unwrap();

        let names: Vec<&str> = result.findings.iter().map(|f| f.name.as_str()).collect();
        assert!(!names.contains(&".hidden.bin"));
        assert!(names.contains(&"visible.bin"));

        // 被跳过的隐藏文件仍计入 sub 的子树大小
        let sub = result.findings.iter().find(|f| f.name == "sub").unwrap();
        assert_eq!(sub.size_bytes, 1300);
        let _ = std::fs::remove_dir_all(&root);
    }
}
