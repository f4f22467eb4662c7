use super::category;
use super::models::{DeepScanFinding, DeepScanRequest, DeepScanStats};
use crate::modules::common::error::TidyError;
use crate::modules::common::utils::{normalize_path_key, CancelToken};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// 判断文件系统错误是否属于可吞掉的非关键集合
///
/// 集合是封闭的：拒绝访问、路径不存在、路径过长、共享冲突、中断。
/// 其余错误向上传播并使扫描失败。
pub fn is_non_critical_fs_error(error: &std::io::Error) -> bool {
    match error.kind() {
        std::io::ErrorKind::NotFound
        | std::io::ErrorKind::PermissionDenied
        | std::io::ErrorKind::Interrupted => true,
        _ => matches!(error.raw_os_error(), Some(3) | Some(5) | Some(32) | Some(206)),
    }
}

/// 堆内元素：按大小排序，序号只用来打破平手
struct HeapItem {
    size: u64,
    seq: u64,
    finding: DeepScanFinding,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.seq == other.seq
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.size
            .cmp(&other.size)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// 容量受限的最小堆：始终保留当前最大的 k 个候选
pub struct BoundedTopHeap {
    capacity: usize,
    heap: BinaryHeap<Reverse<HeapItem>>,
    seq: u64,
}

impl BoundedTopHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1)),
            seq: 0,
        }
    }

    /// 插入前先与当前最小值比较，整体代价 O(n log k)
    pub fn offer(&mut self, finding: DeepScanFinding) {
        if self.capacity == 0 {
            return;
        }

        let size = finding.size_bytes;
        if self.heap.len() >= self.capacity {
            if let Some(Reverse(smallest)) = self.heap.peek() {
                if size <= smallest.size {
                    return;
                }
            }
            self.heap.pop();
        }

        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(HeapItem { size, seq, finding }));
    }

    /// 合并另一个堆的候选
    pub fn merge(&mut self, findings: Vec<DeepScanFinding>) {
        for finding in findings {
            self.offer(finding);
        }
    }

    /// 导出为按大小降序排列的结果
    pub fn into_sorted_findings(self) -> Vec<DeepScanFinding> {
        let mut items: Vec<HeapItem> = self.heap.into_iter().map(|r| r.0).collect();
        items.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.seq.cmp(&b.seq)));
        items.into_iter().map(|item| item.finding).collect()
    }
}

/// 递归扫描器：每个并行工作单元持有自己的堆与计数器
pub struct Walker {
    request: Arc<DeepScanRequest>,
    cancel: CancelToken,
    pub heap: BoundedTopHeap,
    pub stats: DeepScanStats,
}

impl Walker {
    pub fn new(request: Arc<DeepScanRequest>, cancel: CancelToken) -> Self {
        let capacity = request.max_items;
        Self {
            request,
            cancel,
            heap: BoundedTopHeap::new(capacity),
            stats: DeepScanStats::default(),
        }
    }

    /// 递归计算子树大小并收集候选；返回子树总字节数
    pub fn walk_directory(&mut self, dir: &Path) -> Result<u64, TidyError> {
        if self.cancel.is_cancelled() {
            return Err(TidyError::Cancelled);
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) if is_non_critical_fs_error(&error) => {
                self.stats.skipped_entries += 1;
                return Ok(0);
            }
            Err(error) => return Err(error.into()),
        };
        self.stats.scanned_directories += 1;

        let mut total: u64 = 0;

        for entry in entries {
            if self.cancel.is_cancelled() {
                return Err(TidyError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(error) if is_non_critical_fs_error(&error) => {
                    self.stats.skipped_entries += 1;
                    continue;
                }
                Err(error) => return Err(error.into()),
            };

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(error) if is_non_critical_fs_error(&error) => {
                    self.stats.skipped_entries += 1;
                    continue;
                }
                Err(error) => return Err(error.into()),
            };

            let path = entry.path();

            if metadata.is_dir() {
                // 重解析点与策略排除的目录整体跳过，不计大小
                if self.skip_directory(&path, &metadata) {
                    self.stats.skipped_entries += 1;
                    continue;
                }

                let subtree = self.walk_directory(&path)?;
                total += subtree;
                self.consider_directory(&path, subtree, &metadata);
            } else if metadata.is_file() {
                let size = metadata.len();
                self.stats.scanned_files += 1;
                // 被策略跳过的文件不做候选，但仍计入父目录大小
                total += size;

                if !self.skip_file(&path, &metadata) {
                    self.consider_file(&path, size, &metadata);
                }
            }
        }

        Ok(total)
    }

    /// 把目录作为候选评估（大小为子树合计）
    pub fn consider_directory(&mut self, path: &Path, subtree_size: u64, metadata: &fs::Metadata) {
        if !self.request.include_directories {
            return;
        }
        if subtree_size < self.request.minimum_size_bytes {
            return;
        }
        if !self.name_matches(path) {
            return;
        }

        self.heap
            .offer(make_finding(path, subtree_size, true, metadata));
    }

    pub(crate) fn consider_file(&mut self, path: &Path, size: u64, metadata: &fs::Metadata) {
        if !self.request.include_files {
            return;
        }
        if size < self.request.minimum_size_bytes {
            return;
        }
        if !self.name_matches(path) {
            return;
        }

        self.heap.offer(make_finding(path, size, false, metadata));
    }

    fn name_matches(&self, path: &Path) -> bool {
        let Some(filter) = &self.request.name_filter else {
            return true;
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        filter.matches(&name)
    }

    pub(crate) fn skip_directory(&self, path: &Path, metadata: &fs::Metadata) -> bool {
        let attrs = entry_attributes(path, metadata);
        (self.request.skip_reparse_points && attrs.reparse_point)
            || (self.request.skip_hidden && attrs.hidden)
            || (self.request.skip_system && attrs.system)
    }

    pub(crate) fn skip_file(&self, path: &Path, metadata: &fs::Metadata) -> bool {
        let attrs = entry_attributes(path, metadata);
        (self.request.skip_hidden && attrs.hidden) || (self.request.skip_system && attrs.system)
    }
}

struct EntryAttributes {
    hidden: bool,
    system: bool,
    reparse_point: bool,
}

#[cfg(windows)]
fn entry_attributes(_path: &Path, metadata: &fs::Metadata) -> EntryAttributes {
    use std::os::windows::fs::MetadataExt;
    use windows::Win32::Storage::FileSystem::{
        FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_REPARSE_POINT, FILE_ATTRIBUTE_SYSTEM,
    };

    let attrs = metadata.file_attributes();
    EntryAttributes {
        hidden: attrs & FILE_ATTRIBUTE_HIDDEN.0 != 0,
        system: attrs & FILE_ATTRIBUTE_SYSTEM.0 != 0,
        reparse_point: attrs & FILE_ATTRIBUTE_REPARSE_POINT.0 != 0,
    }
}

#[cfg(not(windows))]
fn entry_attributes(path: &Path, metadata: &fs::Metadata) -> EntryAttributes {
    let hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    EntryAttributes {
        hidden,
        system: false,
        reparse_point: metadata.file_type().is_symlink(),
    }
}

/// 构造扫描结果条目
pub fn make_finding(
    path: &Path,
    size: u64,
    is_directory: bool,
    metadata: &fs::Metadata,
) -> DeepScanFinding {
    let path_string = path.to_string_lossy().to_string();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_string.clone());
    let parent = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = if is_directory {
        String::new()
    } else {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    };
    let last_modified = metadata
        .modified()
        .ok()
        .map(|time| DateTime::<Utc>::from(time));

    let path_key = normalize_path_key(&path_string).unwrap_or_else(|| path_string.to_lowercase());
    let category = category::classify(&path_key, &extension, is_directory);

    DeepScanFinding {
        path: path_string,
        name,
        parent,
        size_bytes: size,
        last_modified,
        extension,
        is_directory,
        category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::deepscan::models::FindingCategory;

    fn finding(name: &str, size: u64) -> DeepScanFinding {
        DeepScanFinding {
            path: format!(r"c:\data\{}", name),
            name: name.to_string(),
            parent: r"c:\data".to_string(),
            size_bytes: size,
            last_modified: None,
            extension: String::new(),
            is_directory: false,
            category: FindingCategory::Other,
        }
    }

    #[test]
    fn bounded_heap_keeps_largest_k() {
        let mut heap = BoundedTopHeap::new(3);
        for (name, size) in [("a", 10), ("b", 50), ("c", 5), ("d", 40), ("e", 30)] {
            heap.offer(finding(name, size));
        }

        let result = heap.into_sorted_findings();
        let sizes: Vec<u64> = result.iter().map(|f| f.size_bytes).collect();
        assert_eq!(sizes, vec![50, 40, 30]);
    }

    #[test]
    fn bounded_heap_ignores_smaller_than_current_minimum() {
        let mut heap = BoundedTopHeap::new(2);
        heap.offer(finding("a", 100));
        heap.offer(finding("b", 90));
        heap.offer(finding("c", 10));

        let result = heap.into_sorted_findings();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|f| f.size_bytes >= 90));
    }

    #[test]
    fn zero_capacity_heap_stays_empty() {
        let mut heap = BoundedTopHeap::new(0);
        heap.offer(finding("a", 100));
        assert!(heap.into_sorted_findings().is_empty());
    }

    #[test]
    fn non_critical_error_set_is_closed() {
        use std::io::{Error, ErrorKind};

        assert!(is_non_critical_fs_error(&Error::from(ErrorKind::NotFound)));
        assert!(is_non_critical_fs_error(&Error::from(
            ErrorKind::PermissionDenied
        )));
        assert!(is_non_critical_fs_error(&Error::from_raw_os_error(206)));
        assert!(!is_non_critical_fs_error(&Error::from(
            ErrorKind::OutOfMemory
        )));
    }
}
