use super::models::FindingCategory;

/// 路径前缀规则，先于扩展名规则求值
const PATH_RULES: &[(&str, FindingCategory)] = &[
    (r"\windows\", FindingCategory::System),
    (r"\program files\", FindingCategory::Applications),
    (r"\program files (x86)\", FindingCategory::Applications),
    (r"\steamapps\", FindingCategory::Games),
    (r"\epic games\", FindingCategory::Games),
    (r"\riot games\", FindingCategory::Games),
    (r"\games\", FindingCategory::Games),
    (r"\onedrive\", FindingCategory::CloudSync),
    (r"\dropbox\", FindingCategory::CloudSync),
    (r"\google drive\", FindingCategory::CloudSync),
    (r"\appdata\", FindingCategory::AppData),
    (r"\downloads\", FindingCategory::Downloads),
    (r"\documents\", FindingCategory::Documents),
    (r"\desktop\", FindingCategory::Desktop),
    (r"\pictures\", FindingCategory::Pictures),
    (r"\videos\", FindingCategory::Videos),
    (r"\music\", FindingCategory::Music),
    (r"\cache\", FindingCategory::Cache),
    (r"\temp\", FindingCategory::Cache),
];

const ARCHIVE_EXTS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "zst", "iso"];
const DATABASE_EXTS: &[&str] = &["db", "sqlite", "sqlite3", "mdb", "accdb", "sql"];
const LOG_EXTS: &[&str] = &["log", "etl", "dmp"];
const VIDEO_EXTS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "webm", "m4v"];
const MUSIC_EXTS: &[&str] = &["mp3", "flac", "wav", "aac", "ogg", "m4a", "wma"];
const PICTURE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "heic", "raw"];

/// 按路径/扩展名启发式分类，首个命中的规则生效
pub fn classify(path_key: &str, extension: &str, is_directory: bool) -> FindingCategory {
    // 带终止分隔符再匹配，目录自身也能命中自己的前缀规则
    let haystack = if is_directory && !path_key.ends_with('\\') {
        format!("{}\\", path_key)
    } else {
        path_key.to_string()
    };

    for (needle, category) in PATH_RULES {
        if haystack.contains(needle) {
            return *category;
        }
    }

    if is_directory {
        return FindingCategory::Other;
    }

    let ext = extension.to_lowercase();
    let ext = ext.as_str();
    if ARCHIVE_EXTS.contains(&ext) {
        return FindingCategory::Archives;
    }
    if DATABASE_EXTS.contains(&ext) {
        return FindingCategory::Databases;
    }
    if LOG_EXTS.contains(&ext) {
        return FindingCategory::Logs;
    }
    if VIDEO_EXTS.contains(&ext) {
        return FindingCategory::Videos;
    }
    if MUSIC_EXTS.contains(&ext) {
        return FindingCategory::Music;
    }
    if PICTURE_EXTS.contains(&ext) {
        return FindingCategory::Pictures;
    }

    FindingCategory::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_rules_win_over_extension_rules() {
        // Downloads 下的 zip 归类为 Downloads 而不是 Archives
        assert_eq!(
            classify(r"c:\users\test\downloads\big.zip", "zip", false),
            FindingCategory::Downloads
        );
        assert_eq!(
            classify(r"c:\data\big.zip", "zip", false),
            FindingCategory::Archives
        );
    }

    #[test]
    fn first_matching_path_rule_wins() {
        // Windows 前缀先于 Temp 规则
        assert_eq!(
            classify(r"c:\windows\temp\dump.tmp", "tmp", false),
            FindingCategory::System
        );
    }

    #[test]
    fn directory_matches_own_prefix() {
        assert_eq!(
            classify(r"c:\users\test\downloads", "", true),
            FindingCategory::Downloads
        );
        assert_eq!(
            classify(r"c:\steamapps", "", true),
            FindingCategory::Games
        );
    }

    #[test]
    fn extension_fallbacks() {
        assert_eq!(classify(r"c:\x\a.mkv", "mkv", false), FindingCategory::Videos);
        assert_eq!(classify(r"c:\x\a.sqlite", "sqlite", false), FindingCategory::Databases);
        assert_eq!(classify(r"c:\x\a.log", "log", false), FindingCategory::Logs);
        assert_eq!(classify(r"c:\x\a.bin", "bin", false), FindingCategory::Other);
    }
}
