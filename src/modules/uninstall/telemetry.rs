use super::models::UninstallTelemetryRecord;
use std::path::PathBuf;

/// 卸载遥测汇（可注入；默认空实现）
pub trait UninstallTelemetrySink: Send + Sync {
    fn publish(&self, record: &UninstallTelemetryRecord);
}

/// 空遥测汇
pub struct NoopTelemetrySink;

impl UninstallTelemetrySink for NoopTelemetrySink {
    fn publish(&self, _record: &UninstallTelemetryRecord) {}
}

/// 按行追加 JSON 的文件遥测汇
pub struct JsonLinesTelemetrySink {
    path: PathBuf,
}

impl JsonLinesTelemetrySink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl UninstallTelemetrySink for JsonLinesTelemetrySink {
    fn publish(&self, record: &UninstallTelemetryRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!("序列化遥测记录失败: {}", error);
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        use std::io::Write;
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));

        if let Err(error) = result {
            tracing::warn!("写入遥测文件失败: {}", error);
        }
    }
}
