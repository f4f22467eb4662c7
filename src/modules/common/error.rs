use thiserror::Error;

#[derive(Error, Debug)]
pub enum TidyError {
    #[error("目录文件错误: {0}")]
    Catalog(String),

    #[error("文件系统错误: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("注册表错误: {0}")]
    Registry(String),

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("无效操作: {0}")]
    InvalidOperation(String),

    #[error("不安全的命令目标: {0}")]
    UnsafeCommand(String),

    #[error("没有可用的卸载策略: {0}")]
    NoUninstallStrategy(String),

    #[error("操作已取消")]
    Cancelled,

    #[error("超时: {0}")]
    Timeout(String),

    #[error("序列化错误: {0}")]
    Serde(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl serde::Serialize for TidyError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
