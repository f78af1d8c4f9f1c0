use thiserror::Error;

/// 描述键值存储（内存 / Redis）相关的错误。
///
/// `NotFound` 是预期内的可恢复状态（缓存未命中），调用方必须和其他错误区分处理。
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("键不存在: {0}")]
    NotFound(String),

    #[error("存储连接失败: {0}")]
    Connection(String),

    #[error("存储操作超时: {0}")]
    Timeout(String),

    #[error("连接池已关闭")]
    PoolClosed,

    #[error("Redis 客户端错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// 便捷构造函数，统一字符串转换。
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// 连接类错误：启动时遇到这类错误会降级到内存存储
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) | Self::PoolClosed => true,
            Self::Redis(err) => err.is_connection_refusal() || err.is_io_error() || err.is_timeout(),
            Self::NotFound(_) | Self::Serialization(_) => false,
        }
    }
}

/// 存储层结果类型
pub type StorageResult<T> = std::result::Result<T, StorageError>;
