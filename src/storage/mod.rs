//! # 存储模块
//!
//! 最小化的键值存储抽象（get / set / delete，无事务、无前缀扫描），
//! 以及在其上按记录类型封装的 `RecordStore`。

use async_trait::async_trait;

use crate::error::StorageResult;

pub mod keys;
pub mod memory;
pub mod pool;
pub mod record_store;
pub mod redis;

pub use keys::StorageKey;
pub use memory::MemoryStore;
pub use record_store::RecordStore;
pub use redis::RedisStore;

/// 原始字节键值存储
///
/// `get` 在键不存在时必须返回 [`crate::error::StorageError::NotFound`]，
/// 连接或协议错误使用其它变体，调用方据此区分缓存未命中和故障。
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// 后端名称，用于日志
    fn backend_name(&self) -> &'static str;
}
