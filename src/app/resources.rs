use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, StorageBackend};
use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::storage::{KeyValueStore, MemoryStore, RecordStore, RedisStore};
use crate::{linfo, lwarn};

/// 远端 provider 调用的固定超时
pub const PROVIDER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 应用基础资源：配置、存储、共享 HTTP 客户端
pub struct AppResources {
    config: Arc<AppConfig>,
    store: RecordStore,
    http: reqwest::Client,
}

impl AppResources {
    /// 根据配置构建资源层
    pub async fn build(config: Arc<AppConfig>) -> Result<Arc<Self>> {
        let kv = select_store(&config).await;
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_REQUEST_TIMEOUT)
            .user_agent(concat!("gitter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GitterError::config_with_source("创建 HTTP 客户端失败", e))?;

        Ok(Arc::new(Self {
            config,
            store: RecordStore::new(kv),
            http,
        }))
    }

    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn store(&self) -> RecordStore {
        self.store.clone()
    }

    #[must_use]
    pub fn http(&self) -> reqwest::Client {
        self.http.clone()
    }
}

/// 选择存储后端
///
/// 配置了 Redis 但启动时连不上，降级为内存存储并告警，不中断启动。
pub async fn select_store(config: &AppConfig) -> Arc<dyn KeyValueStore> {
    let redis = match (config.storage.backend, &config.storage.redis) {
        (StorageBackend::Redis, Some(redis)) => redis,
        _ => {
            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Storage,
                "memory_store",
                "使用内存存储，进程退出后数据丢失"
            );
            return Arc::new(MemoryStore::new());
        }
    };

    let store = RedisStore::new(redis);
    match store.probe().await {
        Ok(()) => {
            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Storage,
                "redis_store",
                &format!(
                    "使用 Redis 存储: address={}, sentinel={}",
                    redis.address,
                    redis.uses_sentinel()
                )
            );
            Arc::new(store)
        }
        Err(e) => {
            lwarn!(
                "system",
                LogStage::Startup,
                LogComponent::Storage,
                "redis_unreachable",
                &format!("Redis 不可用，降级为内存存储（数据不会持久化）: {e}")
            );
            Arc::new(MemoryStore::new())
        }
    }
}
