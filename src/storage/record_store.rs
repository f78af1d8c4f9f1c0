//! # 记录存储
//!
//! 在 `KeyValueStore` 之上按记录类型做 JSON 编解码，上层只依赖这里的类型化接口。

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{KeyValueStore, StorageKey};
use crate::error::{StorageError, StorageResult};
use crate::logging::{LogComponent, LogStage};
use crate::types::{OAuthToken, ProviderKind, RepositoryListing, Secret, SshKeypair, WebhookRecord};
use crate::{ldebug, lerror};

#[derive(Clone)]
pub struct RecordStore {
    kv: Arc<dyn KeyValueStore>,
}

impl RecordStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.kv.backend_name()
    }

    /// 读取并反序列化，键不存在时返回 `StorageError::NotFound`
    pub async fn load<T: DeserializeOwned>(&self, key: &StorageKey) -> StorageResult<T> {
        let key = key.build();
        let data = self.kv.get(&key).await.map_err(|e| {
            if !e.is_not_found() {
                lerror!(
                    "system",
                    LogStage::Storage,
                    LogComponent::RecordStore,
                    "load_failed",
                    &format!("load ({key}) error: {e}")
                );
            }
            e
        })?;

        serde_json::from_slice(&data).map_err(|e| {
            lerror!(
                "system",
                LogStage::Storage,
                LogComponent::RecordStore,
                "decode_failed",
                &format!("unmarshal ({key}) error: {e}")
            );
            StorageError::from(e)
        })
    }

    /// 与 `load` 相同，但把 NotFound 折叠为 `None`
    pub async fn find<T: DeserializeOwned>(&self, key: &StorageKey) -> StorageResult<Option<T>> {
        match self.load(key).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                ldebug!(
                    "system",
                    LogStage::Storage,
                    LogComponent::RecordStore,
                    "miss",
                    &format!("{} 记录不存在: {key}", key.kind())
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save<T: Serialize + Sync>(&self, key: &StorageKey, value: &T) -> StorageResult<()> {
        let key = key.build();
        let data = serde_json::to_vec(value)?;
        self.kv.set(&key, data).await.map_err(|e| {
            lerror!(
                "system",
                LogStage::Storage,
                LogComponent::RecordStore,
                "save_failed",
                &format!("save ({key}) error: {e}")
            );
            e
        })
    }

    pub async fn delete(&self, key: &StorageKey) -> StorageResult<()> {
        self.kv.delete(&key.build()).await
    }

    // ---- OAuth 令牌 ----

    pub async fn load_token(&self, provider: ProviderKind, user: &str) -> StorageResult<OAuthToken> {
        self.load(&StorageKey::oauth_token(provider, user)).await
    }

    pub async fn save_token(
        &self,
        provider: ProviderKind,
        user: &str,
        token: &OAuthToken,
    ) -> StorageResult<()> {
        self.save(&StorageKey::oauth_token(provider, user), token).await
    }

    // ---- webhook ----

    pub async fn find_webhook(&self, name: &str) -> StorageResult<Option<WebhookRecord>> {
        self.find(&StorageKey::webhook(name)).await
    }

    pub async fn save_webhook(&self, record: &WebhookRecord) -> StorageResult<()> {
        self.save(&StorageKey::webhook(&record.name), record).await
    }

    pub async fn delete_webhook(&self, name: &str) -> StorageResult<()> {
        self.delete(&StorageKey::webhook(name)).await
    }

    // ---- secret ----

    pub async fn find_secret(
        &self,
        provider: ProviderKind,
        namespace: &str,
        user: &str,
    ) -> StorageResult<Option<Secret>> {
        self.find(&StorageKey::secret(provider, namespace, user)).await
    }

    pub async fn save_secret(&self, provider: ProviderKind, secret: &Secret) -> StorageResult<()> {
        self.save(
            &StorageKey::secret(provider, &secret.namespace, &secret.user),
            secret,
        )
        .await
    }

    // ---- GitLab 部署密钥对 ----

    pub async fn find_keypair(&self, user: &str) -> StorageResult<Option<SshKeypair>> {
        self.find(&StorageKey::ssh_keypair(user)).await
    }

    pub async fn save_keypair(&self, keypair: &SshKeypair) -> StorageResult<()> {
        self.save(&StorageKey::ssh_keypair(&keypair.owner), keypair).await
    }

    // ---- 仓库列表缓存 ----

    pub async fn load_repositories(
        &self,
        provider: ProviderKind,
        user: &str,
    ) -> StorageResult<RepositoryListing> {
        self.load(&StorageKey::repositories(provider, user)).await
    }

    pub async fn save_repositories(
        &self,
        provider: ProviderKind,
        user: &str,
        listing: &RepositoryListing,
    ) -> StorageResult<()> {
        self.save(&StorageKey::repositories(provider, user), listing).await
    }
}
