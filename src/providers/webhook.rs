//! # webhook 注册表
//!
//! 每个 `(namespace, build-config)` 只有两种状态：不存在，或已注册（带远端 id）。
//!
//! - 创建：先按名称查本地记录，存在则原样返回，不会重复创建远端 hook
//! - 查询：只读本地记录，不与远端核对
//! - 删除：记录必须存在，且 id 和来源都一致才调用远端删除；远端成功后才删本地记录
//!
//! 远端创建成功但本地写入失败时，远端会留下一个孤立的 hook，这里只记录错误并返回。

use async_trait::async_trait;

use crate::error::{Context, GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::storage::RecordStore;
use crate::types::{ProviderKind, WebhookRecord};
use crate::{conflict_error, ldebug, lerror, linfo};

/// provider 侧的 hook 操作
#[async_trait]
pub trait HookRemote: Send + Sync {
    /// 在远端创建 hook，返回远端分配的 id
    async fn create_remote_hook(&self, hook: &WebhookRecord) -> Result<i64>;

    async fn delete_remote_hook(&self, hook: &WebhookRecord) -> Result<()>;
}

#[derive(Clone)]
pub struct WebhookRegistry {
    store: RecordStore,
    source: ProviderKind,
}

impl WebhookRegistry {
    pub fn new(store: RecordStore, source: ProviderKind) -> Self {
        Self { store, source }
    }

    pub async fn create(
        &self,
        mut hook: WebhookRecord,
        remote: &dyn HookRemote,
    ) -> Result<WebhookRecord> {
        if hook.name.is_empty() {
            return Err(GitterError::invalid_request("webhook name is required"));
        }

        if let Some(existing) = self.store.find_webhook(&hook.name).await? {
            ldebug!(
                "system",
                LogStage::Provisioning,
                LogComponent::Webhook,
                "hook_exists",
                &format!("hook {} 已存在 (id {})", existing.name, existing.id)
            );
            return Ok(existing);
        }

        hook.source = Some(self.source);
        hook.id = remote
            .create_remote_hook(&hook)
            .await
            .with_context(|| format!("创建远端 hook {} 失败", hook.name))?;

        if let Err(e) = self.store.save_webhook(&hook).await {
            lerror!(
                "system",
                LogStage::Provisioning,
                LogComponent::Webhook,
                "orphaned_hook",
                &format!(
                    "远端 hook 已创建但本地记录写入失败: source={}, name={}, id={}: {e}",
                    self.source, hook.name, hook.id
                )
            );
            return Err(e.into());
        }

        linfo!(
            "system",
            LogStage::Provisioning,
            LogComponent::Webhook,
            "hook_created",
            &format!("created hook {}/{} (hook id {})", self.source, hook.name, hook.id)
        );
        Ok(hook)
    }

    pub async fn check(&self, ns: &str, bc: &str) -> Result<Option<WebhookRecord>> {
        // TODO: reconcile against the provider so hooks deleted out-of-band are detected
        Ok(self
            .store
            .find_webhook(&WebhookRecord::compose_name(ns, bc))
            .await?)
    }

    pub async fn remove(&self, ns: &str, bc: &str, id: i64, remote: &dyn HookRemote) -> Result<()> {
        let name = WebhookRecord::compose_name(ns, bc);
        let hook = self
            .store
            .find_webhook(&name)
            .await?
            .ok_or_else(|| GitterError::not_found("webhook", name.clone()))?;

        if hook.id != id {
            lerror!(
                "system",
                LogStage::Provisioning,
                LogComponent::Webhook,
                "hook_id_mismatch",
                &format!("hook {} mismatch, want remove {}, and met {}", hook.name, id, hook.id)
            );
            return Err(conflict_error!(
                "hook {} id mismatch: requested {}, stored {}",
                name,
                id,
                hook.id
            ));
        }

        if hook.source != Some(self.source) {
            let owner = hook.source.map_or("unknown", ProviderKind::as_str);
            lerror!(
                "system",
                LogStage::Provisioning,
                LogComponent::Webhook,
                "hook_source_mismatch",
                &format!("hook {} (id {}) belongs to {owner}, and met {}", hook.name, hook.id, self.source)
            );
            return Err(conflict_error!(
                "hook {} belongs to {}, not {}",
                name,
                owner,
                self.source
            ));
        }

        remote.delete_remote_hook(&hook).await?;
        self.store.delete_webhook(&name).await?;

        linfo!(
            "system",
            LogStage::Provisioning,
            LogComponent::Webhook,
            "hook_removed",
            &format!("removed hook {}/{} (hook id {})", self.source, name, id)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::HookParams;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRemote {
        creates: AtomicUsize,
        deletes: AtomicUsize,
        fail_delete: bool,
    }

    #[async_trait]
    impl HookRemote for CountingRemote {
        async fn create_remote_hook(&self, _hook: &WebhookRecord) -> Result<i64> {
            Ok(100 + self.creates.fetch_add(1, Ordering::SeqCst) as i64)
        }

        async fn delete_remote_hook(&self, _hook: &WebhookRecord) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete {
                Err(GitterError::remote_api("github", 500, "boom"))
            } else {
                Ok(())
            }
        }
    }

    fn registry(source: ProviderKind) -> WebhookRegistry {
        WebhookRegistry::new(RecordStore::new(Arc::new(MemoryStore::new())), source)
    }

    fn hook(name: &str) -> WebhookRecord {
        WebhookRecord {
            id: 0,
            name: name.to_string(),
            source: None,
            params: HookParams {
                ns: "alice".to_string(),
                repo: "demo".to_string(),
                project_id: String::new(),
                url: "https://platform.example.com/hooks/ns1/bc1".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent_by_name() {
        let registry = registry(ProviderKind::GitHub);
        let remote = CountingRemote::default();

        let first = registry.create(hook("ns1/bc1"), &remote).await.unwrap();
        let second = registry.create(hook("ns1/bc1"), &remote).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.id, 100);
        assert_eq!(first.source, Some(ProviderKind::GitHub));
        assert_eq!(remote.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_missing_hook_is_not_found() {
        let registry = registry(ProviderKind::GitHub);
        let remote = CountingRemote::default();

        let err = registry.remove("ns1", "bc1", 1, &remote).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(remote.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_remote_delete_keeps_record() {
        let registry = registry(ProviderKind::GitHub);
        let remote = CountingRemote {
            fail_delete: true,
            ..CountingRemote::default()
        };

        let created = registry.create(hook("ns1/bc1"), &remote).await.unwrap();
        assert!(registry.remove("ns1", "bc1", created.id, &remote).await.is_err());
        assert_eq!(registry.check("ns1", "bc1").await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let registry = registry(ProviderKind::GitLab);
        let remote = CountingRemote::default();

        let err = registry.create(hook(""), &remote).await.unwrap_err();
        assert!(matches!(err, GitterError::InvalidRequest { .. }));
        assert_eq!(remote.creates.load(Ordering::SeqCst), 0);
    }
}
