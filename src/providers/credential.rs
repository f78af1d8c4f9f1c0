//! # 拉取凭据
//!
//! 把 provider 的认证材料变成平台 secret：
//!
//! - GitHub：OAuth 令牌直接作为 `password`
//! - GitLab：每个用户一对 SSH 密钥，公钥注册为 GitLab 部署公钥，私钥作为 `ssh-privatekey`
//!
//! 任一步失败都直接返回错误，不会写入半成品的 secret 记录。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::platform::PlatformApi;
use crate::providers::keygen::KeypairGenerator;
use crate::storage::RecordStore;
use crate::types::{ProviderKind, Secret, SshKeypair};
use crate::{ldebug, linfo};

/// secret 中的认证材料
pub enum SecretMaterial {
    Password(String),
    SshPrivateKey(String),
}

impl SecretMaterial {
    /// 平台 secret 的数据键
    #[must_use]
    pub const fn data_key(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::SshPrivateKey(_) => "ssh-privatekey",
        }
    }

    fn into_data(self) -> BTreeMap<String, String> {
        let key = self.data_key().to_string();
        let value = match self {
            Self::Password(value) | Self::SshPrivateKey(value) => value,
        };
        BTreeMap::from([(key, value)])
    }
}

/// 远端分配的部署公钥信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployKey {
    pub id: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// 部署公钥注册
#[async_trait]
pub trait DeployKeyRegistrar: Send + Sync {
    async fn register_deploy_key(&self, title: &str, public_key: &str) -> Result<DeployKey>;
}

#[derive(Clone)]
pub struct CredentialProvisioner {
    store: RecordStore,
    platform: Arc<dyn PlatformApi>,
    source: ProviderKind,
}

impl CredentialProvisioner {
    pub fn new(store: RecordStore, platform: Arc<dyn PlatformApi>, source: ProviderKind) -> Self {
        Self {
            store,
            platform,
            source,
        }
    }

    /// 只读本地 secret 指针
    pub async fn cached(&self, user: &str, ns: &str) -> Result<Option<Secret>> {
        Ok(self.store.find_secret(self.source, ns, user).await?)
    }

    /// 在平台上创建 secret 并记录指针
    pub async fn provision(
        &self,
        user: &str,
        bearer: &str,
        ns: &str,
        name: &str,
        material: SecretMaterial,
    ) -> Result<Secret> {
        let data_key = material.data_key();
        let secret_name = self
            .platform
            .create_secret(bearer, ns, name, &material.into_data())
            .await?;

        let secret = Secret {
            namespace: ns.to_string(),
            user: user.to_string(),
            secret_name,
            available: true,
        };
        self.store.save_secret(self.source, &secret).await?;

        linfo!(
            "system",
            LogStage::Provisioning,
            LogComponent::Credential,
            "secret_created",
            &format!(
                "created {} secret {} in {ns} for {user} ({data_key})",
                self.source, secret.secret_name
            )
        );
        Ok(secret)
    }

    /// 取出用户的部署密钥对；没有时生成、注册并保存
    ///
    /// 已保存的密钥对原样复用，不会再生成或再注册。
    pub async fn ensure_deploy_keypair(
        &self,
        user: &str,
        keygen: Arc<dyn KeypairGenerator>,
        registrar: &dyn DeployKeyRegistrar,
        title: &str,
    ) -> Result<SshKeypair> {
        if let Some(keypair) = self.store.find_keypair(user).await? {
            ldebug!(
                "system",
                LogStage::Provisioning,
                LogComponent::Credential,
                "keypair_reused",
                &format!("复用 {user} 的部署密钥 (key id {:?})", keypair.remote_key_id)
            );
            return Ok(keypair);
        }

        let owner = user.to_string();
        let mut keypair = tokio::task::spawn_blocking(move || keygen.generate(&owner))
            .await
            .map_err(|e| GitterError::internal_with_source("密钥生成任务异常退出", e))??;

        let deploy_key = registrar
            .register_deploy_key(title, &keypair.public_key)
            .await?;
        keypair.remote_key_id = Some(deploy_key.id);
        keypair.created_at = Some(deploy_key.created_at.unwrap_or_else(Utc::now));

        self.store.save_keypair(&keypair).await?;

        linfo!(
            "system",
            LogStage::Provisioning,
            LogComponent::Credential,
            "keypair_registered",
            &format!("registered deploy key {} for {user}", deploy_key.id)
        );
        Ok(keypair)
    }
}
