//! # provider 构造
//!
//! 每个请求按 `(provider, user)` 取出持久化的 OAuth 令牌，再构造绑定该令牌的 provider。
//! 令牌不存在时返回 `Unauthorized`，此时不会有任何远端调用。

use std::sync::Arc;

use crate::config::{GitHubConfig, GitLabConfig};
use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::platform::PlatformApi;
use crate::providers::{
    GitHubApi, GitHubClient, GitHubProvider, GitLabApi, GitLabClient, GitLabProvider,
    GitProvider, KeypairGenerator, ProviderSession,
};
use crate::storage::RecordStore;
use crate::types::{OAuthToken, ProviderKind};
use crate::{ldebug, lwarn};

/// 绑定令牌的远端 API 客户端
pub trait RemoteApiFactory: Send + Sync {
    fn github(&self, token: &OAuthToken) -> Arc<dyn GitHubApi>;

    fn gitlab(&self, token: &OAuthToken) -> Arc<dyn GitLabApi>;
}

/// 基于 reqwest 的默认实现，所有客户端共享一个连接池
#[derive(Clone)]
pub struct HttpApiFactory {
    http: reqwest::Client,
    github: GitHubConfig,
    gitlab: GitLabConfig,
}

impl HttpApiFactory {
    pub fn new(http: reqwest::Client, github: GitHubConfig, gitlab: GitLabConfig) -> Self {
        Self {
            http,
            github,
            gitlab,
        }
    }
}

impl RemoteApiFactory for HttpApiFactory {
    fn github(&self, token: &OAuthToken) -> Arc<dyn GitHubApi> {
        Arc::new(GitHubClient::new(
            self.http.clone(),
            self.github.api_base_url.clone(),
            token.access_token.clone(),
            self.github.hook_insecure_ssl,
        ))
    }

    fn gitlab(&self, token: &OAuthToken) -> Arc<dyn GitLabApi> {
        Arc::new(GitLabClient::new(
            self.http.clone(),
            self.gitlab.api_url(),
            token.access_token.clone(),
            self.gitlab.enable_ssl_verification,
        ))
    }
}

#[derive(Clone)]
pub struct ProviderFactory {
    store: RecordStore,
    platform: Arc<dyn PlatformApi>,
    apis: Arc<dyn RemoteApiFactory>,
    keygen: Arc<dyn KeypairGenerator>,
    deploy_key_title: String,
}

impl ProviderFactory {
    pub fn new(
        store: RecordStore,
        platform: Arc<dyn PlatformApi>,
        apis: Arc<dyn RemoteApiFactory>,
        keygen: Arc<dyn KeypairGenerator>,
        deploy_key_title: impl Into<String>,
    ) -> Self {
        Self {
            store,
            platform,
            apis,
            keygen,
            deploy_key_title: deploy_key_title.into(),
        }
    }

    /// 取出用户的 OAuth 令牌，不存在时返回 `Unauthorized`
    pub async fn token_for(&self, kind: ProviderKind, user: &str) -> Result<OAuthToken> {
        match self.store.load_token(kind, user).await {
            Ok(token) if !token.access_token.is_empty() => Ok(token),
            Ok(_) => Err(GitterError::unauthorized(format!(
                "{kind} token for {user} is empty, authorization required"
            ))),
            Err(e) if e.is_not_found() => {
                lwarn!(
                    "system",
                    LogStage::Authentication,
                    LogComponent::OAuth,
                    "token_missing",
                    &format!("{user} 没有 {kind} 令牌")
                );
                Err(GitterError::unauthorized(format!(
                    "no {kind} token for {user}, authorization required"
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn provider_for(
        &self,
        kind: ProviderKind,
        user: &str,
        bearer: &str,
    ) -> Result<Box<dyn GitProvider>> {
        let token = self.token_for(kind, user).await?;
        ldebug!(
            "system",
            LogStage::Authentication,
            LogComponent::OAuth,
            "provider_bound",
            &format!("构造 {kind} provider: user={user}")
        );

        let provider: Box<dyn GitProvider> = match kind {
            ProviderKind::GitHub => Box::new(GitHubProvider::new(
                ProviderSession::new(user, token.clone(), bearer),
                self.apis.github(&token),
                self.store.clone(),
                Arc::clone(&self.platform),
            )),
            ProviderKind::GitLab => Box::new(GitLabProvider::new(
                ProviderSession::new(user, token.clone(), bearer),
                self.apis.gitlab(&token),
                self.store.clone(),
                Arc::clone(&self.platform),
                Arc::clone(&self.keygen),
                self.deploy_key_title.clone(),
            )),
        };
        Ok(provider)
    }
}
