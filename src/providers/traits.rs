//! # provider 能力接口
//!
//! GitHub 与 GitLab 的线上 API 和凭据模型差别很大，但对上层暴露同一组操作。
//! 上层只在构造时区分 provider，之后只通过 [`GitProvider`] 调用。

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Branch, OAuthToken, ProviderKind, RepositoryListing, Secret, WebhookRecord};

/// 统一的 provider 操作集合
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// provider 标签
    fn source(&self) -> ProviderKind;

    /// 当前平台用户
    fn user(&self) -> &str;

    /// 列出个人可见的仓库，按所有者分组
    ///
    /// `use_cache` 为 true 且缓存非空时直接返回缓存，不访问远端。
    async fn list_personal_repositories(&self, use_cache: bool) -> Result<RepositoryListing>;

    /// 列出分支，保持远端返回顺序
    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>>;

    /// 按 `hook.name` 幂等地创建 webhook
    async fn create_webhook(&self, hook: WebhookRecord) -> Result<WebhookRecord>;

    /// 只读本地记录，不访问远端
    async fn check_webhook(&self, ns: &str, bc: &str) -> Result<Option<WebhookRecord>>;

    /// id 与来源都匹配时删除远端 hook，成功后再删除本地记录
    async fn remove_webhook(&self, ns: &str, bc: &str, id: i64) -> Result<()>;

    /// 生成凭据并在平台上创建 secret
    async fn create_secret(&self, ns: &str, name: &str) -> Result<Secret>;

    /// 只读本地 secret 指针
    async fn check_secret(&self, ns: &str) -> Result<Option<Secret>>;

    /// provider OAuth 令牌，构造时确定
    fn oauth_token(&self) -> &str;

    /// 平台 bearer 令牌，只用于调用平台 secret 接口
    fn bearer_token(&self) -> &str;

    fn set_bearer_token(&mut self, bearer: String);
}

/// 一次请求内 provider 持有的身份信息
///
/// 令牌只是借用的副本，provider 本身从不持久化它。
#[derive(Clone)]
pub struct ProviderSession {
    pub user: String,
    pub token: OAuthToken,
    pub bearer: String,
}

impl ProviderSession {
    pub fn new(user: impl Into<String>, token: OAuthToken, bearer: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token,
            bearer: bearer.into(),
        }
    }
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
