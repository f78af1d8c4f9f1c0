//! # GitHub provider
//!
//! REST v3 客户端加上 [`GitProvider`] 实现。凭据模型：OAuth 令牌直接作为
//! 平台 secret 的 `password`。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::platform::PlatformApi;
use crate::providers::credential::{CredentialProvisioner, SecretMaterial};
use crate::providers::http::{PER_PAGE, Page, check_response, collect_pages, next_page_from_link};
use crate::providers::listing::{RepositoryCache, group_by_owner};
use crate::providers::traits::{GitProvider, ProviderSession};
use crate::providers::webhook::{HookRemote, WebhookRegistry};
use crate::storage::RecordStore;
use crate::types::{
    Branch, OwnerInfo, ProviderKind, Repository, RepositoryListing, Secret, WebhookRecord,
};
use crate::{ldebug, linfo};

const PROVIDER_TAG: &str = "github";

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub id: i64,
    pub name: String,
    pub owner: GitHubOwner,
    #[serde(default)]
    pub clone_url: String,
    #[serde(default)]
    pub ssh_url: Option<String>,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommitRef {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubBranch {
    pub name: String,
    pub commit: GitHubCommitRef,
}

#[derive(Debug, Deserialize)]
struct CreatedHook {
    id: i64,
}

/// GitHub 远端接口
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn list_repositories(&self, page: u32) -> Result<Page<GitHubRepo>>;

    async fn list_branches(&self, owner: &str, repo: &str, page: u32) -> Result<Page<GitHubBranch>>;

    /// 创建 push webhook，返回 hook id
    async fn create_hook(&self, owner: &str, repo: &str, url: &str) -> Result<i64>;

    async fn delete_hook(&self, owner: &str, repo: &str, id: i64) -> Result<()>;
}

/// 基于 reqwest 的 GitHub REST 客户端
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base_url: String,
    token: String,
    insecure_ssl: bool,
}

impl GitHubClient {
    pub fn new(
        http: reqwest::Client,
        api_base_url: impl Into<String>,
        token: impl Into<String>,
        insecure_ssl: bool,
    ) -> Self {
        Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            insecure_ssl,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_base_url))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }

    async fn get_page<T: DeserializeOwned>(&self, path: &str, page: u32) -> Result<Page<T>> {
        let response = self
            .request(Method::GET, path)
            .query(&[("per_page", PER_PAGE), ("page", page)])
            .send()
            .await?;
        let response = check_response(PROVIDER_TAG, LogComponent::GitHub, response).await?;

        let next_page = next_page_from_link(response.headers());
        let items = response.json().await?;
        Ok(Page { items, next_page })
    }

    fn repo_path(owner: &str, repo: &str) -> String {
        format!(
            "/repos/{}/{}",
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        )
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn list_repositories(&self, page: u32) -> Result<Page<GitHubRepo>> {
        self.get_page("/user/repos", page).await
    }

    async fn list_branches(&self, owner: &str, repo: &str, page: u32) -> Result<Page<GitHubBranch>> {
        let path = format!("{}/branches", Self::repo_path(owner, repo));
        self.get_page(&path, page).await
    }

    async fn create_hook(&self, owner: &str, repo: &str, url: &str) -> Result<i64> {
        let body = json!({
            "name": "web",
            "active": true,
            "events": ["push"],
            "config": {
                "url": url,
                "content_type": "json",
                "insecure_ssl": if self.insecure_ssl { "1" } else { "0" },
            },
        });

        let path = format!("{}/hooks", Self::repo_path(owner, repo));
        let response = self.request(Method::POST, &path).json(&body).send().await?;
        let response = check_response(PROVIDER_TAG, LogComponent::GitHub, response).await?;

        let created: CreatedHook = response.json().await?;
        Ok(created.id)
    }

    async fn delete_hook(&self, owner: &str, repo: &str, id: i64) -> Result<()> {
        let path = format!("{}/hooks/{id}", Self::repo_path(owner, repo));
        let response = self.request(Method::DELETE, &path).send().await?;
        check_response(PROVIDER_TAG, LogComponent::GitHub, response).await?;
        Ok(())
    }
}

pub struct GitHubProvider {
    session: ProviderSession,
    api: Arc<dyn GitHubApi>,
    cache: RepositoryCache,
    webhooks: WebhookRegistry,
    credentials: CredentialProvisioner,
}

impl GitHubProvider {
    pub fn new(
        session: ProviderSession,
        api: Arc<dyn GitHubApi>,
        store: RecordStore,
        platform: Arc<dyn PlatformApi>,
    ) -> Self {
        let source = ProviderKind::GitHub;
        Self {
            cache: RepositoryCache::new(store.clone(), source, session.user.clone()),
            webhooks: WebhookRegistry::new(store.clone(), source),
            credentials: CredentialProvisioner::new(store, platform, source),
            session,
            api,
        }
    }

    fn to_record(repo: GitHubRepo) -> (OwnerInfo, Repository) {
        let owner = OwnerInfo {
            namespace: repo.owner.login.clone(),
            personal: repo.owner.kind == "User",
        };
        let record = Repository {
            id: repo.id,
            name: repo.name,
            namespace: repo.owner.login,
            clone_url: repo.clone_url,
            ssh_url: repo.ssh_url,
            private: repo.private,
        };
        (owner, record)
    }
}

#[async_trait]
impl HookRemote for GitHubProvider {
    async fn create_remote_hook(&self, hook: &WebhookRecord) -> Result<i64> {
        self.api
            .create_hook(&hook.params.ns, &hook.params.repo, &hook.params.url)
            .await
    }

    async fn delete_remote_hook(&self, hook: &WebhookRecord) -> Result<()> {
        self.api
            .delete_hook(&hook.params.ns, &hook.params.repo, hook.id)
            .await
    }
}

#[async_trait]
impl GitProvider for GitHubProvider {
    fn source(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn user(&self) -> &str {
        &self.session.user
    }

    async fn list_personal_repositories(&self, use_cache: bool) -> Result<RepositoryListing> {
        if use_cache {
            if let Some(listing) = self.cache.read().await {
                ldebug!(
                    "system",
                    LogStage::Storage,
                    LogComponent::GitHub,
                    "repos_cache_hit",
                    &format!("使用缓存的仓库列表: user={}", self.session.user)
                );
                return Ok(listing);
            }
        }

        let api = Arc::clone(&self.api);
        let repos = collect_pages(move |page| {
            let api = Arc::clone(&api);
            async move { api.list_repositories(page).await }
        })
        .await?;

        let listing = group_by_owner(repos.into_iter().map(Self::to_record));
        self.cache.spawn_write(&listing);
        Ok(listing)
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>> {
        let branches = collect_pages(|page| {
            let api = Arc::clone(&self.api);
            let (owner, repo) = (owner.to_string(), repo.to_string());
            async move { api.list_branches(&owner, &repo, page).await }
        })
        .await?;

        Ok(branches
            .into_iter()
            .map(|branch| Branch {
                name: branch.name,
                commit_id: branch.commit.sha,
            })
            .collect())
    }

    async fn create_webhook(&self, mut hook: WebhookRecord) -> Result<WebhookRecord> {
        if hook.params.ns.is_empty() || hook.params.repo.is_empty() {
            return Err(GitterError::invalid_request(
                "github webhook requires params.ns and params.repo",
            ));
        }
        hook.params.project_id.clear();
        self.webhooks.create(hook, self).await
    }

    async fn check_webhook(&self, ns: &str, bc: &str) -> Result<Option<WebhookRecord>> {
        self.webhooks.check(ns, bc).await
    }

    async fn remove_webhook(&self, ns: &str, bc: &str, id: i64) -> Result<()> {
        self.webhooks.remove(ns, bc, id, self).await
    }

    async fn create_secret(&self, ns: &str, name: &str) -> Result<Secret> {
        linfo!(
            "system",
            LogStage::Provisioning,
            LogComponent::GitHub,
            "create_secret",
            &format!("为 {} 创建 github secret: ns={ns}", self.session.user)
        );
        let material = SecretMaterial::Password(self.session.token.access_token.clone());
        self.credentials
            .provision(&self.session.user, &self.session.bearer, ns, name, material)
            .await
    }

    async fn check_secret(&self, ns: &str) -> Result<Option<Secret>> {
        self.credentials.cached(&self.session.user, ns).await
    }

    fn oauth_token(&self) -> &str {
        &self.session.token.access_token
    }

    fn bearer_token(&self) -> &str {
        &self.session.bearer
    }

    fn set_bearer_token(&mut self, bearer: String) {
        self.session.bearer = bearer;
    }
}
