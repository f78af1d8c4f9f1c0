//! # GitLab provider
//!
//! API v4 客户端加上 [`GitProvider`] 实现。凭据模型：每个用户一对 SSH 密钥，
//! 公钥注册到 `/user/keys`，私钥作为平台 secret 的 `ssh-privatekey`。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::platform::PlatformApi;
use crate::providers::credential::{
    CredentialProvisioner, DeployKey, DeployKeyRegistrar, SecretMaterial,
};
use crate::providers::http::{
    PER_PAGE, Page, check_response, collect_pages, next_page_from_header,
};
use crate::providers::keygen::KeypairGenerator;
use crate::providers::listing::{RepositoryCache, group_by_owner};
use crate::providers::traits::{GitProvider, ProviderSession};
use crate::providers::webhook::{HookRemote, WebhookRegistry};
use crate::storage::RecordStore;
use crate::types::{
    Branch, OwnerInfo, ProviderKind, Repository, RepositoryListing, Secret, WebhookRecord,
};
use crate::{ldebug, linfo};

const PROVIDER_TAG: &str = "gitlab";

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabNamespace {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabProject {
    pub id: i64,
    pub name: String,
    pub namespace: GitLabNamespace,
    /// 只有个人项目才有 owner
    #[serde(default)]
    pub owner: Option<serde_json::Value>,
    #[serde(default)]
    pub http_url_to_repo: String,
    #[serde(default)]
    pub ssh_url_to_repo: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    /// 旧版本 GitLab 没有 visibility
    #[serde(default)]
    pub public: Option<bool>,
}

impl GitLabProject {
    #[must_use]
    pub fn is_private(&self) -> bool {
        match (&self.visibility, self.public) {
            (Some(visibility), _) => visibility != "public",
            (None, Some(public)) => !public,
            (None, None) => true,
        }
    }

    #[must_use]
    pub fn is_personal(&self) -> bool {
        self.owner.as_ref().is_some_and(|owner| !owner.is_null())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabCommitRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabBranch {
    pub name: String,
    pub commit: GitLabCommitRef,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CreatedKey {
    id: i64,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// GitLab 远端接口
#[async_trait]
pub trait GitLabApi: Send + Sync {
    async fn list_projects(&self, page: u32) -> Result<Page<GitLabProject>>;

    /// `project_ref` 是项目 id 或 URL 编码后的 `namespace/name`
    async fn list_branches(&self, project_ref: &str, page: u32) -> Result<Page<GitLabBranch>>;

    async fn add_project_hook(&self, project_id: &str, url: &str) -> Result<i64>;

    async fn delete_project_hook(&self, project_id: &str, id: i64) -> Result<()>;

    async fn add_ssh_key(&self, title: &str, key: &str) -> Result<DeployKey>;
}

/// 基于 reqwest 的 GitLab v4 客户端
#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    enable_ssl_verification: bool,
}

impl GitLabClient {
    pub fn new(
        http: reqwest::Client,
        api_url: impl Into<String>,
        token: impl Into<String>,
        enable_ssl_verification: bool,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            enable_ssl_verification,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_url))
            .bearer_auth(&self.token)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, &str)],
        page: u32,
    ) -> Result<Page<T>> {
        let response = self
            .request(Method::GET, path)
            .query(extra)
            .query(&[("per_page", PER_PAGE), ("page", page)])
            .send()
            .await?;
        let response = check_response(PROVIDER_TAG, LogComponent::GitLab, response).await?;

        let next_page = next_page_from_header(response.headers());
        let items = response.json().await?;
        Ok(Page { items, next_page })
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn list_projects(&self, page: u32) -> Result<Page<GitLabProject>> {
        self.get_page("/projects", &[("membership", "true")], page).await
    }

    async fn list_branches(&self, project_ref: &str, page: u32) -> Result<Page<GitLabBranch>> {
        let path = format!("/projects/{project_ref}/repository/branches");
        self.get_page(&path, &[], page).await
    }

    async fn add_project_hook(&self, project_id: &str, url: &str) -> Result<i64> {
        let body = json!({
            "url": url,
            "push_events": true,
            "tag_push_events": true,
            "enable_ssl_verification": self.enable_ssl_verification,
        });

        let path = format!("/projects/{}/hooks", urlencoding::encode(project_id));
        let response = self.request(Method::POST, &path).json(&body).send().await?;
        let response = check_response(PROVIDER_TAG, LogComponent::GitLab, response).await?;

        let created: CreatedObject = response.json().await?;
        Ok(created.id)
    }

    async fn delete_project_hook(&self, project_id: &str, id: i64) -> Result<()> {
        let path = format!("/projects/{}/hooks/{id}", urlencoding::encode(project_id));
        let response = self.request(Method::DELETE, &path).send().await?;
        check_response(PROVIDER_TAG, LogComponent::GitLab, response).await?;
        Ok(())
    }

    async fn add_ssh_key(&self, title: &str, key: &str) -> Result<DeployKey> {
        let response = self
            .request(Method::POST, "/user/keys")
            .json(&json!({ "title": title, "key": key }))
            .send()
            .await?;
        let response = check_response(PROVIDER_TAG, LogComponent::GitLab, response).await?;

        let created: CreatedKey = response.json().await?;
        Ok(DeployKey {
            id: created.id,
            created_at: created.created_at,
        })
    }
}

/// 分支接口的项目引用
///
/// `repo` 是列表里返回的项目 id，也可以是完整的 `namespace/name` 路径（编码后传给接口）。
/// 列表里的 namespace 是显示名，不能拼进路径。
#[must_use]
pub fn project_ref(repo: &str) -> String {
    urlencoding::encode(repo).into_owned()
}

pub struct GitLabProvider {
    session: ProviderSession,
    api: Arc<dyn GitLabApi>,
    keygen: Arc<dyn KeypairGenerator>,
    deploy_key_title: String,
    cache: RepositoryCache,
    webhooks: WebhookRegistry,
    credentials: CredentialProvisioner,
}

impl GitLabProvider {
    pub fn new(
        session: ProviderSession,
        api: Arc<dyn GitLabApi>,
        store: RecordStore,
        platform: Arc<dyn PlatformApi>,
        keygen: Arc<dyn KeypairGenerator>,
        deploy_key_title: impl Into<String>,
    ) -> Self {
        let source = ProviderKind::GitLab;
        Self {
            cache: RepositoryCache::new(store.clone(), source, session.user.clone()),
            webhooks: WebhookRegistry::new(store.clone(), source),
            credentials: CredentialProvisioner::new(store, platform, source),
            session,
            api,
            keygen,
            deploy_key_title: deploy_key_title.into(),
        }
    }

    fn to_record(project: GitLabProject) -> (OwnerInfo, Repository) {
        let owner = OwnerInfo {
            namespace: project.namespace.name.clone(),
            personal: project.is_personal(),
        };
        let private = project.is_private();
        let record = Repository {
            id: project.id,
            name: project.name,
            namespace: project.namespace.name,
            clone_url: project.http_url_to_repo,
            ssh_url: project.ssh_url_to_repo,
            private,
        };
        (owner, record)
    }
}

#[async_trait]
impl HookRemote for GitLabProvider {
    async fn create_remote_hook(&self, hook: &WebhookRecord) -> Result<i64> {
        self.api
            .add_project_hook(&hook.params.project_id, &hook.params.url)
            .await
    }

    async fn delete_remote_hook(&self, hook: &WebhookRecord) -> Result<()> {
        self.api
            .delete_project_hook(&hook.params.project_id, hook.id)
            .await
    }
}

#[async_trait]
impl DeployKeyRegistrar for GitLabProvider {
    async fn register_deploy_key(&self, title: &str, public_key: &str) -> Result<DeployKey> {
        self.api.add_ssh_key(title, public_key).await
    }
}

#[async_trait]
impl GitProvider for GitLabProvider {
    fn source(&self) -> ProviderKind {
        ProviderKind::GitLab
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
                    LogComponent::GitLab,
                    "repos_cache_hit",
                    &format!("使用缓存的仓库列表: user={}", self.session.user)
                );
                return Ok(listing);
            }
        }

        let api = Arc::clone(&self.api);
        let projects = collect_pages(move |page| {
            let api = Arc::clone(&api);
            async move { api.list_projects(page).await }
        })
        .await?;

        let listing = group_by_owner(projects.into_iter().map(Self::to_record));
        self.cache.spawn_write(&listing);
        Ok(listing)
    }

    async fn list_branches(&self, _owner: &str, repo: &str) -> Result<Vec<Branch>> {
        let reference = project_ref(repo);
        let branches = collect_pages(|page| {
            let api = Arc::clone(&self.api);
            let reference = reference.clone();
            async move { api.list_branches(&reference, page).await }
        })
        .await?;

        Ok(branches
            .into_iter()
            .map(|branch| Branch {
                name: branch.name,
                commit_id: branch.commit.id,
            })
            .collect())
    }

    async fn create_webhook(&self, mut hook: WebhookRecord) -> Result<WebhookRecord> {
        if hook.params.project_id.is_empty() {
            return Err(GitterError::invalid_request(
                "gitlab webhook requires params.id",
            ));
        }
        hook.params.ns.clear();
        hook.params.repo.clear();
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
            LogComponent::GitLab,
            "create_secret",
            &format!("为 {} 创建 gitlab secret: ns={ns}", self.session.user)
        );
        let keypair = self
            .credentials
            .ensure_deploy_keypair(
                &self.session.user,
                Arc::clone(&self.keygen),
                self,
                &self.deploy_key_title,
            )
            .await?;

        let material = SecretMaterial::SshPrivateKey(keypair.private_key_pem);
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
