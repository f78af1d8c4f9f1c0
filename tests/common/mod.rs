//! 集成测试共用的替身实现

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use gitter::app::{ProviderFactory, RemoteApiFactory};
use gitter::error::{GitterError, Result, StorageError, StorageResult};
use gitter::platform::{IdentityResolver, PlatformApi};
use gitter::providers::github::{GitHubBranch, GitHubRepo};
use gitter::providers::gitlab::{GitLabBranch, GitLabProject};
use gitter::providers::{
    DeployKey, GitHubApi, GitLabApi, KeypairGenerator, Page, RsaKeypairGenerator,
};
use gitter::storage::{KeyValueStore, MemoryStore, RecordStore};
use gitter::types::{OAuthToken, ProviderKind, SshKeypair};

/// 统计每种操作次数的内存存储
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl CountingStore {
    pub fn total_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.sets.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.sets.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "counting-memory"
    }
}

/// 所有操作都失败的存储，模拟连接故障
pub struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn set(&self, _key: &str, _value: Vec<u8>) -> StorageResult<()> {
        Err(StorageError::connection("connection refused"))
    }

    async fn get(&self, _key: &str) -> StorageResult<Vec<u8>> {
        Err(StorageError::connection("connection refused"))
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::connection("connection refused"))
    }

    fn backend_name(&self) -> &'static str {
        "broken"
    }
}

/// 分页返回预置数据的 GitHub 替身
#[derive(Default)]
pub struct FakeGitHub {
    pub repos: Mutex<Vec<GitHubRepo>>,
    pub branches: Mutex<Vec<GitHubBranch>>,
    pub page_size: usize,
    pub repo_calls: AtomicUsize,
    pub branch_calls: AtomicUsize,
    pub hook_creates: AtomicUsize,
    pub hook_deletes: Mutex<Vec<(String, String, i64)>>,
    pub next_hook_id: AtomicI64,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self {
            page_size: 2,
            next_hook_id: AtomicI64::new(42),
            ..Self::default()
        }
    }

    pub fn with_repos(self, repos: Vec<GitHubRepo>) -> Self {
        *self.repos.lock().unwrap() = repos;
        self
    }

    pub fn with_branches(self, branches: Vec<GitHubBranch>) -> Self {
        *self.branches.lock().unwrap() = branches;
        self
    }
}

fn page_of<T: Clone>(items: &[T], page: u32, size: usize) -> Page<T> {
    let start = (page as usize - 1) * size;
    let chunk: Vec<T> = items.iter().skip(start).take(size).cloned().collect();
    let has_more = start + size < items.len();
    Page {
        items: chunk,
        next_page: has_more.then_some(page + 1),
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn list_repositories(&self, page: u32) -> Result<Page<GitHubRepo>> {
        self.repo_calls.fetch_add(1, Ordering::SeqCst);
        Ok(page_of(&self.repos.lock().unwrap(), page, self.page_size))
    }

    async fn list_branches(&self, _owner: &str, _repo: &str, page: u32) -> Result<Page<GitHubBranch>> {
        self.branch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(page_of(&self.branches.lock().unwrap(), page, self.page_size))
    }

    async fn create_hook(&self, _owner: &str, _repo: &str, _url: &str) -> Result<i64> {
        self.hook_creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_hook_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn delete_hook(&self, owner: &str, repo: &str, id: i64) -> Result<()> {
        self.hook_deletes
            .lock()
            .unwrap()
            .push((owner.to_string(), repo.to_string(), id));
        Ok(())
    }
}

/// GitLab 替身
#[derive(Default)]
pub struct FakeGitLab {
    pub projects: Mutex<Vec<GitLabProject>>,
    pub branches: Mutex<Vec<GitLabBranch>>,
    pub project_calls: AtomicUsize,
    pub branch_refs: Mutex<Vec<String>>,
    pub hook_creates: AtomicUsize,
    pub hook_deletes: AtomicUsize,
    pub registered_keys: Mutex<Vec<(String, String)>>,
    pub fail_key_registration: bool,
}

#[async_trait]
impl GitLabApi for FakeGitLab {
    async fn list_projects(&self, page: u32) -> Result<Page<GitLabProject>> {
        self.project_calls.fetch_add(1, Ordering::SeqCst);
        Ok(page_of(&self.projects.lock().unwrap(), page, 2))
    }

    async fn list_branches(&self, project_ref: &str, page: u32) -> Result<Page<GitLabBranch>> {
        self.branch_refs.lock().unwrap().push(project_ref.to_string());
        Ok(page_of(&self.branches.lock().unwrap(), page, 2))
    }

    async fn add_project_hook(&self, _project_id: &str, _url: &str) -> Result<i64> {
        Ok(100 + self.hook_creates.fetch_add(1, Ordering::SeqCst) as i64)
    }

    async fn delete_project_hook(&self, _project_id: &str, _id: i64) -> Result<()> {
        self.hook_deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_ssh_key(&self, title: &str, key: &str) -> Result<DeployKey> {
        if self.fail_key_registration {
            return Err(GitterError::remote_api("gitlab", 400, "key is invalid"));
        }
        let mut keys = self.registered_keys.lock().unwrap();
        keys.push((title.to_string(), key.to_string()));
        Ok(DeployKey {
            id: 1000 + keys.len() as i64,
            created_at: None,
        })
    }
}

/// 记录平台 secret 调用
#[derive(Default)]
pub struct RecordingPlatform {
    pub calls: Mutex<Vec<(String, String, BTreeMap<String, String>)>>,
}

impl RecordingPlatform {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PlatformApi for RecordingPlatform {
    async fn create_secret(
        &self,
        bearer: &str,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<String> {
        if bearer.is_empty() {
            return Err(GitterError::unauthorized("token is blank"));
        }
        self.calls
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string(), data.clone()));
        Ok(name.to_string())
    }
}

/// `<user>-token` 对应用户 `<user>`
pub struct FakeIdentity;

#[async_trait]
impl IdentityResolver for FakeIdentity {
    async fn whoami(&self, bearer: &str) -> Result<String> {
        bearer
            .strip_suffix("-token")
            .map(str::to_string)
            .ok_or_else(|| GitterError::unauthorized("invalid token"))
    }
}

/// 统计生成次数的密钥生成器
pub struct CountingKeygen {
    inner: RsaKeypairGenerator,
    pub calls: AtomicUsize,
}

impl CountingKeygen {
    pub fn with_bits(bits: usize) -> Self {
        Self {
            inner: RsaKeypairGenerator::with_bits(bits),
            calls: AtomicUsize::new(0),
        }
    }
}

impl KeypairGenerator for CountingKeygen {
    fn generate(&self, owner: &str) -> Result<SshKeypair> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate(owner)
    }
}

pub struct FakeApis {
    pub github: Arc<FakeGitHub>,
    pub gitlab: Arc<FakeGitLab>,
}

impl RemoteApiFactory for FakeApis {
    fn github(&self, _token: &OAuthToken) -> Arc<dyn GitHubApi> {
        Arc::clone(&self.github) as Arc<dyn GitHubApi>
    }

    fn gitlab(&self, _token: &OAuthToken) -> Arc<dyn GitLabApi> {
        Arc::clone(&self.gitlab) as Arc<dyn GitLabApi>
    }
}

/// 组装好的测试环境
pub struct Harness {
    pub kv: Arc<CountingStore>,
    pub store: RecordStore,
    pub github: Arc<FakeGitHub>,
    pub gitlab: Arc<FakeGitLab>,
    pub platform: Arc<RecordingPlatform>,
    pub keygen: Arc<CountingKeygen>,
    pub factory: ProviderFactory,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeGitHub::new(), FakeGitLab::default(), 1024)
    }

    pub fn build(github: FakeGitHub, gitlab: FakeGitLab, key_bits: usize) -> Self {
        let kv = Arc::new(CountingStore::default());
        let store = RecordStore::new(Arc::clone(&kv) as Arc<dyn KeyValueStore>);
        let github = Arc::new(github);
        let gitlab = Arc::new(gitlab);
        let platform = Arc::new(RecordingPlatform::default());
        let keygen = Arc::new(CountingKeygen::with_bits(key_bits));

        let factory = ProviderFactory::new(
            store.clone(),
            Arc::clone(&platform) as Arc<dyn PlatformApi>,
            Arc::new(FakeApis {
                github: Arc::clone(&github),
                gitlab: Arc::clone(&gitlab),
            }),
            Arc::clone(&keygen) as Arc<dyn KeypairGenerator>,
            "gitter-pull-secret",
        );

        Self {
            kv,
            store,
            github,
            gitlab,
            platform,
            keygen,
            factory,
        }
    }

    pub async fn authorize(&self, kind: ProviderKind, user: &str) {
        self.store
            .save_token(kind, user, &OAuthToken::bearer(format!("{user}-{kind}-oauth")))
            .await
            .unwrap();
    }
}

pub fn github_repo(id: i64, owner: &str, owner_type: &str, name: &str) -> GitHubRepo {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "owner": { "login": owner, "type": owner_type },
        "clone_url": format!("https://github.com/{owner}/{name}.git"),
        "ssh_url": format!("git@github.com:{owner}/{name}.git"),
        "private": false,
    }))
    .unwrap()
}

pub fn github_branch(name: &str, sha: &str) -> GitHubBranch {
    serde_json::from_value(json!({ "name": name, "commit": { "sha": sha } })).unwrap()
}

pub fn gitlab_project(id: i64, namespace: &str, name: &str, personal: bool) -> GitLabProject {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "namespace": { "name": namespace, "path": namespace },
        "owner": if personal { json!({ "username": namespace }) } else { serde_json::Value::Null },
        "http_url_to_repo": format!("https://gitlab.example.com/{namespace}/{name}.git"),
        "ssh_url_to_repo": format!("git@gitlab.example.com:{namespace}/{name}.git"),
        "visibility": "private",
    }))
    .unwrap()
}
