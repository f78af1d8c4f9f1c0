//! # 仓库列表缓存
//!
//! 远端结果按所有者分组；非空结果在后台写入缓存，写入失败只记日志。

use indexmap::IndexMap;

use crate::logging::{LogComponent, LogStage};
use crate::storage::RecordStore;
use crate::types::{OwnerInfo, ProviderKind, Repository, RepositoryGroup, RepositoryListing};
use crate::{ldebug, lwarn};

/// 按所有者分组，组和组内仓库都保持首次出现的顺序
#[must_use]
pub fn group_by_owner(
    items: impl IntoIterator<Item = (OwnerInfo, Repository)>,
) -> RepositoryListing {
    let mut groups: IndexMap<OwnerInfo, Vec<Repository>> = IndexMap::new();
    for (owner, repo) in items {
        groups.entry(owner).or_default().push(repo);
    }

    groups
        .into_iter()
        .map(|(owner, repos)| RepositoryGroup { owner, repos })
        .collect()
}

/// 单个用户在某个 provider 下的仓库列表缓存
#[derive(Clone)]
pub struct RepositoryCache {
    store: RecordStore,
    source: ProviderKind,
    user: String,
}

impl RepositoryCache {
    pub fn new(store: RecordStore, source: ProviderKind, user: impl Into<String>) -> Self {
        Self {
            store,
            source,
            user: user.into(),
        }
    }

    /// 非空缓存；未命中、为空或读取失败都返回 `None`
    pub async fn read(&self) -> Option<RepositoryListing> {
        match self.store.load_repositories(self.source, &self.user).await {
            Ok(listing) if !listing.is_empty() => Some(listing),
            Ok(_) => {
                lwarn!(
                    "system",
                    LogStage::Storage,
                    LogComponent::RecordStore,
                    "repos_cache_empty",
                    "cache empty, fetching from remote server."
                );
                None
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::Storage,
                    LogComponent::RecordStore,
                    "repos_cache_read_failed",
                    &format!("读取 {} 仓库缓存失败，改为访问远端: {e}", self.source)
                );
                None
            }
        }
    }

    /// 后台写入缓存，调用方不等待；空结果不写
    pub fn spawn_write(&self, listing: &RepositoryListing) -> Option<tokio::task::JoinHandle<()>> {
        if listing.is_empty() {
            return None;
        }

        let cache = self.clone();
        let listing = listing.clone();
        Some(tokio::spawn(async move {
            match cache
                .store
                .save_repositories(cache.source, &cache.user, &listing)
                .await
            {
                Ok(()) => ldebug!(
                    "system",
                    LogStage::Storage,
                    LogComponent::RecordStore,
                    "repos_cached",
                    &format!("缓存 {} 个所有者的仓库列表: user={}", listing.len(), cache.user)
                ),
                Err(e) => lwarn!(
                    "system",
                    LogStage::Storage,
                    LogComponent::RecordStore,
                    "repos_cache_write_failed",
                    &format!("写入仓库缓存失败: {e}")
                ),
            }
        }))
    }
}
