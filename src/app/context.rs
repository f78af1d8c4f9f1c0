//! 应用上下文
//!
//! 进程启动时构造一次，持有所有跨请求共享的组件，HTTP 层只通过它访问存储和 provider。
//! 测试里可以直接用 [`AppContext::new`] 注入替身实现。

use std::sync::Arc;

use crate::app::factory::{HttpApiFactory, ProviderFactory};
use crate::app::resources::AppResources;
use crate::auth::{OAuthConnector, OAuthSettings};
use crate::config::AppConfig;
use crate::error::Result;
use crate::platform::{IdentityResolver, PlatformApi, PlatformClient};
use crate::providers::RsaKeypairGenerator;
use crate::storage::RecordStore;
use crate::types::ProviderKind;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub store: RecordStore,
    pub identity: Arc<dyn IdentityResolver>,
    pub providers: ProviderFactory,
    github_oauth: Arc<OAuthConnector>,
    gitlab_oauth: Arc<OAuthConnector>,
}

impl AppContext {
    pub fn new(
        config: Arc<AppConfig>,
        store: RecordStore,
        identity: Arc<dyn IdentityResolver>,
        providers: ProviderFactory,
        github_oauth: OAuthConnector,
        gitlab_oauth: OAuthConnector,
    ) -> Self {
        Self {
            config,
            store,
            identity,
            providers,
            github_oauth: Arc::new(github_oauth),
            gitlab_oauth: Arc::new(gitlab_oauth),
        }
    }

    /// 用真实的 HTTP 客户端组装上下文
    pub fn from_resources(resources: &AppResources) -> Result<Self> {
        let config = resources.config();
        let store = resources.store();
        let http = resources.http();

        let platform = Arc::new(PlatformClient::new(&config.platform)?);
        let providers = ProviderFactory::new(
            store.clone(),
            Arc::clone(&platform) as Arc<dyn PlatformApi>,
            Arc::new(HttpApiFactory::new(
                http.clone(),
                config.github.clone(),
                config.gitlab.clone(),
            )),
            Arc::new(RsaKeypairGenerator::default()),
            config.gitlab.deploy_key_title.clone(),
        );

        let github_oauth = OAuthConnector::new(
            ProviderKind::GitHub,
            OAuthSettings::from(&config.github),
            http.clone(),
        );
        let gitlab_oauth =
            OAuthConnector::new(ProviderKind::GitLab, OAuthSettings::from(&config.gitlab), http);

        Ok(Self::new(
            config,
            store,
            platform,
            providers,
            github_oauth,
            gitlab_oauth,
        ))
    }

    #[must_use]
    pub fn oauth(&self, kind: ProviderKind) -> &OAuthConnector {
        match kind {
            ProviderKind::GitHub => &self.github_oauth,
            ProviderKind::GitLab => &self.gitlab_oauth,
        }
    }
}
