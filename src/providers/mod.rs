//! # 代码托管 provider
//!
//! GitHub 与 GitLab 两个实现共享同一个 [`GitProvider`] 接口；
//! webhook 注册表和凭据下发是两者共用的组件。

pub mod credential;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod keygen;
pub mod listing;
pub mod operations;
pub mod traits;
pub mod webhook;

pub use credential::{CredentialProvisioner, DeployKey, DeployKeyRegistrar, SecretMaterial};
pub use github::{GitHubApi, GitHubClient, GitHubProvider};
pub use gitlab::{GitLabApi, GitLabClient, GitLabProvider};
pub use http::Page;
pub use keygen::{KeypairGenerator, RsaKeypairGenerator};
pub use traits::{GitProvider, ProviderSession};
pub use webhook::{HookRemote, WebhookRegistry};
