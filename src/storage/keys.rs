//! # 存储键命名规范
//!
//! 所有键都以 `gitter://` 开头，第二段是 provider 标签或记录类别，
//! 保证不同记录类型、不同 provider 之间的键不会冲突。

use std::fmt;

use crate::types::ProviderKind;

/// 键前缀
pub const KEY_PREFIX: &str = "gitter://";

/// 存储键类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKey {
    /// OAuth 令牌 - `gitter://{provider}/oauthtoken/{user}`
    OAuthToken { provider: ProviderKind, user: String },

    /// 平台 secret 指针 - `gitter://{provider}/secret/{ns}/{user}`
    Secret {
        provider: ProviderKind,
        namespace: String,
        user: String,
    },

    /// GitLab 部署公钥对 - `gitter://gitlab/sshkey/{user}`
    SshKeypair { user: String },

    /// 个人仓库列表缓存 - `gitter://{provider}/repos/{user}`
    Repositories { provider: ProviderKind, user: String },

    /// webhook 记录 - `gitter://webhook/{name}`，name 为 `ns/bc`
    Webhook { name: String },
}

impl StorageKey {
    /// 生成键字符串
    #[must_use]
    pub fn build(&self) -> String {
        match self {
            Self::OAuthToken { provider, user } => {
                format!("{KEY_PREFIX}{provider}/oauthtoken/{user}")
            }
            Self::Secret {
                provider,
                namespace,
                user,
            } => {
                format!("{KEY_PREFIX}{provider}/secret/{namespace}/{user}")
            }
            Self::SshKeypair { user } => {
                format!("{KEY_PREFIX}{}/sshkey/{user}", ProviderKind::GitLab)
            }
            Self::Repositories { provider, user } => {
                format!("{KEY_PREFIX}{provider}/repos/{user}")
            }
            Self::Webhook { name } => format!("{KEY_PREFIX}webhook/{name}"),
        }
    }

    /// 记录类别，用于日志
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OAuthToken { .. } => "oauthtoken",
            Self::Secret { .. } => "secret",
            Self::SshKeypair { .. } => "sshkey",
            Self::Repositories { .. } => "repos",
            Self::Webhook { .. } => "webhook",
        }
    }

    #[must_use]
    pub fn oauth_token(provider: ProviderKind, user: &str) -> Self {
        Self::OAuthToken {
            provider,
            user: user.to_string(),
        }
    }

    #[must_use]
    pub fn secret(provider: ProviderKind, namespace: &str, user: &str) -> Self {
        Self::Secret {
            provider,
            namespace: namespace.to_string(),
            user: user.to_string(),
        }
    }

    #[must_use]
    pub fn ssh_keypair(user: &str) -> Self {
        Self::SshKeypair {
            user: user.to_string(),
        }
    }

    #[must_use]
    pub fn repositories(provider: ProviderKind, user: &str) -> Self {
        Self::Repositories {
            provider,
            user: user.to_string(),
        }
    }

    #[must_use]
    pub fn webhook(name: &str) -> Self {
        Self::Webhook {
            name: name.to_string(),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_layout() {
        assert_eq!(
            StorageKey::oauth_token(ProviderKind::GitHub, "alice").build(),
            "gitter://github/oauthtoken/alice"
        );
        assert_eq!(
            StorageKey::secret(ProviderKind::GitLab, "ns1", "bob").build(),
            "gitter://gitlab/secret/ns1/bob"
        );
        assert_eq!(StorageKey::ssh_keypair("bob").build(), "gitter://gitlab/sshkey/bob");
        assert_eq!(
            StorageKey::repositories(ProviderKind::GitHub, "alice").build(),
            "gitter://github/repos/alice"
        );
        assert_eq!(StorageKey::webhook("ns1/bc1").build(), "gitter://webhook/ns1/bc1");
    }

    #[test]
    fn test_keys_never_collide_across_kinds_or_providers() {
        let keys = [
            StorageKey::oauth_token(ProviderKind::GitHub, "u"),
            StorageKey::oauth_token(ProviderKind::GitLab, "u"),
            StorageKey::secret(ProviderKind::GitHub, "ns", "u"),
            StorageKey::secret(ProviderKind::GitLab, "ns", "u"),
            StorageKey::ssh_keypair("u"),
            StorageKey::repositories(ProviderKind::GitHub, "u"),
            StorageKey::repositories(ProviderKind::GitLab, "u"),
            StorageKey::webhook("ns/u"),
        ];

        let built: HashSet<String> = keys.iter().map(StorageKey::build).collect();
        assert_eq!(built.len(), keys.len());
        assert!(built.iter().all(|k| k.starts_with(KEY_PREFIX)));
    }
}
