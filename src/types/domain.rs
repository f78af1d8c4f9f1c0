//! # 领域记录
//!
//! provider 无关的仓库、分支、webhook、secret 与密钥对记录，
//! 既是 `RecordStore` 中的持久化格式，也是 HTTP 响应的数据格式。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GitterError;

/// 代码托管服务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    GitLab,
}

impl ProviderKind {
    /// 存储键和 secret 名称里使用的标签
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GitterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            other => Err(GitterError::invalid_request(format!("unknown source: {other}"))),
        }
    }
}

/// 仓库所有者
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub namespace: String,
    /// 是否为用户本人（而不是组织 / 群组）
    pub personal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub namespace: String,
    pub clone_url: String,
    #[serde(rename = "ssh_clone_url", default, skip_serializing_if = "Option::is_none")]
    pub ssh_url: Option<String>,
    pub private: bool,
}

/// 同一所有者下的仓库列表，保持远端返回顺序
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryGroup {
    #[serde(flatten)]
    pub owner: OwnerInfo,
    pub repos: Vec<Repository>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(rename = "commitid")]
    pub commit_id: String,
}

/// 本地保存的 webhook 记录，以 `ns/bc` 为主键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRecord {
    /// 远端分配的 hook id，创建前为 0
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// 创建该 hook 的 provider，删除时必须一致
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ProviderKind>,
    #[serde(default)]
    pub params: HookParams,
}

/// webhook 的远端定位信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookParams {
    /// GitHub 仓库所有者
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ns: String,
    /// GitHub 仓库名
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    /// GitLab 项目 id
    #[serde(rename = "id", default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    /// 事件推送地址
    pub url: String,
}

impl WebhookRecord {
    /// `namespace/build-config`
    #[must_use]
    pub fn compose_name(ns: &str, bc: &str) -> String {
        format!("{ns}/{bc}")
    }
}

/// 平台 secret 指针，`available` 为 true 表示平台侧已创建
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub namespace: String,
    pub user: String,
    #[serde(rename = "secret")]
    pub secret_name: String,
    pub available: bool,
}

/// GitLab 部署公钥对
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeypair {
    pub owner: String,
    /// OpenSSH authorized_keys 格式
    pub public_key: String,
    /// PKCS#1 PEM
    pub private_key_pem: String,
    /// 注册到 GitLab 后分配的 key id
    #[serde(default)]
    pub remote_key_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// provider OAuth 令牌
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl OAuthToken {
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expiry: None,
        }
    }
}

// 令牌不进日志
impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"***")
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}
