//! # OAuth 授权码流程
//!
//! 每个 provider 一个 [`OAuthConnector`]：
//!
//! 1. `authorize_url` 生成跳转到 provider 的授权地址，回调地址上带着
//!    调用方的 `redirect_url` 和 `user`
//! 2. provider 回调后用 `exchange_code` 校验 state 并换取令牌
//!
//! state 是进程启动时生成的随机值（40 字节，base64），所有请求共用。

use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenType};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, HttpClientError, RedirectUrl, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use rand::RngCore;
use subtle::ConstantTimeEq;
use url::Url;

use crate::config::{GitHubConfig, GitLabConfig};
use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::types::{OAuthToken, ProviderKind};
use crate::{ldebug, lwarn};

const STATE_BYTES: usize = 40;

/// 配好授权地址和令牌地址的客户端
type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

type TokenError = RequestTokenError<HttpClientError<reqwest::Error>, BasicErrorResponse>;

/// provider OAuth 应用配置
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub callback_url: String,
    pub scopes: Vec<String>,
}

impl From<&GitHubConfig> for OAuthSettings {
    fn from(config: &GitHubConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            authorize_url: config.authorize_url.clone(),
            token_url: config.token_url.clone(),
            callback_url: config.callback_url.clone(),
            scopes: config.scopes.clone(),
        }
    }
}

impl From<&GitLabConfig> for OAuthSettings {
    fn from(config: &GitLabConfig) -> Self {
        Self {
            client_id: config.app_id.clone(),
            client_secret: config.client_secret.clone(),
            authorize_url: config.authorize_url(),
            token_url: config.token_url(),
            callback_url: config.callback_url.clone(),
            scopes: config.scopes.clone(),
        }
    }
}

#[derive(Clone)]
pub struct OAuthConnector {
    kind: ProviderKind,
    settings: OAuthSettings,
    http: reqwest::Client,
    state: String,
}

/// 生成随机 state
#[must_use]
pub fn random_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

impl OAuthConnector {
    pub fn new(kind: ProviderKind, settings: OAuthSettings, http: reqwest::Client) -> Self {
        Self::with_state(kind, settings, http, random_state())
    }

    pub fn with_state(
        kind: ProviderKind,
        settings: OAuthSettings,
        http: reqwest::Client,
        state: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            settings,
            http,
            state: state.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// 常量时间比较 state
    ///
    /// TODO: state 目前全进程共用，回调信任 query 里的 `user`；改为按用户签发并保存的
    /// state 后，才能阻止已登录用户把自己的令牌绑定到别人名下。
    #[must_use]
    pub fn verify_state(&self, state: &str) -> bool {
        !state.is_empty() && bool::from(state.as_bytes().ct_eq(self.state.as_bytes()))
    }

    /// 构建 OAuth2 客户端
    ///
    /// 凭据放在请求体里，GitHub 和 GitLab 都接受这种方式。
    fn client(&self) -> Result<ConfiguredClient> {
        let auth_url = AuthUrl::new(self.settings.authorize_url.clone()).map_err(|e| {
            GitterError::config_with_source(
                format!("{} authorize_url 无效: {}", self.kind, self.settings.authorize_url),
                e,
            )
        })?;
        let token_url = TokenUrl::new(self.settings.token_url.clone()).map_err(|e| {
            GitterError::config_with_source(
                format!("{} token_url 无效: {}", self.kind, self.settings.token_url),
                e,
            )
        })?;

        Ok(BasicClient::new(ClientId::new(self.settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.settings.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_auth_type(AuthType::RequestBody))
    }

    /// provider 回调到本服务的地址，带上调用方的跳转地址和用户
    fn callback_url(&self, redirect_url: &str, user: &str) -> Result<RedirectUrl> {
        let mut callback = Url::parse(&self.settings.callback_url).map_err(|e| {
            GitterError::config_with_source(
                format!("{} callback_url 无效: {}", self.kind, self.settings.callback_url),
                e,
            )
        })?;
        callback
            .query_pairs_mut()
            .append_pair("redirect_url", redirect_url)
            .append_pair("user", user);
        Ok(RedirectUrl::from_url(callback))
    }

    /// 授权地址
    pub fn authorize_url(&self, redirect_url: &str, user: &str) -> Result<String> {
        let callback = self.callback_url(redirect_url, user)?;
        let (url, _state) = self
            .client()?
            .authorize_url(|| CsrfToken::new(self.state.clone()))
            .add_scopes(self.settings.scopes.iter().cloned().map(Scope::new))
            .set_redirect_uri(Cow::Owned(callback))
            .url();

        Ok(url.into())
    }

    /// 校验 state 后用授权码换取令牌
    ///
    /// `redirect_url` 和 `user` 必须与生成授权地址时相同，GitLab 会比对 `redirect_uri`。
    pub async fn exchange_code(
        &self,
        state: &str,
        code: &str,
        redirect_url: &str,
        user: &str,
    ) -> Result<OAuthToken> {
        if !self.verify_state(state) {
            lwarn!(
                "system",
                LogStage::Authentication,
                LogComponent::OAuth,
                "state_mismatch",
                &format!("{} oauth state 不匹配: user={user}", self.kind)
            );
            return Err(GitterError::unauthorized("invalid oauth state"));
        }
        if code.is_empty() {
            return Err(GitterError::invalid_request("missing authorization code"));
        }

        let client = self.client()?;
        let callback = self.callback_url(redirect_url, user)?;

        ldebug!(
            "system",
            LogStage::Authentication,
            LogComponent::OAuth,
            "exchange_code",
            &format!("{} 授权码换取令牌: user={user}", self.kind)
        );

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_redirect_uri(Cow::Owned(callback))
            .request_async(&self.http)
            .await
            .map_err(|e| self.token_error(e))?;

        let access_token = token.access_token().secret().clone();
        if access_token.is_empty() {
            return Err(GitterError::unauthorized(format!(
                "{} returned no access token",
                self.kind
            )));
        }

        let token_type = match token.token_type() {
            BasicTokenType::Bearer => "bearer".to_string(),
            BasicTokenType::Mac => "mac".to_string(),
            BasicTokenType::Extension(other) => other.clone(),
        };

        Ok(OAuthToken {
            access_token,
            token_type,
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expiry: token
                .expires_in()
                .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
                .map(|ttl| Utc::now() + ttl),
        })
    }

    fn token_error(&self, err: TokenError) -> GitterError {
        match err {
            RequestTokenError::ServerResponse(response) => GitterError::unauthorized(format!(
                "{} token exchange failed: {response}",
                self.kind
            )),
            RequestTokenError::Request(e) => {
                GitterError::network_with_source(format!("{} 令牌端点请求失败", self.kind), e)
            }
            // GitHub 出错时仍返回 200，错误体在这里才解析出来
            RequestTokenError::Parse(e, body) => {
                match serde_json::from_slice::<BasicErrorResponse>(&body) {
                    Ok(response) => GitterError::unauthorized(format!(
                        "{} token exchange failed: {response}",
                        self.kind
                    )),
                    Err(_) => GitterError::remote_api(
                        self.kind.as_str(),
                        502,
                        format!("unparseable token response: {e}"),
                    ),
                }
            }
            RequestTokenError::Other(message) => {
                GitterError::remote_api(self.kind.as_str(), 502, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> OAuthConnector {
        OAuthConnector::with_state(
            ProviderKind::GitHub,
            OAuthSettings::from(&GitHubConfig {
                client_id: "cid".to_string(),
                client_secret: "secret".to_string(),
                callback_url: "https://gitter.example.com/github_oauth_cb".to_string(),
                ..GitHubConfig::default()
            }),
            reqwest::Client::new(),
            "fixed-state",
        )
    }

    #[test]
    fn test_random_state_length() {
        let state = random_state();
        assert_eq!(STANDARD.decode(&state).unwrap().len(), STATE_BYTES);
        assert_ne!(state, random_state());
    }

    #[test]
    fn test_authorize_url_carries_callback_params() {
        let url = Url::parse(&connector().authorize_url("https://ui.example.com/x", "alice").unwrap())
            .unwrap();
        assert_eq!(url.host_str(), Some("github.com"));

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "cid");
        assert_eq!(pairs["state"], "fixed-state");
        assert_eq!(pairs["scope"], "user:email repo");

        let callback = Url::parse(&pairs["redirect_uri"]).unwrap();
        let cb: std::collections::HashMap<_, _> = callback.query_pairs().into_owned().collect();
        assert_eq!(cb["redirect_url"], "https://ui.example.com/x");
        assert_eq!(cb["user"], "alice");
    }

    #[test]
    fn test_verify_state_requires_exact_match() {
        let connector = connector();
        assert!(connector.verify_state("fixed-state"));
        assert!(!connector.verify_state("fixed-statf"));
        assert!(!connector.verify_state("fixed"));
        assert!(!connector.verify_state(""));
    }

    #[tokio::test]
    async fn test_exchange_rejects_bad_state() {
        let err = connector()
            .exchange_code("other", "code", "https://ui.example.com", "alice")
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }
}
