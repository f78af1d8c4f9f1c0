//! # 平台 API 客户端
//!
//! 只覆盖两个接口：在命名空间下创建 secret，以及根据 bearer 令牌查询当前用户。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::config::PlatformConfig;
use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror};

const PROVIDER_TAG: &str = "platform";

/// 平台 secret 接口
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// 创建 secret，返回平台最终使用的名称
    async fn create_secret(
        &self,
        bearer: &str,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<String>;
}

/// 调用方身份查询
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// 返回 bearer 令牌对应的用户名，无效令牌返回 `Unauthorized`
    async fn whoami(&self, bearer: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct NamedObject {
    metadata: ObjectMeta,
}

/// 非 2xx 响应体
#[derive(Debug, Default, Deserialize)]
struct StatusBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("gitter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GitterError::config_with_source("创建平台 HTTP 客户端失败", e))?;

        Ok(Self {
            http,
            base_url: config.base_url(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 空令牌直接拒绝；未带 scheme 的令牌补上 `Bearer`
    fn authorization(bearer: &str) -> Result<String> {
        let bearer = bearer.trim();
        if bearer.is_empty() {
            return Err(GitterError::unauthorized("token is blank"));
        }
        if bearer
            .get(..7)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer "))
        {
            Ok(bearer.to_string())
        } else {
            Ok(format!("Bearer {bearer}"))
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        // 401 的响应体不是结构化的 Status
        if status == StatusCode::UNAUTHORIZED {
            return Err(GitterError::unauthorized(
                status.canonical_reason().unwrap_or("Unauthorized"),
            ));
        }

        let text = response.text().await.unwrap_or_default();
        lerror!(
            "system",
            LogStage::ExternalApi,
            LogComponent::Platform,
            "request_failed",
            &format!("{},{}", status.as_u16(), text)
        );

        let body: StatusBody = serde_json::from_str(&text).unwrap_or_default();
        let code = if body.code == 0 { status.as_u16() } else { body.code };
        let message = if body.message.is_empty() { text } else { body.message };
        Err(GitterError::remote_api(PROVIDER_TAG, code, message))
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn create_secret(
        &self,
        bearer: &str,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<String> {
        let url = format!("{}/api/v1/namespaces/{namespace}/secrets", self.base_url);
        let encoded: BTreeMap<&str, String> = data
            .iter()
            .map(|(k, v)| (k.as_str(), STANDARD.encode(v.as_bytes())))
            .collect();
        let body = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": name },
            "data": encoded,
        });

        ldebug!(
            "system",
            LogStage::ExternalApi,
            LogComponent::Platform,
            "create_secret",
            &format!("创建 secret: ns={namespace}, name={name}")
        );

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, Self::authorization(bearer)?)
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let created: NamedObject = response.json().await?;
        if created.metadata.name.is_empty() {
            Ok(name.to_string())
        } else {
            Ok(created.metadata.name)
        }
    }
}

#[async_trait]
impl IdentityResolver for PlatformClient {
    async fn whoami(&self, bearer: &str) -> Result<String> {
        let url = format!("{}/oapi/v1/users/~", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, Self::authorization(bearer)?)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let user: NamedObject = response.json().await?;
        if user.metadata.name.is_empty() {
            return Err(GitterError::unauthorized("platform returned an empty user name"));
        }
        Ok(user.metadata.name)
    }
}
