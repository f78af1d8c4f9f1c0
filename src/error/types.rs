//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

use super::ErrorCategory;
use super::storage::StorageError;

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum GitterError {
    /// 调用方没有有效的 provider 令牌，需要重新授权
    #[error("未授权: {message}")]
    Unauthorized { message: String },

    /// 存储键、webhook 或 secret 记录不存在
    #[error("资源不存在: {resource} {identifier}")]
    NotFound {
        resource: String,
        identifier: String,
    },

    /// webhook id 或来源不匹配，在调用远端前被拒绝
    #[error("资源冲突: {message}")]
    Conflict { message: String },

    /// provider 或平台 API 返回非 2xx
    #[error("远端API错误 [{provider}] {status}: {message}")]
    RemoteApi {
        provider: String,
        status: u16,
        message: String,
    },

    /// 存储层错误（连接、探活、序列化）
    #[error("存储错误: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 网络通信错误
    #[error("网络错误: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 密钥生成或编码错误
    #[error("密钥错误: {message}")]
    Crypto {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 配置相关错误
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 请求参数错误
    #[error("请求参数错误: {message}")]
    InvalidRequest { message: String },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 附加上下文的错误
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<GitterError>,
    },
}

impl GitterError {
    /// 将错误转换为HTTP状态码和错误代码
    #[must_use]
    pub fn to_http_response_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
            Self::RemoteApi { status, .. } => match *status {
                401 => (StatusCode::UNAUTHORIZED, "REMOTE_UNAUTHORIZED"),
                404 => (StatusCode::NOT_FOUND, "REMOTE_NOT_FOUND"),
                _ => (StatusCode::BAD_GATEWAY, "REMOTE_API_ERROR"),
            },
            Self::Storage { .. } => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_ERROR"),
            Self::Network { .. } => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR"),
            Self::Crypto { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CRYPTO_ERROR"),
            Self::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Self::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Context { source, .. } => source.to_http_response_parts(),
        }
    }

    /// 错误分类，用于监控告警
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        if self.to_http_response_parts().0.is_client_error() {
            ErrorCategory::Client
        } else {
            ErrorCategory::Server
        }
    }

    /// 去掉上下文包装后的根错误
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// 是否为未授权错误（需要重新走 OAuth 授权）
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.root(), Self::Unauthorized { .. })
    }

    /// 是否为资源不存在错误
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    /// 创建未授权错误
    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// 创建资源不存在错误
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, identifier: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            identifier: identifier.into(),
        }
    }

    /// 创建冲突错误
    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// 创建远端API错误
    pub fn remote_api<P: Into<String>, T: Into<String>>(provider: P, status: u16, message: T) -> Self {
        Self::RemoteApi {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// 创建带源错误的存储错误
    pub fn storage_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建带源错误的网络错误
    pub fn network_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建带源错误的密钥错误
    pub fn crypto_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Crypto {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建请求参数错误
    pub fn invalid_request<T: Into<String>>(message: T) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// 创建内部错误
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的内部错误
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

// 自动转换常见错误类型
impl From<StorageError> for GitterError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Self::not_found("storage key", key),
            other => Self::storage_with_source(other.to_string(), other),
        }
    }
}

impl From<toml::de::Error> for GitterError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML解析失败", err)
    }
}

impl From<reqwest::Error> for GitterError {
    fn from(err: reqwest::Error) -> Self {
        Self::network_with_source("HTTP请求失败", err)
    }
}

impl From<rsa::Error> for GitterError {
    fn from(err: rsa::Error) -> Self {
        Self::crypto_with_source("RSA密钥处理失败", err)
    }
}
