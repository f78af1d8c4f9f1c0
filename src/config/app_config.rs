//! # 应用配置结构定义

use serde::{Deserialize, Serialize};

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP 服务配置
    pub server: ServerConfig,
    /// 平台 API 配置
    pub platform: PlatformConfig,
    /// GitHub OAuth 与 API 配置
    pub github: GitHubConfig,
    /// GitLab OAuth 与 API 配置
    pub gitlab: GitLabConfig,
    /// 存储配置
    pub storage: StorageConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7000,
        }
    }
}

impl ServerConfig {
    /// 监听地址
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 平台 API 配置（secret 创建与身份查询）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// 平台 API 地址，未带协议时按 https 处理
    pub api_server: String,
    /// 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 是否接受自签名证书
    pub accept_invalid_certs: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_server: String::new(),
            request_timeout_secs: 30,
            accept_invalid_certs: true,
        }
    }
}

impl PlatformConfig {
    /// 规范化后的平台 API 基础地址：补全 https 协议并去掉末尾斜杠
    #[must_use]
    pub fn base_url(&self) -> String {
        normalize_base_url(&self.api_server)
    }
}

/// GitHub 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    /// OAuth 回调地址，例如 `https://gitter.example.com/github_oauth_cb`
    pub callback_url: String,
    pub api_base_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    /// 创建 webhook 时是否跳过证书校验
    pub hook_insecure_ssl: bool,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: String::new(),
            api_base_url: "https://api.github.com".to_string(),
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            scopes: vec!["user:email".to_string(), "repo".to_string()],
            hook_insecure_ssl: true,
        }
    }
}

/// GitLab 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitLabConfig {
    /// GitLab 实例地址，例如 `https://gitlab.example.com`
    pub base_url: String,
    pub app_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub api_path: String,
    pub scopes: Vec<String>,
    /// 部署公钥的标题
    pub deploy_key_title: String,
    /// webhook 是否校验证书
    pub enable_ssl_verification: bool,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            app_id: String::new(),
            client_secret: String::new(),
            callback_url: String::new(),
            api_path: "/api/v4".to_string(),
            scopes: vec!["api".to_string()],
            deploy_key_title: "gitter-pull-secret".to_string(),
            enable_ssl_verification: false,
        }
    }
}

impl GitLabConfig {
    /// API 根地址，例如 `https://gitlab.example.com/api/v4`
    #[must_use]
    pub fn api_url(&self) -> String {
        format!(
            "{}/{}",
            normalize_base_url(&self.base_url),
            self.api_path.trim_start_matches('/')
        )
    }

    #[must_use]
    pub fn authorize_url(&self) -> String {
        format!("{}/oauth/authorize", normalize_base_url(&self.base_url))
    }

    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", normalize_base_url(&self.base_url))
    }
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// 进程内存储，进程退出即丢失
    #[default]
    Memory,
    /// Redis 存储，可选哨兵发现主节点
    Redis,
}

/// 存储配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
}

/// Redis配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// 直连模式下是 Redis 地址，哨兵模式下是哨兵地址（host:port）
    pub address: String,
    /// 哨兵监控的集群名，为空表示直连
    pub cluster_name: Option<String>,
    /// 连接密码（可选）
    pub password: Option<String>,
    /// 最大连接数，连接池满时等待
    pub max_connections: usize,
    /// 空闲连接超时（秒）
    pub idle_timeout_secs: u64,
    /// 建连与命令超时（秒）
    pub dial_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            cluster_name: None,
            password: None,
            max_connections: 10,
            idle_timeout_secs: 240,
            dial_timeout_secs: 10,
        }
    }
}

impl RedisConfig {
    /// 是否通过哨兵发现主节点
    #[must_use]
    pub fn uses_sentinel(&self) -> bool {
        self.cluster_name.as_deref().is_some_and(|name| !name.is_empty())
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be greater than 0".to_string());
        }
        if self.platform.api_server.trim().is_empty() {
            return Err("platform.api_server must be specified".to_string());
        }
        if self.platform.request_timeout_secs == 0 {
            return Err("platform.request_timeout_secs must be greater than 0".to_string());
        }

        if self.github.client_id.is_empty() || self.github.client_secret.is_empty() {
            return Err("github.client_id and github.client_secret must be specified".to_string());
        }
        if self.github.callback_url.is_empty() {
            return Err("github.callback_url must be specified".to_string());
        }

        if self.gitlab.base_url.is_empty() {
            return Err("gitlab.base_url must be specified".to_string());
        }
        if self.gitlab.app_id.is_empty() || self.gitlab.client_secret.is_empty() {
            return Err("gitlab.app_id and gitlab.client_secret must be specified".to_string());
        }
        if self.gitlab.callback_url.is_empty() {
            return Err("gitlab.callback_url must be specified".to_string());
        }

        match self.storage.backend {
            StorageBackend::Memory => {}
            StorageBackend::Redis => {
                let redis = self
                    .storage
                    .redis
                    .as_ref()
                    .ok_or_else(|| "Redis storage configuration must be provided".to_string())?;

                if redis.address.is_empty() {
                    return Err("Redis address cannot be empty".to_string());
                }
                if redis.max_connections == 0 {
                    return Err("Redis max_connections must be greater than 0".to_string());
                }
            }
        }

        Ok(())
    }
}

/// 补全协议并去掉末尾斜杠
#[must_use]
pub fn normalize_base_url(addr: &str) -> String {
    let addr = addr.trim();
    let lower = addr.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        addr.to_string()
    } else {
        format!("https://{addr}")
    };
    with_scheme.trim_end_matches('/').to_string()
}
