//! # 配置管理器
//!
//! 加载 TOML 配置文件，叠加环境变量覆盖和部署平台注入的 Redis 参数，最后统一校验。

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{AppConfig, RedisConfig, StorageBackend};
use crate::error::{GitterError, Result};

/// 环境变量前缀
const ENV_PREFIX: &str = "GITTER_";
/// 默认配置文件路径
const DEFAULT_CONFIG_PATH: &str = "config/gitter.toml";
/// `host+port+password` 形式的 Redis 直连参数
const REDIS_PARAMS_ENV: &str = "GITTER_REDIS_PARAMS";
/// Cloud Foundry 风格的服务绑定信息
const VCAP_SERVICES_ENV: &str = "VCAP_SERVICES";
/// 在 VCAP_SERVICES 中选择 Redis 服务实例的名称
const REDIS_SERVICE_NAME_ENV: &str = "GITTER_REDIS_SERVICE_NAME";
/// VCAP_SERVICES 中 Redis 服务的类别名
const REDIS_SERVICE_KIND: &str = "Redis";

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 当前配置
    config: AppConfig,
    /// 已应用的环境变量覆盖数量
    override_count: usize,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 默认路径下没有配置文件时使用内置默认值，仅依赖环境变量。
    pub fn new() -> Result<Self> {
        if let Ok(path) = env::var("GITTER_CONFIG_PATH") {
            return Self::from_file(path);
        }

        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)
        } else {
            info!("未找到配置文件 {}，使用默认配置和环境变量", DEFAULT_CONFIG_PATH);
            Self::from_parts(AppConfig::default(), env::vars())
        }
    }

    /// 从指定文件创建配置管理器
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::load_config_file(config_path.as_ref())?;
        Self::from_parts(config, env::vars())
    }

    /// 基于已解析配置和给定环境变量集合构建
    pub fn from_parts(
        mut config: AppConfig,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let vars: HashMap<String, String> = vars.into_iter().collect();

        let env_overrides = Self::build_env_overrides(&vars);
        Self::apply_env_overrides(&mut config, &env_overrides)?;
        Self::apply_redis_deployment(&mut config, &vars)?;

        config.validate().map_err(GitterError::config)?;

        info!("配置管理器初始化完成");
        info!("- 存储后端: {:?}", config.storage.backend);
        info!("- 环境变量覆盖: {} 个", env_overrides.len());

        Ok(Self {
            config,
            override_count: env_overrides.len(),
        })
    }

    /// 获取当前配置
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 消费管理器并取出配置
    #[must_use]
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    #[must_use]
    pub const fn override_count(&self) -> usize {
        self.override_count
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> Result<AppConfig> {
        crate::ensure_config!(path.exists(), "配置文件不存在: {}", path.display());

        let config_content = std::fs::read_to_string(path).map_err(|e| {
            GitterError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
        })?;

        toml::from_str(&config_content).map_err(|e| {
            GitterError::config_with_source(
                format!("TOML解析失败 - 配置文件: {}, 详细错误: {}", path.display(), e),
                e,
            )
        })
    }

    /// 构建环境变量覆盖映射
    fn build_env_overrides(vars: &HashMap<String, String>) -> HashMap<String, String> {
        let mut overrides = HashMap::new();

        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                // GITTER_SERVER_PORT -> server.port
                let config_path = config_key.to_lowercase().replace('_', ".");
                overrides.insert(config_path, value.clone());
            }
        }

        debug!("发现 {} 个环境变量覆盖", overrides.len());
        overrides
    }

    /// 应用环境变量覆盖
    fn apply_env_overrides(
        config: &mut AppConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<()> {
        for (path, value) in overrides {
            debug!(
                "应用环境变量覆盖: {} = {}",
                path,
                if path.contains("password") || path.contains("secret") {
                    "***"
                } else {
                    value
                }
            );

            Self::apply_override_to_config(config, path, value)?;
        }
        Ok(())
    }

    /// 将环境变量覆盖应用到配置对象
    fn apply_override_to_config(config: &mut AppConfig, path: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["server", "host"] => config.server.host = value.to_string(),
            ["server", "port"] => config.server.port = parse_value(path, value)?,

            ["platform", "api", "server"] => config.platform.api_server = value.to_string(),
            ["platform", "request", "timeout", "secs"] => {
                config.platform.request_timeout_secs = parse_value(path, value)?;
            }
            ["platform", "accept", "invalid", "certs"] => {
                config.platform.accept_invalid_certs = parse_value(path, value)?;
            }

            ["github", "client", "id"] => config.github.client_id = value.to_string(),
            ["github", "client", "secret"] => config.github.client_secret = value.to_string(),
            ["github", "callback", "url"] => config.github.callback_url = value.to_string(),
            ["github", "api", "base", "url"] => config.github.api_base_url = value.to_string(),
            ["github", "authorize", "url"] => config.github.authorize_url = value.to_string(),
            ["github", "token", "url"] => config.github.token_url = value.to_string(),
            ["github", "scopes"] => config.github.scopes = split_list(value),
            ["github", "hook", "insecure", "ssl"] => {
                config.github.hook_insecure_ssl = parse_value(path, value)?;
            }

            ["gitlab", "base", "url"] => config.gitlab.base_url = value.to_string(),
            ["gitlab", "app", "id"] => config.gitlab.app_id = value.to_string(),
            ["gitlab", "client", "secret"] => config.gitlab.client_secret = value.to_string(),
            ["gitlab", "callback", "url"] => config.gitlab.callback_url = value.to_string(),
            ["gitlab", "api", "path"] => config.gitlab.api_path = value.to_string(),
            ["gitlab", "scopes"] => config.gitlab.scopes = split_list(value),
            ["gitlab", "deploy", "key", "title"] => {
                config.gitlab.deploy_key_title = value.to_string();
            }
            ["gitlab", "enable", "ssl", "verification"] => {
                config.gitlab.enable_ssl_verification = parse_value(path, value)?;
            }

            ["storage", "backend"] => {
                config.storage.backend = match value.to_ascii_lowercase().as_str() {
                    "memory" => StorageBackend::Memory,
                    "redis" => StorageBackend::Redis,
                    other => {
                        return Err(crate::config_error!("无效的存储后端: {}", other));
                    }
                };
            }
            ["storage", "redis", rest @ ..] => {
                let redis = config.storage.redis.get_or_insert_with(RedisConfig::default);
                match rest {
                    ["address"] => redis.address = value.to_string(),
                    ["cluster", "name"] => {
                        redis.cluster_name = non_empty(value);
                    }
                    ["password"] => redis.password = non_empty(value),
                    ["max", "connections"] => redis.max_connections = parse_value(path, value)?,
                    ["idle", "timeout", "secs"] => {
                        redis.idle_timeout_secs = parse_value(path, value)?;
                    }
                    ["dial", "timeout", "secs"] => {
                        redis.dial_timeout_secs = parse_value(path, value)?;
                    }
                    _ => warn!("未知的配置路径，忽略环境变量覆盖: {}", path),
                }
            }

            // 由其它入口处理的变量
            ["config", "path"] | ["redis", "params"] | ["redis", "service", "name"] | ["log", "level"] => {}

            _ => {
                warn!("未知的配置路径，忽略环境变量覆盖: {}", path);
            }
        }

        Ok(())
    }

    /// 应用部署平台注入的 Redis 参数
    ///
    /// `GITTER_REDIS_PARAMS` 优先于 `VCAP_SERVICES`。
    fn apply_redis_deployment(config: &mut AppConfig, vars: &HashMap<String, String>) -> Result<()> {
        let redis = if let Some(params) = vars.get(REDIS_PARAMS_ENV).filter(|v| !v.is_empty()) {
            Some(parse_redis_params(params)?)
        } else if let Some(vcap) = vars.get(VCAP_SERVICES_ENV).filter(|v| !v.is_empty()) {
            let service_name = vars.get(REDIS_SERVICE_NAME_ENV).map(String::as_str);
            Some(parse_vcap_services(vcap, service_name)?)
        } else {
            None
        };

        if let Some(redis) = redis {
            // 保留配置文件里的连接池参数
            let base = config.storage.redis.take().unwrap_or_default();
            config.storage.redis = Some(RedisConfig {
                max_connections: base.max_connections,
                idle_timeout_secs: base.idle_timeout_secs,
                dial_timeout_secs: base.dial_timeout_secs,
                ..redis
            });
            config.storage.backend = StorageBackend::Redis;
            info!("使用部署环境提供的 Redis 参数");
        }

        Ok(())
    }
}

/// 解析 `host+port+password`，密码本身可能包含 `+`
pub fn parse_redis_params(params: &str) -> Result<RedisConfig> {
    let words: Vec<&str> = params.split('+').collect();
    if words.len() < 3 {
        return Err(GitterError::config(format!(
            "{REDIS_PARAMS_ENV} should have 3 params, now: {}",
            words.len()
        )));
    }

    Ok(RedisConfig {
        address: format!("{}:{}", words[0], words[1]),
        cluster_name: None,
        password: non_empty(&words[2..].join("+")),
        ..RedisConfig::default()
    })
}

#[derive(Debug, Deserialize)]
struct VcapService {
    #[serde(default)]
    name: String,
    credentials: VcapCredential,
}

#[derive(Debug, Deserialize)]
struct VcapCredential {
    #[serde(rename = "Host")]
    host: String,
    #[serde(rename = "Port")]
    port: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Password", default)]
    password: String,
}

/// 从 VCAP_SERVICES 中取出 Redis 哨兵参数
pub fn parse_vcap_services(vcap: &str, service_name: Option<&str>) -> Result<RedisConfig> {
    let services: HashMap<String, Vec<VcapService>> = serde_json::from_str(vcap)
        .map_err(|e| GitterError::config_with_source("VCAP_SERVICES 解析失败", e))?;

    let redis_services = services.get(REDIS_SERVICE_KIND).map(Vec::as_slice).unwrap_or_default();
    let service = match service_name.filter(|name| !name.is_empty()) {
        Some(name) => redis_services.iter().find(|s| s.name == name),
        None => redis_services.first(),
    }
    .ok_or_else(|| GitterError::config("no redis services found in VCAP_SERVICES"))?;

    let credential = &service.credentials;
    Ok(RedisConfig {
        address: format!("{}:{}", credential.host, credential.port),
        cluster_name: non_empty(&credential.name),
        password: non_empty(&credential.password),
        ..RedisConfig::default()
    })
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|e| GitterError::config_with_source(format!("无效的配置值: {path} = {value}"), e))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn required_vars() -> Vec<(String, String)> {
        [
            ("GITTER_PLATFORM_API_SERVER", "platform.example.com"),
            ("GITTER_GITHUB_CLIENT_ID", "hub-id"),
            ("GITTER_GITHUB_CLIENT_SECRET", "hub-secret"),
            ("GITTER_GITHUB_CALLBACK_URL", "https://gitter.example.com/github_oauth_cb"),
            ("GITTER_GITLAB_BASE_URL", "https://gitlab.example.com"),
            ("GITTER_GITLAB_APP_ID", "lab-id"),
            ("GITTER_GITLAB_CLIENT_SECRET", "lab-secret"),
            ("GITTER_GITLAB_CALLBACK_URL", "https://gitter.example.com/gitlab_oauth_cb"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn env_overrides_fill_required_fields() {
        let mut vars = required_vars();
        vars.push(("GITTER_SERVER_PORT".to_string(), "8088".to_string()));
        vars.push(("GITTER_GITHUB_SCOPES".to_string(), "repo, admin:repo_hook".to_string()));

        let manager = ConfigManager::from_parts(AppConfig::default(), vars).unwrap();
        let config = manager.config();

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.github.client_id, "hub-id");
        assert_eq!(config.github.scopes, vec!["repo", "admin:repo_hook"]);
        assert_eq!(config.platform.base_url(), "https://platform.example.com");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn invalid_port_is_config_error() {
        let mut vars = required_vars();
        vars.push(("GITTER_SERVER_PORT".to_string(), "not-a-port".to_string()));

        let err = ConfigManager::from_parts(AppConfig::default(), vars).unwrap_err();
        assert!(matches!(err, GitterError::Config { .. }));
    }

    #[test]
    fn missing_required_fields_fail_validation() {
        let err = ConfigManager::from_parts(AppConfig::default(), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("platform.api_server"));
    }

    #[test]
    fn redis_params_keep_plus_in_password() {
        let redis = parse_redis_params("10.0.0.5+6379+pa+ss").unwrap();
        assert_eq!(redis.address, "10.0.0.5:6379");
        assert_eq!(redis.password.as_deref(), Some("pa+ss"));
        assert!(!redis.uses_sentinel());

        assert!(parse_redis_params("10.0.0.5+6379").is_err());
    }

    #[test]
    fn vcap_services_select_sentinel_cluster() {
        let vcap = r#"{
            "Redis": [
                {"name": "other", "credentials": {"Host": "h1", "Port": "26379", "Name": "c1", "Password": "p1"}},
                {"name": "gitter-redis", "credentials": {"Host": "h2", "Port": "26380", "Name": "mymaster", "Password": "p2"}}
            ]
        }"#;

        let redis = parse_vcap_services(vcap, Some("gitter-redis")).unwrap();
        assert_eq!(redis.address, "h2:26380");
        assert_eq!(redis.cluster_name.as_deref(), Some("mymaster"));

        let first = parse_vcap_services(vcap, None).unwrap();
        assert_eq!(first.address, "h1:26379");

        assert!(parse_vcap_services(r#"{"MySQL": []}"#, None).is_err());
    }

    #[test]
    fn redis_params_switch_backend() {
        let mut vars = required_vars();
        vars.push((REDIS_PARAMS_ENV.to_string(), "redis.local+6379+secret".to_string()));

        let config = ConfigManager::from_parts(AppConfig::default(), vars)
            .unwrap()
            .into_config();

        assert_eq!(config.storage.backend, StorageBackend::Redis);
        assert_eq!(config.storage.redis.unwrap().address, "redis.local:6379");
    }

    #[test]
    fn loads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [server]
            port = 7100

            [platform]
            api_server = "https://platform.example.com/"
            "#
        )
        .unwrap();

        let config = ConfigManager::load_config_file(file.path()).unwrap();
        assert_eq!(config.server.port, 7100);
        assert_eq!(config.platform.base_url(), "https://platform.example.com");
    }

    #[test]
    fn missing_config_file_is_error() {
        let err = ConfigManager::load_config_file(Path::new("/nonexistent/gitter.toml")).unwrap_err();
        assert!(err.to_string().contains("配置文件不存在"));
    }
}
