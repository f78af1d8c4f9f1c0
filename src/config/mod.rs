//! # 配置管理模块
//!
//! 处理应用配置加载、验证和管理

mod app_config;
mod manager;

pub use app_config::{
    AppConfig, GitHubConfig, GitLabConfig, PlatformConfig, RedisConfig, ServerConfig,
    StorageBackend, StorageConfig, normalize_base_url,
};
pub use manager::{ConfigManager, parse_redis_params, parse_vcap_services};
