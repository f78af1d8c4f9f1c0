//! # gitter
//!
//! 构建平台与代码托管服务（GitHub / GitLab）的集成：仓库与分支列表、
//! push webhook 注册，以及拉取代码用的平台 secret 下发。

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{GitterError, Result};
