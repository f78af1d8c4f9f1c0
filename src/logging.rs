//! # 日志配置模块
//!
//! 统一的结构化日志：`linfo!` / `ldebug!` / `lwarn!` / `lerror!` 四个宏带上
//! request_id、处理阶段、组件和操作名，输出到 tracing。
//!
//! 令牌、密码和私钥永远不进入日志内容。

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 请求处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Configuration,
    Shutdown,
    RequestStart,
    Authentication,
    Storage,
    ExternalApi,
    Provisioning,
    Response,
    Error,
}

impl LogStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Configuration => "configuration",
            Self::Shutdown => "shutdown",
            Self::RequestStart => "request_start",
            Self::Authentication => "authentication",
            Self::Storage => "storage",
            Self::ExternalApi => "external_api",
            Self::Provisioning => "provisioning",
            Self::Response => "response",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    Config,
    ServerSetup,
    Storage,
    RedisPool,
    RecordStore,
    GitHub,
    GitLab,
    Webhook,
    Credential,
    Platform,
    OAuth,
    Handler,
}

impl LogComponent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::ServerSetup => "server_setup",
            Self::Storage => "storage",
            Self::RedisPool => "redis_pool",
            Self::RecordStore => "record_store",
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Webhook => "webhook",
            Self::Credential => "credential",
            Self::Platform => "platform",
            Self::OAuth => "oauth",
            Self::Handler => "handler",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

/// 默认过滤规则：应用自身 debug，依赖库只保留告警
fn default_filter(level: &str) -> String {
    format!("{level},gitter=debug,hyper=warn,reqwest=warn,redis=warn,tower_http=info")
}

/// 初始化日志系统
///
/// `RUST_LOG` 存在时优先使用，否则按命令行传入的级别构造过滤规则。
pub fn init_optimized_logging(log_level: Option<&String>) {
    let level = log_level.map_or("info", String::as_str);
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter(level));

    let result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();

    if result.is_err() {
        // 测试或嵌入场景下可能已经初始化过
        tracing::debug!("tracing subscriber already initialized");
    }
}

/// 环境变量设置指南
pub fn print_logging_help() {
    println!("📋 日志配置指南:");
    println!("  RUST_LOG=info                      # 标准日志级别");
    println!("  RUST_LOG=debug                     # 调试级别");
    println!("  RUST_LOG=info,redis=debug          # 排查 Redis 连接问题");
    println!("  RUST_LOG=gitter=trace              # 应用详细追踪");
}
