//! # gitter 主程序
//!
//! 构建平台与 GitHub / GitLab 的集成服务

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use gitter::{
    Result,
    app::{AppContext, AppResources},
    config::ConfigManager,
    lerror, linfo,
    logging::{self, LogComponent, LogStage},
    server::GitterServer,
};

#[derive(Debug, Parser)]
#[command(name = "gitter", version, about = "Git hosting integration service")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, env = "GITTER_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long)]
    log_level: Option<String>,

    /// 打印日志配置说明后退出
    #[arg(long)]
    logging_help: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.logging_help {
        logging::print_logging_help();
        return Ok(());
    }

    // 初始化日志系统
    logging::init_optimized_logging(cli.log_level.as_ref());

    let manager = match &cli.config {
        Some(path) => ConfigManager::from_file(path),
        None => ConfigManager::new(),
    };
    let manager = match manager {
        Ok(manager) => manager,
        Err(e) => {
            lerror!(
                "system",
                LogStage::Configuration,
                LogComponent::Config,
                "config_invalid",
                &format!("配置加载失败: {e}")
            );
            return Err(e);
        }
    };
    linfo!(
        "system",
        LogStage::Configuration,
        LogComponent::Config,
        "config_loaded",
        &format!("配置加载完成，环境变量覆盖 {} 项", manager.override_count())
    );

    let config = Arc::new(manager.into_config());
    let resources = AppResources::build(Arc::clone(&config)).await?;
    let ctx = AppContext::from_resources(&resources)?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动"
    );
    if let Err(e) = GitterServer::new(config.server.clone(), ctx).serve().await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            &format!("服务启动失败: {e:?}")
        );
        std::process::exit(1);
    }
    Ok(())
}
