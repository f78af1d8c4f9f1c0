//! # HTTP 服务
//!
//! axum 路由、处理器和统一响应格式。

pub mod handlers;
pub mod response;
pub mod routes;

use tokio::net::TcpListener;

use crate::app::AppContext;
use crate::config::ServerConfig;
use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{lerror, linfo};

pub use routes::create_routes;

pub struct GitterServer {
    config: ServerConfig,
    router: axum::Router,
}

impl GitterServer {
    pub fn new(config: ServerConfig, ctx: AppContext) -> Self {
        Self {
            config,
            router: create_routes(ctx),
        }
    }

    /// 启动服务器，收到 Ctrl+C 后优雅退出
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| GitterError::network_with_source(format!("监听 {addr} 失败"), e))?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "server_start",
            &format!("Starting gitter server on {addr}")
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GitterError::network_with_source("HTTP 服务异常退出", e))?;

        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "server_stopped",
            "服务正常关闭"
        );
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "ctrl_c_error",
            &format!("Failed to listen for Ctrl+C: {e:?}")
        );
    }
}
