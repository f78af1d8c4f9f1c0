//! # 认证模块
//!
//! 调用方令牌解析，以及各 provider 的 OAuth 授权码流程。

pub mod header;
pub mod oauth;

pub use header::bearer_token;
pub use oauth::{OAuthConnector, OAuthSettings};
