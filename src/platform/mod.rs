//! # 平台集成
//!
//! 平台自身的 API：secret 创建和调用方身份查询。

mod client;

pub use client::{IdentityResolver, PlatformApi, PlatformClient};
