//! # 认证头解析

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use crate::error::{GitterError, Result};

/// 取出 `Authorization` 头里的令牌，`Bearer ` 前缀可有可无
pub fn bearer_token(headers: &HeaderMap) -> Result<String> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    let token = match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => value,
    };

    if token.is_empty() {
        return Err(GitterError::unauthorized("missing bearer token"));
    }
    Ok(token.to_string())
}
