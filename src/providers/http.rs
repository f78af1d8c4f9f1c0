//! # provider REST 公共部分
//!
//! 分页循环、分页头解析和非 2xx 响应的错误映射。

use std::future::Future;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::lerror;

/// 每页条数
pub const PER_PAGE: u32 = 30;

/// 一页结果，`next_page` 为空表示已到最后一页
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

/// 从第一页开始翻页直到没有下一页，结果保持远端顺序
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut all = Vec::new();
    let mut page = 1;

    loop {
        let Page { items, next_page } = fetch(page).await?;
        all.extend(items);
        match next_page {
            // 下一页必须前进，防止远端返回错误的分页信息导致死循环
            Some(next) if next > page => page = next,
            _ => break,
        }
    }

    Ok(all)
}

/// 解析 GitHub 风格的 `Link: <...&page=3>; rel="next"`
#[must_use]
pub fn next_page_from_link(headers: &HeaderMap) -> Option<u32> {
    let link = headers.get(reqwest::header::LINK)?.to_str().ok()?;

    link.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim().trim_start_matches('<').trim_end_matches('>');
        let is_next = segments.any(|param| param.trim() == r#"rel="next""#);
        if !is_next {
            return None;
        }

        let url = url::Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}

/// 解析 GitLab 风格的 `X-Next-Page: 3`，空值表示最后一页
#[must_use]
pub fn next_page_from_header(headers: &HeaderMap) -> Option<u32> {
    headers
        .get("x-next-page")?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())?
        .parse()
        .ok()
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// 2xx 原样返回；401 视为令牌失效；其余转为 `RemoteApi`
pub async fn check_response(
    provider: &str,
    component: LogComponent,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let text = response.text().await.unwrap_or_default();
    lerror!(
        "system",
        LogStage::ExternalApi,
        component,
        "remote_error",
        &format!("{provider} {url} -> {}: {text}", status.as_u16())
    );

    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = match (body.message, body.error) {
        (Some(serde_json::Value::String(message)), _) => message,
        (Some(other), _) => other.to_string(),
        (None, Some(error)) => error,
        (None, None) => text,
    };

    if status == StatusCode::UNAUTHORIZED {
        return Err(GitterError::unauthorized(format!("{provider}: {message}")));
    }
    Err(GitterError::remote_api(provider, status.as_u16(), message))
}
