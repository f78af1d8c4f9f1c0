//! # 请求处理器
//!
//! 除 OAuth 回调外，所有接口都先用 `Authorization` 头向平台查询调用方身份。

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppContext;
use crate::auth::bearer_token;
use crate::error::{GitterError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::providers::{GitProvider, operations};
use crate::server::response::{ApiResult, success, success_without_data};
use crate::types::{ProviderKind, WebhookRecord};
use crate::{ldebug, lerror, linfo};

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub redirect_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct ReposQuery {
    /// 默认读缓存，`cache=false` 强制访问远端
    #[serde(default)]
    pub cache: Option<String>,
}

impl ReposQuery {
    fn use_cache(&self) -> bool {
        !matches!(self.cache.as_deref(), Some("false" | "0" | "no"))
    }
}

#[derive(Debug, Deserialize)]
pub struct BranchQuery {
    #[serde(default)]
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    pub ns: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    pub ns: String,
    pub bc: String,
}

/// 已认证的调用方
struct Caller {
    user: String,
    bearer: String,
}

async fn caller(ctx: &AppContext, headers: &HeaderMap) -> Result<Caller> {
    let bearer = bearer_token(headers)?;
    let user = ctx.identity.whoami(&bearer).await?;
    ldebug!(
        "system",
        LogStage::RequestStart,
        LogComponent::Handler,
        "caller_resolved",
        &format!("caller: {user}")
    );
    Ok(Caller { user, bearer })
}

async fn provider(
    ctx: &AppContext,
    headers: &HeaderMap,
    source: &str,
) -> Result<Box<dyn GitProvider>> {
    let kind: ProviderKind = source.parse()?;
    let caller = caller(ctx, headers).await?;
    ctx.providers
        .provider_for(kind, &caller.user, &caller.bearer)
        .await
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Response {
    success(json!({
        "status": "ok",
        "storage": ctx.store.backend_name(),
    }))
}

/// GET /authorize/{source}
///
/// 返回 provider 授权地址，由前端跳转。
pub async fn authorize(
    State(ctx): State<AppContext>,
    Path(source): Path<String>,
    Query(query): Query<AuthorizeQuery>,
    headers: HeaderMap,
) -> ApiResult {
    let kind: ProviderKind = source.parse()?;
    let caller = caller(&ctx, &headers).await?;
    let url = ctx.oauth(kind).authorize_url(&query.redirect_url, &caller.user)?;
    Ok(success(json!({ "url": url })))
}

/// GET /github_oauth_cb
pub async fn github_callback(
    State(ctx): State<AppContext>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    oauth_callback(&ctx, ProviderKind::GitHub, query).await
}

/// GET /gitlab_oauth_cb
pub async fn gitlab_callback(
    State(ctx): State<AppContext>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    oauth_callback(&ctx, ProviderKind::GitLab, query).await
}

/// 302 跳转，`redirect_url` 为空时跳回根路径
fn found(redirect_url: &str) -> Response {
    let location = if redirect_url.is_empty() { "/" } else { redirect_url };
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// 不论成败都跳回 `redirect_url`；令牌保存失败只记日志
async fn oauth_callback(ctx: &AppContext, kind: ProviderKind, query: CallbackQuery) -> Response {
    let token = match ctx
        .oauth(kind)
        .exchange_code(&query.state, &query.code, &query.redirect_url, &query.user)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            lerror!(
                "system",
                LogStage::Authentication,
                LogComponent::OAuth,
                "exchange_failed",
                &format!("{kind} oauth exchange failed for {}: {e}", query.user)
            );
            return found(&query.redirect_url);
        }
    };

    match ctx.store.save_token(kind, &query.user, &token).await {
        Ok(()) => linfo!(
            "system",
            LogStage::Authentication,
            LogComponent::OAuth,
            "token_saved",
            &format!("{kind} authorized for {}", query.user)
        ),
        Err(e) => lerror!(
            "system",
            LogStage::Authentication,
            LogComponent::OAuth,
            "token_save_failed",
            &format!("save {kind} token error: {e}")
        ),
    }
    found(&query.redirect_url)
}

/// GET /repos/{source}
pub async fn list_repos(
    State(ctx): State<AppContext>,
    Path(source): Path<String>,
    Query(query): Query<ReposQuery>,
    headers: HeaderMap,
) -> ApiResult {
    let provider = provider(&ctx, &headers, &source).await?;
    let listing = provider.list_personal_repositories(query.use_cache()).await?;
    Ok(success(listing))
}

/// GET /repos/{source}/branches
pub async fn list_branches(
    State(ctx): State<AppContext>,
    Path(source): Path<String>,
    Query(query): Query<BranchQuery>,
    headers: HeaderMap,
) -> ApiResult {
    let provider = provider(&ctx, &headers, &source).await?;
    let branches = provider.list_branches(&query.owner, &query.repo).await?;
    Ok(success(branches))
}

/// GET /repos/{source}/secret
pub async fn ensure_secret(
    State(ctx): State<AppContext>,
    Path(source): Path<String>,
    Query(query): Query<NamespaceQuery>,
    headers: HeaderMap,
) -> ApiResult {
    if query.ns.is_empty() {
        return Err(GitterError::invalid_request("ns is required").into());
    }
    let provider = provider(&ctx, &headers, &source).await?;
    let secret = operations::ensure_secret(provider.as_ref(), &query.ns).await?;
    Ok(success(secret))
}

/// GET /repos/{source}/webhook
pub async fn check_webhook(
    State(ctx): State<AppContext>,
    Path(source): Path<String>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
) -> ApiResult {
    let provider = provider(&ctx, &headers, &source).await?;
    match provider.check_webhook(&query.ns, &query.bc).await? {
        Some(hook) => Ok(success(hook)),
        None => Err(GitterError::not_found(
            "webhook",
            WebhookRecord::compose_name(&query.ns, &query.bc),
        )
        .into()),
    }
}

/// POST /repos/{source}/webhook
pub async fn create_webhook(
    State(ctx): State<AppContext>,
    Path(source): Path<String>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    Json(hook): Json<WebhookRecord>,
) -> ApiResult {
    let provider = provider(&ctx, &headers, &source).await?;
    let hook = operations::create_webhook(provider.as_ref(), &query.ns, &query.bc, hook).await?;
    Ok(success(hook))
}

/// DELETE /repos/{source}/webhook/{hookid}
pub async fn remove_webhook(
    State(ctx): State<AppContext>,
    Path((source, hook_id)): Path<(String, String)>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
) -> ApiResult {
    let provider = provider(&ctx, &headers, &source).await?;
    operations::remove_webhook(provider.as_ref(), &query.ns, &query.bc, &hook_id).await?;
    Ok(success_without_data("webhook removed"))
}
