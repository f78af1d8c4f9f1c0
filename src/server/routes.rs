//! # 路由配置

use axum::Router;
use axum::routing::{delete, get};
use tower_http::trace::TraceLayer;

use crate::app::AppContext;
use crate::server::handlers;

/// 创建所有路由
pub fn create_routes(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(oauth_routes())
        .merge(repo_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// OAuth 授权与回调
fn oauth_routes() -> Router<AppContext> {
    Router::new()
        .route("/authorize/{source}", get(handlers::authorize))
        .route("/github_oauth_cb", get(handlers::github_callback))
        .route("/gitlab_oauth_cb", get(handlers::gitlab_callback))
}

/// 仓库、分支、secret 与 webhook
fn repo_routes() -> Router<AppContext> {
    Router::new()
        .route("/repos/{source}", get(handlers::list_repos))
        .route("/repos/{source}/branches", get(handlers::list_branches))
        .route("/repos/{source}/secret", get(handlers::ensure_secret))
        .route(
            "/repos/{source}/webhook",
            get(handlers::check_webhook).post(handlers::create_webhook),
        )
        .route(
            "/repos/{source}/webhook/{hookid}",
            delete(handlers::remove_webhook),
        )
}
