//! 远端 HTTP 客户端：分页头、请求体格式和错误映射

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gitter::auth::{OAuthConnector, OAuthSettings};
use gitter::config::PlatformConfig;
use gitter::error::GitterError;
use gitter::platform::{IdentityResolver, PlatformApi, PlatformClient};
use gitter::providers::{GitHubApi, GitHubClient, GitLabApi, GitLabClient};
use gitter::types::ProviderKind;

fn platform(server: &MockServer) -> PlatformClient {
    PlatformClient::new(&PlatformConfig {
        api_server: server.uri(),
        ..PlatformConfig::default()
    })
    .unwrap()
}

fn last_body(requests: &[wiremock::Request]) -> Value {
    serde_json::from_slice(&requests.last().unwrap().body).unwrap()
}

#[tokio::test]
async fn github_follows_link_header() {
    let server = MockServer::start().await;
    let next = format!("<{}/user/repos?per_page=30&page=2>; rel=\"next\"", server.uri());

    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer gh-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!([{
                    "id": 1, "name": "a1",
                    "owner": {"login": "alice", "type": "User"},
                    "clone_url": "https://github.com/alice/a1.git",
                    "private": true,
                }])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = GitHubClient::new(reqwest::Client::new(), server.uri(), "gh-token", false);

    let first = client.list_repositories(1).await.unwrap();
    assert_eq!(first.next_page, Some(2));
    assert_eq!(first.items[0].owner.login, "alice");
    assert!(first.items[0].private);

    let second = client.list_repositories(2).await.unwrap();
    assert!(second.items.is_empty());
    assert_eq!(second.next_page, None);
}

#[tokio::test]
async fn github_hook_body_carries_push_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/alice/demo/hooks"))
        .and(body_partial_json(json!({
            "name": "web",
            "events": ["push"],
            "config": {
                "url": "https://platform.example.com/hook",
                "content_type": "json",
                "insecure_ssl": "1",
            },
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 77})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/repos/alice/demo/hooks/77"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = GitHubClient::new(reqwest::Client::new(), server.uri(), "gh-token", true);
    let id = client
        .create_hook("alice", "demo", "https://platform.example.com/hook")
        .await
        .unwrap();
    assert_eq!(id, 77);
    client.delete_hook("alice", "demo", 77).await.unwrap();
}

#[tokio::test]
async fn github_rejected_token_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/alice/demo/branches"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/repos/alice/demo/hooks/5"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    let client = GitHubClient::new(reqwest::Client::new(), server.uri(), "stale", false);
    let err = client.list_branches("alice", "demo", 1).await.unwrap_err();
    assert!(err.is_unauthorized());

    let err = client.delete_hook("alice", "demo", 5).await.unwrap_err();
    match err {
        GitterError::RemoteApi {
            provider,
            status,
            message,
        } => {
            assert_eq!(provider, "github");
            assert_eq!(status, 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn gitlab_follows_next_page_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("membership", "true"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "2")
                .set_body_json(json!([{
                    "id": 5, "name": "p1",
                    "namespace": {"name": "bob", "path": "bob"},
                    "owner": {"id": 1},
                    "visibility": "public",
                }])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/team%2Flib/repository/branches"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "")
                .set_body_json(json!([{"name": "main", "commit": {"id": "c0ffee"}}])),
        )
        .mount(&server)
        .await;

    let client = GitLabClient::new(
        reqwest::Client::new(),
        format!("{}/api/v4", server.uri()),
        "gl-token",
        false,
    );

    let page = client.list_projects(1).await.unwrap();
    assert_eq!(page.next_page, Some(2));
    assert!(page.items[0].is_personal());
    assert!(!page.items[0].is_private());

    let branches = client.list_branches("team%2Flib", 1).await.unwrap();
    assert_eq!(branches.next_page, None);
    assert_eq!(branches.items[0].commit.id, "c0ffee");
}

#[tokio::test]
async fn gitlab_registers_ssh_key_and_hook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/user/keys"))
        .and(body_partial_json(json!({"title": "gitter-pull-secret"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 314,
            "created_at": "2026-01-02T03:04:05Z",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v4/projects/17/hooks"))
        .and(body_partial_json(json!({
            "url": "https://platform.example.com/hook",
            "push_events": true,
            "enable_ssl_verification": false,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    let client = GitLabClient::new(
        reqwest::Client::new(),
        format!("{}/api/v4", server.uri()),
        "gl-token",
        false,
    );

    let key = client
        .add_ssh_key("gitter-pull-secret", "ssh-rsa AAAA rsa-key-20260102")
        .await
        .unwrap();
    assert_eq!(key.id, 314);
    assert!(key.created_at.is_some());

    let hook = client
        .add_project_hook("17", "https://platform.example.com/hook")
        .await
        .unwrap();
    assert_eq!(hook, 9);

    let requests = server.received_requests().await.unwrap();
    let key_request: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(key_request["key"], "ssh-rsa AAAA rsa-key-20260102");
}

#[tokio::test]
async fn platform_secret_body_is_base64_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/namespaces/ns1/secrets"))
        .and(header("authorization", "Bearer alice-token"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"metadata": {"name": "github-alice-abcd1234"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = platform(&server);
    let data = BTreeMap::from([("password".to_string(), "gho_secret".to_string())]);
    let name = client
        .create_secret("alice-token", "ns1", "github-alice-abcd1234", &data)
        .await
        .unwrap();
    assert_eq!(name, "github-alice-abcd1234");

    let body = last_body(&server.received_requests().await.unwrap());
    assert_eq!(body["kind"], "Secret");
    assert_eq!(body["metadata"]["name"], "github-alice-abcd1234");
    assert_eq!(body["data"]["password"], STANDARD.encode("gho_secret"));
}

#[tokio::test]
async fn platform_errors_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/namespaces/denied/secrets"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/namespaces/taken/secrets"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "kind": "Status",
            "code": 409,
            "message": "secrets \"x\" already exists",
        })))
        .mount(&server)
        .await;

    let client = platform(&server);
    let data = BTreeMap::new();

    let err = client
        .create_secret("alice-token", "denied", "x", &data)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let err = client
        .create_secret("alice-token", "taken", "x", &data)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GitterError::RemoteApi { status: 409, ref message, .. } if message.contains("already exists")
    ));

    let err = client.create_secret("  ", "ns1", "x", &data).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn platform_whoami_returns_user_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oapi/v1/users/~"))
        .and(header("authorization", "Bearer alice-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "User",
            "metadata": {"name": "alice"},
        })))
        .mount(&server)
        .await;

    let client = platform(&server);
    assert_eq!(client.whoami("Bearer alice-token").await.unwrap(), "alice");
    assert!(client.whoami("other").await.is_err());
}

fn oauth(server: &MockServer, state: &str) -> OAuthConnector {
    OAuthConnector::with_state(
        ProviderKind::GitLab,
        OAuthSettings {
            client_id: "app".to_string(),
            client_secret: "shh".to_string(),
            authorize_url: format!("{}/oauth/authorize", server.uri()),
            token_url: format!("{}/oauth/token", server.uri()),
            callback_url: "https://gitter.example.com/gitlab_oauth_cb".to_string(),
            scopes: vec!["api".to_string()],
        },
        reqwest::Client::new(),
        state.to_string(),
    )
}

#[tokio::test]
async fn oauth_code_exchange_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("client_secret=shh"))
        .and(body_string_contains("redirect_uri=https%3A%2F%2Fgitter.example.com%2Fgitlab_oauth_cb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "glpat-1",
            "token_type": "bearer",
            "refresh_token": "r1",
            "expires_in": 7200,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connector = oauth(&server, "s1");
    let token = connector
        .exchange_code("s1", "abc", "https://console.example.com", "bob")
        .await
        .unwrap();

    assert_eq!(token.access_token, "glpat-1");
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    assert!(token.expiry.is_some());
}

#[tokio::test]
async fn oauth_exchange_rejects_bad_state_and_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired.",
        })))
        .mount(&server)
        .await;

    let connector = oauth(&server, "s1");

    let err = connector
        .exchange_code("forged", "abc", "https://console.example.com", "bob")
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert!(server.received_requests().await.unwrap().is_empty());

    let err = connector
        .exchange_code("s1", "abc", "https://console.example.com", "bob")
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn oauth_exchange_maps_token_endpoint_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("code=expired"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "The provided authorization grant is invalid.",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("code=boom"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let connector = oauth(&server, "s1");

    let err = connector
        .exchange_code("s1", "expired", "https://console.example.com", "bob")
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let err = connector
        .exchange_code("s1", "boom", "https://console.example.com", "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, GitterError::RemoteApi { .. }));
    assert!(!err.is_unauthorized());
}
