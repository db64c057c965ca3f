use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::ServiceState;

pub mod api;
pub mod health;

/// Every request body is a small JSON document.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/status", get(health::status::handler))
        .merge(api::router(state))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, HttpServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| HttpServerError::Bind { addr, source })
}

/// Serve the API until `shutdown` fires or its sender is dropped.
pub async fn serve(
    listener: TcpListener,
    state: ServiceState,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            tracing::info!("api server shutting down");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::database::Database;
    use crate::runtime::fake::FakeRuntime;
    use crate::workspace::{Settings, SharedRuntime};

    struct TestApp {
        _temp: TempDir,
        state: ServiceState,
        fake: Arc<FakeRuntime>,
    }

    impl TestApp {
        async fn new() -> Self {
            let temp = tempfile::tempdir().unwrap();
            let settings =
                Settings::new(temp.path().join("playground"), temp.path().join("contributions"))
                    .prepare()
                    .unwrap();
            let fake = Arc::new(FakeRuntime::new());
            let runtime: SharedRuntime = fake.clone();
            let database = Database::in_memory().await.unwrap();
            let state = ServiceState::with_runtime(database, runtime, settings);
            Self {
                _temp: temp,
                state,
                fake,
            }
        }

        async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            let response = router(self.state.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.send(Method::POST, uri, Some(body)).await
        }

        /// alice owns `web`; bob exists.
        async fn with_project(&self) {
            for username in ["alice", "bob"] {
                let (status, _) = self.post("/users", json!({"username": username})).await;
                assert_eq!(status, StatusCode::CREATED);
            }
            let (status, _) = self
                .post("/directories/claim", json!({"username": "alice", "path": "web"}))
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }
    }

    #[tokio::test]
    async fn test_status_reports_ok() {
        let app = TestApp::new().await;
        let (status, body) = app.send(Method::GET, "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_create_user_then_conflict() {
        let app = TestApp::new().await;
        let (status, body) = app.post("/users", json!({"username": "alice"})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["message"].as_str().unwrap().contains("alice"));

        let (status, body) = app.post("/users", json!({"username": "alice"})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "user_exists");
    }

    #[tokio::test]
    async fn test_create_user_rejects_missing_and_invalid_names() {
        let app = TestApp::new().await;
        let (status, body) = app.post("/users", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_username");

        let (status, body) = app.post("/users", json!({"username": "../root"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_username");
    }

    #[tokio::test]
    async fn test_claim_status_codes() {
        let app = TestApp::new().await;
        app.with_project().await;

        let (status, body) = app
            .post("/directories/claim", json!({"username": "alice", "path": "web"}))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already_claimed");

        let (status, body) = app
            .post("/directories/claim", json!({"username": "alice", "path": "../bob/x"}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "path_outside_sandbox");

        let (status, body) = app
            .post("/directories/claim", json!({"username": "carol", "path": "web"}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "user_not_found");

        let (status, _) = app.post("/directories/claim", json!({"username": "alice"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_claim_returns_absolute_path() {
        let app = TestApp::new().await;
        app.with_project().await;
        let (status, body) = app
            .post("/directories/claim", json!({"username": "bob", "path": "docs/notes"}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let expected = app.state.settings().sandbox_root.join("bob/docs/notes");
        assert_eq!(body["path"], expected.to_str().unwrap());
        assert!(expected.is_dir());
    }

    #[tokio::test]
    async fn test_session_requires_username_unless_guest() {
        let app = TestApp::new().await;
        let (status, body) = app.post("/session", json!({"path": "alice/web"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_username");

        let (status, body) = app.post("/session", json!({"is_guest": true})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["container_name"].as_str().unwrap().starts_with("guest_"));
        assert!(body.get("contribution_id").is_none());
    }

    #[tokio::test]
    async fn test_session_for_owner_is_reused() {
        let app = TestApp::new().await;
        app.with_project().await;

        let (status, first) = app
            .post("/session", json!({"username": "alice", "path": "alice/web"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["container_name"], "session_alice");

        let (status, second) = app.post("/session", json!({"username": "alice"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["container_name"], "session_alice");
        assert_eq!(app.fake.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_session_on_unclaimed_path_is_a_guest() {
        let app = TestApp::new().await;
        app.with_project().await;
        let (status, body) = app
            .post("/session", json!({"username": "bob", "path": "alice/elsewhere"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["container_name"].as_str().unwrap().starts_with("guest_"));
    }

    #[tokio::test]
    async fn test_session_path_outside_sandbox_is_rejected() {
        let app = TestApp::new().await;
        let (status, body) = app
            .post("/session", json!({"username": "bob", "path": "../../etc"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_path");
        assert!(app.fake.runs().is_empty());
    }

    #[tokio::test]
    async fn test_contribution_lifecycle_over_http() {
        let app = TestApp::new().await;
        app.with_project().await;

        let (status, session) = app
            .post("/session", json!({"username": "bob", "path": "alice/web"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        let contribution_id = session["contribution_id"].as_str().unwrap().to_string();
        let container = session["container_name"].as_str().unwrap().to_string();
        assert!(container.starts_with("contrib_bob_for_alice_web_"));

        let (status, listed) = app.send(Method::GET, "/contributions/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["contribution_id"], contribution_id.as_str());

        let (status, _) = app
            .post("/session/heartbeat", json!({"container_name": container}))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .send(
                Method::DELETE,
                "/contributions/delete",
                Some(json!({"contribution_id": contribution_id})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, listed) = app.send(Method::GET, "/contributions/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed, json!([]));

        let (status, body) = app
            .post("/contributions/merge", json!({"contribution_id": contribution_id}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "contribution_not_found");
    }

    #[tokio::test]
    async fn test_contribution_endpoints_validate_input() {
        let app = TestApp::new().await;
        let (status, _) = app.post("/contributions/merge", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(Method::DELETE, "/contributions/delete", Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app.send(Method::GET, "/contributions/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "user_not_found");
    }

    #[tokio::test]
    async fn test_heartbeat_status_codes() {
        let app = TestApp::new().await;
        let (status, _) = app.post("/session/heartbeat", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .post("/session/heartbeat", json!({"container_name": "session_ghost"}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");
    }
}
