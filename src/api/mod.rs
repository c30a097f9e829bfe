// src/api/mod.rs — Session-handoff listener
//
// The hosting marketplace dashboard can push a one-time token + profile to
// a running client instead of making the user re-enter credentials. Only
// requests whose Origin header exactly matches the configured parent
// origin are accepted; everything else is turned away without detail. The
// next CLI invocation picks the new session up from the credential store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::auth::RolesWire;
use crate::infra::config::HandoffConfig;
use crate::infra::errors::VendoraError;
use crate::infra::session::{CredentialStore, Session};

#[derive(Clone)]
pub struct ApiState {
    pub expected_origin: String,
    pub store: Arc<CredentialStore>,
    accepted: Arc<AtomicBool>,
    done: Arc<tokio::sync::Notify>,
}

impl ApiState {
    pub fn new(expected_origin: String, store: Arc<CredentialStore>) -> Self {
        Self {
            expected_origin,
            store,
            accepted: Arc::new(AtomicBool::new(false)),
            done: Arc::new(tokio::sync::Notify::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HandoffRequest {
    pub token: String,
    pub user: HandoffUser,
}

#[derive(Debug, Deserialize)]
pub struct HandoffUser {
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub roles: RolesWire,
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub vendor_slug: Option<String>,
}

/// Build the axum router.
pub fn build_router(state: ApiState) -> Router {
    let cors = match state.expected_origin.parse::<axum::http::HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        Err(_) => CorsLayer::new(),
    };

    Router::new()
        .route("/handoff", post(accept_handoff))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn accept_handoff(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<HandoffRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if origin != state.expected_origin {
        tracing::debug!(origin, "ignoring handoff from unexpected origin");
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "accepted": false })),
        );
    }

    if state.accepted.swap(true, Ordering::SeqCst) {
        return (
            StatusCode::GONE,
            Json(serde_json::json!({ "accepted": false, "error": "handoff already consumed" })),
        );
    }

    let session = Session {
        token: request.token,
        user_id: request.user.user_id,
        email: request.user.email,
        display_name: request.user.display_name,
        roles: request.user.roles.into_set(),
        vendor_slug: request.user.vendor_slug,
    };

    if let Err(e) = state.store.save(&session) {
        tracing::error!("failed to persist handoff session: {e}");
        state.accepted.store(false, Ordering::SeqCst);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "accepted": false })),
        );
    }

    tracing::info!(email = %session.email, "session handoff accepted");
    state.done.notify_one();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "accepted": true })),
    )
}

/// Announce readiness to the hosting parent (best effort — a missing or
/// unreachable parent is not an error).
async fn announce_ready(config: &HandoffConfig) {
    let Some(url) = &config.parent_ready_url else {
        return;
    };
    let client = reqwest::Client::new();
    if let Err(e) = client
        .post(url)
        .json(&serde_json::json!({ "ready": true }))
        .send()
        .await
    {
        tracing::debug!("ready announcement failed: {e}");
    }
}

/// Serve the handoff listener on loopback until one handoff is accepted.
pub async fn run_handoff_listener(
    config: &HandoffConfig,
    store: Arc<CredentialStore>,
) -> Result<(), VendoraError> {
    let state = ApiState::new(config.expected_origin.clone(), store);
    let done = state.done.clone();
    let router = build_router(state);

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(VendoraError::Io)?;
    tracing::info!("handoff listener on http://{addr}");

    announce_ready(config).await;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            done.notified().await;
        })
        .await
        .map_err(VendoraError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const ORIGIN: &str = "https://market.vendora.app";

    fn test_state(dir: &tempfile::TempDir) -> ApiState {
        ApiState::new(
            ORIGIN.into(),
            Arc::new(CredentialStore::at(dir.path().join("session.json"))),
        )
    }

    fn handoff_request(origin: Option<&str>) -> Request<Body> {
        let body = serde_json::json!({
            "token": "jwt-new",
            "user": {
                "email": "vendor@example.com",
                "display_name": "Vendor Co",
                "roles": ["vendor"],
                "user_id": 7,
                "vendor_slug": "vendor-co"
            }
        });
        let mut builder = Request::builder()
            .method("POST")
            .uri("/handoff")
            .header("content-type", "application/json");
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir));
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_handoff_rejects_unexpected_origin() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let store = state.store.clone();
        let app = build_router(state);

        let resp = app
            .oneshot(handoff_request(Some("https://evil.example.com")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn test_handoff_rejects_missing_origin() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir));
        let resp = app.oneshot(handoff_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_handoff_persists_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let store = state.store.clone();
        let app = build_router(state);

        let resp = app.oneshot(handoff_request(Some(ORIGIN))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let session = store.load().unwrap();
        assert_eq!(session.token, "jwt-new");
        assert_eq!(session.email, "vendor@example.com");
        assert!(session.has_role("vendor"));
    }

    #[tokio::test]
    async fn test_handoff_is_one_time() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir));

        let resp = app
            .clone()
            .oneshot(handoff_request(Some(ORIGIN)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.oneshot(handoff_request(Some(ORIGIN))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::GONE);
    }
}
