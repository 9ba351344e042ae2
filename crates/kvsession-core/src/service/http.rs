use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::session::{KvStore, Registry, SessionValue};

/// Cookie name used by the demo endpoints.
pub const SESSION_NAME: &str = "kvsession";

/// Shared application state for the HTTP API.
pub struct AppState {
    pub store: KvStore,
    pub config: Config,
}

impl AppState {
    pub fn new(store: KvStore, config: Config) -> Self {
        Self { store, config }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CounterResponse {
    count: i64,
    is_new: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    backend: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// Build the router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/incr", get(handle_incr))
        .route("/logout", get(handle_logout))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /incr: bump the session counter. The first request of a session reports 1.
async fn handle_incr(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let mut registry = Registry::new();
    let (count, is_new) = {
        let (session, err) = state.store.get(&mut registry, &headers, SESSION_NAME).await;
        if let Some(e) = err {
            debug!("Starting a new session: {}", e);
        }
        let count = session
            .get("count")
            .and_then(SessionValue::as_i64)
            .unwrap_or(0)
            + 1;
        session.insert("count", count);
        (count, session.is_new)
    };

    let mut response_headers = HeaderMap::new();
    if let Err(e) = registry.save_all(&state.store, &mut response_headers).await {
        error!("Failed to save session: {}", e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
    }

    (
        StatusCode::OK,
        response_headers,
        Json(CounterResponse { count, is_new }),
    )
        .into_response()
}

/// GET /logout: delete the session record and expire the cookie
async fn handle_logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let mut registry = Registry::new();
    {
        let (session, _) = state.store.get(&mut registry, &headers, SESSION_NAME).await;
        session.options.max_age = -1;
    }

    let mut response_headers = HeaderMap::new();
    if let Err(e) = registry.save_all(&state.store, &mut response_headers).await {
        error!("Failed to delete session: {}", e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// GET /health: health check
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        backend: state.config.backend.kind.to_string(),
    })
}

/// Start the HTTP server on the given address.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::http::{HeaderValue, Request};
    use tower::ServiceExt;

    use super::*;
    use crate::backend::MemoryRecordStore;
    use crate::codec::KeyPair;

    async fn test_state() -> (Arc<MemoryRecordStore>, Arc<AppState>) {
        let backend = Arc::new(MemoryRecordStore::new());
        let store = KvStore::new(backend.clone(), &[KeyPair::new(b"http-test-key".to_vec())])
            .await
            .unwrap();
        (backend, Arc::new(AppState::new(store, Config::default())))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn cookie_from(response: &Response) -> HeaderValue {
        let line = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        HeaderValue::from_str(line.split(';').next().unwrap()).unwrap()
    }

    fn get(uri: &str, cookie: Option<HeaderValue>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_, state) = test_state().await;
        let response = create_router(state).oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["backend"], "memory");
    }

    #[tokio::test]
    async fn test_incr_persists_between_requests() {
        let (backend, state) = test_state().await;
        let router = create_router(state);

        let first = router.clone().oneshot(get("/incr", None)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let cookie = cookie_from(&first);
        let json = body_json(first).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["isNew"], true);
        assert_eq!(backend.len(), 1);

        let second = router.oneshot(get("/incr", Some(cookie))).await.unwrap();
        let json = body_json(second).await;
        assert_eq!(json["count"], 2);
        assert_eq!(json["isNew"], false);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_logout_deletes_record() {
        let (backend, state) = test_state().await;
        let router = create_router(state);

        let first = router.clone().oneshot(get("/incr", None)).await.unwrap();
        let cookie = cookie_from(&first);
        assert_eq!(backend.len(), 1);

        let response = router.oneshot(get("/logout", Some(cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(backend.is_empty());
        let line = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(line.starts_with("kvsession=;"));
    }

    #[tokio::test]
    async fn test_incr_with_forged_cookie_starts_over() {
        let (_, state) = test_state().await;
        let response = create_router(state)
            .oneshot(get("/incr", Some(HeaderValue::from_static("kvsession=bogus"))))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["isNew"], true);
    }
}
