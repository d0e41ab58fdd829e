use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::user::user_router;
use crate::auth::TokenGenerator;
use crate::config::ServerConfig;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: TokenGenerator,
    /// Lifetime of tokens issued by login. `None` issues non-expiring tokens.
    pub token_ttl: Option<chrono::Duration>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: &ServerConfig) -> Self {
        Self {
            store,
            tokens: TokenGenerator::new(),
            token_ttl: config.token_ttl(),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", user_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode, header};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::store::SqliteStore;

    fn test_router() -> (TempDir, Router) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        let state = Arc::new(AppState::new(Arc::new(store), &ServerConfig::default()));
        (temp, create_router(state))
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (_temp, app) = test_router();

        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_challenges() {
        let (_temp, app) = test_router();

        let response = app
            .oneshot(
                HttpRequest::get("/api/v1/calendars")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"calshare\""
        );
    }

    fn json_post(uri: &str, body: serde_json::Value) -> HttpRequest<Body> {
        HttpRequest::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_with_overflowing_ttl_fails_cleanly() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        let mut state = AppState::new(Arc::new(store), &ServerConfig::default());
        state.token_ttl = Some(chrono::Duration::MAX);
        let app = create_router(Arc::new(state));

        let credentials = serde_json::json!({
            "email": "ttl@example.com",
            "name": "TTL",
            "password": "correct-horse-battery",
        });
        let response = app
            .clone()
            .oneshot(json_post("/api/v1/auth/register", credentials.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(json_post("/api/v1/auth/login", credentials))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
