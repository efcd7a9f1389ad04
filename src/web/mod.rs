pub mod auth;
pub mod extract;
pub mod response;
pub mod session;
pub mod tickets;
pub mod users;
pub mod workflow;

use crate::error::ApiError;
use crate::state::SharedState;
use axum::{routing::get, Router};
use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn normalized(&self) -> (i64, i64) {
        normalize_page(self.page, self.limit)
    }
}

/// 1-based page and a limit clamped to `1..=MAX_PAGE_SIZE`.
pub fn normalize_page(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

async fn health() -> &'static str {
    "OK"
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

/// Every API route, to be nested under `/api`.
pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/users", users::router(state.clone()))
        .nest("/tickets", tickets::router(state.clone()))
        .nest("/inngest", workflow::router(state))
        .fallback(not_found)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::middleware::RateLimiter;
    use crate::state::AppState;
    use crate::workflow::ticket_created::tests::{FixedTriage, MemoryStore, RecordingNotifier};
    use crate::workflow::ticket_created::{TicketStore, WorkflowOutcome};
    use crate::workflow::{RetryPolicy, TicketCreatedWorkflow, WorkflowEngine};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::{engine::general_purpose, Engine as _};
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    pub(crate) fn test_config(signing_key: Option<&str>) -> Config {
        let key = general_purpose::STANDARD.encode([9u8; 32]);
        let signing_key = signing_key.map(str::to_string);
        Config::from_lookup(|k| match k {
            "DATABASE_URL" => Some("postgres://localhost:1/unused".to_string()),
            "SESSION_KEY" => Some(key.clone()),
            "WORKFLOW_SIGNING_KEY" => signing_key.clone(),
            _ => None,
        })
        .unwrap()
    }

    /// Never connects: requests using it must be rejected before any query.
    pub(crate) fn lazy_pool(config: &Config) -> PgPool {
        PgPoolOptions::new().connect_lazy(&config.database_url).unwrap()
    }

    pub(crate) fn state_from(
        config: Config,
        pool: PgPool,
        store: Arc<dyn TicketStore>,
        outcomes: Option<mpsc::UnboundedSender<WorkflowOutcome>>,
    ) -> SharedState {
        let workflow = Arc::new(TicketCreatedWorkflow::new(
            store,
            Arc::new(FixedTriage(None)),
            Arc::new(RecordingNotifier::default()),
            RetryPolicy::once(),
            config.app_url.clone(),
        ));
        let (engine, _handle) = WorkflowEngine::start(workflow, Duration::from_secs(60), outcomes);

        Arc::new(AppState {
            pool,
            config: Arc::new(config),
            workflow: engine,
            login_limiter: RateLimiter::new(5, 60),
            webhook_limiter: RateLimiter::new(120, 60),
        })
    }

    pub(crate) fn test_state() -> SharedState {
        let config = test_config(None);
        let pool = lazy_pool(&config);
        state_from(config, pool, Arc::new(MemoryStore::default()), None)
    }

    pub(crate) fn state_with_limiters(login: RateLimiter, webhook: RateLimiter) -> SharedState {
        let mut state = (*test_state()).clone();
        state.login_limiter = login;
        state.webhook_limiter = webhook;
        Arc::new(state)
    }

    pub(crate) async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_normalize_page() {
        assert_eq!(normalize_page(None, None), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(normalize_page(Some(0), Some(0)), (1, 1));
        assert_eq!(normalize_page(Some(3), Some(1000)), (3, MAX_PAGE_SIZE));
    }

    #[tokio::test]
    async fn test_health() {
        let app = routes(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_tickets_require_session() {
        let app = routes(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tickets")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"title":"Cannot login","description":"Nothing happens"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["statusCode"], 401);
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_forged_token_rejected() {
        let app = routes(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/users/me")
                    .header("authorization", "Bearer bm90.dmFsaWQ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["message"], "Invalid or expired session");
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let app = routes(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
        assert!(cookie.contains("Max-Age=0"));
        assert_eq!(body_json(resp).await["message"], "Logged out");
    }

    #[tokio::test]
    async fn test_unknown_route_uses_envelope() {
        let app = routes(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["statusCode"], 404);
    }
}
