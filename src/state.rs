use crate::config::Config;
use crate::middleware::RateLimiter;
use crate::workflow::WorkflowEngine;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub workflow: WorkflowEngine,
    pub login_limiter: RateLimiter,
    pub webhook_limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;

/// What one housekeeping pass removed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub login_keys: usize,
    pub webhook_keys: usize,
    pub event_ids: usize,
}

impl AppState {
    /// Forgets idle rate-limit keys and expired workflow event ids.
    pub async fn prune_expired(&self) -> PruneReport {
        PruneReport {
            login_keys: self.login_limiter.cleanup().await,
            webhook_keys: self.webhook_limiter.cleanup().await,
            event_ids: self.workflow.prune(),
        }
    }
}
