mod config;
mod db;
mod domain;
mod error;
mod messages;
mod middleware;
mod services;
mod state;
mod web;
mod workflow;

use crate::config::Config;
use crate::db::seed;
use crate::middleware::RateLimiter;
use crate::services::{ai::AiService, mailer::Mailer};
use crate::state::SharedState;
use crate::workflow::{PgTicketStore, RetryPolicy, TicketCreatedWorkflow, WorkflowEngine};
use axum::{http::HeaderValue, Router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_DEDUP_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
    tracing::info!("Database migrations completed");

    seed::seed_admin(&pool, &config).await?;

    let ai = Arc::new(AiService::new(config.openai_api_key.clone(), config.openai_model.clone()));
    let mailer = Arc::new(Mailer::from_config(config.smtp.as_ref())?);

    let ticket_workflow = Arc::new(TicketCreatedWorkflow::new(
        Arc::new(PgTicketStore::new(pool.clone())),
        ai,
        mailer,
        RetryPolicy::new(config.workflow_max_attempts, Duration::from_millis(500)),
        config.app_url.clone(),
    ));
    let (engine, _dispatcher) = WorkflowEngine::start(ticket_workflow, EVENT_DEDUP_WINDOW, None);

    let shared: SharedState = Arc::new(state::AppState {
        pool,
        config: config.clone(),
        workflow: engine,
        login_limiter: RateLimiter::new(5, 60),
        webhook_limiter: RateLimiter::new(120, 60),
    });

    // Housekeeping - prune both rate limiters and the event dedup cache hourly
    let scheduler = JobScheduler::new().await?;
    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                let report = state.prune_expired().await;
                tracing::info!(
                    "Housekeeping: pruned {} login keys, {} webhook keys, {} workflow event ids",
                    report.login_keys,
                    report.webhook_keys,
                    report.event_ids
                );
            })
        })?)
        .await?;
    scheduler.start().await?;
    tracing::info!("Scheduler started: hourly housekeeping");

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_credentials(true)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION]),
        None => CorsLayer::new(),
    };

    let app = Router::new()
        .nest("/api", web::routes(shared.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
