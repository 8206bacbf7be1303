//! Axum JSON API for Grantwatch: manual sync trigger plus the grant read side.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use grantwatch_feed::{HttpFeedConfig, HttpFeedSource};
use grantwatch_store::{GrantQuery, GrantStore, PgGrantStore, StoreError};
use grantwatch_sync::{maybe_build_scheduler, SyncConfig, SyncPipeline};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

pub const CRATE_NAME: &str = "grantwatch-web";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SyncPipeline>,
    pub store: Arc<dyn GrantStore>,
}

impl AppState {
    pub fn new(pipeline: Arc<SyncPipeline>, store: Arc<dyn GrantStore>) -> Self {
        Self { pipeline, store }
    }
}

#[derive(Debug, Deserialize, Default)]
struct GrantsListQuery {
    agency: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/grants", get(grants_list_handler))
        .route("/grants/{external_id}", get(grant_detail_handler))
        .route("/admin/sync", post(admin_sync_handler))
        .with_state(Arc::new(state))
}

/// Build full production state from env config and serve until shutdown.
/// Starts the cron scheduler alongside the listener when enabled.
pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();
    let store = Arc::new(PgGrantStore::connect(&config.database_url).await?);
    let feed = Arc::new(HttpFeedSource::new(HttpFeedConfig {
        url: config.feed_url.clone(),
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: config.user_agent.clone(),
    })?);
    let pipeline = Arc::new(SyncPipeline::new(feed, store.clone()));

    if let Some(sched) = maybe_build_scheduler(pipeline.clone(), &config).await? {
        sched.start().await?;
        info!(cron = %config.sync_cron, "sync scheduler started");
    }

    let state = AppState::new(pipeline, store);
    let listener = TcpListener::bind(("0.0.0.0", config.web_port)).await?;
    info!(port = config.web_port, "grantwatch web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn healthz_handler() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

async fn admin_sync_handler(State(state): State<Arc<AppState>>) -> Response {
    let report = state.pipeline.run_once().await;
    Json(report).into_response()
}

async fn grants_list_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GrantsListQuery>,
) -> Response {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 200);
    let filter = GrantQuery::page(query.agency.clone(), page, per_page);

    let grants = match state.store.list(&filter).await {
        Ok(grants) => grants,
        Err(err) => return store_error(err),
    };
    let total = match state.store.count().await {
        Ok(total) => total,
        Err(err) => return store_error(err),
    };

    Json(serde_json::json!({
        "grants": grants,
        "page": page,
        "per_page": per_page,
        "total": total,
    }))
    .into_response()
}

async fn grant_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(external_id): AxumPath<String>,
) -> Response {
    match state.store.get_by_external_id(&external_id).await {
        Ok(Some(grant)) => Json(grant).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "grant not found" })),
        )
            .into_response(),
        Err(err) => store_error(err),
    }
}

fn store_error(err: StoreError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}
