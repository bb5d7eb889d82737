//! fxrecon-engine library interface
//!
//! Exposes the pipeline, store and HTTP surface for integration
//! testing.

pub mod api;
pub mod automation;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod matching;
pub mod pipeline;
pub mod tasks;

pub use crate::error::{ApiError, ApiResult};

use crate::automation::OutboundMailer;
use crate::config::EngineConfig;
use crate::pipeline::Pipeline;
use axum::Router;
use chrono::{DateTime, Utc};
use fxrecon_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Record store pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Resolved engine configuration
    pub config: Arc<EngineConfig>,
    /// Ingestion pipeline
    pub pipeline: Arc<Pipeline>,
    /// Outbound email binding; absent when no mailbox is configured
    pub mailer: Option<Arc<dyn OutboundMailer>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        config: Arc<EngineConfig>,
        pipeline: Arc<Pipeline>,
        mailer: Option<Arc<dyn OutboundMailer>>,
    ) -> Self {
        Self {
            db,
            event_bus,
            config,
            pipeline,
            mailer,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;
    use tower_http::trace::TraceLayer;

    Router::new()
        .merge(api::upload_routes())
        .route("/events/stream", get(api::event_stream))
        .merge(api::task_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
