//! Server-sent event stream
//!
//! Replays recent matching events on connect, then forwards live
//! events. Wire format is data-only JSON frames with a heartbeat
//! comment every 30 seconds of inactivity.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use fxrecon_common::events::{EventFilter, EventPriority};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize, Default)]
pub struct StreamParams {
    /// Tenant whose events to follow; absent means all tenants
    pub client_id: Option<String>,
    /// Comma-separated event type names
    pub event_types: Option<String>,
    /// Comma-separated priorities (low, normal, high, critical)
    pub priority_filter: Option<String>,
    /// Bearer token, passed as a query parameter for EventSource
    /// compatibility
    pub token: Option<String>,
}

fn csv_list(raw: &Option<String>) -> Option<Vec<String>> {
    let raw = raw.as_deref()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn parse_priorities(raw: &Option<String>) -> Option<Vec<EventPriority>> {
    let names = csv_list(raw)?;
    let mut priorities = Vec::new();
    for name in names {
        match EventPriority::from_str(&name) {
            Ok(p) => priorities.push(p),
            Err(_) => warn!(priority = %name, "ignoring unknown priority in filter"),
        }
    }
    if priorities.is_empty() {
        None
    } else {
        Some(priorities)
    }
}

/// GET /events/stream
pub async fn event_stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if let Some(expected) = state.config.stream_token.as_deref() {
        if params.token.as_deref() != Some(expected) {
            return Err(ApiError::Forbidden("invalid stream token".to_string()));
        }
    }

    let filter = EventFilter {
        tenant_id: params.client_id.clone(),
        user_id: None,
        types: csv_list(&params.event_types),
        priorities: parse_priorities(&params.priority_filter),
    };
    info!(client_id = ?params.client_id, "event stream client connected");

    let mut subscription = state.event_bus.subscribe(filter);

    let stream = async_stream::stream! {
        for event in std::mem::take(&mut subscription.replay) {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok(Event::default().data(json)),
                Err(e) => warn!(%e, "failed to serialize replayed event"),
            }
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("event stream heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = subscription.rx.recv() => {
                    match received {
                        Some(event) => {
                            match serde_json::to_string(&event) {
                                Ok(json) => yield Ok(Event::default().data(json)),
                                Err(e) => warn!(%e, "failed to serialize event"),
                            }
                        }
                        // Bus dropped the subscriber; end the stream.
                        None => break,
                    }
                }
            }
        }
    };

    // The stream emits its own heartbeat comment frames.
    Ok(Sse::new(stream))
}
