//! Task queue callbacks
//!
//! One POST endpoint per queue family. Origin verification accepts a
//! request iff the queue-name header exactly matches the queue in the
//! path; a failure response triggers the scheduler's retry policy.

use crate::error::{ApiError, ApiResult};
use crate::tasks::{QueueName, TaskPayload, QUEUE_NAME_HEADER};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use fxrecon_common::events::{EventPriority, SystemEvent};
use serde_json::json;
use tracing::{info, warn};

/// POST /internal/tasks/{queue}
pub async fn handle_task(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<TaskPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    let queue = QueueName::parse(&queue)
        .ok_or_else(|| ApiError::NotFound(format!("unknown queue: {queue}")))?;

    let header_queue = headers
        .get(QUEUE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(QueueName::parse);
    if header_queue != Some(queue) {
        warn!(%queue, task_id = %payload.task_id, "task callback with bad origin header");
        return Err(ApiError::Forbidden(
            "queue-name header does not match the target queue".to_string(),
        ));
    }

    info!(
        %queue,
        task_id = %payload.task_id,
        task_type = %payload.task_type,
        "task callback received"
    );
    execute_task(&state, &payload).await?;
    Ok(Json(json!({ "success": true, "task_id": payload.task_id })))
}

async fn execute_task(state: &AppState, payload: &TaskPayload) -> ApiResult<()> {
    match payload.task_type.as_str() {
        "send_confirmation_email" | "send_dispute_email" => {
            let data = &payload.data;
            let to = data["to"]
                .as_str()
                .ok_or_else(|| ApiError::BadRequest("task data missing 'to'".to_string()))?;
            let cc: Vec<String> = data["cc"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            let subject = data["subject"].as_str().unwrap_or_default();
            let body = data["body"].as_str().unwrap_or_default();

            let Some(mailer) = state.mailer.as_ref() else {
                warn!(task_id = %payload.task_id, "no outbound mailer configured, dropping email task");
                return Ok(());
            };
            let message_id = mailer
                .send(to, &cc, subject, body)
                .await
                .map_err(|e| ApiError::Internal(format!("email send failed: {e}")))?;

            state.event_bus.publish(
                SystemEvent::new(
                    "email_sent",
                    EventPriority::Normal,
                    "Auto-reply sent",
                    format!("{} delivered to {to}", payload.task_type),
                )
                .with_payload(json!({
                    "task_id": payload.task_id,
                    "message_id": message_id,
                    "tenant_id": data["tenant_id"],
                })),
            );
            Ok(())
        }
        other => Err(ApiError::BadRequest(format!("unknown task type: {other}"))),
    }
}

pub fn task_routes() -> Router<AppState> {
    Router::new().route("/internal/tasks/:queue", post(handle_task))
}
