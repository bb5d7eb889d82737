//! Confirmation upload endpoint
//!
//! Accepts one `.msg` or `.pdf` file as multipart form data and runs
//! the full ingestion pipeline synchronously, returning the per-email
//! reconciliation summary.

use crate::error::{ApiError, ApiResult};
use crate::ingest::{self, IngestError};
use crate::{db, AppState};
use axum::{
    extract::{Multipart, Path, State},
    routing::post,
    Json, Router,
};
use tracing::info;

/// POST /clients/{tenant_id}/emails/upload
pub async fn upload_email(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<crate::pipeline::IngestReport>> {
    let tenant = db::tenants::get_tenant(&state.db, &tenant_id).await?;

    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .ok_or_else(|| ApiError::BadRequest("file part needs a filename".to_string()))?
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read file part: {e}")))?;
        file = Some((filename, bytes.to_vec()));
    }
    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("missing file part".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
    }

    info!(tenant_id, filename, size = bytes.len(), "upload received");

    let unit = match ingest::unit_from_upload(&tenant, &filename, &bytes) {
        Ok(unit) => unit,
        Err(err @ IngestError::UnsupportedFileType(_)) => {
            return Err(ApiError::BadRequest(err.to_string()));
        }
        Err(err @ IngestError::Parse(_, _)) => {
            // Parse failures are a reported outcome, not a 4xx.
            return Ok(Json(crate::pipeline::IngestReport {
                success: false,
                email_id: uuid::Uuid::nil(),
                trades_extracted: 0,
                matches_found: 0,
                duplicates_found: 0,
                counterparty_name: None,
                matched_trade_numbers: Vec::new(),
                error: Some(err.to_string()),
            }));
        }
    };

    let report = state.pipeline.process_unit(unit).await;
    Ok(Json(report))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/clients/:tenant_id/emails/upload", post(upload_email))
}
