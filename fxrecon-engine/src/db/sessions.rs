//! Upload session audit trail

use super::StoreResult;
use fxrecon_common::model::{SessionStatus, UploadSession};
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn create_session(pool: &SqlitePool, session: &UploadSession) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO upload_sessions (
            id, tenant_id, file_name, file_type,
            records_processed, records_failed, status, started_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.id.to_string())
    .bind(&session.tenant_id)
    .bind(&session.file_name)
    .bind(&session.file_type)
    .bind(session.records_processed as i64)
    .bind(session.records_failed as i64)
    .bind(session.status.as_str())
    .bind(session.started_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_session(
    pool: &SqlitePool,
    session_id: Uuid,
    records_processed: u32,
    records_failed: u32,
    status: SessionStatus,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE upload_sessions
        SET records_processed = ?, records_failed = ?, status = ?
        WHERE id = ?
        "#,
    )
    .bind(records_processed as i64)
    .bind(records_failed as i64)
    .bind(status.as_str())
    .bind(session_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}
