//! Email record persistence and nested extracted-trade updates

use super::{StoreError, StoreResult};
use fxrecon_common::model::{DuplicateInfo, EmailRecord, LlmPayload};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Persist a new email record; returns its ID.
pub async fn save_email(pool: &SqlitePool, email: &EmailRecord) -> StoreResult<Uuid> {
    let payload = serde_json::to_string(&email.llm_payload)
        .map_err(|e| StoreError::Fatal(format!("failed to serialize payload: {e}")))?;
    let duplicate_info = serde_json::to_string(&email.duplicate_info)
        .map_err(|e| StoreError::Fatal(format!("failed to serialize duplicate info: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO emails (
            id, tenant_id, sender_email, subject, email_date, email_time,
            body, source_file, llm_payload, has_duplicates, duplicate_info,
            extraction_failed, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(email.id.to_string())
    .bind(&email.tenant_id)
    .bind(&email.sender_email)
    .bind(&email.subject)
    .bind(&email.email_date)
    .bind(&email.email_time)
    .bind(&email.body)
    .bind(&email.source_file)
    .bind(payload)
    .bind(email.has_duplicates as i64)
    .bind(duplicate_info)
    .bind(email.extraction_failed as i64)
    .bind(email.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(email.id)
}

/// Load an email record, scoped to the tenant.
pub async fn get_email(pool: &SqlitePool, tenant_id: &str, email_id: Uuid) -> StoreResult<EmailRecord> {
    let row = sqlx::query("SELECT * FROM emails WHERE tenant_id = ? AND id = ?")
        .bind(tenant_id)
        .bind(email_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("email {email_id}")))?;

    email_from_row(&row)
}

/// Patch applied to one nested extracted trade.
#[derive(Debug, Clone, Default)]
pub struct ExtractedTradePatch {
    pub status: Option<String>,
    pub match_id: Option<Uuid>,
}

/// In-place update of `llm_payload.trades[index]`.
///
/// Runs as a read-modify-write inside one transaction so concurrent
/// readers never observe a half-applied patch.
pub async fn update_extracted_trade(
    pool: &SqlitePool,
    tenant_id: &str,
    email_id: Uuid,
    index: usize,
    patch: ExtractedTradePatch,
) -> StoreResult<()> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT llm_payload FROM emails WHERE tenant_id = ? AND id = ?")
        .bind(tenant_id)
        .bind(email_id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("email {email_id}")))?;

    let raw: String = row.get("llm_payload");
    let mut payload: LlmPayload = serde_json::from_str(&raw)
        .map_err(|e| StoreError::Fatal(format!("corrupt payload on email {email_id}: {e}")))?;

    let trade = payload.trades.get_mut(index).ok_or_else(|| {
        StoreError::NotFound(format!("email {email_id} has no extracted trade {index}"))
    })?;
    if let Some(status) = patch.status {
        trade.status = Some(status);
    }
    if let Some(match_id) = patch.match_id {
        trade.match_id = Some(match_id);
    }

    let updated = serde_json::to_string(&payload)
        .map_err(|e| StoreError::Fatal(format!("failed to serialize payload: {e}")))?;

    sqlx::query("UPDATE emails SET llm_payload = ? WHERE tenant_id = ? AND id = ?")
        .bind(updated)
        .bind(tenant_id)
        .bind(email_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Flag an email as carrying duplicate confirmations and append the
/// duplicate bookkeeping entry.
pub async fn mark_email_duplicate(
    pool: &SqlitePool,
    tenant_id: &str,
    email_id: Uuid,
    info: DuplicateInfo,
) -> StoreResult<()> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT duplicate_info FROM emails WHERE tenant_id = ? AND id = ?")
        .bind(tenant_id)
        .bind(email_id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("email {email_id}")))?;

    let raw: String = row.get("duplicate_info");
    let mut entries: Vec<DuplicateInfo> = serde_json::from_str(&raw)
        .map_err(|e| StoreError::Fatal(format!("corrupt duplicate info on email {email_id}: {e}")))?;
    entries.push(info);

    let updated = serde_json::to_string(&entries)
        .map_err(|e| StoreError::Fatal(format!("failed to serialize duplicate info: {e}")))?;

    sqlx::query(
        "UPDATE emails SET has_duplicates = 1, duplicate_info = ? WHERE tenant_id = ? AND id = ?",
    )
    .bind(updated)
    .bind(tenant_id)
    .bind(email_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub(crate) fn email_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<EmailRecord> {
    let id: String = row.get("id");
    let payload: String = row.get("llm_payload");
    let duplicate_info: String = row.get("duplicate_info");
    let created_at: String = row.get("created_at");

    Ok(EmailRecord {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Fatal(format!("bad email id: {e}")))?,
        tenant_id: row.get("tenant_id"),
        sender_email: row.get("sender_email"),
        subject: row.get("subject"),
        email_date: row.get("email_date"),
        email_time: row.get("email_time"),
        body: row.get("body"),
        source_file: row.get("source_file"),
        llm_payload: serde_json::from_str(&payload)
            .map_err(|e| StoreError::Fatal(format!("corrupt payload: {e}")))?,
        has_duplicates: row.get::<i64, _>("has_duplicates") != 0,
        duplicate_info: serde_json::from_str(&duplicate_info)
            .map_err(|e| StoreError::Fatal(format!("corrupt duplicate info: {e}")))?,
        extraction_failed: row.get::<i64, _>("extraction_failed") != 0,
        created_at: super::trades::parse_timestamp(&created_at)?,
    })
}
