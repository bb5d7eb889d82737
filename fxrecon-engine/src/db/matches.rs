//! Match record persistence
//!
//! `create_match` is the invariant-bearing write: the match row, the
//! trade status flip and the nested extracted-trade back-reference
//! all land in one transaction or not at all.

use super::{StoreError, StoreResult};
use fxrecon_common::model::{Discrepancy, LlmPayload, MatchRecord, MatchStatus};
use sqlx::{Row, SqlitePool};
use tracing::error;
use uuid::Uuid;

/// Single-document lookup used for duplicate detection.
pub async fn existing_match_for_trade(
    pool: &SqlitePool,
    tenant_id: &str,
    trade_id: Uuid,
) -> StoreResult<Option<MatchRecord>> {
    let row = sqlx::query("SELECT * FROM matches WHERE tenant_id = ? AND trade_id = ?")
        .bind(tenant_id)
        .bind(trade_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(match_from_row).transpose()
}

/// Write a match and its side-effects atomically:
/// - insert the match row
/// - flip the trade from `unmatched` to `matched`
/// - stamp `match_id` and status on the extracted trade inside the
///   email payload
///
/// Idempotent per `(trade_id, email_id, index)`: a retry after a
/// successful write is a no-op. A second match for an already-matched
/// trade via a different email is an invariant violation and is
/// refused as `Fatal`.
pub async fn create_match(pool: &SqlitePool, record: &MatchRecord) -> StoreResult<()> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query("SELECT email_id, extracted_trade_index FROM matches WHERE trade_id = ?")
        .bind(record.trade_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

    if let Some(row) = existing {
        let email_id: String = row.get("email_id");
        let index: i64 = row.get("extracted_trade_index");
        if email_id == record.email_id.to_string() && index as usize == record.extracted_trade_index {
            // retry of an already-committed write
            return Ok(());
        }
        error!(
            trade_id = %record.trade_id,
            existing_email = %email_id,
            "refusing second match for an already-matched trade"
        );
        return Err(StoreError::Fatal(format!(
            "trade {} already matched via email {email_id}",
            record.trade_id
        )));
    }

    let flipped = sqlx::query(
        "UPDATE trades SET status = 'matched' WHERE tenant_id = ? AND id = ? AND status = 'unmatched'",
    )
    .bind(&record.tenant_id)
    .bind(record.trade_id.to_string())
    .execute(&mut *tx)
    .await?;

    if flipped.rows_affected() != 1 {
        return Err(StoreError::Conflict(format!(
            "trade {} is no longer unmatched",
            record.trade_id
        )));
    }

    let reasons = serde_json::to_string(&record.match_reasons)
        .map_err(|e| StoreError::Fatal(format!("failed to serialize reasons: {e}")))?;
    let discrepancies = serde_json::to_string(&record.discrepancies)
        .map_err(|e| StoreError::Fatal(format!("failed to serialize discrepancies: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO matches (
            match_id, tenant_id, trade_id, email_id, extracted_trade_index,
            confidence_score, status, match_reasons, discrepancies, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.match_id.to_string())
    .bind(&record.tenant_id)
    .bind(record.trade_id.to_string())
    .bind(record.email_id.to_string())
    .bind(record.extracted_trade_index as i64)
    .bind(record.confidence_score as i64)
    .bind(record.status.as_str())
    .bind(reasons)
    .bind(discrepancies)
    .bind(record.created_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    // Back-reference on the extracted trade, inside the same transaction.
    let row = sqlx::query("SELECT llm_payload FROM emails WHERE tenant_id = ? AND id = ?")
        .bind(&record.tenant_id)
        .bind(record.email_id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("email {}", record.email_id)))?;

    let raw: String = row.get("llm_payload");
    let mut payload: LlmPayload = serde_json::from_str(&raw)
        .map_err(|e| StoreError::Fatal(format!("corrupt payload on email {}: {e}", record.email_id)))?;

    let extracted = payload
        .trades
        .get_mut(record.extracted_trade_index)
        .ok_or_else(|| {
            StoreError::NotFound(format!(
                "email {} has no extracted trade {}",
                record.email_id, record.extracted_trade_index
            ))
        })?;
    extracted.match_id = Some(record.match_id);
    extracted.status = Some(if record.discrepancies.is_empty() {
        "matched".to_string()
    } else {
        "difference".to_string()
    });

    let updated = serde_json::to_string(&payload)
        .map_err(|e| StoreError::Fatal(format!("failed to serialize payload: {e}")))?;

    sqlx::query("UPDATE emails SET llm_payload = ? WHERE tenant_id = ? AND id = ?")
        .bind(updated)
        .bind(&record.tenant_id)
        .bind(record.email_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub(crate) fn match_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<MatchRecord> {
    let match_id: String = row.get("match_id");
    let trade_id: String = row.get("trade_id");
    let email_id: String = row.get("email_id");
    let status: String = row.get("status");
    let reasons: String = row.get("match_reasons");
    let discrepancies: String = row.get("discrepancies");
    let created_at: String = row.get("created_at");

    let status = match status.as_str() {
        "confirmed" => MatchStatus::Confirmed,
        "review_needed" => MatchStatus::ReviewNeeded,
        other => return Err(StoreError::Fatal(format!("unknown match status: {other}"))),
    };

    let reasons: Vec<String> = serde_json::from_str(&reasons)
        .map_err(|e| StoreError::Fatal(format!("corrupt match reasons: {e}")))?;
    let discrepancies: Vec<Discrepancy> = serde_json::from_str(&discrepancies)
        .map_err(|e| StoreError::Fatal(format!("corrupt discrepancies: {e}")))?;

    Ok(MatchRecord {
        match_id: Uuid::parse_str(&match_id)
            .map_err(|e| StoreError::Fatal(format!("bad match id: {e}")))?,
        tenant_id: row.get("tenant_id"),
        trade_id: Uuid::parse_str(&trade_id)
            .map_err(|e| StoreError::Fatal(format!("bad trade id: {e}")))?,
        email_id: Uuid::parse_str(&email_id)
            .map_err(|e| StoreError::Fatal(format!("bad email id: {e}")))?,
        extracted_trade_index: row.get::<i64, _>("extracted_trade_index") as usize,
        confidence_score: row.get::<i64, _>("confidence_score") as u8,
        status,
        match_reasons: reasons,
        discrepancies,
        created_at: super::trades::parse_timestamp(&created_at)?,
    })
}
