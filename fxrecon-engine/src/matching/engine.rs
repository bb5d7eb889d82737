//! Matching engine
//!
//! Scores every extracted trade in a confirmation email against the
//! tenant's unmatched client trades, selects the best candidate,
//! detects duplicate confirmations and writes match records through
//! the store's atomic create-match transaction.

use super::compare;
use super::counterparty::counterparty_for_sender;
use crate::db::{self, emails::ExtractedTradePatch, StoreError, StoreResult};
use chrono::Utc;
use fxrecon_common::fields::{normalize_date, normalize_decimal, normalize_text};
use fxrecon_common::model::{
    Discrepancy, DuplicateInfo, EmailRecord, ExtractedTrade, MatchRecord, MatchStatus,
    ReconciliationOutcome, Trade,
};
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Minimum score for a candidate to be considered at all
pub const SCORE_THRESHOLD: u32 = 40;

/// Score at or above which a match is auto-confirmed
pub const AUTO_CONFIRM_THRESHOLD: u32 = 60;

/// Maximum achievable score (all predicates at full weight)
pub const MAX_SCORE: u32 = 90;

/// Relative tolerance for the near-amount predicate
const AMOUNT_TOLERANCE: &str = "0.001";

/// Outcome for one extracted trade within an email
#[derive(Debug, Clone)]
pub enum TradeMatchOutcome {
    Matched {
        record: MatchRecord,
        classification: ReconciliationOutcome,
        trade_number: String,
    },
    Duplicate {
        trade_number: String,
        existing_match_id: Uuid,
    },
    Unrecognized,
}

/// Aggregate result of reconciling one email
#[derive(Debug, Clone, Default)]
pub struct MatchingReport {
    pub outcomes: Vec<TradeMatchOutcome>,
}

impl MatchingReport {
    pub fn matches_found(&self) -> u32 {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TradeMatchOutcome::Matched { .. }))
            .count() as u32
    }

    pub fn duplicates_found(&self) -> u32 {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TradeMatchOutcome::Duplicate { .. }))
            .count() as u32
    }

    pub fn matched_trade_numbers(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                TradeMatchOutcome::Matched { trade_number, .. } => Some(trade_number.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Confidence percentage exposed to the UI.
pub fn confidence_percent(score: u32) -> u8 {
    ((score as f64 / MAX_SCORE as f64) * 100.0).round() as u8
}

/// Score one (extracted trade, client trade) pair.
///
/// Returns the summed weight of every predicate that holds, with a
/// human-readable reason per predicate.
pub fn score_candidate(
    email_counterparty: Option<&str>,
    email_trade: &ExtractedTrade,
    client: &Trade,
) -> (u32, Vec<String>) {
    let mut score = 0;
    let mut reasons = Vec::new();

    // Counterparty name: exact beats substring, never both.
    if let (Some(email_cp), Some(client_cp)) = (
        email_counterparty.and_then(normalize_text),
        normalize_text(&client.counterparty_name),
    ) {
        if email_cp == client_cp {
            score += 30;
            reasons.push(format!("Counterparty matches exactly: {client_cp}"));
        } else if email_cp.contains(&client_cp) || client_cp.contains(&email_cp) {
            score += 20;
            reasons.push(format!(
                "Counterparty partial match: '{email_cp}' ~ '{client_cp}'"
            ));
        }
    }

    // Trade date after normalisation.
    let email_date = email_trade.trade_date.as_deref().and_then(normalize_date);
    let client_date = normalize_date(&client.trade_date);
    if let (Some(ed), Some(cd)) = (email_date, client_date) {
        if ed == cd {
            score += 25;
            reasons.push(format!("Trade date matches: {cd}"));
        }
    }

    // Currency pair, direct or reversed.
    if let (Some(e1), Some(e2), Some(c1), Some(c2)) = (
        email_trade.currency1.as_deref().and_then(normalize_text),
        email_trade.currency2.as_deref().and_then(normalize_text),
        normalize_text(&client.currency1),
        normalize_text(&client.currency2),
    ) {
        if e1 == c1 && e2 == c2 {
            score += 20;
            reasons.push(format!("Currency pair matches: {c1}/{c2}"));
        } else if e1 == c2 && e2 == c1 {
            score += 15;
            reasons.push(format!("Currency pair matches reversed: {c1}/{c2}"));
        }
    }

    // Amount, exact or within tolerance.
    if let Some(email_qty) = email_trade
        .quantity_currency1
        .as_deref()
        .and_then(normalize_decimal)
    {
        let client_qty = client.quantity_currency1.round_dp(4);
        if email_qty == client_qty {
            score += 15;
            reasons.push(format!("Amount matches exactly: {client_qty}"));
        } else if within_amount_tolerance(email_qty, client_qty) {
            score += 10;
            reasons.push(format!(
                "Amount within tolerance: {email_qty} ~ {client_qty}"
            ));
        }
    }

    (score, reasons)
}

fn within_amount_tolerance(a: Decimal, b: Decimal) -> bool {
    let max = a.abs().max(b.abs());
    if max.is_zero() {
        return false; // equal zeros already matched exactly
    }
    let tolerance = Decimal::from_str(AMOUNT_TOLERANCE).unwrap_or_default();
    ((a - b).abs() / max) <= tolerance
}

/// Reconcile every extracted trade of an email against the tenant's
/// unmatched client trades.
///
/// Extracted trades are processed in payload order; the unmatched set
/// is re-read for each one so that a trade matched by an earlier
/// sibling is no longer a candidate. Only `Transient` store read
/// failures are retried; any other store error aborts this email
/// unit.
pub async fn reconcile_email(pool: &SqlitePool, email: &EmailRecord) -> StoreResult<MatchingReport> {
    let mut report = MatchingReport::default();

    if !email.llm_payload.email.confirmation {
        debug!(email_id = %email.id, "email is not a confirmation, skipping matching");
        return Ok(report);
    }

    for (index, extracted) in email.llm_payload.trades.iter().enumerate() {
        let outcome = reconcile_extracted_trade(pool, email, index, extracted).await?;
        report.outcomes.push(outcome);
    }

    Ok(report)
}

async fn reconcile_extracted_trade(
    pool: &SqlitePool,
    email: &EmailRecord,
    index: usize,
    extracted: &ExtractedTrade,
) -> StoreResult<TradeMatchOutcome> {
    let candidates = with_retry("get_unmatched_trades", || {
        db::trades::get_unmatched_trades(pool, &email.tenant_id)
    })
    .await?;

    // Counterparty from the extraction, else from the sender domain.
    let email_counterparty = extracted.counterparty_name.clone().or_else(|| {
        email
            .sender_email
            .as_deref()
            .and_then(counterparty_for_sender)
            .map(String::from)
    });

    // First strictly-greater score wins; candidates arrive in stable
    // insertion order, so equal scores keep the earliest trade.
    let mut best: Option<(&Trade, u32, Vec<String>)> = None;
    for candidate in &candidates {
        let (score, reasons) = score_candidate(email_counterparty.as_deref(), extracted, candidate);
        if score < SCORE_THRESHOLD {
            continue;
        }
        if best.as_ref().map_or(true, |(_, top, _)| score > *top) {
            best = Some((candidate, score, reasons));
        }
    }

    let Some((winner, score, reasons)) = best else {
        // No unmatched candidate cleared the bar. The confirmation may
        // repeat one that already matched, so scan the matched set
        // before classifying it as unrecognized.
        if let Some(outcome) = duplicate_of_matched_trade(
            pool,
            email,
            index,
            extracted,
            email_counterparty.as_deref(),
        )
        .await?
        {
            return Ok(outcome);
        }

        debug!(email_id = %email.id, index, "no candidate reached the threshold");
        db::emails::update_extracted_trade(
            pool,
            &email.tenant_id,
            email.id,
            index,
            ExtractedTradePatch {
                status: Some("unrecognized".to_string()),
                match_id: None,
            },
        )
        .await?;
        return Ok(TradeMatchOutcome::Unrecognized);
    };

    // Duplicate check before writing anything.
    let existing = with_retry("existing_match_for_trade", || {
        db::matches::existing_match_for_trade(pool, &email.tenant_id, winner.id)
    })
    .await?;

    if let Some(existing) = existing {
        return record_duplicate(pool, email, index, winner, existing.match_id).await;
    }

    let (classification, discrepancies) = compare::compare(extracted, winner);
    let record = build_match_record(email, index, winner, score, reasons, &discrepancies);

    match db::matches::create_match(pool, &record).await {
        Ok(()) => {
            info!(
                tenant_id = %email.tenant_id,
                email_id = %email.id,
                trade_number = %winner.trade_number,
                score,
                %classification,
                "match created"
            );
            Ok(TradeMatchOutcome::Matched {
                record,
                classification,
                trade_number: winner.trade_number.clone(),
            })
        }
        Err(StoreError::Conflict(reason)) => {
            // Lost a race for this trade; the winner's match must exist now.
            warn!(trade_id = %winner.id, %reason, "match write lost race, recording duplicate");
            let existing = db::matches::existing_match_for_trade(pool, &email.tenant_id, winner.id)
                .await?
                .ok_or_else(|| {
                    StoreError::Fatal(format!(
                        "trade {} conflicted but has no match record",
                        winner.id
                    ))
                })?;
            record_duplicate(pool, email, index, winner, existing.match_id).await
        }
        Err(err) => Err(err),
    }
}

/// Score the tenant's already-matched trades; a winner there means
/// this confirmation repeats one that was reconciled earlier.
///
/// A matched winner without a match record (confirmed through another
/// channel) has nothing to point the duplicate at, so the extracted
/// trade falls through to the unrecognized path.
async fn duplicate_of_matched_trade(
    pool: &SqlitePool,
    email: &EmailRecord,
    index: usize,
    extracted: &ExtractedTrade,
    email_counterparty: Option<&str>,
) -> StoreResult<Option<TradeMatchOutcome>> {
    let matched = with_retry("get_matched_trades", || {
        db::trades::get_matched_trades(pool, &email.tenant_id)
    })
    .await?;

    let mut best: Option<(&Trade, u32)> = None;
    for candidate in &matched {
        let (score, _) = score_candidate(email_counterparty, extracted, candidate);
        if score < SCORE_THRESHOLD {
            continue;
        }
        if best.as_ref().map_or(true, |(_, top)| score > *top) {
            best = Some((candidate, score));
        }
    }

    let Some((winner, _)) = best else {
        return Ok(None);
    };

    let existing = with_retry("existing_match_for_trade", || {
        db::matches::existing_match_for_trade(pool, &email.tenant_id, winner.id)
    })
    .await?;

    match existing {
        Some(existing) => record_duplicate(pool, email, index, winner, existing.match_id)
            .await
            .map(Some),
        None => Ok(None),
    }
}

async fn record_duplicate(
    pool: &SqlitePool,
    email: &EmailRecord,
    index: usize,
    winner: &Trade,
    existing_match_id: Uuid,
) -> StoreResult<TradeMatchOutcome> {
    info!(
        tenant_id = %email.tenant_id,
        email_id = %email.id,
        trade_number = %winner.trade_number,
        "duplicate confirmation detected"
    );

    db::emails::mark_email_duplicate(
        pool,
        &email.tenant_id,
        email.id,
        DuplicateInfo {
            extracted_trade_index: index,
            trade_number: winner.trade_number.clone(),
            existing_match_id,
            detected_at: Utc::now(),
        },
    )
    .await?;

    db::emails::update_extracted_trade(
        pool,
        &email.tenant_id,
        email.id,
        index,
        ExtractedTradePatch {
            status: Some("duplicate".to_string()),
            match_id: None,
        },
    )
    .await?;

    Ok(TradeMatchOutcome::Duplicate {
        trade_number: winner.trade_number.clone(),
        existing_match_id,
    })
}

fn build_match_record(
    email: &EmailRecord,
    index: usize,
    winner: &Trade,
    score: u32,
    reasons: Vec<String>,
    discrepancies: &[Discrepancy],
) -> MatchRecord {
    let status = if score >= AUTO_CONFIRM_THRESHOLD {
        MatchStatus::Confirmed
    } else {
        MatchStatus::ReviewNeeded
    };

    MatchRecord {
        match_id: Uuid::new_v4(),
        tenant_id: email.tenant_id.clone(),
        trade_id: winner.id,
        email_id: email.id,
        extracted_trade_index: index,
        confidence_score: confidence_percent(score),
        status,
        match_reasons: reasons,
        discrepancies: discrepancies.to_vec(),
        created_at: Utc::now(),
    }
}

/// Retry a store read on transient failures: 3 attempts total with
/// jittered exponential backoff.
async fn with_retry<T, F, Fut>(operation: &str, mut f: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Err(err) if err.is_transient() && attempt < 2 => {
                attempt += 1;
                let jitter = rand::thread_rng().gen_range(0..50u64);
                let delay = Duration::from_millis(100 * 2u64.pow(attempt) + jitter);
                warn!(%operation, attempt, %err, "transient store failure, retrying");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
