//! Ingestion pipeline
//!
//! Orchestrates one ingestion unit end to end: audit session,
//! LLM extraction, email persistence, matching, automation and
//! event emission. Workers never surface errors past the report;
//! they log with tenant and email correlation fields.

use crate::automation::AutomationDispatcher;
use crate::db;
use crate::extract::{self, ExtractionContext, LlmProvider};
use crate::ingest::IngestUnit;
use crate::matching::counterparty::counterparty_for_sender;
use crate::matching::engine::{self, TradeMatchOutcome};
use chrono::Utc;
use fxrecon_common::events::{EventBus, EventPriority, SystemEvent};
use fxrecon_common::model::{
    EmailRecord, ReconciliationOutcome, SessionStatus, Tenant, UploadSession,
};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of one ingestion unit, shaped for the upload response.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub success: bool,
    pub email_id: Uuid,
    pub trades_extracted: u32,
    pub matches_found: u32,
    pub duplicates_found: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_name: Option<String>,
    pub matched_trade_numbers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Pipeline {
    db: SqlitePool,
    llm: Arc<dyn LlmProvider>,
    automation: AutomationDispatcher,
    event_bus: EventBus,
}

impl Pipeline {
    pub fn new(
        db: SqlitePool,
        llm: Arc<dyn LlmProvider>,
        automation: AutomationDispatcher,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            llm,
            automation,
            event_bus,
        }
    }

    /// Process one ingestion unit. Store errors end the unit but are
    /// reported, not propagated; the caller always gets a report.
    pub async fn process_unit(&self, unit: IngestUnit) -> IngestReport {
        let tenant = unit.tenant.clone();
        let session_id = self.open_session(&unit).await;

        match self.run_unit(&unit).await {
            Ok(report) => {
                if let Some(id) = session_id {
                    let status = SessionStatus::Completed;
                    if let Err(err) =
                        db::sessions::finish_session(&self.db, id, report.trades_extracted, 0, status)
                            .await
                    {
                        warn!(tenant_id = %tenant.id, %err, "failed to close upload session");
                    }
                }
                report
            }
            Err(err) => {
                error!(tenant_id = %tenant.id, %err, "ingestion unit failed");
                if let Some(id) = session_id {
                    if let Err(close_err) =
                        db::sessions::finish_session(&self.db, id, 0, 1, SessionStatus::Failed).await
                    {
                        warn!(tenant_id = %tenant.id, %close_err, "failed to close upload session");
                    }
                }
                IngestReport {
                    success: false,
                    email_id: Uuid::nil(),
                    trades_extracted: 0,
                    matches_found: 0,
                    duplicates_found: 0,
                    counterparty_name: None,
                    matched_trade_numbers: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn open_session(&self, unit: &IngestUnit) -> Option<Uuid> {
        let file_name = unit.source_file.clone()?;
        let session = UploadSession {
            id: Uuid::new_v4(),
            tenant_id: unit.tenant.id.clone(),
            file_type: crate::ingest::file_type_of(&file_name).to_string(),
            file_name,
            records_processed: 0,
            records_failed: 0,
            status: SessionStatus::Processing,
            started_at: Utc::now(),
        };
        match db::sessions::create_session(&self.db, &session).await {
            Ok(()) => Some(session.id),
            Err(err) => {
                warn!(tenant_id = %unit.tenant.id, %err, "failed to open upload session");
                None
            }
        }
    }

    async fn run_unit(&self, unit: &IngestUnit) -> anyhow::Result<IngestReport> {
        let tenant = &unit.tenant;

        let context = ExtractionContext {
            subject: unit.subject.clone().unwrap_or_default(),
            body: unit.body.clone(),
            sender_email: unit.sender_email.clone().unwrap_or_default(),
            attachments_text: unit.attachments_text.clone(),
            client_name: tenant.name.clone(),
        };
        let extraction = extract::extract(self.llm.as_ref(), &context).await;

        let email = EmailRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant.id.clone(),
            sender_email: unit.sender_email.clone(),
            subject: unit.subject.clone(),
            email_date: unit.email_date.clone(),
            email_time: unit.email_time.clone(),
            body: if unit.body.is_empty() {
                None
            } else {
                Some(unit.body.clone())
            },
            source_file: unit.source_file.clone(),
            llm_payload: extraction.payload,
            has_duplicates: false,
            duplicate_info: Vec::new(),
            extraction_failed: extraction.failed,
            created_at: Utc::now(),
        };
        db::emails::save_email(&self.db, &email).await?;

        let trades_extracted = email.llm_payload.trades.len() as u32;
        info!(
            tenant_id = %tenant.id,
            email_id = %email.id,
            trades_extracted,
            extraction_failed = email.extraction_failed,
            "email saved"
        );

        let report = engine::reconcile_email(&self.db, &email).await?;
        self.dispatch_outcomes(tenant, &email, &report).await;

        let counterparty_name = self.counterparty_name(&email);
        let ingest_report = IngestReport {
            success: true,
            email_id: email.id,
            trades_extracted,
            matches_found: report.matches_found(),
            duplicates_found: report.duplicates_found(),
            counterparty_name: counterparty_name.clone(),
            matched_trade_numbers: report.matched_trade_numbers(),
            error: None,
        };

        self.event_bus.publish(
            SystemEvent::new(
                "gmail_processed",
                EventPriority::Low,
                "Email processed",
                format!(
                    "{} trades extracted, {} matched, {} duplicates",
                    trades_extracted,
                    ingest_report.matches_found,
                    ingest_report.duplicates_found
                ),
            )
            .with_tenant(tenant.id.clone())
            .with_payload(json!({
                "email_id": email.id,
                "trades_extracted": trades_extracted,
                "matches_found": ingest_report.matches_found,
                "duplicates_found": ingest_report.duplicates_found,
                "counterparty_name": counterparty_name,
            })),
        );

        Ok(ingest_report)
    }

    async fn dispatch_outcomes(
        &self,
        tenant: &Tenant,
        email: &EmailRecord,
        report: &engine::MatchingReport,
    ) {
        if report.outcomes.is_empty() {
            return;
        }
        let config = match db::tenants::automation_config(&self.db, &tenant.id).await {
            Ok(c) => c,
            Err(err) => {
                warn!(tenant_id = %tenant.id, %err, "automation config unavailable, using defaults");
                Default::default()
            }
        };

        for outcome in &report.outcomes {
            match outcome {
                TradeMatchOutcome::Matched {
                    record,
                    classification,
                    trade_number,
                } => {
                    let disputed = *classification == ReconciliationOutcome::Difference;
                    let (event_type, priority, title) = if disputed {
                        ("trade_disputed", EventPriority::High, "Trade disputed")
                    } else {
                        ("trade_matched", EventPriority::Normal, "Trade matched")
                    };
                    self.event_bus.publish(
                        SystemEvent::new(
                            event_type,
                            priority,
                            title,
                            format!("Trade {trade_number}: {classification}"),
                        )
                        .with_tenant(tenant.id.clone())
                        .with_payload(json!({
                            "match_id": record.match_id,
                            "trade_number": trade_number,
                            "confidence": record.confidence_score,
                            "status": record.status,
                            "discrepancies": record.discrepancies,
                        })),
                    );

                    if let Err(err) = self
                        .automation
                        .dispatch(tenant, &config, *classification, record, email, trade_number)
                        .await
                    {
                        // The match stands; the operator UI is the fallback.
                        error!(
                            tenant_id = %tenant.id,
                            email_id = %email.id,
                            trade_number,
                            %err,
                            "automation dispatch failed"
                        );
                    }
                }
                TradeMatchOutcome::Duplicate {
                    trade_number,
                    existing_match_id,
                } => {
                    self.event_bus.publish(
                        SystemEvent::new(
                            "trade_duplicate",
                            EventPriority::Normal,
                            "Duplicate confirmation",
                            format!("Trade {trade_number} was already matched"),
                        )
                        .with_tenant(tenant.id.clone())
                        .with_payload(json!({
                            "trade_number": trade_number,
                            "existing_match_id": existing_match_id,
                            "email_id": email.id,
                        })),
                    );
                }
                TradeMatchOutcome::Unrecognized => {}
            }
        }
    }

    fn counterparty_name(&self, email: &EmailRecord) -> Option<String> {
        email
            .llm_payload
            .trades
            .iter()
            .find_map(|t| t.counterparty_name.clone())
            .or_else(|| {
                email
                    .sender_email
                    .as_deref()
                    .and_then(counterparty_for_sender)
                    .map(|s| s.to_string())
            })
    }
}
