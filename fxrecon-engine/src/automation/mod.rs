//! Automation dispatcher
//!
//! On each classification, consults the tenant's automation config,
//! schedules the confirmation or dispute email on the email queue and
//! fires SMS alerts immediately. Email scheduling failure is a hard
//! error to the caller; the match itself is never rolled back.

pub mod sms;
pub mod templates;

use crate::tasks::{QueueName, TaskScheduler};
use fxrecon_common::model::{
    EmailRecord, MatchRecord, ReconciliationOutcome, Tenant, TenantAutomationConfig,
};
use serde_json::json;
use sms::SmsNotifier;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Capability set for sending outbound notification emails. The
/// production binding goes through the monitored mailbox's account.
#[async_trait::async_trait]
pub trait OutboundMailer: Send + Sync {
    /// Send one message; returns the provider's message ID.
    async fn send(
        &self,
        to: &str,
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> anyhow::Result<String>;
}

pub struct AutomationDispatcher {
    scheduler: Arc<dyn TaskScheduler>,
    sms: Arc<SmsNotifier>,
}

impl AutomationDispatcher {
    pub fn new(scheduler: Arc<dyn TaskScheduler>, sms: Arc<SmsNotifier>) -> Self {
        Self { scheduler, sms }
    }

    /// Act on one classified match. SMS alerts go out first and never
    /// fail the call; email scheduling errors propagate.
    pub async fn dispatch(
        &self,
        tenant: &Tenant,
        config: &TenantAutomationConfig,
        outcome: ReconciliationOutcome,
        record: &MatchRecord,
        email: &EmailRecord,
        trade_number: &str,
    ) -> anyhow::Result<()> {
        let disputed = match outcome {
            ReconciliationOutcome::ConfirmationOk => false,
            ReconciliationOutcome::Difference => true,
            // Duplicates and unrecognized trades carry no automation.
            _ => return Ok(()),
        };

        let sms_alerts = if disputed {
            &config.alerts_sms_disputed
        } else {
            &config.alerts_sms_confirmed
        };
        if sms_alerts.enabled && !sms_alerts.destinations.is_empty() {
            let notice = templates::sms_notice(&tenant.language, trade_number, disputed);
            let sent = self
                .sms
                .notify(&tenant.id, &sms_alerts.destinations, &notice)
                .await;
            debug!(tenant_id = %tenant.id, trade_number, sent, "SMS alerts dispatched");
        }

        let toggle = if disputed {
            &config.auto_confirm_disputed
        } else {
            &config.auto_confirm_matched
        };
        if !toggle.enabled {
            return Ok(());
        }
        let Some(recipient) = email.sender_email.as_deref() else {
            debug!(
                tenant_id = %tenant.id,
                trade_number,
                "no sender address on email, skipping auto-reply"
            );
            return Ok(());
        };

        let content = if disputed {
            templates::dispute_email(
                &tenant.language,
                &tenant.name,
                trade_number,
                &record.discrepancies,
            )
        } else {
            templates::confirmation_email(&tenant.language, &tenant.name, trade_number)
        };

        let cc = if disputed {
            &config.alerts_email_disputed
        } else {
            &config.alerts_email_confirmed
        };
        let cc_list: &[String] = if cc.enabled { &cc.destinations } else { &[] };

        let task_type = if disputed {
            "send_dispute_email"
        } else {
            "send_confirmation_email"
        };
        let data = json!({
            "tenant_id": tenant.id,
            "match_id": record.match_id,
            "trade_number": trade_number,
            "to": recipient,
            "cc": cc_list,
            "subject": content.subject,
            "body": content.body,
            "discrepancies": if disputed {
                record
                    .discrepancies
                    .iter()
                    .map(|d| {
                        json!({
                            "field": d.field,
                            "your_value": d.email_value,
                            "our_value": d.client_value,
                        })
                    })
                    .collect::<Vec<_>>()
            } else {
                Vec::new()
            },
        });

        let delay = Duration::from_secs(u64::from(toggle.delay_minutes) * 60);
        let task_name = self
            .scheduler
            .enqueue(QueueName::Email, task_type, data, delay)
            .await?;

        info!(
            tenant_id = %tenant.id,
            trade_number,
            task_type,
            %task_name,
            delay_minutes = toggle.delay_minutes,
            "auto-reply scheduled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskError, TaskPayload};
    use async_trait::async_trait;
    use chrono::Utc;
    use fxrecon_common::model::{
        AlertList, AutomationToggle, Discrepancy, LlmPayload, MatchStatus,
    };
    use std::sync::Mutex;
    use uuid::Uuid;

    struct CapturingScheduler {
        enqueued: Mutex<Vec<(QueueName, TaskPayload, Duration)>>,
        fail: bool,
    }

    #[async_trait]
    impl TaskScheduler for CapturingScheduler {
        async fn enqueue(
            &self,
            queue: QueueName,
            task_type: &str,
            data: serde_json::Value,
            delay: Duration,
        ) -> Result<String, TaskError> {
            if self.fail {
                return Err(TaskError::Enqueue("queue unavailable".to_string()));
            }
            let payload = TaskPayload {
                task_type: task_type.to_string(),
                task_id: "t-1".to_string(),
                data,
                created_at: Utc::now(),
                queue_used: queue,
            };
            self.enqueued.lock().unwrap().push((queue, payload, delay));
            Ok("task-1".to_string())
        }
    }

    struct NullSms;

    #[async_trait]
    impl sms::SmsTransport for NullSms {
        async fn send(&self, _to: &str, _body: &str) -> Result<String, sms::SmsError> {
            Ok("msg-1".to_string())
        }
        async fn status(&self, _id: &str) -> Result<String, sms::SmsError> {
            Ok("delivered".to_string())
        }
    }

    fn tenant() -> Tenant {
        Tenant {
            id: "acme".to_string(),
            name: "Acme Corp".to_string(),
            confirmation_email: "confirmaciones+acme@fxrecon.cl".to_string(),
            language: "es".to_string(),
        }
    }

    fn email() -> EmailRecord {
        EmailRecord {
            id: Uuid::new_v4(),
            tenant_id: "acme".to_string(),
            sender_email: Some("fx@bancoabc.cl".to_string()),
            subject: Some("Confirmación".to_string()),
            email_date: None,
            email_time: None,
            body: None,
            source_file: None,
            llm_payload: LlmPayload::fallback(),
            has_duplicates: false,
            duplicate_info: Vec::new(),
            extraction_failed: false,
            created_at: Utc::now(),
        }
    }

    fn record(discrepancies: Vec<Discrepancy>) -> MatchRecord {
        MatchRecord {
            match_id: Uuid::new_v4(),
            tenant_id: "acme".to_string(),
            trade_id: Uuid::new_v4(),
            email_id: Uuid::new_v4(),
            extracted_trade_index: 0,
            confidence_score: 100,
            status: MatchStatus::Confirmed,
            match_reasons: Vec::new(),
            discrepancies,
            created_at: Utc::now(),
        }
    }

    fn dispatcher(fail: bool) -> (AutomationDispatcher, Arc<CapturingScheduler>) {
        let scheduler = Arc::new(CapturingScheduler {
            enqueued: Mutex::new(Vec::new()),
            fail,
        });
        let sms = Arc::new(SmsNotifier::new(Box::new(NullSms)));
        (
            AutomationDispatcher::new(scheduler.clone(), sms),
            scheduler,
        )
    }

    fn config_with_matched(delay_minutes: u32) -> TenantAutomationConfig {
        TenantAutomationConfig {
            auto_confirm_matched: AutomationToggle {
                enabled: true,
                delay_minutes,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn confirmation_is_scheduled_with_configured_delay() {
        let (dispatcher, scheduler) = dispatcher(false);
        dispatcher
            .dispatch(
                &tenant(),
                &config_with_matched(15),
                ReconciliationOutcome::ConfirmationOk,
                &record(Vec::new()),
                &email(),
                "32013",
            )
            .await
            .unwrap();

        let enqueued = scheduler.enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 1);
        let (queue, payload, delay) = &enqueued[0];
        assert_eq!(*queue, QueueName::Email);
        assert_eq!(payload.task_type, "send_confirmation_email");
        assert_eq!(*delay, Duration::from_secs(900));
        assert_eq!(payload.data["to"], "fx@bancoabc.cl");
    }

    #[tokio::test]
    async fn dispute_payload_lists_discrepancies() {
        let (dispatcher, scheduler) = dispatcher(false);
        let config = TenantAutomationConfig {
            auto_confirm_disputed: AutomationToggle {
                enabled: true,
                delay_minutes: 0,
            },
            ..Default::default()
        };
        dispatcher
            .dispatch(
                &tenant(),
                &config,
                ReconciliationOutcome::Difference,
                &record(vec![Discrepancy {
                    field: "Price".to_string(),
                    email_value: Some("932.98".to_string()),
                    client_value: Some("932.88".to_string()),
                }]),
                &email(),
                "32013",
            )
            .await
            .unwrap();

        let enqueued = scheduler.enqueued.lock().unwrap();
        let (_, payload, _) = &enqueued[0];
        assert_eq!(payload.task_type, "send_dispute_email");
        assert_eq!(payload.data["discrepancies"][0]["field"], "Price");
        assert_eq!(payload.data["discrepancies"][0]["your_value"], "932.98");
        assert_eq!(payload.data["discrepancies"][0]["our_value"], "932.88");
    }

    #[tokio::test]
    async fn disabled_toggle_schedules_nothing() {
        let (dispatcher, scheduler) = dispatcher(false);
        dispatcher
            .dispatch(
                &tenant(),
                &TenantAutomationConfig::default(),
                ReconciliationOutcome::ConfirmationOk,
                &record(Vec::new()),
                &email(),
                "32013",
            )
            .await
            .unwrap();
        assert!(scheduler.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_failure_is_a_hard_error() {
        let (dispatcher, _) = dispatcher(true);
        let result = dispatcher
            .dispatch(
                &tenant(),
                &config_with_matched(0),
                ReconciliationOutcome::ConfirmationOk,
                &record(Vec::new()),
                &email(),
                "32013",
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn duplicates_carry_no_automation() {
        let (dispatcher, scheduler) = dispatcher(false);
        let config = TenantAutomationConfig {
            alerts_sms_confirmed: AlertList {
                enabled: true,
                destinations: vec!["+56911111111".to_string()],
            },
            ..config_with_matched(0)
        };
        dispatcher
            .dispatch(
                &tenant(),
                &config,
                ReconciliationOutcome::Duplicate,
                &record(Vec::new()),
                &email(),
                "32013",
            )
            .await
            .unwrap();
        assert!(scheduler.enqueued.lock().unwrap().is_empty());
    }
}
