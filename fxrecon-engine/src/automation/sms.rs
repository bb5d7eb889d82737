//! SMS notifications
//!
//! Alerts are dispatched immediately on classification, subject to a
//! per-tenant rate limit and a daily cap. Failures are per-recipient;
//! one bad number never blocks the rest.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Per-tenant send rate
const RATE_PER_MINUTE: u32 = 10;

/// Per-tenant daily message cap
const DAILY_CAP: u32 = 100;

/// GSM single-segment length
const MAX_SMS_CHARS: usize = 160;

/// Hard deadline per gateway call
const SEND_DEADLINE: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("SMS send failed: {0}")]
    Send(String),

    #[error("SMS status query failed: {0}")]
    Status(String),
}

/// Capability set of the SMS gateway. Production binds to the
/// provider's REST API; tests count invocations.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Send one message; returns the provider's message ID.
    async fn send(&self, to: &str, body: &str) -> Result<String, SmsError>;

    /// Delivery status of a previously sent message.
    async fn status(&self, message_id: &str) -> Result<String, SmsError>;
}

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate-limited fan-out over an [`SmsTransport`].
pub struct SmsNotifier {
    transport: Box<dyn SmsTransport>,
    limiter: KeyedLimiter,
    daily: Mutex<HashMap<String, (NaiveDate, u32)>>,
}

impl SmsNotifier {
    pub fn new(transport: Box<dyn SmsTransport>) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(RATE_PER_MINUTE).expect("nonzero rate"));
        Self {
            transport,
            limiter: RateLimiter::keyed(quota),
            daily: Mutex::new(HashMap::new()),
        }
    }

    /// Send `message` to every destination, applying the tenant's rate
    /// limit and daily cap. Returns how many sends succeeded.
    pub async fn notify(&self, tenant_id: &str, destinations: &[String], message: &str) -> usize {
        let truncated: String = message.chars().take(MAX_SMS_CHARS).collect();
        let mut sent = 0;

        for destination in destinations {
            if !self.consume_daily_budget(tenant_id) {
                warn!(tenant_id, "daily SMS cap reached, dropping remaining alerts");
                break;
            }
            if self.limiter.check_key(&tenant_id.to_string()).is_err() {
                warn!(tenant_id, destination, "SMS rate limit hit, dropping alert");
                continue;
            }
            let send = self.transport.send(destination, &truncated);
            match tokio::time::timeout(SEND_DEADLINE, send).await {
                Ok(Ok(message_id)) => {
                    debug!(tenant_id, destination, %message_id, "SMS alert sent");
                    sent += 1;
                }
                Ok(Err(err)) => {
                    warn!(tenant_id, destination, %err, "SMS send failed");
                }
                Err(_) => {
                    warn!(tenant_id, destination, "SMS send deadline exceeded");
                }
            }
        }
        sent
    }

    fn consume_daily_budget(&self, tenant_id: &str) -> bool {
        let today = Utc::now().date_naive();
        let mut daily = self.daily.lock().expect("SMS counter lock poisoned");
        let entry = daily
            .entry(tenant_id.to_string())
            .or_insert((today, 0));
        if entry.0 != today {
            *entry = (today, 0);
        }
        if entry.1 >= DAILY_CAP {
            return false;
        }
        entry.1 += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTransport {
        sent: Arc<AtomicUsize>,
        fail_for: Option<String>,
        last_body: Arc<Mutex<String>>,
    }

    #[async_trait]
    impl SmsTransport for CountingTransport {
        async fn send(&self, to: &str, body: &str) -> Result<String, SmsError> {
            if self.fail_for.as_deref() == Some(to) {
                return Err(SmsError::Send("number rejected".to_string()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            *self.last_body.lock().unwrap() = body.to_string();
            Ok(format!("msg-{to}"))
        }

        async fn status(&self, _message_id: &str) -> Result<String, SmsError> {
            Ok("delivered".to_string())
        }
    }

    fn notifier(fail_for: Option<&str>) -> (SmsNotifier, Arc<AtomicUsize>, Arc<Mutex<String>>) {
        let sent = Arc::new(AtomicUsize::new(0));
        let last_body = Arc::new(Mutex::new(String::new()));
        let transport = CountingTransport {
            sent: sent.clone(),
            fail_for: fail_for.map(|s| s.to_string()),
            last_body: last_body.clone(),
        };
        (SmsNotifier::new(Box::new(transport)), sent, last_body)
    }

    #[tokio::test]
    async fn one_bad_number_does_not_block_the_rest() {
        let (notifier, sent, _) = notifier(Some("+56911111111"));
        let destinations = vec![
            "+56911111111".to_string(),
            "+56922222222".to_string(),
        ];
        let delivered = notifier.notify("acme", &destinations, "Operación 32013 OK").await;
        assert_eq!(delivered, 1);
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn messages_are_truncated_to_one_segment() {
        let (notifier, _, last_body) = notifier(None);
        let long = "x".repeat(400);
        notifier
            .notify("acme", &["+56911111111".to_string()], &long)
            .await;
        assert_eq!(last_body.lock().unwrap().chars().count(), MAX_SMS_CHARS);
    }

    struct StalledTransport;

    #[async_trait]
    impl SmsTransport for StalledTransport {
        async fn send(&self, _to: &str, _body: &str) -> Result<String, SmsError> {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Ok("late".to_string())
        }

        async fn status(&self, _message_id: &str) -> Result<String, SmsError> {
            Ok("unknown".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_stalled_gateway_does_not_hang_the_notifier() {
        let notifier = SmsNotifier::new(Box::new(StalledTransport));
        let delivered = notifier
            .notify("acme", &["+56911111111".to_string()], "alert")
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn rate_limit_caps_a_burst_per_tenant() {
        let (notifier, sent, _) = notifier(None);
        let destinations: Vec<String> =
            (0..20).map(|n| format!("+569000000{n:02}")).collect();
        notifier.notify("acme", &destinations, "alert").await;
        assert_eq!(sent.load(Ordering::SeqCst) as u32, RATE_PER_MINUTE);
    }
}
