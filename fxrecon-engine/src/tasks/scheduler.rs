//! In-process task dispatcher
//!
//! Holds each scheduled task on a timer, then delivers it as an HTTP
//! POST to the engine's own callback endpoint with the queue-name
//! header attached. Delivery failures retry with bounded exponential
//! backoff.

use super::{QueueName, TaskError, TaskPayload, TaskScheduler, QUEUE_NAME_HEADER};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const DELIVERY_ATTEMPTS: u32 = 4;
const DELIVERY_BASE_BACKOFF: Duration = Duration::from_secs(2);

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

pub struct InProcessScheduler {
    client: reqwest::Client,
    /// Base URL of this engine's own HTTP surface, no trailing slash
    callback_base: String,
}

impl InProcessScheduler {
    pub fn new(callback_base: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DELIVERY_TIMEOUT)
                .build()
                .expect("failed to build HTTP client (system error)"),
            callback_base: callback_base.trim_end_matches('/').to_string(),
        }
    }

    async fn deliver(
        client: reqwest::Client,
        url: String,
        queue: QueueName,
        payload: TaskPayload,
    ) {
        for attempt in 0..DELIVERY_ATTEMPTS {
            let result = client
                .post(&url)
                .header(QUEUE_NAME_HEADER, queue.as_str())
                .json(&payload)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(task_id = %payload.task_id, %queue, "task delivered");
                    return;
                }
                Ok(response) => {
                    warn!(
                        task_id = %payload.task_id,
                        %queue,
                        status = %response.status(),
                        attempt,
                        "task callback rejected"
                    );
                }
                Err(err) => {
                    warn!(task_id = %payload.task_id, %queue, %err, attempt, "task delivery failed");
                }
            }
            tokio::time::sleep(DELIVERY_BASE_BACKOFF * 2u32.pow(attempt)).await;
        }
        warn!(task_id = %payload.task_id, %queue, "task dropped after delivery retries");
    }
}

#[async_trait]
impl TaskScheduler for InProcessScheduler {
    async fn enqueue(
        &self,
        queue: QueueName,
        task_type: &str,
        data: serde_json::Value,
        delay: Duration,
    ) -> Result<String, TaskError> {
        let capped = delay.min(queue.max_delay());
        if capped < delay {
            debug!(
                %queue,
                requested_secs = delay.as_secs(),
                capped_secs = capped.as_secs(),
                "task delay clamped to queue cap"
            );
        }

        let task_id = Uuid::new_v4().to_string();
        let payload = TaskPayload {
            task_type: task_type.to_string(),
            task_id: task_id.clone(),
            data,
            created_at: Utc::now(),
            queue_used: queue,
        };
        let url = format!("{}/internal/tasks/{}", self.callback_base, queue.as_str());
        let client = self.client.clone();

        tokio::spawn(async move {
            if !capped.is_zero() {
                tokio::time::sleep(capped).await;
            }
            Self::deliver(client, url, queue, payload).await;
        });

        Ok(task_id)
    }
}
