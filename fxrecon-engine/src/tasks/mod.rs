//! Task queues
//!
//! Named queues with scheduled dispatch and HTTP callback delivery.
//! Each queue carries a maximum delay that caps whatever the caller
//! requests; the receiving handler verifies origin by matching the
//! queue-name header against the known queue set.

pub mod scheduler;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Header attesting the origin queue on callback requests
pub const QUEUE_NAME_HEADER: &str = "x-fxrecon-queue-name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    General,
    Email,
    Priority,
    FileProcessing,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        QueueName::General,
        QueueName::Email,
        QueueName::Priority,
        QueueName::FileProcessing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::General => "general",
            QueueName::Email => "email",
            QueueName::Priority => "priority",
            QueueName::FileProcessing => "file-processing",
        }
    }

    pub fn parse(s: &str) -> Option<QueueName> {
        match s {
            "general" => Some(QueueName::General),
            "email" => Some(QueueName::Email),
            "priority" => Some(QueueName::Priority),
            "file-processing" => Some(QueueName::FileProcessing),
            _ => None,
        }
    }

    /// Maximum scheduling delay honoured by this queue. Requested
    /// delays above the cap are clamped, not rejected.
    pub fn max_delay(&self) -> Duration {
        match self {
            QueueName::General => Duration::from_secs(60 * 60),
            QueueName::Email => Duration::from_secs(24 * 60 * 60),
            QueueName::Priority => Duration::from_secs(5 * 60),
            QueueName::FileProcessing => Duration::from_secs(60 * 60),
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload delivered to the callback handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    pub task_type: String,
    pub task_id: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub queue_used: QueueName,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("enqueue failed: {0}")]
    Enqueue(String),

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("task execution failed: {0}")]
    Execution(String),
}

/// Capability set of the task scheduling service. Production binds to
/// an in-process timer dispatcher; tests capture enqueued payloads.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Schedule `data` for callback delivery on `queue` after `delay`
    /// (clamped to the queue's cap). Returns the scheduler's task name.
    async fn enqueue(
        &self,
        queue: QueueName,
        task_type: &str,
        data: serde_json::Value,
        delay: Duration,
    ) -> Result<String, TaskError>;
}

/// Accept a callback iff the queue-name header exactly matches one of
/// the known queues.
pub fn verify_queue_header(header_value: Option<&str>) -> Option<QueueName> {
    header_value.and_then(QueueName::parse)
}
