//! Mailbox polling
//!
//! A single cooperative loop pulls new messages from the monitored
//! confirmation mailbox, resolves each to a tenant, and emits one
//! ingestion unit per PDF attachment. The loop never runs two
//! iterations concurrently and survives every error by backing off.

use super::{pdf, IngestUnit};
use crate::db;
use async_trait::async_trait;
use lru::LruCache;
use sqlx::SqlitePool;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default wait between poll iterations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Ceiling applied to the error backoff
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Window used when the change cursor has expired
const FALLBACK_WINDOW_HOURS: u32 = 24;

/// Capacity of the seen-message LRU used during cursor-expiry fallback
const SEEN_IDS_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum MailboxError {
    /// The store no longer honours the stored change cursor; the
    /// caller must fall back to a time-window listing.
    #[error("change cursor expired")]
    CursorExpired,

    #[error("mailbox request failed: {0}")]
    Request(String),
}

/// Reference to one attachment on a message, fetched separately.
#[derive(Debug, Clone)]
pub struct MailAttachmentRef {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
}

impl MailAttachmentRef {
    pub fn is_pdf(&self) -> bool {
        self.mime_type.to_lowercase().contains("pdf")
            || self.filename.to_lowercase().ends_with(".pdf")
    }
}

/// One message pulled from the monitored mailbox.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub id: String,
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    /// dd-mm-yyyy, in the mailbox's timezone
    pub date: Option<String>,
    /// HH:MM:SS
    pub time: Option<String>,
    pub body_text: String,
    pub attachments: Vec<MailAttachmentRef>,
}

/// Capability set of a mailbox service. Production binds to the Gmail
/// REST API; tests use an in-memory fake.
#[async_trait]
pub trait MailboxSource: Send + Sync {
    /// Current change cursor for the mailbox profile.
    async fn current_cursor(&self) -> Result<String, MailboxError>;

    /// Message IDs changed since `cursor`, plus the new cursor.
    /// Returns `CursorExpired` when the store no longer accepts it.
    async fn history_since(&self, cursor: &str) -> Result<(Vec<String>, String), MailboxError>;

    /// Message IDs received within the last `hours`.
    async fn list_since_hours(&self, hours: u32) -> Result<Vec<String>, MailboxError>;

    async fn fetch_message(&self, id: &str) -> Result<MailMessage, MailboxError>;

    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError>;
}

/// Poll loop state. `run` consumes the poller and blocks until the
/// cancellation token fires.
pub struct MailboxPoller<S, F> {
    source: S,
    db: SqlitePool,
    interval: Duration,
    last_cursor: Option<String>,
    seen_ids: LruCache<String, ()>,
    /// Invoked once per ingestion unit; errors are logged, not fatal.
    submit: F,
}

impl<S, F, Fut> MailboxPoller<S, F>
where
    S: MailboxSource,
    F: FnMut(IngestUnit) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    pub fn new(source: S, db: SqlitePool, interval: Duration, submit: F) -> Self {
        Self {
            source,
            db,
            interval,
            last_cursor: None,
            seen_ids: LruCache::new(
                NonZeroUsize::new(SEEN_IDS_CAPACITY).expect("nonzero capacity"),
            ),
            submit,
        }
    }

    /// Run the poll loop until cancelled. One iteration at a time;
    /// any iteration error backs off before the next attempt.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "mailbox poller started");

        loop {
            let wait = match self.poll_once().await {
                Ok(count) => {
                    if count > 0 {
                        debug!(messages = count, "poll iteration complete");
                    }
                    self.interval
                }
                Err(err) => {
                    warn!(%err, "poll iteration failed, backing off");
                    MAX_BACKOFF.min(self.interval)
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("mailbox poller stopping");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// One poll iteration. Returns the number of messages processed.
    async fn poll_once(&mut self) -> Result<usize, MailboxError> {
        let ids = match self.last_cursor.clone() {
            None => {
                // First connection: record the current cursor and pick
                // up only messages that arrive after it.
                let cursor = self.source.current_cursor().await?;
                info!(%cursor, "mailbox cursor initialised");
                self.last_cursor = Some(cursor);
                return Ok(0);
            }
            Some(cursor) => match self.source.history_since(&cursor).await {
                Ok((ids, next)) => {
                    self.last_cursor = Some(next);
                    ids
                }
                Err(MailboxError::CursorExpired) => {
                    warn!("mailbox cursor expired, listing last {FALLBACK_WINDOW_HOURS}h");
                    let ids = self.source.list_since_hours(FALLBACK_WINDOW_HOURS).await?;
                    self.last_cursor = Some(self.source.current_cursor().await?);
                    ids
                }
                Err(e) => return Err(e),
            },
        };

        let mut processed = 0;
        for id in ids {
            if self.seen_ids.put(id.clone(), ()).is_some() {
                continue;
            }
            // Message-level failures never stop the iteration.
            if let Err(err) = self.process_message(&id).await {
                error!(message_id = %id, %err, "failed to process mailbox message");
            }
            processed += 1;
        }
        Ok(processed)
    }

    async fn process_message(&mut self, id: &str) -> anyhow::Result<()> {
        let message = self.source.fetch_message(id).await?;

        let Some(tenant) =
            db::tenants::find_by_confirmation_email(&self.db, &message.recipients).await?
        else {
            warn!(
                message_id = %id,
                recipients = ?message.recipients,
                "no tenant for recipients, dropping message"
            );
            return Ok(());
        };

        let pdf_refs: Vec<&MailAttachmentRef> =
            message.attachments.iter().filter(|a| a.is_pdf()).collect();

        if pdf_refs.is_empty() {
            // Body-only confirmation: a single unit with no attachment text.
            let unit = IngestUnit {
                tenant,
                sender_email: message.sender.clone(),
                subject: message.subject.clone(),
                email_date: message.date.clone(),
                email_time: message.time.clone(),
                body: message.body_text.clone(),
                attachments_text: String::new(),
                source_file: None,
            };
            if let Err(err) = (self.submit)(unit).await {
                error!(message_id = %id, %err, "ingestion unit failed");
            }
            return Ok(());
        }

        // Each PDF attachment is an independent ingestion unit carrying
        // the enclosing email's metadata.
        for attachment in pdf_refs {
            let bytes = match self.source.fetch_attachment(id, &attachment.id).await {
                Ok(b) => b,
                Err(err) => {
                    warn!(
                        message_id = %id,
                        attachment = %attachment.filename,
                        %err,
                        "attachment fetch failed, skipping"
                    );
                    continue;
                }
            };
            let text = match pdf::extract_text(&bytes) {
                Ok(t) => t,
                Err(err) => {
                    warn!(
                        message_id = %id,
                        attachment = %attachment.filename,
                        %err,
                        "PDF extraction failed, skipping"
                    );
                    continue;
                }
            };
            let unit = IngestUnit {
                tenant: tenant.clone(),
                sender_email: message.sender.clone(),
                subject: message.subject.clone(),
                email_date: message.date.clone(),
                email_time: message.time.clone(),
                body: message.body_text.clone(),
                attachments_text: text,
                source_file: Some(attachment.filename.clone()),
            };
            if let Err(err) = (self.submit)(unit).await {
                error!(
                    message_id = %id,
                    attachment = %attachment.filename,
                    %err,
                    "ingestion unit failed"
                );
            }
        }
        Ok(())
    }
}
