//! Gmail REST binding for the mailbox source
//!
//! Thin mapping of the `users.*` endpoints onto [`MailboxSource`].
//! The history cursor is Gmail's `historyId`; a 404 from the history
//! endpoint means the cursor aged out and is surfaced as
//! `CursorExpired`.

use super::mailbox::{MailAttachmentRef, MailMessage, MailboxError, MailboxSource};
use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct GmailClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    history_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    #[serde(default)]
    history: Vec<HistoryEntry>,
    history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntry {
    #[serde(default)]
    messages_added: Vec<AddedMessage>,
}

#[derive(Debug, Deserialize)]
struct AddedMessage {
    message: MessageRef,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    id: String,
    payload: Option<MessagePart>,
    internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    data: Option<String>,
    attachment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachmentBody {
    data: String,
}

impl GmailClient {
    pub fn new(access_token: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client (system error)"),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            access_token,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailboxError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // history.list returns 404 when startHistoryId is too old
            return Err(MailboxError::CursorExpired);
        }
        if !response.status().is_success() {
            return Err(MailboxError::Request(format!(
                "gmail returned {} for {path}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))
    }
}

/// Decode Gmail's URL-safe base64, padded or not.
fn decode_body(data: &str) -> Result<Vec<u8>, MailboxError> {
    URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .map_err(|e| MailboxError::Request(format!("undecodable message body: {e}")))
}

fn header<'a>(part: &'a MessagePart, name: &str) -> Option<&'a str> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Addresses on the To/Cc headers, bare form.
fn recipient_addresses(part: &MessagePart) -> Vec<String> {
    let mut out = Vec::new();
    for name in ["To", "Cc"] {
        if let Some(value) = header(part, name) {
            for piece in value.split(',') {
                let piece = piece.trim();
                let addr = piece
                    .rsplit_once('<')
                    .and_then(|(_, rest)| rest.strip_suffix('>'))
                    .unwrap_or(piece);
                if !addr.is_empty() {
                    out.push(addr.trim().to_lowercase());
                }
            }
        }
    }
    out
}

fn sender_address(part: &MessagePart) -> Option<String> {
    let raw = header(part, "From")?.trim();
    let addr = raw
        .rsplit_once('<')
        .and_then(|(_, rest)| rest.strip_suffix('>'))
        .unwrap_or(raw);
    Some(addr.trim().to_lowercase())
}

/// First text/plain body in the part tree, depth-first.
fn body_text(part: &MessagePart) -> Option<String> {
    if part.mime_type.eq_ignore_ascii_case("text/plain") {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            if let Ok(bytes) = decode_body(data) {
                return Some(String::from_utf8_lossy(&bytes).into_owned());
            }
        }
    }
    part.parts.iter().find_map(body_text)
}

fn collect_attachments(part: &MessagePart, out: &mut Vec<MailAttachmentRef>) {
    if !part.filename.is_empty() {
        if let Some(id) = part.body.as_ref().and_then(|b| b.attachment_id.clone()) {
            out.push(MailAttachmentRef {
                id,
                filename: part.filename.clone(),
                mime_type: part.mime_type.clone(),
            });
        }
    }
    for child in &part.parts {
        collect_attachments(child, out);
    }
}

fn message_timestamp(message: &Message) -> Option<DateTime<Utc>> {
    let millis: i64 = message.internal_date.as_deref()?.parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}

impl GmailClient {
    /// Send one plain-text message through the mailbox account.
    pub async fn send_message(
        &self,
        to: &str,
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> Result<String, MailboxError> {
        let mut raw = format!("To: {to}\r\n");
        if !cc.is_empty() {
            raw.push_str(&format!("Cc: {}\r\n", cc.join(", ")));
        }
        raw.push_str(&format!(
            "Subject: {subject}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}"
        ));

        let response = self
            .client
            .post(format!("{}/users/me/messages/send", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "raw": URL_SAFE.encode(raw) }))
            .send()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailboxError::Request(format!(
                "gmail send returned {}",
                response.status()
            )));
        }
        let sent: MessageRef = response
            .json()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))?;
        Ok(sent.id)
    }
}

#[async_trait]
impl crate::automation::OutboundMailer for GmailClient {
    async fn send(
        &self,
        to: &str,
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> anyhow::Result<String> {
        Ok(self.send_message(to, cc, subject, body).await?)
    }
}

#[async_trait]
impl MailboxSource for GmailClient {
    async fn current_cursor(&self) -> Result<String, MailboxError> {
        let profile: Profile = self.get_json("/users/me/profile", &[]).await?;
        Ok(profile.history_id)
    }

    async fn history_since(&self, cursor: &str) -> Result<(Vec<String>, String), MailboxError> {
        let response: HistoryResponse = self
            .get_json(
                "/users/me/history",
                &[
                    ("startHistoryId", cursor.to_string()),
                    ("historyTypes", "messageAdded".to_string()),
                ],
            )
            .await?;

        let mut ids = Vec::new();
        for entry in &response.history {
            for added in &entry.messages_added {
                ids.push(added.message.id.clone());
            }
        }
        let next = response.history_id.unwrap_or_else(|| cursor.to_string());
        debug!(new_messages = ids.len(), "gmail history fetched");
        Ok((ids, next))
    }

    async fn list_since_hours(&self, hours: u32) -> Result<Vec<String>, MailboxError> {
        let after = (Utc::now() - ChronoDuration::hours(i64::from(hours))).timestamp();
        let response: ListResponse = self
            .get_json("/users/me/messages", &[("q", format!("after:{after}"))])
            .await?;
        Ok(response.messages.into_iter().map(|m| m.id).collect())
    }

    async fn fetch_message(&self, id: &str) -> Result<MailMessage, MailboxError> {
        let message: Message = self
            .get_json(
                &format!("/users/me/messages/{id}"),
                &[("format", "full".to_string())],
            )
            .await?;

        let timestamp = message_timestamp(&message);
        let payload = message.payload.as_ref();

        let mut attachments = Vec::new();
        if let Some(part) = payload {
            collect_attachments(part, &mut attachments);
        }

        Ok(MailMessage {
            id: message.id.clone(),
            sender: payload.and_then(sender_address),
            recipients: payload.map(recipient_addresses).unwrap_or_default(),
            subject: payload
                .and_then(|p| header(p, "Subject"))
                .map(|s| s.to_string()),
            date: timestamp.map(|t| t.format("%d-%m-%Y").to_string()),
            time: timestamp.map(|t| t.format("%H:%M:%S").to_string()),
            body_text: payload.and_then(body_text).unwrap_or_default(),
            attachments,
        })
    }

    async fn fetch_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError> {
        let body: AttachmentBody = self
            .get_json(
                &format!("/users/me/messages/{message_id}/attachments/{attachment_id}"),
                &[],
            )
            .await?;
        decode_body(&body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(json: serde_json::Value) -> MessagePart {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn recipients_parse_display_names_and_bare_addresses() {
        let payload = part(serde_json::json!({
            "mimeType": "multipart/mixed",
            "headers": [
                {"name": "To", "value": "Mesa FX <confirmaciones+acme@fxrecon.cl>, ops@acme.cl"},
                {"name": "Cc", "value": "backoffice@acme.cl"}
            ]
        }));
        assert_eq!(
            recipient_addresses(&payload),
            [
                "confirmaciones+acme@fxrecon.cl",
                "ops@acme.cl",
                "backoffice@acme.cl"
            ]
        );
    }

    #[test]
    fn body_text_walks_nested_parts() {
        let encoded = URL_SAFE.encode("Operación spot USD/CLP");
        let payload = part(serde_json::json!({
            "mimeType": "multipart/alternative",
            "parts": [
                {"mimeType": "text/html", "body": {"data": "PGI+aHRtbDwvYj4="}},
                {"mimeType": "text/plain", "body": {"data": encoded}}
            ]
        }));
        assert_eq!(body_text(&payload).as_deref(), Some("Operación spot USD/CLP"));
    }

    #[test]
    fn attachments_require_an_attachment_id() {
        let payload = part(serde_json::json!({
            "mimeType": "multipart/mixed",
            "parts": [
                {"mimeType": "application/pdf", "filename": "conf.pdf",
                 "body": {"attachmentId": "att-1"}},
                {"mimeType": "application/pdf", "filename": "inline.pdf", "body": {}}
            ]
        }));
        let mut found = Vec::new();
        collect_attachments(&payload, &mut found);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "att-1");
        assert!(found[0].is_pdf());
    }

    #[test]
    fn unpadded_base64url_decodes() {
        let data = URL_SAFE_NO_PAD.encode("abc");
        assert_eq!(decode_body(&data).unwrap(), b"abc");
    }
}
