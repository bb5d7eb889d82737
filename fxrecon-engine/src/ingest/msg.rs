//! Outlook MSG parsing
//!
//! Bank confirmations forwarded from Outlook arrive as MAPI `.msg`
//! files. The PDF attachments carry the authoritative confirmation
//! text; the message body is only a fallback.

use super::pdf;
use anyhow::anyhow;
use msg_parser::Outlook;
use tracing::warn;

/// Parsed content of one `.msg` file
#[derive(Debug, Clone, Default)]
pub struct ParsedMsg {
    pub sender_email: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    /// Extracted text of each PDF attachment, in attachment order
    pub attachment_texts: Vec<String>,
}

/// Parse a MAPI message and extract the text of its PDF attachments.
pub fn parse(bytes: &[u8]) -> anyhow::Result<ParsedMsg> {
    let outlook = Outlook::from_slice(bytes).map_err(|e| anyhow!("MSG parse failed: {e:?}"))?;

    let sender_email = if outlook.sender.email.trim().is_empty() {
        None
    } else {
        Some(outlook.sender.email.trim().to_string())
    };
    let subject = if outlook.subject.trim().is_empty() {
        None
    } else {
        Some(outlook.subject.trim().to_string())
    };

    let mut attachment_texts = Vec::new();
    for attachment in &outlook.attachments {
        let name = if attachment.file_name.is_empty() {
            &attachment.display_name
        } else {
            &attachment.file_name
        };
        let is_pdf = name.to_lowercase().ends_with(".pdf")
            || attachment.mime_tag.to_lowercase().contains("pdf");
        if !is_pdf {
            continue;
        }

        // msg_parser exposes attachment payloads hex-encoded
        let payload = match hex::decode(&attachment.payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(attachment = %name, %err, "undecodable attachment payload, skipping");
                continue;
            }
        };
        match pdf::extract_text(&payload) {
            Ok(text) => attachment_texts.push(text),
            Err(err) => {
                warn!(attachment = %name, %err, "PDF extraction failed, skipping attachment");
            }
        }
    }

    Ok(ParsedMsg {
        sender_email,
        subject,
        body: outlook.body,
        attachment_texts,
    })
}
