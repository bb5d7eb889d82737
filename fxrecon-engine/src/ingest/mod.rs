//! Email ingestion
//!
//! Two entry points with identical downstream contracts: uploaded
//! `.msg`/`.pdf` files, and the monitored mailbox poller. Both
//! produce `IngestUnit`s handed to the reconciliation pipeline.

pub mod gmail;
pub mod mailbox;
pub mod msg;
pub mod pdf;

use chrono::Utc;
use fxrecon_common::model::Tenant;
use thiserror::Error;

/// One independent unit of ingestion: a single email body or a single
/// PDF attachment, carrying the enclosing email's metadata.
#[derive(Debug, Clone)]
pub struct IngestUnit {
    pub tenant: Tenant,
    pub sender_email: Option<String>,
    pub subject: Option<String>,
    pub email_date: Option<String>,
    pub email_time: Option<String>,
    pub body: String,
    pub attachments_text: String,
    pub source_file: Option<String>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("failed to parse {0}: {1}")]
    Parse(String, String),
}

/// Build an ingestion unit from an uploaded file, dispatching on the
/// filename suffix.
pub fn unit_from_upload(
    tenant: &Tenant,
    filename: &str,
    bytes: &[u8],
) -> Result<IngestUnit, IngestError> {
    let lower = filename.to_lowercase();
    let now = Utc::now();
    let date = now.format("%d-%m-%Y").to_string();
    let time = now.format("%H:%M:%S").to_string();

    if lower.ends_with(".msg") {
        let parsed = msg::parse(bytes)
            .map_err(|e| IngestError::Parse(filename.to_string(), e.to_string()))?;

        // Prefer the PDF attachment text; the body is the fallback.
        let attachments_text = parsed.attachment_texts.join("\n\n");
        Ok(IngestUnit {
            tenant: tenant.clone(),
            sender_email: parsed.sender_email,
            subject: parsed.subject,
            email_date: Some(date),
            email_time: Some(time),
            body: parsed.body,
            attachments_text,
            source_file: Some(filename.to_string()),
        })
    } else if lower.ends_with(".pdf") {
        let text = pdf::extract_text(bytes)
            .map_err(|e| IngestError::Parse(filename.to_string(), e.to_string()))?;
        let (sender, subject) = pdf::scan_headers(&text);
        Ok(IngestUnit {
            tenant: tenant.clone(),
            sender_email: sender,
            subject,
            email_date: Some(date),
            email_time: Some(time),
            body: String::new(),
            attachments_text: text,
            source_file: Some(filename.to_string()),
        })
    } else {
        Err(IngestError::UnsupportedFileType(filename.to_string()))
    }
}

/// File-type label recorded on the upload session.
pub fn file_type_of(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".msg") {
        "msg"
    } else if lower.ends_with(".pdf") {
        "pdf"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> Tenant {
        Tenant {
            id: "acme".to_string(),
            name: "Acme Corp".to_string(),
            confirmation_email: "ops@acme.cl".to_string(),
            language: "es".to_string(),
        }
    }

    #[test]
    fn unknown_suffix_is_rejected() {
        let err = unit_from_upload(&tenant(), "blotter.csv", b"a,b,c").unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType(_)));
    }

    #[test]
    fn corrupt_pdf_reports_parse_error() {
        let err = unit_from_upload(&tenant(), "conf.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, IngestError::Parse(_, _)));
    }

    #[test]
    fn file_type_labels() {
        assert_eq!(file_type_of("a.MSG"), "msg");
        assert_eq!(file_type_of("b.pdf"), "pdf");
        assert_eq!(file_type_of("c.txt"), "unknown");
    }
}
