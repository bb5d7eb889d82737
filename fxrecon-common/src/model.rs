//! Domain models shared across FxRecon services
//!
//! All records are scoped to a tenant (the "client" owning the trade
//! blotter). Matches reference trades and emails by ID only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// FX product type on the client blotter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Spot,
    Forward,
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductType::Spot => write!(f, "Spot"),
            ProductType::Forward => write!(f, "Forward"),
        }
    }
}

/// Trade direction from the client's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "Buy"),
            Direction::Sell => write!(f, "Sell"),
        }
    }
}

/// Settlement mode of the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementType {
    /// Net cash settlement of the two currency legs
    #[serde(rename = "Compensación")]
    Compensacion,
    /// Physical delivery of both currency legs
    #[serde(rename = "Entrega Física")]
    EntregaFisica,
}

impl std::fmt::Display for SettlementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementType::Compensacion => write!(f, "Compensación"),
            SettlementType::EntregaFisica => write!(f, "Entrega Física"),
        }
    }
}

/// Lifecycle state of a client trade
///
/// Transitions: `Unmatched -> Matched` through the matching engine
/// only, or to `ConfirmedViaPortal` by explicit operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Unmatched,
    Matched,
    ConfirmedViaPortal,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Unmatched => "unmatched",
            TradeStatus::Matched => "matched",
            TradeStatus::ConfirmedViaPortal => "confirmed_via_portal",
        }
    }
}

/// A booked FX transaction on the client side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub tenant_id: String,
    /// Tenant-unique trade identifier from the client blotter
    pub trade_number: String,
    pub counterparty_name: String,
    pub product_type: ProductType,
    pub direction: Direction,
    pub currency1: String,
    pub currency2: String,
    pub quantity_currency1: Decimal,
    pub price: Decimal,
    /// Dates carried as `dd-mm-yyyy` strings; normalised on comparison
    pub trade_date: String,
    pub value_date: Option<String>,
    pub maturity_date: Option<String>,
    pub payment_date: Option<String>,
    pub settlement_type: Option<SettlementType>,
    pub settlement_currency: Option<String>,
    pub fixing_reference: Option<String>,
    pub our_payment_method: Option<String>,
    pub counterparty_payment_method: Option<String>,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
}

/// Summary header of an extracted email payload
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmailSummary {
    /// Whether the email is a trade confirmation at all
    #[serde(default, deserialize_with = "de_confirmation")]
    pub confirmation: bool,
    #[serde(default)]
    pub num_trades: u32,
}

/// A trade parsed by the LLM from a bank confirmation email
///
/// All business fields are free-text as extracted; normalisation
/// happens in the comparator. Values already flipped to the client's
/// perspective by the extraction prompt.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractedTrade {
    #[serde(default, deserialize_with = "de_stringy")]
    pub trade_number: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub counterparty_name: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub product_type: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub currency1: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub currency2: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub quantity_currency1: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub trade_date: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub value_date: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub maturity_date: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub payment_date: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub settlement_type: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub settlement_currency: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub fixing_reference: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub our_payment_method: Option<String>,
    #[serde(default, deserialize_with = "de_stringy")]
    pub counterparty_payment_method: Option<String>,
    /// Reconciliation state of this extracted trade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Set once a Match record references this extracted trade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Uuid>,
}

/// Canonical payload produced by the LLM extractor for one email
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmPayload {
    #[serde(default)]
    pub email: EmailSummary,
    #[serde(default)]
    pub trades: Vec<ExtractedTrade>,
}

impl LlmPayload {
    /// Fallback payload used when extraction fails: not a
    /// confirmation, no trades, so matching finds no candidates.
    pub fn fallback() -> Self {
        Self::default()
    }
}

/// Duplicate bookkeeping attached to an email record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateInfo {
    pub extracted_trade_index: usize,
    pub trade_number: String,
    pub existing_match_id: Uuid,
    pub detected_at: DateTime<Utc>,
}

/// A stored bank confirmation email with its extracted payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub sender_email: Option<String>,
    pub subject: Option<String>,
    pub email_date: Option<String>,
    pub email_time: Option<String>,
    pub body: Option<String>,
    /// Reference to the uploaded or fetched source file
    pub source_file: Option<String>,
    pub llm_payload: LlmPayload,
    pub has_duplicates: bool,
    pub duplicate_info: Vec<DuplicateInfo>,
    pub extraction_failed: bool,
    pub created_at: DateTime<Utc>,
}

/// Review state of a match record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Confirmed,
    ReviewNeeded,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Confirmed => "confirmed",
            MatchStatus::ReviewNeeded => "review_needed",
        }
    }
}

/// One differing field between an extracted trade and a client trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub field: String,
    pub email_value: Option<String>,
    pub client_value: Option<String>,
}

/// Link record between a client Trade and an ExtractedTrade
///
/// Refers to both sides by ID only; a matched trade has exactly one
/// match record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: Uuid,
    pub tenant_id: String,
    pub trade_id: Uuid,
    pub email_id: Uuid,
    pub extracted_trade_index: usize,
    /// Confidence percentage exposed to the UI (0-100)
    pub confidence_score: u8,
    pub status: MatchStatus,
    pub match_reasons: Vec<String>,
    pub discrepancies: Vec<Discrepancy>,
    pub created_at: DateTime<Utc>,
}

/// The four reconciliation outcomes for an extracted trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationOutcome {
    #[serde(rename = "ConfirmationOK")]
    ConfirmationOk,
    Difference,
    Unrecognized,
    Duplicate,
}

impl std::fmt::Display for ReconciliationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconciliationOutcome::ConfirmationOk => write!(f, "ConfirmationOK"),
            ReconciliationOutcome::Difference => write!(f, "Difference"),
            ReconciliationOutcome::Unrecognized => write!(f, "Unrecognized"),
            ReconciliationOutcome::Duplicate => write!(f, "Duplicate"),
        }
    }
}

/// One automation toggle with its scheduling delay
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutomationToggle {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub delay_minutes: u32,
}

/// One alert channel destination list
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlertList {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub destinations: Vec<String>,
}

/// Per-tenant automation configuration, read-only to the engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TenantAutomationConfig {
    #[serde(default)]
    pub auto_confirm_matched: AutomationToggle,
    #[serde(default)]
    pub auto_confirm_disputed: AutomationToggle,
    #[serde(default)]
    pub alerts_email_confirmed: AlertList,
    #[serde(default)]
    pub alerts_email_disputed: AlertList,
    #[serde(default)]
    pub alerts_sms_confirmed: AlertList,
    #[serde(default)]
    pub alerts_sms_disputed: AlertList,
}

/// Tenant ("client") organisation owning trades, emails and matches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// Address bank confirmations are addressed to; used to resolve
    /// the tenant for mailbox-sourced messages
    pub confirmation_email: String,
    /// Template language for outbound notifications ("es" / "en")
    pub language: String,
}

/// Terminal state of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

/// Write-only audit trail for one ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: Uuid,
    pub tenant_id: String,
    pub file_name: String,
    pub file_type: String,
    pub records_processed: u32,
    pub records_failed: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
}

/// Accept strings, numbers and booleans for extracted text fields.
/// LLM output is not reliable about quoting numeric values.
fn de_stringy<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            if s.trim().is_empty() {
                None
            } else {
                Some(s)
            }
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Accept `true`/`false`, "Yes"/"No" and Spanish variants for the
/// confirmation flag.
fn de_confirmation<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "yes" | "si" | "sí" | "true" | "y")
        }
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_payload_accepts_yes_no_confirmation() {
        let payload: LlmPayload = serde_json::from_str(
            r#"{"email": {"confirmation": "Yes", "num_trades": 1}, "trades": [{}]}"#,
        )
        .unwrap();
        assert!(payload.email.confirmation);
        assert_eq!(payload.email.num_trades, 1);
        assert_eq!(payload.trades.len(), 1);

        let payload: LlmPayload = serde_json::from_str(
            r#"{"email": {"confirmation": "No", "num_trades": 0}, "trades": []}"#,
        )
        .unwrap();
        assert!(!payload.email.confirmation);
    }

    #[test]
    fn extracted_trade_accepts_numeric_fields() {
        let trade: ExtractedTrade = serde_json::from_str(
            r#"{"trade_number": 32013, "quantity_currency1": 1000000.0, "price": "932.88"}"#,
        )
        .unwrap();
        assert_eq!(trade.trade_number.as_deref(), Some("32013"));
        assert_eq!(trade.quantity_currency1.as_deref(), Some("1000000.0"));
        assert_eq!(trade.price.as_deref(), Some("932.88"));
    }

    #[test]
    fn empty_strings_collapse_to_none() {
        let trade: ExtractedTrade =
            serde_json::from_str(r#"{"fixing_reference": "   ", "currency1": "USD"}"#).unwrap();
        assert_eq!(trade.fixing_reference, None);
        assert_eq!(trade.currency1.as_deref(), Some("USD"));
    }

    #[test]
    fn fallback_payload_is_empty_non_confirmation() {
        let payload = LlmPayload::fallback();
        assert!(!payload.email.confirmation);
        assert!(payload.trades.is_empty());
    }

    #[test]
    fn settlement_type_serializes_domain_labels() {
        assert_eq!(
            serde_json::to_string(&SettlementType::Compensacion).unwrap(),
            "\"Compensación\""
        );
        assert_eq!(
            serde_json::to_string(&SettlementType::EntregaFisica).unwrap(),
            "\"Entrega Física\""
        );
    }

    #[test]
    fn outcome_display_matches_wire_labels() {
        assert_eq!(ReconciliationOutcome::ConfirmationOk.to_string(), "ConfirmationOK");
        assert_eq!(ReconciliationOutcome::Difference.to_string(), "Difference");
        assert_eq!(
            serde_json::to_string(&ReconciliationOutcome::ConfirmationOk).unwrap(),
            "\"ConfirmationOK\""
        );
    }
}
