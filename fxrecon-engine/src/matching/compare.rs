//! Field comparator
//!
//! Normalises and compares the 15 canonical trade fields between an
//! extracted bank trade and the client blotter trade, and classifies
//! the match as ConfirmationOK or Difference.

use fxrecon_common::fields::{normalize_date, normalize_decimal, normalize_text};
use fxrecon_common::model::{Discrepancy, ExtractedTrade, ReconciliationOutcome, Trade};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Date,
    Numeric,
}

/// The canonical comparison fields, in reporting order.
const FIELDS: &[(&str, FieldKind)] = &[
    ("ProductType", FieldKind::Text),
    ("TradeDate", FieldKind::Date),
    ("ValueDate", FieldKind::Date),
    ("Direction", FieldKind::Text),
    ("Currency1", FieldKind::Text),
    ("QuantityCurrency1", FieldKind::Numeric),
    ("Price", FieldKind::Numeric),
    ("Currency2", FieldKind::Text),
    ("MaturityDate", FieldKind::Date),
    ("FixingReference", FieldKind::Text),
    ("SettlementType", FieldKind::Text),
    ("SettlementCurrency", FieldKind::Text),
    ("PaymentDate", FieldKind::Date),
    ("OurPaymentMethod", FieldKind::Text),
    ("CounterpartyPaymentMethod", FieldKind::Text),
];

/// Compare all canonical fields.
///
/// A field is a discrepancy iff the normalised values differ and the
/// email value is present: a missing email value never disputes a
/// populated client value. The discrepancy list preserves the
/// canonical field order.
pub fn compare(email: &ExtractedTrade, client: &Trade) -> (ReconciliationOutcome, Vec<Discrepancy>) {
    let mut discrepancies = Vec::new();

    for (name, kind) in FIELDS {
        let email_raw = email_field(email, name);
        let client_raw = client_field(client, name);

        let email_norm = email_raw.as_deref().and_then(|v| normalize_field(v, *kind));
        let Some(email_norm) = email_norm else {
            continue;
        };
        let client_norm = client_raw.as_deref().and_then(|v| normalize_field(v, *kind));

        if Some(&email_norm) != client_norm.as_ref() {
            discrepancies.push(Discrepancy {
                field: (*name).to_string(),
                email_value: email_raw,
                client_value: client_raw,
            });
        }
    }

    let outcome = if discrepancies.is_empty() {
        ReconciliationOutcome::ConfirmationOk
    } else {
        ReconciliationOutcome::Difference
    };
    (outcome, discrepancies)
}

/// Normalise one value by field kind. Unparseable dates and numbers
/// fall back to text normalisation so garbage still disputes.
fn normalize_field(raw: &str, kind: FieldKind) -> Option<String> {
    match kind {
        FieldKind::Text => normalize_text(raw),
        FieldKind::Date => normalize_date(raw).or_else(|| normalize_text(raw)),
        FieldKind::Numeric => normalize_decimal(raw)
            .map(|d| d.normalize().to_string())
            .or_else(|| normalize_text(raw)),
    }
}

fn email_field(email: &ExtractedTrade, name: &str) -> Option<String> {
    match name {
        "ProductType" => email.product_type.clone(),
        "TradeDate" => email.trade_date.clone(),
        "ValueDate" => email.value_date.clone(),
        "Direction" => email.direction.clone(),
        "Currency1" => email.currency1.clone(),
        "QuantityCurrency1" => email.quantity_currency1.clone(),
        "Price" => email.price.clone(),
        "Currency2" => email.currency2.clone(),
        "MaturityDate" => email.maturity_date.clone(),
        "FixingReference" => email.fixing_reference.clone(),
        "SettlementType" => email.settlement_type.clone(),
        "SettlementCurrency" => email.settlement_currency.clone(),
        "PaymentDate" => email.payment_date.clone(),
        "OurPaymentMethod" => email.our_payment_method.clone(),
        "CounterpartyPaymentMethod" => email.counterparty_payment_method.clone(),
        _ => None,
    }
}

fn client_field(client: &Trade, name: &str) -> Option<String> {
    match name {
        "ProductType" => Some(client.product_type.to_string()),
        "TradeDate" => Some(client.trade_date.clone()),
        "ValueDate" => client.value_date.clone(),
        "Direction" => Some(client.direction.to_string()),
        "Currency1" => Some(client.currency1.clone()),
        "QuantityCurrency1" => Some(client.quantity_currency1.to_string()),
        "Price" => Some(client.price.to_string()),
        "Currency2" => Some(client.currency2.clone()),
        "MaturityDate" => client.maturity_date.clone(),
        "FixingReference" => client.fixing_reference.clone(),
        "SettlementType" => client.settlement_type.map(|s| s.to_string()),
        "SettlementCurrency" => client.settlement_currency.clone(),
        "PaymentDate" => client.payment_date.clone(),
        "OurPaymentMethod" => client.our_payment_method.clone(),
        "CounterpartyPaymentMethod" => client.counterparty_payment_method.clone(),
        _ => None,
    }
}
