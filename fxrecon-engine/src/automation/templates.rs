//! Notification templates
//!
//! Confirmation and dispute bodies are selected by tenant language;
//! Spanish is the default for the Chilean client base.

use fxrecon_common::model::Discrepancy;

pub struct EmailContent {
    pub subject: String,
    pub body: String,
}

/// Confirmation email for a reconciled trade.
pub fn confirmation_email(
    language: &str,
    tenant_name: &str,
    trade_number: &str,
) -> EmailContent {
    if is_english(language) {
        EmailContent {
            subject: format!("Trade confirmation {trade_number} - {tenant_name}"),
            body: format!(
                "Dear counterparty,\n\n\
                 We confirm that trade {trade_number} matches our records. \
                 All fields were verified and no differences were found.\n\n\
                 Regards,\n{tenant_name}"
            ),
        }
    } else {
        EmailContent {
            subject: format!("Confirmación operación {trade_number} - {tenant_name}"),
            body: format!(
                "Estimados,\n\n\
                 Confirmamos que la operación {trade_number} coincide con \
                 nuestros registros. Todos los campos fueron verificados sin \
                 encontrar diferencias.\n\n\
                 Saludos,\n{tenant_name}"
            ),
        }
    }
}

/// Dispute email listing every differing field.
pub fn dispute_email(
    language: &str,
    tenant_name: &str,
    trade_number: &str,
    discrepancies: &[Discrepancy],
) -> EmailContent {
    let absent = if is_english(language) { "(not stated)" } else { "(no indicado)" };
    let lines: String = discrepancies
        .iter()
        .map(|d| {
            format!(
                "- {}: {} / {}\n",
                d.field,
                d.email_value.as_deref().unwrap_or(absent),
                d.client_value.as_deref().unwrap_or(absent),
            )
        })
        .collect();

    if is_english(language) {
        EmailContent {
            subject: format!("Discrepancy on trade {trade_number} - {tenant_name}"),
            body: format!(
                "Dear counterparty,\n\n\
                 Trade {trade_number} does not match our records on the \
                 following fields (your value / our value):\n\n{lines}\n\
                 Please review and resend the confirmation.\n\n\
                 Regards,\n{tenant_name}"
            ),
        }
    } else {
        EmailContent {
            subject: format!("Discrepancia operación {trade_number} - {tenant_name}"),
            body: format!(
                "Estimados,\n\n\
                 La operación {trade_number} no coincide con nuestros \
                 registros en los siguientes campos (su valor / nuestro valor):\n\n{lines}\n\
                 Favor revisar y reenviar la confirmación.\n\n\
                 Saludos,\n{tenant_name}"
            ),
        }
    }
}

/// One-line SMS notice. The notifier truncates to the SMS length cap.
pub fn sms_notice(language: &str, trade_number: &str, disputed: bool) -> String {
    match (is_english(language), disputed) {
        (true, false) => format!("Trade {trade_number} confirmed OK"),
        (true, true) => format!("Trade {trade_number} has discrepancies, review needed"),
        (false, false) => format!("Operación {trade_number} confirmada OK"),
        (false, true) => format!("Operación {trade_number} con discrepancias, requiere revisión"),
    }
}

fn is_english(language: &str) -> bool {
    language.eq_ignore_ascii_case("en")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_is_the_default_language() {
        let content = confirmation_email("es", "Acme Corp", "32013");
        assert!(content.subject.starts_with("Confirmación"));
        let fallback = confirmation_email("pt", "Acme Corp", "32013");
        assert!(fallback.subject.starts_with("Confirmación"));
    }

    #[test]
    fn dispute_lists_each_discrepancy_with_both_values() {
        let content = dispute_email(
            "en",
            "Acme Corp",
            "32013",
            &[Discrepancy {
                field: "Price".to_string(),
                email_value: Some("932.98".to_string()),
                client_value: Some("932.88".to_string()),
            }],
        );
        assert!(content.body.contains("- Price: 932.98 / 932.88"));
    }

    #[test]
    fn missing_values_render_as_absent() {
        let content = dispute_email(
            "es",
            "Acme Corp",
            "32013",
            &[Discrepancy {
                field: "FixingReference".to_string(),
                email_value: None,
                client_value: Some("DOLAR OBS".to_string()),
            }],
        );
        assert!(content.body.contains("(no indicado) / DOLAR OBS"));
    }
}
