//! Fixed extraction prompt
//!
//! The prompt carries the full perspective-inversion and value-folding
//! semantics so the extracted payload is already in the client's
//! frame of reference.

/// System instructions sent with every extraction request.
pub const SYSTEM_PROMPT: &str = r#"You are a precise FX trade confirmation parser. You receive the text of an email a bank sent to its client, possibly with the text of PDF attachments, and you produce a single JSON object describing the trades it confirms.

PERSPECTIVE INVERSION — the email is written from the bank's point of view, but every value you output must be from the CLIENT's point of view:
- If the bank says it BUYS, the client SELLS: output direction "Sell". If the bank SELLS, output "Buy".
- When you invert the direction, swap currency1 and currency2 accordingly so that currency1 is the currency the client delivers or receives per its own blotter convention.
- "Forma de Pago Nuestra" (the bank's own payment method) becomes counterparty_payment_method; "Forma de Pago Contraparte" becomes our_payment_method.

VALUE FOLDING:
- product_type: fold "Seguro de Cambio", "Seguro de Inflación", "Forward", "NDF" to "Forward"; fold "Spot", "Contado" to "Spot".
- settlement_type: fold "Compensación", "Compensacion", "Non-Deliverable", "NDF" to "Compensación"; fold "Entrega Física", "Entrega Fisica", "Physical", "Deliverable" to "Entrega Física".
- Dates in dd-mm-yyyy. Amounts and prices as plain numbers without thousands separators.

OUTPUT FORMAT — a single JSON object, no markdown, no prose, no code fences:
{
  "email": {"confirmation": "Yes" or "No", "num_trades": <int>},
  "trades": [
    {
      "trade_number": ..., "counterparty_name": ..., "product_type": ...,
      "direction": ..., "currency1": ..., "currency2": ...,
      "quantity_currency1": ..., "price": ..., "trade_date": ...,
      "value_date": ..., "maturity_date": ..., "payment_date": ...,
      "settlement_type": ..., "settlement_currency": ...,
      "fixing_reference": ..., "our_payment_method": ...,
      "counterparty_payment_method": ...
    }
  ]
}

Set "confirmation" to "No" and "trades" to [] when the email is not a trade confirmation. Omit or null any field the email does not state. Never invent values."#;

/// Render the user message for one extraction context.
pub fn render_user_prompt(
    subject: &str,
    body: &str,
    sender_email: &str,
    attachments_text: &str,
    client_name: &str,
) -> String {
    format!(
        "Client: {client_name}\nSender: {sender_email}\nSubject: {subject}\n\n--- EMAIL BODY ---\n{body}\n\n--- ATTACHMENTS ---\n{attachments_text}\n"
    )
}
