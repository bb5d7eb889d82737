//! Sender-domain to counterparty-name resolution
//!
//! Used when the LLM could not extract a counterparty name from the
//! email body; the sending bank's domain is a reliable fallback.

/// Static mapping from bank sender domains to counterparty names.
const DOMAIN_COUNTERPARTIES: &[(&str, &str)] = &[
    ("bancoabc.cl", "Banco ABC"),
    ("santander.cl", "Banco Santander"),
    ("bancochile.cl", "Banco de Chile"),
    ("bancoestado.cl", "BancoEstado"),
    ("bci.cl", "BCI"),
    ("itau.cl", "Banco Itaú"),
    ("scotiabank.cl", "Scotiabank"),
    ("security.cl", "Banco Security"),
    ("bice.cl", "Banco BICE"),
    ("corpbanca.cl", "CorpBanca"),
];

/// Resolve a counterparty name from a sender address.
///
/// Matches the registered domain or any subdomain of it.
pub fn counterparty_for_sender(sender: &str) -> Option<&'static str> {
    let address = sender.trim().trim_end_matches('>');
    let domain = address.rsplit('@').next()?.trim().to_lowercase();
    if domain.is_empty() {
        return None;
    }

    DOMAIN_COUNTERPARTIES
        .iter()
        .find(|(known, _)| domain == *known || domain.ends_with(&format!(".{known}")))
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_domains() {
        assert_eq!(
            counterparty_for_sender("confirmaciones@bancoabc.cl"),
            Some("Banco ABC")
        );
        assert_eq!(
            counterparty_for_sender("Mesa FX <fx@santander.cl>"),
            Some("Banco Santander")
        );
    }

    #[test]
    fn resolves_subdomains() {
        assert_eq!(
            counterparty_for_sender("ops@mesa.bancoabc.cl"),
            Some("Banco ABC")
        );
    }

    #[test]
    fn unknown_domains_resolve_to_none() {
        assert_eq!(counterparty_for_sender("someone@example.com"), None);
        assert_eq!(counterparty_for_sender("not-an-address"), None);
    }
}
