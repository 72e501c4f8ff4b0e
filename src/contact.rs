//! Outbound contact helpers: deep links into a third-party messaging app.
//! There is no delivery confirmation; the link is handed back to the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::error::{Error, Result};

// Country code plus area code plus an 8-digit number, with the optional
// leading 9 mobile numbers carry. Matches after stripping formatting.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^55\d{2}9?\d{8}$").expect("valid regex"));

/// Builds a `wa.me` deep link for a phone number and a prefilled message.
/// Non-digits are stripped before validation, so formatted input like
/// `+55 11 99999-9999` is accepted.
pub fn messaging_link(phone: &str, message: &str) -> Result<String> {
    if message.trim().is_empty() {
        return Err(Error::Validation("message must be non-empty".into()));
    }
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if !PHONE_RE.is_match(&digits) {
        return Err(Error::Validation(
            "phone must be an international number with country code (e.g. +55 11 99999-9999)"
                .into(),
        ));
    }
    let url = Url::parse_with_params(&format!("https://wa.me/{digits}"), &[("text", message)])
        .map_err(|e| Error::Internal(format!("failed to build messaging link: {e}")))?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_number_produces_link() {
        let link = messaging_link("+55 11 99999-9999", "Oi, vi seu horário").unwrap();
        assert!(link.starts_with("https://wa.me/5511999999999?text="));
        assert!(link.contains("text=Oi"));
        // The message is percent-encoded into the query.
        assert!(!link.contains(' '));
    }

    #[test]
    fn landline_without_ninth_digit_is_accepted() {
        let link = messaging_link("55 11 3333-4444", "hello").unwrap();
        assert!(link.starts_with("https://wa.me/551133334444?"));
    }

    #[test]
    fn missing_country_code_is_rejected() {
        assert!(matches!(
            messaging_link("11 99999-9999", "hello"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn garbage_and_empty_message_are_rejected() {
        assert!(matches!(
            messaging_link("not-a-phone", "hello"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            messaging_link("+55 11 99999-9999", "   "),
            Err(Error::Validation(_))
        ));
    }
}
