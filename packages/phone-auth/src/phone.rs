//! Phone number normalization.
//!
//! User input is free-form (`"98765 43210"`, `"(+91) 98765-43210"`). The
//! identity provider only accepts one canonical, country-prefixed form, so
//! every number passes through [`PhoneNumberNormalizer`] before any network
//! call is made.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::NormalizationError;

/// Dialing rules for the single supported country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRule {
    /// Calling code without the leading `+`, e.g. `"91"`
    pub calling_code: String,
    /// Number of digits in a national number
    pub national_len: usize,
    /// Adjective used in user-facing messages, e.g. `"Indian"`
    pub name: String,
}

impl CountryRule {
    pub fn new(calling_code: impl Into<String>, national_len: usize, name: impl Into<String>) -> Self {
        Self {
            calling_code: calling_code.into(),
            national_len,
            name: name.into(),
        }
    }

    /// India: `+91` followed by a 10-digit mobile number.
    pub fn india() -> Self {
        Self::new("91", 10, "Indian")
    }

    /// Digit count of a number that already carries the calling code.
    pub fn prefixed_len(&self) -> usize {
        self.calling_code.len() + self.national_len
    }

    fn format_hint(&self) -> String {
        format!(
            "Invalid phone number format. Please enter a {}-digit {} mobile number.",
            self.national_len, self.name
        )
    }
}

impl Default for CountryRule {
    fn default() -> Self {
        Self::india()
    }
}

/// A phone number that passed normalization.
///
/// Only valid numbers are ever constructed; a failed normalization is a
/// [`NormalizationError`] instead of a `PhoneNumber` with a validity flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneNumber {
    raw: String,
    canonical: String,
}

impl PhoneNumber {
    /// Input exactly as the user typed it
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Canonical `+<calling code><national number>` form
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Short SHA256 fingerprint of the canonical number, safe to log.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        hash[..12].to_string()
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Converts raw input into a [`PhoneNumber`] for one country.
#[derive(Debug, Clone, Default)]
pub struct PhoneNumberNormalizer {
    rule: CountryRule,
}

impl PhoneNumberNormalizer {
    pub fn new(rule: CountryRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &CountryRule {
        &self.rule
    }

    /// Normalize free-form input.
    ///
    /// All non-digit characters are stripped. What remains must be either a
    /// bare national number or a national number preceded by the calling
    /// code; anything else is rejected.
    pub fn normalize(&self, raw: &str) -> Result<PhoneNumber, NormalizationError> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        let canonical = if digits.len() == self.rule.national_len {
            format!("+{}{}", self.rule.calling_code, digits)
        } else if digits.len() == self.rule.prefixed_len()
            && digits.starts_with(&self.rule.calling_code)
        {
            format!("+{}", digits)
        } else {
            return Err(NormalizationError::InvalidFormat {
                message: self.rule.format_hint(),
            });
        };

        Ok(PhoneNumber {
            raw: raw.to_string(),
            canonical,
        })
    }
}

/// Normalize with the default country rule.
pub fn normalize(raw: &str) -> Result<PhoneNumber, NormalizationError> {
    PhoneNumberNormalizer::default().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_national_number_gets_prefix() {
        let phone = normalize("9876543210").unwrap();
        assert_eq!(phone.canonical(), "+919876543210");
        assert_eq!(phone.raw(), "9876543210");
    }

    #[test]
    fn test_separators_are_stripped() {
        for raw in ["98765-43210", "98765 43210", "(987) 654.3210", " 9 8 7 6 5 4 3 2 1 0 "] {
            let phone = normalize(raw).unwrap();
            assert_eq!(phone.canonical(), "+919876543210", "input: {raw:?}");
        }
    }

    #[test]
    fn test_prefixed_number_is_accepted() {
        assert_eq!(normalize("919876543210").unwrap().canonical(), "+919876543210");
        assert_eq!(normalize("+91 98765 43210").unwrap().canonical(), "+919876543210");
    }

    #[test]
    fn test_canonical_output_is_stable() {
        let first = normalize("98765-43210").unwrap();
        let again = normalize(first.canonical().trim_start_matches('+')).unwrap();
        assert_eq!(first.canonical(), again.canonical());

        let with_plus = normalize(first.canonical()).unwrap();
        assert_eq!(first.canonical(), with_plus.canonical());
    }

    #[test]
    fn test_wrong_country_code_is_rejected() {
        let err = normalize("449876543210").unwrap_err();
        assert!(matches!(err, NormalizationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_wrong_digit_counts_are_rejected() {
        for raw in ["", "123", "987654321", "98765432101", "9198765432101", "abc-def"] {
            assert!(normalize(raw).is_err(), "input: {raw:?}");
        }
    }

    #[test]
    fn test_error_message_describes_national_format() {
        let err = normalize("123").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid phone number format. Please enter a 10-digit Indian mobile number."
        );
    }

    #[test]
    fn test_custom_country_rule() {
        let normalizer = PhoneNumberNormalizer::new(CountryRule::new("1", 10, "US"));
        assert_eq!(
            normalizer.normalize("(415) 555-1212").unwrap().canonical(),
            "+14155551212"
        );
        assert_eq!(
            normalizer.normalize("1-415-555-1212").unwrap().canonical(),
            "+14155551212"
        );
        assert!(normalizer.normalize("44 415 555 1212").is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = normalize("9876543210").unwrap();
        let b = normalize("+91 98765 43210").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
        assert!(a.fingerprint().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
