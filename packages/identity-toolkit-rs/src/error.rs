use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityToolkitError>;

/// Error codes meaning the reCAPTCHA token was not (or no longer) accepted.
const RECAPTCHA_CODES: &[&str] = &[
    "CAPTCHA_CHECK_FAILED",
    "INVALID_RECAPTCHA_TOKEN",
    "MISSING_RECAPTCHA_TOKEN",
    "INVALID_APP_CREDENTIAL",
];

#[derive(Debug, Error)]
pub enum IdentityToolkitError {
    /// Non-2xx answer. `code` is the leading token of the error message,
    /// e.g. `INVALID_CODE` for `"INVALID_CODE"` or `INVALID_PHONE_NUMBER`
    /// for `"INVALID_PHONE_NUMBER : Invalid format."`.
    #[error("Identity Toolkit error ({status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse Identity Toolkit response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl IdentityToolkitError {
    pub fn code(&self) -> Option<&str> {
        match self {
            IdentityToolkitError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the request failed because of the reCAPTCHA token.
    pub fn is_recaptcha_failure(&self) -> bool {
        self.code().is_some_and(|code| RECAPTCHA_CODES.contains(&code))
    }
}

/// Split `"CODE : detail"` into its code part.
pub(crate) fn error_code(message: &str) -> String {
    message
        .split(" : ")
        .next()
        .unwrap_or(message)
        .trim()
        .to_string()
}
