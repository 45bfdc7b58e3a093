//! Values exchanged between the controller and its collaborators.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::secret::Secret;

/// Opaque identifier of an issued challenge.
///
/// For Identity Toolkit this is the `sessionInfo` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeHandle(String);

impl ChallengeHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Code as entered by the user.
///
/// Only surrounding whitespace is removed; the provider decides whether the
/// code is well formed.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpCode(String);

impl OtpCode {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OtpCode({} chars)", self.0.chars().count())
    }
}

/// Proof of a human/browser context, required before a challenge is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanVerificationToken(Secret);

impl HumanVerificationToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Secret::new(value))
    }

    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

/// What a successful verification yields.
///
/// Opaque to the controller; it is handed unchanged to the
/// [`SessionEstablisher`](crate::traits::SessionEstablisher).
#[derive(Debug, Clone)]
pub struct SessionCredential {
    pub id_token: Secret,
    pub refresh_token: Secret,
    /// Provider-side user id
    pub user_id: Option<String>,
    /// Phone number as the provider recorded it
    pub phone_number: Option<String>,
    /// Lifetime of `id_token`
    pub expires_in: Option<Duration>,
    pub is_new_user: bool,
    pub issued_at: DateTime<Utc>,
}

impl SessionCredential {
    pub fn new(id_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            id_token: Secret::new(id_token),
            refresh_token: Secret::new(refresh_token),
            user_id: None,
            phone_number: None,
            expires_in: None,
            is_new_user: false,
            issued_at: Utc::now(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in.map(|ttl| self.issued_at + ttl)
    }
}
