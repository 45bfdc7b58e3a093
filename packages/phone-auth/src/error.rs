//! Typed errors for the phone login flow.
//!
//! Three layers:
//! - [`NormalizationError`]: local input validation, never touches the network
//! - [`ProviderError`]: everything a collaborator (identity provider, human
//!   verifier, session establisher) can report, already stripped of
//!   provider-internal types
//! - [`FlowError`]: the controller refusing an event in its current state
//!
//! Failures that the user should see are not errors of the controller API;
//! they land in the [`ErrorRecord`] of the current snapshot.

use serde::Serialize;
use thiserror::Error;

use crate::machine::FlowState;

/// Phone input could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("{message}")]
    InvalidFormat { message: String },
}

/// Errors reported by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The human-verification token is no longer accepted
    #[error("human verification expired")]
    HumanVerificationExpired,

    /// The provider answered and refused the request
    #[error("{message}")]
    Rejected { code: String, message: String },

    /// The request never got a usable answer (connection, decoding)
    #[error("{0}")]
    Transport(String),
}

impl ProviderError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// The controller did not accept an event.
///
/// Rejections leave state and error record untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// A network call for this step is still outstanding
    #[error("request already in flight while {state}")]
    Busy { state: FlowState },

    /// The event is not valid in the current state
    #[error("cannot handle {event} while {state}")]
    NotAccepting { state: FlowState, event: &'static str },
}

/// Category of the last user-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidFormat,
    HumanVerificationExpired,
    ChallengeIssueFailed,
    VerificationFailed,
    SessionEstablishmentFailed,
}

/// Last user-visible failure, cleared when a new attempt starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    pub fn invalid_format(err: &NormalizationError) -> Self {
        Self {
            kind: ErrorKind::InvalidFormat,
            message: err.to_string(),
        }
    }

    pub fn human_verification_expired() -> Self {
        Self {
            kind: ErrorKind::HumanVerificationExpired,
            message: "Human verification expired. Please try again.".to_string(),
        }
    }

    pub fn challenge_issue_failed(reason: &str) -> Self {
        Self {
            kind: ErrorKind::ChallengeIssueFailed,
            message: format!("Failed to send OTP: {}", reason),
        }
    }

    pub fn verification_failed(reason: &str) -> Self {
        Self {
            kind: ErrorKind::VerificationFailed,
            message: format!("Invalid OTP: {}", reason),
        }
    }

    pub fn session_establishment_failed(reason: &str) -> Self {
        Self {
            kind: ErrorKind::SessionEstablishmentFailed,
            message: format!("Failed to establish session: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_messages_are_passed_through_verbatim() {
        let err = ProviderError::rejected("TOO_MANY_ATTEMPTS_TRY_LATER", "TOO_MANY_ATTEMPTS_TRY_LATER");
        let record = ErrorRecord::challenge_issue_failed(&err.to_string());
        assert_eq!(record.kind, ErrorKind::ChallengeIssueFailed);
        assert_eq!(record.message, "Failed to send OTP: TOO_MANY_ATTEMPTS_TRY_LATER");

        let record = ErrorRecord::verification_failed(&ProviderError::Transport("timed out".into()).to_string());
        assert_eq!(record.message, "Invalid OTP: timed out");
    }

    #[test]
    fn test_flow_error_display() {
        let err = FlowError::Busy {
            state: FlowState::SendingChallenge,
        };
        assert_eq!(err.to_string(), "request already in flight while SendingChallenge");
    }
}
