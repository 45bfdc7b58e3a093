// Collaborator traits
//
// The controller only talks to the outside world through these traits, so
// the identity provider, the bot-mitigation widget and the session layer can
// be swapped for test doubles.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::phone::PhoneNumber;
use crate::types::{ChallengeHandle, HumanVerificationToken, OtpCode, SessionCredential};

// =============================================================================
// Human Verification (bot mitigation widget)
// =============================================================================

#[async_trait]
pub trait HumanVerifier: Send + Sync {
    /// Obtain a token proving a human/browser context.
    ///
    /// `binding_target` names the surface the widget is attached to.
    async fn obtain_token(&self, binding_target: &str) -> Result<HumanVerificationToken, ProviderError>;
}

// =============================================================================
// Challenge Provider (identity provider - OTP send/check)
// =============================================================================

#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    /// Send an OTP to `phone` and return the handle identifying the challenge.
    ///
    /// Returns `ProviderError::HumanVerificationExpired` when `token` is no
    /// longer accepted.
    async fn issue_challenge(
        &self,
        phone: &PhoneNumber,
        token: &HumanVerificationToken,
    ) -> Result<ChallengeHandle, ProviderError>;

    /// Check `code` against the challenge.
    ///
    /// Wrong code, expired challenge and unknown handle all come back as a
    /// plain provider error.
    async fn verify_challenge(
        &self,
        handle: &ChallengeHandle,
        code: &OtpCode,
    ) -> Result<SessionCredential, ProviderError>;
}

// =============================================================================
// Session Establisher
// =============================================================================

#[async_trait]
pub trait SessionEstablisher: Send + Sync {
    /// Turn a verified credential into an authenticated session.
    async fn establish(
        &self,
        phone: &PhoneNumber,
        credential: SessionCredential,
    ) -> Result<(), ProviderError>;
}
