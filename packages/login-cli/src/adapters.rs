//! Collaborators of the login flow, backed by Identity Toolkit and the terminal.
//!
//! All external services are reached through the `phone_auth` traits; this
//! module is the only place that knows about `identity_toolkit` types.

use async_trait::async_trait;
use chrono::Duration;
use dialoguer::{theme::ColorfulTheme, Password};
use identity_toolkit::{IdentityToolkitError, IdentityToolkitService, SignInWithPhoneNumberResponse};
use phone_auth::{
    ChallengeHandle, ChallengeProvider, HumanVerificationToken, HumanVerifier, OtpCode,
    PhoneNumber, ProviderError, SessionCredential, SessionEstablisher,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::context::AppContext;

// =============================================================================
// IdentityToolkitService Adapter (implements ChallengeProvider trait)
// =============================================================================

/// Wrapper around IdentityToolkitService that implements ChallengeProvider
pub struct IdentityToolkitAdapter(pub Arc<IdentityToolkitService>);

impl IdentityToolkitAdapter {
    pub fn new(service: Arc<IdentityToolkitService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl ChallengeProvider for IdentityToolkitAdapter {
    async fn issue_challenge(
        &self,
        phone: &PhoneNumber,
        token: &HumanVerificationToken,
    ) -> Result<ChallengeHandle, ProviderError> {
        self.0
            .send_verification_code(phone.canonical(), token.expose())
            .await
            .map(ChallengeHandle::new)
            .map_err(to_provider_error)
    }

    async fn verify_challenge(
        &self,
        handle: &ChallengeHandle,
        code: &OtpCode,
    ) -> Result<SessionCredential, ProviderError> {
        self.0
            .sign_in_with_phone_number(handle.as_str(), code.as_str())
            .await
            .map(to_credential)
            .map_err(to_provider_error)
    }
}

fn to_provider_error(err: IdentityToolkitError) -> ProviderError {
    if err.is_recaptcha_failure() {
        return ProviderError::HumanVerificationExpired;
    }
    match err {
        IdentityToolkitError::Api { code, message, .. } => ProviderError::Rejected { code, message },
        other => ProviderError::Transport(other.to_string()),
    }
}

fn to_credential(response: SignInWithPhoneNumberResponse) -> SessionCredential {
    let expires_in = response.expires_in_seconds().map(Duration::seconds);
    let mut credential = SessionCredential::new(response.id_token, response.refresh_token);
    credential.user_id = response.local_id;
    credential.phone_number = response.phone_number;
    credential.expires_in = expires_in;
    credential.is_new_user = response.is_new_user;
    credential
}

// =============================================================================
// Prompted Human Verifier
// =============================================================================

/// Uses the configured reCAPTCHA token once, then asks the user to paste a
/// freshly solved one whenever another token is needed.
pub struct PromptedHumanVerifier {
    preset: Mutex<Option<SecretString>>,
}

impl PromptedHumanVerifier {
    pub fn new(preset: Option<SecretString>) -> Self {
        Self {
            preset: Mutex::new(preset),
        }
    }

    fn take_preset(&self) -> Option<SecretString> {
        self.preset.lock().ok().and_then(|mut preset| preset.take())
    }
}

#[async_trait]
impl HumanVerifier for PromptedHumanVerifier {
    async fn obtain_token(&self, binding_target: &str) -> Result<HumanVerificationToken, ProviderError> {
        if let Some(token) = self.take_preset() {
            debug!("Using configured reCAPTCHA token");
            return Ok(HumanVerificationToken::new(token.expose_secret()));
        }

        let prompt = format!("Paste a solved reCAPTCHA token ({})", binding_target);
        let token = tokio::task::spawn_blocking(move || {
            Password::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .interact()
        })
        .await
        .map_err(|e| ProviderError::Transport(format!("prompt task failed: {}", e)))?
        .map_err(|e| ProviderError::Transport(format!("could not read token: {}", e)))?;

        Ok(HumanVerificationToken::new(token.trim()))
    }
}

// =============================================================================
// Console Session Establisher
// =============================================================================

/// Reports the signed-in session on the terminal.
pub struct ConsoleSessionEstablisher {
    ctx: Arc<AppContext>,
    print_id_token: bool,
}

impl ConsoleSessionEstablisher {
    pub fn new(ctx: Arc<AppContext>, print_id_token: bool) -> Self {
        Self {
            ctx,
            print_id_token,
        }
    }
}

#[async_trait]
impl SessionEstablisher for ConsoleSessionEstablisher {
    async fn establish(
        &self,
        phone: &PhoneNumber,
        credential: SessionCredential,
    ) -> Result<(), ProviderError> {
        info!(
            phone = %phone.fingerprint(),
            new_user = credential.is_new_user,
            "Session established"
        );

        self.ctx.print_success("OTP verified successfully. You are now logged in!");
        if let Some(user_id) = &credential.user_id {
            self.ctx.print_info(&format!("User: {}", user_id));
        }
        if let Some(expires_at) = credential.expires_at() {
            self.ctx.print_info(&format!("ID token valid until {}", expires_at.to_rfc3339()));
        }
        if self.print_id_token {
            println!("{}", credential.id_token.expose());
        }
        Ok(())
    }
}
