//! Pure Google Identity Toolkit REST client.
//!
//! Covers the two calls behind Firebase phone sign-in:
//! `accounts:sendVerificationCode` (send an SMS code, get a `sessionInfo`
//! handle) and `accounts:signInWithPhoneNumber` (exchange handle + code for
//! ID and refresh tokens).
//!
//! # Example
//!
//! ```rust,ignore
//! use identity_toolkit::{IdentityToolkitOptions, IdentityToolkitService};
//!
//! let service = IdentityToolkitService::new(IdentityToolkitOptions::new(api_key));
//!
//! let session_info = service.send_verification_code("+919876543210", &recaptcha).await?;
//! let tokens = service.sign_in_with_phone_number(&session_info, "123456").await?;
//! ```

pub mod error;
pub mod models;

pub use error::{IdentityToolkitError, Result};
pub use models::{SendVerificationCodeResponse, SignInWithPhoneNumberResponse};

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::error_code;
use crate::models::{ErrorEnvelope, SendVerificationCodeRequest, SignInWithPhoneNumberRequest};

pub const DEFAULT_BASE_URL: &str = "https://identitytoolkit.googleapis.com";

#[derive(Debug)]
pub struct IdentityToolkitOptions {
    pub api_key: SecretString,
    /// Multi-tenant projects only
    pub tenant_id: Option<String>,
    /// Override for the Auth emulator, e.g.
    /// `http://localhost:9099/identitytoolkit.googleapis.com`
    pub base_url: String,
}

impl IdentityToolkitOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            tenant_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug)]
pub struct IdentityToolkitService {
    client: Client,
    options: IdentityToolkitOptions,
}

impl IdentityToolkitService {
    pub fn new(options: IdentityToolkitOptions) -> Self {
        Self {
            client: Client::new(),
            options,
        }
    }

    /// Send an SMS verification code and return the `sessionInfo` handle.
    pub async fn send_verification_code(
        &self,
        phone_number: &str,
        recaptcha_token: &str,
    ) -> Result<String> {
        let request = SendVerificationCodeRequest {
            phone_number: phone_number.to_string(),
            recaptcha_token: recaptcha_token.to_string(),
            tenant_id: self.options.tenant_id.clone(),
        };

        let response: SendVerificationCodeResponse =
            self.post("accounts:sendVerificationCode", &request).await?;
        debug!("Verification code sent");
        Ok(response.session_info)
    }

    /// Exchange a `sessionInfo` handle and the SMS code for tokens.
    pub async fn sign_in_with_phone_number(
        &self,
        session_info: &str,
        code: &str,
    ) -> Result<SignInWithPhoneNumberResponse> {
        let request = SignInWithPhoneNumberRequest {
            session_info: session_info.to_string(),
            code: code.to_string(),
            tenant_id: self.options.tenant_id.clone(),
        };

        let response: SignInWithPhoneNumberResponse =
            self.post("accounts:signInWithPhoneNumber", &request).await?;
        debug!(is_new_user = response.is_new_user, "Signed in with phone number");
        Ok(response)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, method: &str, body: &B) -> Result<T> {
        let url = format!("{}/v1/{}", self.options.base_url, method);

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.options.api_key.expose_secret())])
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => envelope.error.message,
                Err(_) => text,
            };
            error!("Identity Toolkit {} failed ({}): {}", method, status, message);
            return Err(IdentityToolkitError::Api {
                status: status.as_u16(),
                code: error_code(&message),
                message,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}
