//! Lazily obtained human-verification token.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ProviderError;
use crate::traits::HumanVerifier;
use crate::types::HumanVerificationToken;

/// Holds at most one token per controller.
///
/// The token is obtained on first use, reused across attempts and replaced
/// only after [`invalidate`](Self::invalidate).
pub struct VerificationTokenCache {
    verifier: Arc<dyn HumanVerifier>,
    binding_target: String,
    current: Mutex<Option<HumanVerificationToken>>,
}

impl VerificationTokenCache {
    pub fn new(verifier: Arc<dyn HumanVerifier>, binding_target: impl Into<String>) -> Self {
        Self {
            verifier,
            binding_target: binding_target.into(),
            current: Mutex::new(None),
        }
    }

    /// Return the cached token, obtaining one if there is none.
    pub async fn get(&self) -> Result<HumanVerificationToken, ProviderError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            return Ok(token.clone());
        }

        debug!(target_id = %self.binding_target, "Obtaining human verification token");
        let token = self.verifier.obtain_token(&self.binding_target).await?;
        *current = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next [`get`](Self::get) obtains a new one.
    pub async fn invalidate(&self) {
        if self.current.lock().await.take().is_some() {
            debug!("Human verification token invalidated");
        }
    }

    pub async fn is_cached(&self) -> bool {
        self.current.lock().await.is_some()
    }
}
