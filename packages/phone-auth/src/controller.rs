//! Async OTP flow controller.
//!
//! Wraps a [`FlowMachine`] and executes its commands against the
//! collaborators. Every settled call is fed back into the machine as exactly
//! one event.
//!
//! The controller takes `&self` everywhere so it can be shared between UI
//! tasks. The machine lock is only held while deciding, never across a
//! provider call; the in-flight guard is the state check the machine does
//! under that lock.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{FlowError, ProviderError};
use crate::machine::{FlowCommand, FlowEvent, FlowMachine, FlowOptions, FlowSnapshot, FlowState};
use crate::phone::{PhoneNumber, PhoneNumberNormalizer};
use crate::token::VerificationTokenCache;
use crate::traits::{ChallengeProvider, HumanVerifier, SessionEstablisher};
use crate::types::{ChallengeHandle, OtpCode};

/// Default surface name handed to the human verifier.
pub const DEFAULT_BINDING_TARGET: &str = "recaptcha-container";

/// Drives one user's phone login.
pub struct OtpFlowController {
    machine: Mutex<FlowMachine>,
    tokens: VerificationTokenCache,
    provider: Arc<dyn ChallengeProvider>,
    establisher: Arc<dyn SessionEstablisher>,
    updates: watch::Sender<FlowSnapshot>,
}

impl OtpFlowController {
    pub fn new(
        provider: Arc<dyn ChallengeProvider>,
        verifier: Arc<dyn HumanVerifier>,
        establisher: Arc<dyn SessionEstablisher>,
    ) -> Self {
        Self::builder(provider, verifier, establisher).build()
    }

    pub fn builder(
        provider: Arc<dyn ChallengeProvider>,
        verifier: Arc<dyn HumanVerifier>,
        establisher: Arc<dyn SessionEstablisher>,
    ) -> OtpFlowControllerBuilder {
        OtpFlowControllerBuilder {
            provider,
            verifier,
            establisher,
            normalizer: PhoneNumberNormalizer::default(),
            options: FlowOptions::default(),
            binding_target: DEFAULT_BINDING_TARGET.to_string(),
        }
    }

    /// Current state as the UI should render it.
    pub fn snapshot(&self) -> FlowSnapshot {
        self.updates.borrow().clone()
    }

    pub fn state(&self) -> FlowState {
        self.updates.borrow().state
    }

    /// Receive a snapshot after every transition.
    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot> {
        self.updates.subscribe()
    }

    /// Normalize `raw` and, if valid, send a challenge to it.
    ///
    /// Resolves once the challenge call has settled. An invalid number is not
    /// an `Err`: it shows up as the snapshot's error record.
    pub async fn submit_phone(&self, raw: &str) -> Result<FlowSnapshot, FlowError> {
        let command = self
            .apply(FlowEvent::PhoneSubmitted {
                raw: raw.to_string(),
            })
            .await?;
        self.run(command).await;
        Ok(self.snapshot())
    }

    /// Verify `raw` against the live challenge.
    pub async fn submit_code(&self, raw: &str) -> Result<FlowSnapshot, FlowError> {
        let command = self
            .apply(FlowEvent::CodeSubmitted {
                code: OtpCode::new(raw),
            })
            .await?;
        self.run(command).await;
        Ok(self.snapshot())
    }

    /// Expiry callback of the human-verification widget.
    ///
    /// Drops the cached token and records the error; state is unchanged and
    /// the user has to submit the phone number again.
    pub async fn human_verification_expired(&self) -> FlowSnapshot {
        self.tokens.invalidate().await;
        if let Err(e) = self.apply(FlowEvent::HumanVerificationExpired).await {
            warn!("Expiry event refused: {}", e);
        }
        self.snapshot()
    }

    /// Abandon the current attempt and go back to phone entry.
    ///
    /// Calls still in flight settle into the void.
    pub async fn restart(&self) -> FlowSnapshot {
        if let Err(e) = self.apply(FlowEvent::Restarted).await {
            warn!("Restart refused: {}", e);
        }
        self.snapshot()
    }

    async fn apply(&self, event: FlowEvent) -> Result<Option<FlowCommand>, FlowError> {
        let mut machine = self.machine.lock().await;
        let result = machine.decide(event);
        if result.is_ok() {
            self.updates.send_replace(machine.snapshot());
        }
        result
    }

    async fn run(&self, mut next: Option<FlowCommand>) {
        while let Some(command) = next {
            let event = self.execute(command).await;
            next = match self.apply(event).await {
                Ok(command) => command,
                Err(e) => {
                    warn!("Settled result refused: {}", e);
                    None
                }
            };
        }
    }

    async fn execute(&self, command: FlowCommand) -> FlowEvent {
        match command {
            FlowCommand::IssueChallenge { attempt, phone } => {
                match self.issue_challenge(&phone).await {
                    Ok(handle) => FlowEvent::ChallengeIssued { attempt, handle },
                    Err(error) => FlowEvent::ChallengeFailed { attempt, error },
                }
            }
            FlowCommand::VerifyChallenge {
                attempt,
                handle,
                code,
            } => match self.provider.verify_challenge(&handle, &code).await {
                Ok(credential) => FlowEvent::CodeAccepted {
                    attempt,
                    credential,
                },
                Err(error) => FlowEvent::CodeRejected { attempt, error },
            },
            FlowCommand::EstablishSession {
                attempt,
                phone,
                credential,
            } => match self.establisher.establish(&phone, credential).await {
                Ok(()) => FlowEvent::SessionEstablished { attempt },
                Err(error) => FlowEvent::SessionRejected { attempt, error },
            },
        }
    }

    /// Issue a challenge, re-obtaining the human-verification token and
    /// retrying once if the provider reports it expired.
    async fn issue_challenge(&self, phone: &PhoneNumber) -> Result<ChallengeHandle, ProviderError> {
        let token = self.tokens.get().await?;
        match self.provider.issue_challenge(phone, &token).await {
            Err(ProviderError::HumanVerificationExpired) => {
                info!("Human verification expired, retrying with a fresh token");
                self.tokens.invalidate().await;
                let token = self.tokens.get().await?;
                let result = self.provider.issue_challenge(phone, &token).await;
                if matches!(result, Err(ProviderError::HumanVerificationExpired)) {
                    self.tokens.invalidate().await;
                }
                result
            }
            result => {
                debug!(ok = result.is_ok(), "Challenge request settled");
                result
            }
        }
    }
}

/// Optional settings for [`OtpFlowController`].
pub struct OtpFlowControllerBuilder {
    provider: Arc<dyn ChallengeProvider>,
    verifier: Arc<dyn HumanVerifier>,
    establisher: Arc<dyn SessionEstablisher>,
    normalizer: PhoneNumberNormalizer,
    options: FlowOptions,
    binding_target: String,
}

impl OtpFlowControllerBuilder {
    pub fn normalizer(mut self, normalizer: PhoneNumberNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn options(mut self, options: FlowOptions) -> Self {
        self.options = options;
        self
    }

    pub fn binding_target(mut self, binding_target: impl Into<String>) -> Self {
        self.binding_target = binding_target.into();
        self
    }

    pub fn build(self) -> OtpFlowController {
        let machine = FlowMachine::new(self.normalizer, self.options);
        let (updates, _) = watch::channel(machine.snapshot());

        OtpFlowController {
            machine: Mutex::new(machine),
            tokens: VerificationTokenCache::new(self.verifier, self.binding_target),
            provider: self.provider,
            establisher: self.establisher,
            updates,
        }
    }
}
