//! Pure OTP flow state machine.
//!
//! The machine interprets events and decides on commands. It owns the flow
//! state, the per-attempt values and the error record, and it never does IO:
//! provider calls are described as [`FlowCommand`]s, executed by the
//! [`OtpFlowController`](crate::controller::OtpFlowController), and their
//! settled results come back as events.
//!
//! # Key Properties
//!
//! - **One event, at most one command**: `decide` returns `Option<FlowCommand>`
//! - **One outstanding call per step**: submitting while the step is in
//!   flight is refused with [`FlowError::Busy`]
//! - **Stale results are dropped**: every command carries the attempt number
//!   it was issued under, and settle events from an older attempt are ignored

use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{ErrorRecord, FlowError, ProviderError};
use crate::phone::{PhoneNumber, PhoneNumberNormalizer};
use crate::types::{ChallengeHandle, OtpCode, SessionCredential};

/// Which step of the login the user is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowState {
    CollectingPhone,
    SendingChallenge,
    AwaitingCode,
    VerifyingCode,
    Authenticated,
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::CollectingPhone => "CollectingPhone",
            FlowState::SendingChallenge => "SendingChallenge",
            FlowState::AwaitingCode => "AwaitingCode",
            FlowState::VerifyingCode => "VerifyingCode",
            FlowState::Authenticated => "Authenticated",
            FlowState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Tunables for the machine.
#[derive(Debug, Clone, Default)]
pub struct FlowOptions {
    /// Failed verifications allowed per challenge before the flow moves to
    /// `Failed`. `None` means the user may retry the code indefinitely.
    pub max_verify_attempts: Option<u32>,
}

/// Facts fed into the machine: user input and settled provider calls.
#[derive(Debug)]
pub enum FlowEvent {
    PhoneSubmitted { raw: String },
    ChallengeIssued { attempt: u64, handle: ChallengeHandle },
    ChallengeFailed { attempt: u64, error: ProviderError },
    CodeSubmitted { code: OtpCode },
    CodeAccepted { attempt: u64, credential: SessionCredential },
    CodeRejected { attempt: u64, error: ProviderError },
    SessionEstablished { attempt: u64 },
    SessionRejected { attempt: u64, error: ProviderError },
    HumanVerificationExpired,
    Restarted,
}

impl FlowEvent {
    fn name(&self) -> &'static str {
        match self {
            FlowEvent::PhoneSubmitted { .. } => "submit_phone",
            FlowEvent::ChallengeIssued { .. } => "challenge_issued",
            FlowEvent::ChallengeFailed { .. } => "challenge_failed",
            FlowEvent::CodeSubmitted { .. } => "submit_code",
            FlowEvent::CodeAccepted { .. } => "code_accepted",
            FlowEvent::CodeRejected { .. } => "code_rejected",
            FlowEvent::SessionEstablished { .. } => "session_established",
            FlowEvent::SessionRejected { .. } => "session_rejected",
            FlowEvent::HumanVerificationExpired => "human_verification_expired",
            FlowEvent::Restarted => "restart",
        }
    }
}

/// IO the controller must perform on behalf of the machine.
#[derive(Debug)]
pub enum FlowCommand {
    IssueChallenge {
        attempt: u64,
        phone: PhoneNumber,
    },
    VerifyChallenge {
        attempt: u64,
        handle: ChallengeHandle,
        code: OtpCode,
    },
    EstablishSession {
        attempt: u64,
        phone: PhoneNumber,
        credential: SessionCredential,
    },
}

/// What the UI renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    pub state: FlowState,
    pub error: Option<ErrorRecord>,
    /// Canonical number of the current attempt
    pub phone: Option<String>,
    pub challenge_live: bool,
    pub sending_challenge: bool,
    pub verifying_code: bool,
}

/// The OTP login state machine.
#[derive(Debug)]
pub struct FlowMachine {
    normalizer: PhoneNumberNormalizer,
    options: FlowOptions,
    state: FlowState,
    attempt: u64,
    phone: Option<PhoneNumber>,
    handle: Option<ChallengeHandle>,
    code: Option<OtpCode>,
    error: Option<ErrorRecord>,
    failed_verifications: u32,
    // Outstanding provider calls per step. Restart leaves these alone; only
    // the settle event of the call (current or stale) clears them.
    issue_in_flight: bool,
    verify_in_flight: bool,
}

impl FlowMachine {
    pub fn new(normalizer: PhoneNumberNormalizer, options: FlowOptions) -> Self {
        Self {
            normalizer,
            options,
            state: FlowState::CollectingPhone,
            attempt: 0,
            phone: None,
            handle: None,
            code: None,
            error: None,
            failed_verifications: 0,
            issue_in_flight: false,
            verify_in_flight: false,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    pub fn phone(&self) -> Option<&PhoneNumber> {
        self.phone.as_ref()
    }

    pub fn handle(&self) -> Option<&ChallengeHandle> {
        self.handle.as_ref()
    }

    pub fn code(&self) -> Option<&OtpCode> {
        self.code.as_ref()
    }

    /// Attempt number that settle events must carry to be applied.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            state: self.state,
            error: self.error.clone(),
            phone: self.phone.as_ref().map(|p| p.canonical().to_string()),
            challenge_live: self.handle.is_some(),
            sending_challenge: self.issue_in_flight,
            verifying_code: self.verify_in_flight || self.state == FlowState::VerifyingCode,
        }
    }

    /// Apply one event.
    ///
    /// Returns the command to execute, `Ok(None)` when the event only changed
    /// state (or was a stale settle), and `Err` when the event is refused.
    pub fn decide(&mut self, event: FlowEvent) -> Result<Option<FlowCommand>, FlowError> {
        let event_name = event.name();

        match event {
            FlowEvent::PhoneSubmitted { raw } => match self.state {
                FlowState::CollectingPhone | FlowState::AwaitingCode if self.issue_in_flight => {
                    debug!(state = %self.state, "Previous challenge request still outstanding");
                    Err(FlowError::Busy { state: self.state })
                }
                FlowState::CollectingPhone | FlowState::AwaitingCode => {
                    self.error = None;
                    match self.normalizer.normalize(&raw) {
                        Ok(phone) => {
                            // A fresh challenge supersedes whatever was outstanding
                            self.attempt += 1;
                            self.handle = None;
                            self.code = None;
                            self.failed_verifications = 0;
                            self.phone = Some(phone.clone());
                            self.state = FlowState::SendingChallenge;
                            self.issue_in_flight = true;
                            info!(
                                attempt = self.attempt,
                                phone = %phone.fingerprint(),
                                "Phone number accepted, requesting challenge"
                            );
                            Ok(Some(FlowCommand::IssueChallenge {
                                attempt: self.attempt,
                                phone,
                            }))
                        }
                        Err(e) => {
                            debug!("Phone number rejected: {}", e);
                            self.error = Some(ErrorRecord::invalid_format(&e));
                            Ok(None)
                        }
                    }
                }
                FlowState::SendingChallenge => Err(FlowError::Busy { state: self.state }),
                _ => Err(self.not_accepting(event_name)),
            },

            FlowEvent::ChallengeIssued { attempt, handle } => {
                self.issue_in_flight = false;
                if !self.is_current(attempt, FlowState::SendingChallenge, event_name) {
                    return Ok(None);
                }
                // The challenge went out, so an expiry reported meanwhile is moot
                self.error = None;
                self.handle = Some(handle);
                self.state = FlowState::AwaitingCode;
                info!(attempt, "Challenge issued, awaiting code");
                Ok(None)
            }

            FlowEvent::ChallengeFailed { attempt, error } => {
                self.issue_in_flight = false;
                if !self.is_current(attempt, FlowState::SendingChallenge, event_name) {
                    return Ok(None);
                }
                self.error = Some(match error {
                    ProviderError::HumanVerificationExpired => {
                        ErrorRecord::human_verification_expired()
                    }
                    other => ErrorRecord::challenge_issue_failed(&other.to_string()),
                });
                self.state = FlowState::CollectingPhone;
                warn!(attempt, "Failed to issue challenge: {}", error_message(&self.error));
                Ok(None)
            }

            FlowEvent::CodeSubmitted { code } => match self.state {
                FlowState::AwaitingCode if self.verify_in_flight => {
                    Err(FlowError::Busy { state: self.state })
                }
                FlowState::AwaitingCode => {
                    let Some(handle) = self.handle.clone() else {
                        return Err(self.not_accepting(event_name));
                    };
                    self.error = None;
                    self.code = Some(code.clone());
                    self.state = FlowState::VerifyingCode;
                    self.verify_in_flight = true;
                    debug!(attempt = self.attempt, "Verifying code");
                    Ok(Some(FlowCommand::VerifyChallenge {
                        attempt: self.attempt,
                        handle,
                        code,
                    }))
                }
                FlowState::VerifyingCode => Err(FlowError::Busy { state: self.state }),
                _ => Err(self.not_accepting(event_name)),
            },

            FlowEvent::CodeAccepted { attempt, credential } => {
                self.verify_in_flight = false;
                if !self.is_current(attempt, FlowState::VerifyingCode, event_name) {
                    return Ok(None);
                }
                let Some(phone) = self.phone.clone() else {
                    return Err(self.not_accepting(event_name));
                };
                info!(attempt, "Code verified, establishing session");
                // Stay in VerifyingCode until the session exists
                Ok(Some(FlowCommand::EstablishSession {
                    attempt,
                    phone,
                    credential,
                }))
            }

            FlowEvent::CodeRejected { attempt, error } => {
                self.verify_in_flight = false;
                if !self.is_current(attempt, FlowState::VerifyingCode, event_name) {
                    return Ok(None);
                }
                self.failed_verifications += 1;
                self.error = Some(ErrorRecord::verification_failed(&error.to_string()));

                let exhausted = self
                    .options
                    .max_verify_attempts
                    .is_some_and(|max| self.failed_verifications >= max);

                if exhausted {
                    warn!(
                        attempt,
                        failures = self.failed_verifications,
                        "Verification attempts exhausted"
                    );
                    self.handle = None;
                    self.state = FlowState::Failed;
                } else {
                    warn!(attempt, "Code rejected: {}", error);
                    self.state = FlowState::AwaitingCode;
                }
                Ok(None)
            }

            FlowEvent::SessionEstablished { attempt } => {
                if !self.is_current(attempt, FlowState::VerifyingCode, event_name) {
                    return Ok(None);
                }
                self.clear_attempt();
                self.state = FlowState::Authenticated;
                info!(attempt, "Authenticated");
                Ok(None)
            }

            FlowEvent::SessionRejected { attempt, error } => {
                if !self.is_current(attempt, FlowState::VerifyingCode, event_name) {
                    return Ok(None);
                }
                self.handle = None;
                self.error = Some(ErrorRecord::session_establishment_failed(&error.to_string()));
                self.state = FlowState::Failed;
                warn!(attempt, "Session establishment failed: {}", error);
                Ok(None)
            }

            FlowEvent::HumanVerificationExpired => {
                self.error = Some(ErrorRecord::human_verification_expired());
                debug!(state = %self.state, "Human verification expired");
                Ok(None)
            }

            FlowEvent::Restarted => {
                self.attempt += 1;
                self.clear_attempt();
                self.error = None;
                self.state = FlowState::CollectingPhone;
                info!(attempt = self.attempt, "Flow restarted");
                Ok(None)
            }
        }
    }

    fn clear_attempt(&mut self) {
        self.phone = None;
        self.handle = None;
        self.code = None;
        self.failed_verifications = 0;
    }

    /// Whether a settle event belongs to the call currently in flight.
    fn is_current(&self, attempt: u64, expected: FlowState, event_name: &str) -> bool {
        if attempt != self.attempt || self.state != expected {
            debug!(
                attempt,
                current_attempt = self.attempt,
                state = %self.state,
                "Ignoring stale {}",
                event_name
            );
            return false;
        }
        true
    }

    fn not_accepting(&self, event: &'static str) -> FlowError {
        FlowError::NotAccepting {
            state: self.state,
            event,
        }
    }
}

fn error_message(error: &Option<ErrorRecord>) -> &str {
    error.as_ref().map(|e| e.message.as_str()).unwrap_or_default()
}
