//! Testing utilities including mock collaborators.
//!
//! These let applications exercise the OTP flow without a real identity
//! provider or bot-mitigation widget. Every mock records its calls for
//! assertions and can be scripted with queued responses.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::error::ProviderError;
use crate::phone::PhoneNumber;
use crate::traits::{ChallengeProvider, HumanVerifier, SessionEstablisher};
use crate::types::{ChallengeHandle, HumanVerificationToken, OtpCode, SessionCredential};

/// Code accepted by [`MockChallengeProvider`] unless configured otherwise.
pub const MOCK_VALID_CODE: &str = "123456";

// =============================================================================
// Mock Human Verifier
// =============================================================================

/// Hands out `token-1`, `token-2`, ... and records every request.
#[derive(Default)]
pub struct MockHumanVerifier {
    failures: Mutex<VecDeque<ProviderError>>,
    calls: Mutex<Vec<String>>,
    issued: AtomicUsize,
}

impl MockHumanVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next request with `error`.
    pub fn with_failure(self, error: ProviderError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    /// Binding targets of all requests, including failed ones.
    pub fn obtain_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HumanVerifier for MockHumanVerifier {
    async fn obtain_token(&self, binding_target: &str) -> Result<HumanVerificationToken, ProviderError> {
        self.calls.lock().unwrap().push(binding_target.to_string());

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(HumanVerificationToken::new(format!("token-{}", n)))
    }
}

// =============================================================================
// Mock Challenge Provider
// =============================================================================

/// Arguments captured from an issue call
#[derive(Debug, Clone)]
pub struct IssueCall {
    pub phone: String,
    pub token: String,
}

/// Arguments captured from a verify call
#[derive(Debug, Clone)]
pub struct VerifyCall {
    pub handle: String,
    pub code: String,
}

/// In-memory identity provider.
///
/// By default every issue succeeds with `session-1`, `session-2`, ... and a
/// verify succeeds when the code equals the configured valid code and the
/// handle is the most recently issued one.
pub struct MockChallengeProvider {
    valid_code: String,
    issue_responses: Mutex<VecDeque<Result<ChallengeHandle, ProviderError>>>,
    verify_responses: Mutex<VecDeque<Result<SessionCredential, ProviderError>>>,
    issue_calls: Mutex<Vec<IssueCall>>,
    verify_calls: Mutex<Vec<VerifyCall>>,
    latest_handle: Mutex<Option<String>>,
    issue_gate: Option<Arc<Semaphore>>,
    verify_gate: Option<Arc<Semaphore>>,
}

impl Default for MockChallengeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChallengeProvider {
    pub fn new() -> Self {
        Self {
            valid_code: MOCK_VALID_CODE.to_string(),
            issue_responses: Mutex::new(VecDeque::new()),
            verify_responses: Mutex::new(VecDeque::new()),
            issue_calls: Mutex::new(Vec::new()),
            verify_calls: Mutex::new(Vec::new()),
            latest_handle: Mutex::new(None),
            issue_gate: None,
            verify_gate: None,
        }
    }

    pub fn with_valid_code(mut self, code: impl Into<String>) -> Self {
        self.valid_code = code.into();
        self
    }

    /// Queue a result for the next issue call.
    pub fn with_issue_response(self, response: Result<ChallengeHandle, ProviderError>) -> Self {
        self.issue_responses.lock().unwrap().push_back(response);
        self
    }

    /// Queue a result for the next verify call.
    pub fn with_verify_response(self, response: Result<SessionCredential, ProviderError>) -> Self {
        self.verify_responses.lock().unwrap().push_back(response);
        self
    }

    /// Hold issue calls until [`release_issue`](Self::release_issue) is called.
    pub fn with_issue_gate(mut self) -> Self {
        self.issue_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Hold verify calls until [`release_verify`](Self::release_verify) is called.
    pub fn with_verify_gate(mut self) -> Self {
        self.verify_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` held issue calls proceed.
    pub fn release_issue(&self, n: usize) {
        if let Some(gate) = &self.issue_gate {
            gate.add_permits(n);
        }
    }

    /// Let `n` held verify calls proceed.
    pub fn release_verify(&self, n: usize) {
        if let Some(gate) = &self.verify_gate {
            gate.add_permits(n);
        }
    }

    pub fn issue_calls(&self) -> Vec<IssueCall> {
        self.issue_calls.lock().unwrap().clone()
    }

    pub fn verify_calls(&self) -> Vec<VerifyCall> {
        self.verify_calls.lock().unwrap().clone()
    }

    async fn pass_gate(gate: &Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl ChallengeProvider for MockChallengeProvider {
    async fn issue_challenge(
        &self,
        phone: &PhoneNumber,
        token: &HumanVerificationToken,
    ) -> Result<ChallengeHandle, ProviderError> {
        let n = {
            let mut calls = self.issue_calls.lock().unwrap();
            calls.push(IssueCall {
                phone: phone.canonical().to_string(),
                token: token.expose().to_string(),
            });
            calls.len()
        };

        Self::pass_gate(&self.issue_gate).await;

        let scripted = self.issue_responses.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| Ok(ChallengeHandle::new(format!("session-{}", n))));

        if let Ok(handle) = &result {
            *self.latest_handle.lock().unwrap() = Some(handle.as_str().to_string());
        }
        result
    }

    async fn verify_challenge(
        &self,
        handle: &ChallengeHandle,
        code: &OtpCode,
    ) -> Result<SessionCredential, ProviderError> {
        self.verify_calls.lock().unwrap().push(VerifyCall {
            handle: handle.as_str().to_string(),
            code: code.as_str().to_string(),
        });

        Self::pass_gate(&self.verify_gate).await;

        if let Some(scripted) = self.verify_responses.lock().unwrap().pop_front() {
            return scripted;
        }

        let latest = self.latest_handle.lock().unwrap().clone();
        if latest.as_deref() != Some(handle.as_str()) {
            return Err(ProviderError::rejected("INVALID_SESSION_INFO", "INVALID_SESSION_INFO"));
        }
        if code.as_str() != self.valid_code {
            return Err(ProviderError::rejected("INVALID_CODE", "INVALID_CODE"));
        }

        let mut credential = SessionCredential::new(
            format!("id-token-for-{}", handle.as_str()),
            format!("refresh-token-for-{}", handle.as_str()),
        );
        credential.user_id = Some(format!("uid-{}", handle.as_str()));
        Ok(credential)
    }
}

// =============================================================================
// Recording Session Establisher
// =============================================================================

/// Session captured by [`RecordingEstablisher`]
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub phone: String,
    pub credential: SessionCredential,
}

/// Keeps every credential it is handed; optionally refuses them.
#[derive(Default)]
pub struct RecordingEstablisher {
    sessions: Mutex<Vec<EstablishedSession>>,
    failure: Mutex<Option<ProviderError>>,
}

impl RecordingEstablisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every credential with `error`.
    pub fn failing_with(error: ProviderError) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            failure: Mutex::new(Some(error)),
        }
    }

    pub fn sessions(&self) -> Vec<EstablishedSession> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionEstablisher for RecordingEstablisher {
    async fn establish(
        &self,
        phone: &PhoneNumber,
        credential: SessionCredential,
    ) -> Result<(), ProviderError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.sessions.lock().unwrap().push(EstablishedSession {
            phone: phone.canonical().to_string(),
            credential,
        });
        Ok(())
    }
}
