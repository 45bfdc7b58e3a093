//! Integration tests for the OTP flow controller.
//!
//! These drive the controller end to end against the in-memory collaborators:
//! 1. Submit phone number (normalize, token, issue challenge)
//! 2. Submit code (verify challenge)
//! 3. Hand the credential to the session establisher

use phone_auth::testing::{MockChallengeProvider, MockHumanVerifier, RecordingEstablisher};
use phone_auth::{
    ChallengeHandle, ErrorKind, FlowError, FlowOptions, FlowState, OtpFlowController,
    ProviderError,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    provider: Arc<MockChallengeProvider>,
    verifier: Arc<MockHumanVerifier>,
    establisher: Arc<RecordingEstablisher>,
    controller: Arc<OtpFlowController>,
}

/// Helper to wire a controller to the given mocks.
fn harness_with(
    provider: MockChallengeProvider,
    verifier: MockHumanVerifier,
    establisher: RecordingEstablisher,
    options: FlowOptions,
) -> Harness {
    let provider = Arc::new(provider);
    let verifier = Arc::new(verifier);
    let establisher = Arc::new(establisher);
    let controller = Arc::new(
        OtpFlowController::builder(provider.clone(), verifier.clone(), establisher.clone())
            .options(options)
            .build(),
    );

    Harness {
        provider,
        verifier,
        establisher,
        controller,
    }
}

fn harness() -> Harness {
    harness_with(
        MockChallengeProvider::new(),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    )
}

/// Wait until spawned tasks have reached their first await point.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_happy_path_reaches_authenticated() {
    let h = harness();
    let mut updates = h.controller.subscribe();

    let snapshot = h.controller.submit_phone("9876543210").await.unwrap();
    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    assert!(snapshot.error.is_none());
    assert!(snapshot.challenge_live);
    assert_eq!(snapshot.phone.as_deref(), Some("+919876543210"));

    let snapshot = h.controller.submit_code("123456").await.unwrap();
    assert_eq!(snapshot.state, FlowState::Authenticated);
    assert!(snapshot.error.is_none());
    assert!(!snapshot.challenge_live);

    let issued = h.provider.issue_calls();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].phone, "+919876543210");
    assert_eq!(issued[0].token, "token-1");

    let verified = h.provider.verify_calls();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0].handle, "session-1");
    assert_eq!(verified[0].code, "123456");

    let sessions = h.establisher.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].phone, "+919876543210");
    assert_eq!(sessions[0].credential.id_token.expose(), "id-token-for-session-1");

    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().state, FlowState::Authenticated);
}

#[tokio::test]
async fn test_invalid_phone_never_reaches_network() {
    let h = harness();

    let snapshot = h.controller.submit_phone("123").await.unwrap();

    assert_eq!(snapshot.state, FlowState::CollectingPhone);
    let error = snapshot.error.unwrap();
    assert_eq!(error.kind, ErrorKind::InvalidFormat);
    assert!(error.message.contains("10-digit"));
    assert!(h.provider.issue_calls().is_empty());
    assert!(h.verifier.obtain_calls().is_empty());
}

#[tokio::test]
async fn test_double_phone_submit_sends_one_challenge() {
    let h = harness_with(
        MockChallengeProvider::new().with_issue_gate(),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );

    let first = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.submit_phone("9876543210").await }
    });
    settle().await;

    assert_eq!(h.controller.state(), FlowState::SendingChallenge);
    assert!(h.controller.snapshot().sending_challenge);

    let second = h.controller.submit_phone("9876543210").await;
    assert_eq!(
        second.unwrap_err(),
        FlowError::Busy {
            state: FlowState::SendingChallenge
        }
    );

    h.provider.release_issue(1);
    let snapshot = first.await.unwrap().unwrap();

    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    assert_eq!(h.provider.issue_calls().len(), 1);
}

#[tokio::test]
async fn test_double_code_submit_verifies_once() {
    let h = harness_with(
        MockChallengeProvider::new().with_verify_gate(),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );
    h.controller.submit_phone("9876543210").await.unwrap();

    let first = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.submit_code("123456").await }
    });
    settle().await;

    assert!(h.controller.snapshot().verifying_code);
    let second = h.controller.submit_code("123456").await;
    assert!(matches!(second, Err(FlowError::Busy { .. })));

    h.provider.release_verify(1);
    let snapshot = first.await.unwrap().unwrap();

    assert_eq!(snapshot.state, FlowState::Authenticated);
    assert_eq!(h.provider.verify_calls().len(), 1);
    assert_eq!(h.establisher.sessions().len(), 1);
}

#[tokio::test]
async fn test_issue_failure_returns_to_phone_entry() {
    let h = harness_with(
        MockChallengeProvider::new().with_issue_response(Err(ProviderError::rejected(
            "TOO_MANY_ATTEMPTS_TRY_LATER",
            "TOO_MANY_ATTEMPTS_TRY_LATER",
        ))),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );

    let snapshot = h.controller.submit_phone("9876543210").await.unwrap();
    assert_eq!(snapshot.state, FlowState::CollectingPhone);
    let error = snapshot.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ChallengeIssueFailed);
    assert_eq!(error.message, "Failed to send OTP: TOO_MANY_ATTEMPTS_TRY_LATER");

    // User may resubmit; the token from the first attempt is reused
    let snapshot = h.controller.submit_phone("9876543210").await.unwrap();
    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    assert!(snapshot.error.is_none());
    assert_eq!(h.verifier.obtain_calls().len(), 1);
}

#[tokio::test]
async fn test_wrong_code_allows_retry_with_same_handle() {
    let h = harness();
    h.controller.submit_phone("98765 43210").await.unwrap();

    let snapshot = h.controller.submit_code("000000").await.unwrap();
    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    let error = snapshot.error.unwrap();
    assert_eq!(error.kind, ErrorKind::VerificationFailed);
    assert_eq!(error.message, "Invalid OTP: INVALID_CODE");

    let snapshot = h.controller.submit_code(" 123456 ").await.unwrap();
    assert_eq!(snapshot.state, FlowState::Authenticated);
    assert!(snapshot.error.is_none());

    let calls = h.provider.verify_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.handle == "session-1"));
    assert_eq!(h.provider.issue_calls().len(), 1);
}

#[tokio::test]
async fn test_empty_code_is_still_sent_to_provider() {
    let h = harness();
    h.controller.submit_phone("9876543210").await.unwrap();

    let snapshot = h.controller.submit_code("   ").await.unwrap();

    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    assert_eq!(h.provider.verify_calls()[0].code, "");
}

#[tokio::test]
async fn test_expired_token_is_renewed_and_retried_once() {
    let h = harness_with(
        MockChallengeProvider::new().with_issue_response(Err(ProviderError::HumanVerificationExpired)),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );

    let snapshot = h.controller.submit_phone("9876543210").await.unwrap();

    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    assert!(snapshot.error.is_none());

    let issued = h.provider.issue_calls();
    assert_eq!(issued.len(), 2);
    assert_eq!(issued[0].token, "token-1");
    assert_eq!(issued[1].token, "token-2");
    assert_eq!(h.verifier.obtain_calls().len(), 2);
}

#[tokio::test]
async fn test_expired_twice_is_surfaced() {
    let h = harness_with(
        MockChallengeProvider::new()
            .with_issue_response(Err(ProviderError::HumanVerificationExpired))
            .with_issue_response(Err(ProviderError::HumanVerificationExpired)),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );

    let snapshot = h.controller.submit_phone("9876543210").await.unwrap();

    assert_eq!(snapshot.state, FlowState::CollectingPhone);
    assert_eq!(snapshot.error.unwrap().kind, ErrorKind::HumanVerificationExpired);
    assert_eq!(h.provider.issue_calls().len(), 2);

    // The next submission starts with a fresh token
    let snapshot = h.controller.submit_phone("9876543210").await.unwrap();
    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    assert_eq!(h.provider.issue_calls()[2].token, "token-3");
}

#[tokio::test]
async fn test_token_failure_is_an_issue_failure() {
    let h = harness_with(
        MockChallengeProvider::new(),
        MockHumanVerifier::new().with_failure(ProviderError::Transport("widget not rendered".into())),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );

    let snapshot = h.controller.submit_phone("9876543210").await.unwrap();

    assert_eq!(snapshot.state, FlowState::CollectingPhone);
    let error = snapshot.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ChallengeIssueFailed);
    assert_eq!(error.message, "Failed to send OTP: widget not rendered");
    assert!(h.provider.issue_calls().is_empty());
}

#[tokio::test]
async fn test_widget_expiry_callback_keeps_state_and_drops_token() {
    let h = harness();
    h.controller.submit_phone("9876543210").await.unwrap();

    let snapshot = h.controller.human_verification_expired().await;
    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    assert_eq!(snapshot.error.unwrap().kind, ErrorKind::HumanVerificationExpired);

    // Re-entering the number obtains a new token
    h.controller.submit_phone("9876543210").await.unwrap();
    let issued = h.provider.issue_calls();
    assert_eq!(issued.len(), 2);
    assert_eq!(issued[1].token, "token-2");
}

#[tokio::test]
async fn test_new_phone_supersedes_live_handle() {
    let h = harness();
    h.controller.submit_phone("9876543210").await.unwrap();
    h.controller.submit_phone("9876500000").await.unwrap();

    let snapshot = h.controller.submit_code("123456").await.unwrap();

    assert_eq!(snapshot.state, FlowState::Authenticated);
    assert_eq!(h.provider.verify_calls()[0].handle, "session-2");
    assert_eq!(h.establisher.sessions()[0].phone, "+919876500000");
}

#[tokio::test]
async fn test_restart_clears_attempt_and_ignores_late_result() {
    let h = harness_with(
        MockChallengeProvider::new().with_issue_gate(),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );

    let pending = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.submit_phone("9876543210").await }
    });
    settle().await;

    let snapshot = h.controller.restart().await;
    assert_eq!(snapshot.state, FlowState::CollectingPhone);
    assert!(snapshot.phone.is_none());

    h.provider.release_issue(1);
    let late = pending.await.unwrap().unwrap();

    assert_eq!(late.state, FlowState::CollectingPhone);
    assert!(!late.challenge_live);
    assert!(late.error.is_none());
}

#[tokio::test]
async fn test_restart_does_not_allow_second_send_while_first_outstanding() {
    let h = harness_with(
        MockChallengeProvider::new().with_issue_gate(),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );

    let pending = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.submit_phone("9876543210").await }
    });
    settle().await;

    let snapshot = h.controller.restart().await;
    assert_eq!(snapshot.state, FlowState::CollectingPhone);
    assert!(snapshot.sending_challenge);

    let second = h.controller.submit_phone("9876543210").await;
    assert_eq!(
        second.unwrap_err(),
        FlowError::Busy {
            state: FlowState::CollectingPhone
        }
    );
    assert_eq!(h.provider.issue_calls().len(), 1);

    h.provider.release_issue(1);
    pending.await.unwrap().unwrap();
    assert!(!h.controller.snapshot().sending_challenge);

    h.provider.release_issue(1);
    let snapshot = h.controller.submit_phone("9876543210").await.unwrap();
    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    assert_eq!(h.provider.issue_calls().len(), 2);
}

#[tokio::test]
async fn test_expiry_during_send_does_not_outlive_successful_challenge() {
    let h = harness_with(
        MockChallengeProvider::new().with_issue_gate(),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );

    let pending = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.submit_phone("9876543210").await }
    });
    settle().await;

    let snapshot = h.controller.human_verification_expired().await;
    assert_eq!(snapshot.state, FlowState::SendingChallenge);

    h.provider.release_issue(1);
    let snapshot = pending.await.unwrap().unwrap();

    assert_eq!(snapshot.state, FlowState::AwaitingCode);
    assert!(snapshot.error.is_none());
    assert!(snapshot.challenge_live);
}

#[tokio::test]
async fn test_restart_after_failed_verification() {
    let h = harness();
    h.controller.submit_phone("9876543210").await.unwrap();
    h.controller.submit_code("000000").await.unwrap();

    let snapshot = h.controller.restart().await;

    assert_eq!(snapshot.state, FlowState::CollectingPhone);
    assert!(snapshot.phone.is_none());
    assert!(!snapshot.challenge_live);
    assert!(snapshot.error.is_none());

    let err = h.controller.submit_code("123456").await.unwrap_err();
    assert!(matches!(err, FlowError::NotAccepting { .. }));
}

#[tokio::test]
async fn test_attempt_limit_fails_flow_until_restart() {
    let h = harness_with(
        MockChallengeProvider::new(),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions {
            max_verify_attempts: Some(3),
        },
    );
    h.controller.submit_phone("9876543210").await.unwrap();

    for _ in 0..2 {
        let snapshot = h.controller.submit_code("000000").await.unwrap();
        assert_eq!(snapshot.state, FlowState::AwaitingCode);
    }
    let snapshot = h.controller.submit_code("000000").await.unwrap();
    assert_eq!(snapshot.state, FlowState::Failed);
    assert!(!snapshot.challenge_live);

    assert!(h.controller.submit_phone("9876543210").await.is_err());

    h.controller.restart().await;
    let snapshot = h.controller.submit_phone("9876543210").await.unwrap();
    assert_eq!(snapshot.state, FlowState::AwaitingCode);
}

#[tokio::test]
async fn test_session_rejection_fails_flow() {
    let h = harness_with(
        MockChallengeProvider::new(),
        MockHumanVerifier::new(),
        RecordingEstablisher::failing_with(ProviderError::Transport("session store down".into())),
        FlowOptions::default(),
    );
    h.controller.submit_phone("9876543210").await.unwrap();

    let snapshot = h.controller.submit_code("123456").await.unwrap();

    assert_eq!(snapshot.state, FlowState::Failed);
    let error = snapshot.error.unwrap();
    assert_eq!(error.kind, ErrorKind::SessionEstablishmentFailed);
    assert!(error.message.contains("session store down"));
}

#[tokio::test]
async fn test_authenticated_flow_refuses_further_input() {
    let h = harness_with(
        MockChallengeProvider::new().with_issue_response(Ok(ChallengeHandle::new("fixed"))),
        MockHumanVerifier::new(),
        RecordingEstablisher::new(),
        FlowOptions::default(),
    );
    h.controller.submit_phone("919876543210").await.unwrap();
    h.controller.submit_code("123456").await.unwrap();

    assert!(matches!(
        h.controller.submit_phone("9876543210").await,
        Err(FlowError::NotAccepting {
            state: FlowState::Authenticated,
            ..
        })
    ));
    assert!(matches!(
        h.controller.submit_code("123456").await,
        Err(FlowError::NotAccepting { .. })
    ));
}
