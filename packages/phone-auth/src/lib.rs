//! Phone number OTP login flow.
//!
//! Collect a phone number, have an identity provider send a one-time
//! passcode, collect the code and exchange it for a session.
//!
//! # Architecture
//!
//! ```text
//! UI ─► OtpFlowController ─► FlowMachine (pure: state + decisions)
//!            │
//!            ├─► HumanVerifier        (bot mitigation token, cached)
//!            ├─► ChallengeProvider    (issue / verify challenge)
//!            └─► SessionEstablisher   (consumes the verified credential)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use phone_auth::OtpFlowController;
//!
//! let controller = OtpFlowController::new(provider, verifier, establisher);
//!
//! controller.submit_phone("98765 43210").await?;
//! let snapshot = controller.submit_code("123456").await?;
//! assert_eq!(snapshot.state, FlowState::Authenticated);
//! ```

pub mod controller;
pub mod error;
pub mod machine;
pub mod phone;
pub mod secret;
pub mod token;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use controller::{OtpFlowController, OtpFlowControllerBuilder, DEFAULT_BINDING_TARGET};
pub use error::{ErrorKind, ErrorRecord, FlowError, NormalizationError, ProviderError};
pub use machine::{FlowCommand, FlowEvent, FlowMachine, FlowOptions, FlowSnapshot, FlowState};
pub use phone::{normalize, CountryRule, PhoneNumber, PhoneNumberNormalizer};
pub use secret::Secret;
pub use token::VerificationTokenCache;
pub use traits::{ChallengeProvider, HumanVerifier, SessionEstablisher};
pub use types::{ChallengeHandle, HumanVerificationToken, OtpCode, SessionCredential};
