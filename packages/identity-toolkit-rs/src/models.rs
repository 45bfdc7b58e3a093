use serde::{Deserialize, Serialize};

/// Body of `accounts:sendVerificationCode`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationCodeRequest {
    pub phone_number: String,
    pub recaptcha_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationCodeResponse {
    /// Opaque handle to pass to `accounts:signInWithPhoneNumber`
    pub session_info: String,
}

/// Body of `accounts:signInWithPhoneNumber`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInWithPhoneNumberRequest {
    pub session_info: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInWithPhoneNumberResponse {
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds, sent as a string
    #[serde(default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub local_id: Option<String>,
    #[serde(default)]
    pub is_new_user: bool,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl SignInWithPhoneNumberResponse {
    pub fn expires_in_seconds(&self) -> Option<i64> {
        self.expires_in.as_deref().and_then(|s| s.parse().ok())
    }
}

impl std::fmt::Debug for SignInWithPhoneNumberResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInWithPhoneNumberResponse")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("local_id", &self.local_id)
            .field("is_new_user", &self.is_new_user)
            .field("phone_number", &self.phone_number)
            .finish()
    }
}

/// `{"error": {...}}` envelope of failed calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// HTTP status echoed by the API; not always present
    #[serde(default)]
    pub code: Option<u16>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_omits_missing_tenant() {
        let body = serde_json::to_value(SendVerificationCodeRequest {
            phone_number: "+919876543210".into(),
            recaptcha_token: "tok".into(),
            tenant_id: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"phoneNumber": "+919876543210", "recaptchaToken": "tok"})
        );
    }

    #[test]
    fn test_sign_in_response_parses_expiry() {
        let response: SignInWithPhoneNumberResponse = serde_json::from_value(serde_json::json!({
            "idToken": "secret-id-token",
            "refreshToken": "secret-refresh-token",
            "expiresIn": "3600",
            "localId": "uid-1",
            "isNewUser": true,
            "phoneNumber": "+919876543210"
        }))
        .unwrap();
        assert_eq!(response.expires_in_seconds(), Some(3600));
        assert!(response.is_new_user);
        let debug = format!("{:?}", response);
        assert!(!debug.contains("secret-id-token"));
        assert!(!debug.contains("secret-refresh-token"));
    }

    #[test]
    fn test_error_envelope_without_code() {
        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"error": {"message": "INVALID_SESSION_INFO"}}"#).unwrap();
        assert_eq!(envelope.error.code, None);
        assert_eq!(envelope.error.message, "INVALID_SESSION_INFO");
    }
}
