use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use std::env;

/// Login configuration loaded from environment variables
#[derive(Debug)]
pub struct Config {
    pub api_key: SecretString,
    pub tenant_id: Option<String>,
    pub base_url: Option<String>,
    /// Pre-solved reCAPTCHA token; prompted for when absent or expired
    pub recaptcha_token: Option<SecretString>,
    pub phone: PhoneConfig,
    pub max_verify_attempts: Option<u32>,
}

/// Country rules for phone normalization
#[derive(Debug, Clone)]
pub struct PhoneConfig {
    pub country_code: String,
    pub national_digits: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let phone = PhoneConfig::from_env()?;

        Ok(Self {
            api_key: env::var("IDENTITY_TOOLKIT_API_KEY")
                .map(SecretString::from)
                .context("IDENTITY_TOOLKIT_API_KEY must be set")?,
            tenant_id: env::var("IDENTITY_TOOLKIT_TENANT_ID").ok(),
            base_url: env::var("IDENTITY_TOOLKIT_BASE_URL").ok(),
            recaptcha_token: env::var("RECAPTCHA_TOKEN").ok().map(SecretString::from),
            phone,
            max_verify_attempts: env::var("OTP_MAX_VERIFY_ATTEMPTS")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("OTP_MAX_VERIFY_ATTEMPTS must be a valid number")?,
        })
    }
}

impl PhoneConfig {
    /// Load only the phone rules; needs no provider credentials
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            country_code: env::var("PHONE_COUNTRY_CODE").unwrap_or_else(|_| "91".to_string()),
            national_digits: env::var("PHONE_NATIONAL_DIGITS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("PHONE_NATIONAL_DIGITS must be a valid number")?,
        })
    }
}
