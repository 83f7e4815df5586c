//! TOTP (Time-based One-Time Password) support.

use crate::error::{ImpersonationError, Result};
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};

/// Account label used when a TOTP instance is built only for verification.
const VERIFY_ACCOUNT: &str = "operator";

/// Configuration for operator TOTP.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TotpConfig {
    /// Issuer name shown in authenticator apps.
    pub issuer: String,
    /// Number of digits in the code (default: 6).
    pub digits: usize,
    /// Time step in seconds (default: 30).
    pub step: u64,
    /// Steps of clock drift tolerated either side of now (default: 1).
    pub skew: u8,
    /// Algorithm (default: SHA1 for compatibility).
    #[serde(skip, default = "default_algorithm")]
    pub algorithm: Algorithm,
}

fn default_algorithm() -> Algorithm {
    Algorithm::SHA1
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "Gangway".to_string(),
            digits: 6,
            step: 30,
            skew: 1,
            algorithm: default_algorithm(),
        }
    }
}

impl TotpConfig {
    /// Create a new TOTP config with the given issuer name.
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    /// Set the number of digits.
    pub fn digits(mut self, digits: usize) -> Self {
        self.digits = digits;
        self
    }

    /// Set the time step in seconds.
    pub fn step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    /// Load overrides from `GANGWAY_TOTP_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(issuer) = get_env_with_prefix("TOTP_ISSUER") {
            config.issuer = issuer;
        }
        if let Some(digits) = parse_env_with_prefix("TOTP_DIGITS") {
            config.digits = digits;
        }
        if let Some(step) = parse_env_with_prefix("TOTP_STEP") {
            config.step = step;
        }
        if let Some(skew) = parse_env_with_prefix("TOTP_SKEW") {
            config.skew = skew;
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if !(6..=8).contains(&self.digits) {
            return Err(ImpersonationError::invalid_config(format!(
                "TOTP digits must be between 6 and 8, got {}",
                self.digits
            )));
        }
        if self.step == 0 {
            return Err(ImpersonationError::invalid_config(
                "TOTP step must be greater than 0",
            ));
        }
        if self.issuer.contains(':') {
            return Err(ImpersonationError::invalid_config(
                "TOTP issuer must not contain ':'",
            ));
        }
        Ok(())
    }
}

/// Data returned when enrolling an operator.
#[derive(Debug, Clone)]
pub struct TotpSetup {
    /// Base32-encoded secret to store.
    pub secret: String,
    /// URI for QR code (otpauth://...).
    pub uri: String,
}

/// Generates and checks operator TOTP codes.
#[derive(Clone, Debug)]
pub struct TotpVerifier {
    config: TotpConfig,
}

impl TotpVerifier {
    pub fn new(config: TotpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TotpConfig {
        &self.config
    }

    /// Generate a new TOTP enrollment for an operator.
    pub fn generate_setup(&self, account_name: &str) -> Result<TotpSetup> {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();

        let totp = self.build_totp(&secret_base32, account_name)?;
        let uri = totp.get_url();

        Ok(TotpSetup {
            secret: secret_base32,
            uri,
        })
    }

    /// Find the time step a code belongs to, within the skew window around `time`.
    ///
    /// Returns `None` when no step in the window matches. Every candidate is
    /// compared in constant time.
    pub fn matching_step(&self, secret: &str, code: &str, time: u64) -> Result<Option<u64>> {
        let totp = self.build_totp(secret, VERIFY_ACCOUNT)?;
        let step = self.config.step;
        let current = time / step;
        let skew = u64::from(self.config.skew);

        let mut matched = None;
        for candidate in current.saturating_sub(skew)..=current.saturating_add(skew) {
            let expected = totp.generate(candidate * step);
            if bool::from(expected.as_bytes().ct_eq(code.as_bytes())) && matched.is_none() {
                matched = Some(candidate);
            }
        }
        Ok(matched)
    }

    /// Generate the code for a given Unix timestamp.
    pub fn generate_at(&self, secret: &str, time: u64) -> Result<String> {
        Ok(self.build_totp(secret, VERIFY_ACCOUNT)?.generate(time))
    }

    /// Strip the separators people paste and check the shape of the code.
    pub fn normalize_code(&self, code: &str) -> Option<String> {
        let code = code.replace([' ', '-'], "");
        (code.len() == self.config.digits && code.bytes().all(|b| b.is_ascii_digit()))
            .then_some(code)
    }

    fn build_totp(&self, secret: &str, account_name: &str) -> Result<TOTP> {
        TOTP::new(
            self.config.algorithm,
            self.config.digits,
            self.config.skew,
            self.config.step,
            Secret::Encoded(secret.to_string())
                .to_bytes()
                .map_err(|e| ImpersonationError::internal(format!("Invalid TOTP secret: {e:?}")))?,
            Some(self.config.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| ImpersonationError::internal(format!("Failed to create TOTP: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = 1_700_000_010;

    fn verifier() -> TotpVerifier {
        TotpVerifier::new(TotpConfig::new("TestApp"))
    }

    #[test]
    fn test_generate_and_match() {
        let verifier = verifier();
        let setup = verifier.generate_setup("op-1").unwrap();
        let code = verifier.generate_at(&setup.secret, T).unwrap();

        assert_eq!(
            verifier.matching_step(&setup.secret, &code, T).unwrap(),
            Some(T / 30)
        );
    }

    #[test]
    fn test_skew_window() {
        let verifier = verifier();
        let setup = verifier.generate_setup("op-1").unwrap();
        let previous = verifier.generate_at(&setup.secret, T - 30).unwrap();

        assert_eq!(
            verifier.matching_step(&setup.secret, &previous, T).unwrap(),
            Some(T / 30 - 1)
        );
        // three steps later the previous code has left the window
        let later = T + 90;
        let window: Vec<String> = (0..3)
            .map(|i| verifier.generate_at(&setup.secret, later - 30 + i * 30).unwrap())
            .collect();
        if !window.contains(&previous) {
            assert_eq!(verifier.matching_step(&setup.secret, &previous, later).unwrap(), None);
        }
    }

    #[test]
    fn test_normalize_code() {
        let verifier = verifier();
        assert_eq!(verifier.normalize_code("123 456").as_deref(), Some("123456"));
        assert_eq!(verifier.normalize_code("123-456").as_deref(), Some("123456"));
        assert!(verifier.normalize_code("12345").is_none());
        assert!(verifier.normalize_code("12a456").is_none());
    }

    #[test]
    fn test_setup_uri() {
        let setup = verifier().generate_setup("op-1").unwrap();
        assert!(!setup.secret.is_empty());
        assert!(setup.uri.starts_with("otpauth://totp/"));
    }

    #[test]
    fn test_config_validation() {
        assert!(TotpConfig::default().validate().is_ok());
        assert!(TotpConfig::default().digits(5).validate().is_err());
        assert!(TotpConfig::default().digits(9).validate().is_err());
        assert!(TotpConfig::default().step(0).validate().is_err());
        assert!(TotpConfig::new("bad:issuer").validate().is_err());
    }
}
