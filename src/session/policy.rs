//! Request-time policy for impersonation sessions.
//!
//! The allow-list, attempt ceiling and verification window are injected here
//! rather than written into the state machine. A deployment can tighten them
//! but never loosen them: durations must come from
//! [`DEFAULT_ALLOWED_DURATIONS`] and attempts may not exceed
//! [`DEFAULT_MAX_STEP_UP_ATTEMPTS`].

use crate::error::{ImpersonationError, Result};
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Every session length that can ever be granted, in minutes. 60 is a hard ceiling.
pub const DEFAULT_ALLOWED_DURATIONS: [u32; 4] = [15, 30, 45, 60];

/// Step-up attempts before a session is denied. Also the configurable maximum.
pub const DEFAULT_MAX_STEP_UP_ATTEMPTS: u32 = 5;

/// Default window for completing step-up verification (5 minutes).
pub const DEFAULT_PENDING_STEP_UP_SECS: u64 = 5 * 60;

/// Default minimum justification length, in characters.
pub const DEFAULT_MIN_JUSTIFICATION_LENGTH: usize = 10;

/// Maximum length for justification text (prevent DoS).
pub const DEFAULT_MAX_JUSTIFICATION_LENGTH: usize = 500;

/// Upper bound for the step-up window.
const MAX_PENDING_STEP_UP_SECS: u64 = 60 * 60;

/// Configuration for impersonation session requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpersonationPolicy {
    /// Session lengths an operator may choose, in minutes. A subset of
    /// [`DEFAULT_ALLOWED_DURATIONS`]; anything else is rejected.
    pub allowed_durations_minutes: Vec<u32>,
    /// Failed step-up attempts allowed before the session is denied.
    pub max_step_up_attempts: u32,
    /// Seconds an operator has to complete step-up after requesting a session.
    pub pending_step_up_timeout_secs: u64,
    /// Minimum justification length after trimming.
    pub min_justification_length: usize,
    /// Justification text beyond this length is truncated.
    pub max_justification_length: usize,
}

impl Default for ImpersonationPolicy {
    fn default() -> Self {
        Self {
            allowed_durations_minutes: DEFAULT_ALLOWED_DURATIONS.to_vec(),
            max_step_up_attempts: DEFAULT_MAX_STEP_UP_ATTEMPTS,
            pending_step_up_timeout_secs: DEFAULT_PENDING_STEP_UP_SECS,
            min_justification_length: DEFAULT_MIN_JUSTIFICATION_LENGTH,
            max_justification_length: DEFAULT_MAX_JUSTIFICATION_LENGTH,
        }
    }
}

impl ImpersonationPolicy {
    /// Create a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a strict policy (short sessions, 3 attempts, 2 minute window).
    #[must_use]
    pub fn strict() -> Self {
        Self {
            allowed_durations_minutes: vec![15, 30],
            max_step_up_attempts: 3,
            pending_step_up_timeout_secs: 2 * 60,
            min_justification_length: 20,
            max_justification_length: DEFAULT_MAX_JUSTIFICATION_LENGTH,
        }
    }

    /// Set the allowed session lengths.
    #[must_use]
    pub fn allowed_durations(mut self, minutes: Vec<u32>) -> Self {
        self.allowed_durations_minutes = minutes;
        self
    }

    /// Set the maximum number of step-up attempts.
    #[must_use]
    pub fn max_step_up_attempts(mut self, attempts: u32) -> Self {
        self.max_step_up_attempts = attempts;
        self
    }

    /// Set the step-up verification window.
    #[must_use]
    pub fn pending_step_up_timeout(mut self, secs: u64) -> Self {
        self.pending_step_up_timeout_secs = secs;
        self
    }

    /// Set the minimum justification length.
    #[must_use]
    pub fn min_justification_length(mut self, len: usize) -> Self {
        self.min_justification_length = len;
        self
    }

    /// Load policy overrides from `GANGWAY_`-prefixed environment variables.
    ///
    /// `ALLOWED_DURATIONS` is a comma-separated list such as `15,30`.
    pub fn from_env() -> Self {
        let mut policy = Self::default();

        if let Some(list) = get_env_with_prefix("ALLOWED_DURATIONS") {
            let parsed: Vec<u32> = list
                .split(',')
                .filter_map(|v| v.trim().parse().ok())
                .collect();
            if !parsed.is_empty() {
                policy.allowed_durations_minutes = parsed;
            }
        }
        if let Some(attempts) = parse_env_with_prefix("MAX_STEP_UP_ATTEMPTS") {
            policy.max_step_up_attempts = attempts;
        }
        if let Some(secs) = parse_env_with_prefix("PENDING_STEP_UP_SECS") {
            policy.pending_step_up_timeout_secs = secs;
        }
        if let Some(len) = parse_env_with_prefix("MIN_JUSTIFICATION_LENGTH") {
            policy.min_justification_length = len;
        }
        if let Some(len) = parse_env_with_prefix("MAX_JUSTIFICATION_LENGTH") {
            policy.max_justification_length = len;
        }

        policy
    }

    /// Validate the policy itself.
    pub fn validate(&self) -> Result<()> {
        if self.allowed_durations_minutes.is_empty() {
            return Err(ImpersonationError::invalid_config(
                "At least one allowed session duration is required",
            ));
        }
        if let Some(bad) = self
            .allowed_durations_minutes
            .iter()
            .find(|m| !DEFAULT_ALLOWED_DURATIONS.contains(m))
        {
            return Err(ImpersonationError::invalid_config(format!(
                "Session duration {bad} is not one of {DEFAULT_ALLOWED_DURATIONS:?} minutes"
            )));
        }
        if self.max_step_up_attempts == 0
            || self.max_step_up_attempts > DEFAULT_MAX_STEP_UP_ATTEMPTS
        {
            return Err(ImpersonationError::invalid_config(format!(
                "max_step_up_attempts must be between 1 and {DEFAULT_MAX_STEP_UP_ATTEMPTS}"
            )));
        }
        if self.pending_step_up_timeout_secs == 0
            || self.pending_step_up_timeout_secs > MAX_PENDING_STEP_UP_SECS
        {
            return Err(ImpersonationError::invalid_config(format!(
                "pending_step_up_timeout_secs must be between 1 and {MAX_PENDING_STEP_UP_SECS}"
            )));
        }
        if self.min_justification_length == 0 {
            return Err(ImpersonationError::invalid_config(
                "min_justification_length must be at least 1",
            ));
        }
        if self.max_justification_length < self.min_justification_length {
            return Err(ImpersonationError::invalid_config(
                "max_justification_length must not be below min_justification_length",
            ));
        }
        Ok(())
    }

    /// Check a requested duration against the allow-list.
    ///
    /// The fixed ceiling applies even to a policy that skipped [`validate`](Self::validate).
    pub fn check_duration(&self, minutes: u32) -> Result<Duration> {
        if self.allowed_durations_minutes.contains(&minutes)
            && DEFAULT_ALLOWED_DURATIONS.contains(&minutes)
        {
            Ok(Duration::minutes(i64::from(minutes)))
        } else {
            Err(ImpersonationError::InvalidDuration(minutes))
        }
    }

    /// Trim, bound and return the justification text.
    pub fn normalize_justification(&self, text: &str) -> Result<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ImpersonationError::MissingJustification);
        }
        if trimmed.chars().count() < self.min_justification_length {
            return Err(ImpersonationError::JustificationTooShort(
                self.min_justification_length,
            ));
        }
        Ok(truncate_string(trimmed, self.max_justification_length))
    }

    /// The step-up verification window as a duration.
    pub fn step_up_window(&self) -> Duration {
        let secs = self.pending_step_up_timeout_secs.min(MAX_PENDING_STEP_UP_SECS);
        Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }
}

/// Truncate a string to a maximum byte length (UTF-8 safe).
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}
