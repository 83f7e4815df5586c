use serde::{Deserialize, Serialize};

use crate::error::{ImpersonationError, Result};
use crate::session::{ImpersonationPolicy, SweeperConfig};
use crate::stepup::TotpConfig;
use crate::utils::get_env_with_prefix;

/// Main configuration for a gangway deployment
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub impersonation: ImpersonationPolicy,
    #[serde(default)]
    pub totp: TotpConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_impersonation_policy(mut self, policy: ImpersonationPolicy) -> Self {
        self.config.impersonation = policy;
        self
    }

    pub fn with_totp(mut self, totp: TotpConfig) -> Self {
        self.config.totp = totp;
        self
    }

    pub fn with_sweeper(mut self, sweeper: SweeperConfig) -> Self {
        self.config.sweeper = sweeper;
        self
    }

    /// Load configuration from environment variables with GANGWAY_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }

        self.config.impersonation = ImpersonationPolicy::from_env();
        self.config.totp = TotpConfig::from_env();
        self.config.sweeper = SweeperConfig::from_env();

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration is invalid:
    /// - Invalid log level
    /// - Empty duration allow-list, or one with a length outside 15/30/45/60
    /// - Step-up attempts outside 1..=5, or a zero pending-verification timeout
    /// - Unsupported TOTP digit count
    pub fn build(self) -> Result<Config> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(ImpersonationError::invalid_config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        self.config.impersonation.validate()?;
        self.config.totp.validate()?;

        if self.config.sweeper.enabled && self.config.sweeper.interval_secs == 0 {
            return Err(ImpersonationError::invalid_config(
                "Sweeper interval must be greater than 0 when enabled",
            ));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
