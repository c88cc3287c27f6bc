//! Configuration management for the reversible action engine
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (RVB_* prefix, `__` between section and key)
//! 2. reversible.local.toml (gitignored, local overrides)
//! 3. reversible.toml (git-tracked, project config)
//! 4. ~/.config/reversible/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use serde::{Deserialize, Serialize};

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::{ConfigLayer, ConfigLoader, LayerKind};

/// Upper bound on `tokens.ttl_secs`. Confirmations are meant to be short-lived.
pub const MAX_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Upper bound on `windows.default_max_age_hours` (ten years).
pub const MAX_WINDOW_HOURS: u64 = 10 * 365 * 24;

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    pub tokens: TokenConfig,
    pub windows: WindowConfig,
    pub reasons: ReasonConfig,
    pub logging: LoggingConfig,
}

/// Confirmation token settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of a confirmation token in seconds.
    pub ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

/// Eligibility window settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window applied by the standard UPDATE policies, in hours.
    pub default_max_age_hours: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_max_age_hours: 72,
        }
    }
}

/// Bounds on the free-text reason required by every execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonConfig {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for ReasonConfig {
    fn default() -> Self {
        Self {
            min_len: 10,
            max_len: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive (e.g. "info", "reversible=debug").
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl RollbackConfig {
    /// Reject settings the engine cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&self.tokens.ttl_secs) {
            return Err(ConfigError::ValidationError(format!(
                "tokens.ttl_secs must be between 1 and {MAX_TOKEN_TTL_SECS}, got {}",
                self.tokens.ttl_secs
            )));
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&self.windows.default_max_age_hours) {
            return Err(ConfigError::ValidationError(format!(
                "windows.default_max_age_hours must be between 1 and {MAX_WINDOW_HOURS}, got {}",
                self.windows.default_max_age_hours
            )));
        }
        if self.reasons.min_len > self.reasons.max_len {
            return Err(ConfigError::ValidationError(format!(
                "reasons.min_len ({}) exceeds reasons.max_len ({})",
                self.reasons.min_len, self.reasons.max_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config() {
        let config = RollbackConfig::default();
        assert_eq!(config.tokens.ttl_secs, 600);
        assert_eq!(config.windows.default_max_age_hours, 72);
        assert_eq!(config.reasons.min_len, 10);
        assert_eq!(config.reasons.max_len, 500);
        assert_eq!(config.logging.filter, "info");
        assert!(config.validate().is_ok());
    }

    #[test_case(0 ; "zero")]
    #[test_case(MAX_TOKEN_TTL_SECS + 1 ; "above the cap")]
    #[test_case(u64::MAX ; "not representable as a duration")]
    fn test_validation_rejects_ttl(ttl_secs: u64) {
        let mut config = RollbackConfig::default();
        config.tokens.ttl_secs = ttl_secs;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("ttl_secs")
        ));
    }

    #[test]
    fn test_validation_accepts_ttl_cap() {
        let mut config = RollbackConfig::default();
        config.tokens.ttl_secs = MAX_TOKEN_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test_case(0)]
    #[test_case(MAX_WINDOW_HOURS + 1)]
    fn test_validation_rejects_window(hours: u64) {
        let mut config = RollbackConfig::default();
        config.windows.default_max_age_hours = hours;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_reason_bounds() {
        let mut config = RollbackConfig::default();
        config.reasons.min_len = 600;
        assert!(config.validate().is_err());
    }
}
