//! Runtime settings read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `HARVIT_DEBUG` | `false` |
//! | `HARVIT_LOG` | unset (`harvit=info`) |
//! | `HARVIT_SCRIPT_TIMEOUT_MS` | `2000` |
//! | `HARVIT_SCRIPT_MAX_OPERATIONS` | `0` (unlimited) |
//!
//! A `.env` file in the working directory is honoured by [`Settings::load`].

use std::time::Duration;

use crate::transform::ScriptLimits;

pub const ENV_DEBUG: &str = "HARVIT_DEBUG";
pub const ENV_LOG: &str = "HARVIT_LOG";
pub const ENV_SCRIPT_TIMEOUT_MS: &str = "HARVIT_SCRIPT_TIMEOUT_MS";
pub const ENV_SCRIPT_MAX_OPERATIONS: &str = "HARVIT_SCRIPT_MAX_OPERATIONS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub debug: bool,
    /// Log filter directive, used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    pub script_timeout: Duration,
    pub script_max_operations: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let limits = ScriptLimits::default();
        Self {
            debug: false,
            log_filter: None,
            script_timeout: limits.timeout,
            script_max_operations: limits.max_operations,
        }
    }
}

impl Settings {
    /// Load `.env` (if present), then read the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(value) = lookup(ENV_DEBUG) {
            settings.debug = parse_bool(ENV_DEBUG, &value)?;
        }

        settings.log_filter = lookup(ENV_LOG).filter(|v| !v.trim().is_empty());

        if let Some(value) = lookup(ENV_SCRIPT_TIMEOUT_MS) {
            let millis = parse_u64(ENV_SCRIPT_TIMEOUT_MS, &value)?;
            settings.script_timeout = Duration::from_millis(millis);
        }

        if let Some(value) = lookup(ENV_SCRIPT_MAX_OPERATIONS) {
            settings.script_max_operations = parse_u64(ENV_SCRIPT_MAX_OPERATIONS, &value)?;
        }

        Ok(settings)
    }

    pub fn script_limits(&self) -> ScriptLimits {
        ScriptLimits {
            timeout: self.script_timeout,
            max_operations: self.script_max_operations,
            ..ScriptLimits::default()
        }
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_u64(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}
