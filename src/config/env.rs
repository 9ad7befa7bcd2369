//! Environment variable loading.

use std::str::FromStr;

use super::{ServerConfig, merge, validation};

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Values from a `.env` file are already part of the environment (loaded in
    /// `main`). Missing values fall back to defaults.
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate_config(&config)?;
        Ok(config)
    }
}

/// Read a variable, treating empty or whitespace-only values as unset.
pub(super) fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional variable.
pub(super) fn env_parse<T>(key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| format!("Invalid {key} value '{raw}': {e}"))
        })
        .transpose()
}

/// Parse a boolean flag (`true`/`false`/`1`/`0`/`yes`/`no`).
pub(super) fn env_bool(key: &str) -> Result<Option<bool>, String> {
    env_var(key)
        .map(|raw| match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(format!("Invalid {key} value '{raw}': expected true or false")),
        })
        .transpose()
}
