// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::constants::{DEFAULT_BATCH_QUEUE_CAPACITY, EU_LOGS_ENDPOINT, US_LOGS_ENDPOINT};
use crate::errors::ConfigError;

/// Configuration of the forwarder, read from the function's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// License key given directly in the environment
    pub license_key: Option<String>,
    /// Name of the secret holding the license key, when not given directly
    pub license_key_secret_name: Option<String>,
    /// New Relic region, `US` or `EU`
    pub region: String,
    /// Overrides the regional logs endpoint
    pub logs_endpoint: Option<String>,
    /// Custom metadata as a JSON list of `{AttributeName, AttributeValue}`
    pub custom_metadata: String,
    pub debug_enabled: bool,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    pub delivery_timeout: Duration,
    /// Number of sealed batches that may wait for delivery
    pub batch_queue_capacity: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            license_key: None,
            license_key_secret_name: None,
            region: "US".to_string(),
            logs_endpoint: None,
            custom_metadata: String::new(),
            debug_enabled: false,
            log_level: "info".to_string(),
            delivery_timeout: Duration::from_secs(10),
            batch_queue_capacity: DEFAULT_BATCH_QUEUE_CAPACITY,
        }
    }
}

impl ForwarderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|val| !val.trim().is_empty());

        let debug_enabled = lookup("DEBUG_ENABLED")
            .map(|val| val.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let log_level = match lookup("LOG_LEVEL") {
            Some(level) => level.to_lowercase(),
            None if debug_enabled => "debug".to_string(),
            None => defaults.log_level,
        };
        let delivery_timeout = match lookup("DELIVERY_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(parse_number("DELIVERY_TIMEOUT_SECS", &secs)?),
            None => defaults.delivery_timeout,
        };
        let batch_queue_capacity = match lookup("BATCH_QUEUE_CAPACITY") {
            Some(capacity) => {
                usize::try_from(parse_number("BATCH_QUEUE_CAPACITY", &capacity)?).map_err(|_| {
                    ConfigError::Invalid(format!("BATCH_QUEUE_CAPACITY '{capacity}' is too large"))
                })?
            }
            None => defaults.batch_queue_capacity,
        };

        let config = Self {
            license_key: non_empty("LICENSE_KEY"),
            license_key_secret_name: non_empty("NEW_RELIC_LICENSE_KEY_SECRET_NAME"),
            region: non_empty("NEW_RELIC_REGION")
                .map(|val| val.trim().to_uppercase())
                .unwrap_or(defaults.region),
            logs_endpoint: non_empty("NEW_RELIC_LOGS_ENDPOINT"),
            custom_metadata: lookup("CUSTOM_META_DATA").unwrap_or_default(),
            debug_enabled,
            log_level,
            delivery_timeout,
            batch_queue_capacity,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.region.as_str(), "US" | "EU") {
            return Err(ConfigError::Invalid(format!(
                "unknown region '{}'. Must be one of: US, EU",
                self.region
            )));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if self.delivery_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "DELIVERY_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.batch_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "BATCH_QUEUE_CAPACITY must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Endpoint batches are posted to.
    #[must_use]
    pub fn logs_endpoint(&self) -> &str {
        match (&self.logs_endpoint, self.region.as_str()) {
            (Some(endpoint), _) => endpoint,
            (None, "EU") => EU_LOGS_ENDPOINT,
            (None, _) => US_LOGS_ENDPOINT,
        }
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a number, got '{value}'")))
}
