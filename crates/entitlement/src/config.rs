//! Configuration model
//!
//! Every field has a default, so an empty document is a valid config.
//!
//! ```toml
//! [validation]
//! mode = "scoped"
//! exclude-entitled-requirements = false
//!
//! [integrations]
//! gateway = true
//! auth = true
//! events = true
//!
//! [retry]
//! max-attempts = 3
//! initial-delay-ms = 500
//! max-delay-ms = 10000
//! multiplier = 2.0
//!
//! [execution]
//! mode = "parallel"
//! strategy = "cancel-on-error"
//! jobs = 8
//! timeout-secs = 600
//! in-flight-grace-secs = 30
//! ```

use crate::composer::{ExecutionMode, IntegrationSettings};
use crate::integrity::{IntegrityValidator, ValidationMode};
use serde::{Deserialize, Serialize};
use stageflow::{ExecuteOptions, ExecutionStrategy, RetryConfig, default_jobs};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EntitlementConfig {
    pub validation: ValidationSettings,
    pub integrations: IntegrationSettings,
    pub retry: RetrySettings,
    pub execution: ExecutionSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ValidationSettings {
    pub mode: ValidationMode,
    /// Skip requirements of applications the tenant already has
    pub exclude_entitled_requirements: bool,
}

impl ValidationSettings {
    pub fn validator(&self) -> IntegrityValidator {
        IntegrityValidator::new(self.mode)
            .with_exclude_entitled_requirements(self.exclude_entitled_requirements)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutionSettings {
    pub mode: ExecutionMode,
    pub strategy: ExecutionStrategy,
    /// Worker threads; machine parallelism when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    /// Wall-clock limit per request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    pub in_flight_grace_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            strategy: ExecutionStrategy::default(),
            jobs: None,
            timeout_secs: None,
            in_flight_grace_secs: 30,
        }
    }
}

impl ExecutionSettings {
    /// Executor options; `strategy` overrides the configured one
    pub fn to_execute_options(&self, strategy: Option<ExecutionStrategy>) -> ExecuteOptions {
        let options = ExecuteOptions::default()
            .with_jobs(self.jobs.unwrap_or_else(default_jobs))
            .with_strategy(strategy.unwrap_or(self.strategy));
        let grace = Duration::from_secs(self.in_flight_grace_secs);
        match self.timeout_secs {
            Some(secs) => options.with_timeout(Duration::from_secs(secs), grace),
            None => ExecuteOptions {
                in_flight_grace: grace,
                ..options
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config: EntitlementConfig = toml::from_str("").unwrap();
        assert_eq!(config, EntitlementConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.integrations.gateway);
        assert_eq!(config.execution.in_flight_grace_secs, 30);
    }

    #[test]
    fn test_partial_document() {
        let config: EntitlementConfig = toml::from_str(
            r#"
            [validation]
            mode = "combined"

            [integrations]
            auth = false

            [retry]
            max-attempts = 5
            initial-delay-ms = 100

            [execution]
            mode = "ordered"
            strategy = "ignore-on-error"
            jobs = 2
            timeout-secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.validation.mode, ValidationMode::Combined);
        assert!(!config.integrations.auth);
        assert!(config.integrations.gateway);
        assert_eq!(config.execution.mode, ExecutionMode::Ordered);

        let retry = config.retry.to_retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_secs(10));

        let options = config.execution.to_execute_options(None);
        assert_eq!(options.jobs, 2);
        assert_eq!(options.strategy, ExecutionStrategy::IgnoreOnError);
        assert_eq!(options.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_request_strategy_overrides_config() {
        let settings = ExecutionSettings::default();
        let options = settings.to_execute_options(Some(ExecutionStrategy::IgnoreOnError));
        assert_eq!(options.strategy, ExecutionStrategy::IgnoreOnError);
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = EntitlementConfig::default();
        config.execution.jobs = Some(4);
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("jobs = 4"));
        let parsed: EntitlementConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
