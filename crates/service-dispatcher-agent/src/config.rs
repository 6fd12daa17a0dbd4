// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use service_dispatcher::{DispatchError, DispatcherConfig};
use std::env;
use std::time::Duration;
use tracing_core::Level;

const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum AgentConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Dispatcher(#[from] DispatchError),
}

/// Configuration for the agent binary
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// How often the heartbeat service logs
    pub heartbeat_interval: Duration,
    /// How long to run before stopping all services. `None` runs until stopped
    pub run_duration: Option<Duration>,
    pub dispatcher: DispatcherConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            run_duration: None,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, AgentConfigError> {
        let log_level = log_level_from_env();
        let heartbeat_interval = env::var("AGENT_HEARTBEAT_INTERVAL_MS")
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS));
        let run_duration = env::var("AGENT_RUN_SECONDS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let dispatcher = DispatcherConfig::from_env()?;

        let config = Self {
            log_level,
            heartbeat_interval,
            run_duration,
            dispatcher,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AgentConfigError> {
        if self.log_level.parse::<Level>().is_err() {
            return Err(AgentConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(AgentConfigError::InvalidConfig(
                "Heartbeat interval must be greater than 0".to_string(),
            ));
        }

        self.dispatcher.validate()?;
        Ok(())
    }
}

/// Log level as configured, read ahead of the rest so logging can come up first.
pub fn log_level_from_env() -> String {
    env::var("AGENT_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| "info".to_string())
}
