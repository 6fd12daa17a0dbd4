// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::DispatchError;
use std::env;

/// Smallest stack accepted for a service thread.
pub const MIN_THREAD_STACK_SIZE: usize = 64 * 1024;

/// Configuration for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Prepended to the service name to form the thread name
    pub thread_name_prefix: String,
    /// Stack size for service threads, in bytes. `None` keeps the platform default
    pub thread_stack_size: Option<usize>,
    /// Whether `stop_services` interrupts the services still running
    pub interrupt_on_stop: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: String::new(),
            thread_stack_size: None,
            interrupt_on_stop: true,
        }
    }
}

impl DispatcherConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, DispatchError> {
        let thread_name_prefix = env::var("DISPATCHER_THREAD_NAME_PREFIX").unwrap_or_default();
        let thread_stack_size = env::var("DISPATCHER_THREAD_STACK_SIZE")
            .ok()
            .and_then(|size| size.trim().parse::<usize>().ok());
        let interrupt_on_stop = env::var("DISPATCHER_INTERRUPT_ON_STOP")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(true);

        let config = Self {
            thread_name_prefix,
            thread_stack_size,
            interrupt_on_stop,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.thread_name_prefix.contains('\0') {
            return Err(DispatchError::InvalidConfig(
                "Thread name prefix cannot contain NUL bytes".to_string(),
            ));
        }

        if let Some(size) = self.thread_stack_size {
            if size < MIN_THREAD_STACK_SIZE {
                return Err(DispatchError::InvalidConfig(format!(
                    "Thread stack size {size} is below the minimum of {MIN_THREAD_STACK_SIZE} bytes"
                )));
            }
        }

        Ok(())
    }

    /// Thread name for a service, with NUL bytes stripped.
    pub fn thread_name(&self, service_name: &str) -> String {
        format!("{}{}", self.thread_name_prefix, service_name).replace('\0', "")
    }
}
