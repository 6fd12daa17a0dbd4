// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors returned by the dispatcher.
///
/// `Stopping` and `AlreadyRun` are ordinary scheduling rejections: the
/// service was not started and nothing was registered.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatcher is stopping, service {0} not started")]
    Stopping(String),

    #[error("Service {0} has already run or is already scheduled")]
    AlreadyRun(String),

    #[error("Failed to spawn thread for service {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Dispatcher already initialized")]
    AlreadyInitialized,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DispatchError {
    /// True for the two ordinary rejections a caller is expected to handle.
    pub fn is_rejection(&self) -> bool {
        matches!(self, DispatchError::Stopping(_) | DispatchError::AlreadyRun(_))
    }
}
