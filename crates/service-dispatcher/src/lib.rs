// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Service Dispatcher
//!
//! Concurrency core for host agents: runs long-lived background services,
//! each on its own dedicated thread, and lets callers start, track, interrupt
//! and wait for them.
//!
//! - [`runnable`]: the [`Runnable`] capability and its run bookkeeping,
//!   including the interruptible [`pause`](Runnable::pause)
//! - [`handle`]: [`ServiceHandle`], a runnable paired with its thread
//! - [`dispatcher`]: the process-wide [`Dispatcher`] registry
//! - [`config`]: [`DispatcherConfig`], read from the environment
//!
//! ```no_run
//! use service_dispatcher::{Dispatcher, Runnable, RunnableState};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Watcher {
//!     state: RunnableState,
//! }
//!
//! impl Runnable for Watcher {
//!     fn start(&self) {
//!         while !self.interrupted() {
//!             self.pause(Duration::from_secs(1));
//!         }
//!     }
//!
//!     fn state(&self) -> &RunnableState {
//!         &self.state
//!     }
//! }
//!
//! let dispatcher = Dispatcher::instance();
//! let watcher = Arc::new(Watcher { state: RunnableState::new("watcher") });
//! dispatcher.add_service(watcher)?;
//!
//! dispatcher.stop_services();
//! dispatcher.join_services();
//! # Ok::<(), service_dispatcher::DispatchError>(())
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod runnable;

pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DispatcherState};
pub use error::DispatchError;
pub use handle::ServiceHandle;
pub use runnable::{RunState, Runnable, RunnableState};
