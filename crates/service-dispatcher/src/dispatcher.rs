// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::handle::ServiceHandle;
use crate::runnable::Runnable;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use tracing::{debug, error, info};

static INSTANCE: OnceLock<Dispatcher> = OnceLock::new();

/// Whether the dispatcher accepts new services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// `add_service` may start services.
    Accepting,
    /// `stop_services` was called; `add_service` rejects until `reset_stopping`.
    Stopping,
}

#[derive(Debug, Default)]
struct Registry {
    services: Vec<Arc<ServiceHandle>>,
    stopping: bool,
    next_id: u64,
}

/// State shared with the service threads, which reclaim their own handle on exit.
#[derive(Debug, Default)]
struct Shared {
    registry: Mutex<Registry>,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reclaim(&self, id: u64) {
        let mut registry = self.registry();
        registry.services.retain(|handle| handle.id() != id);
        debug!(
            active = registry.services.len(),
            "Service reclaimed from registry"
        );
    }
}

/// Registry and scheduler of the agent's background services.
///
/// Every accepted service runs on its own dedicated thread for its whole
/// lifetime. The registry and the stopping flag sit behind a single lock, so
/// `add_service`, `service_count` and `join_services` observe a consistent
/// registry from any thread.
///
/// ## Lifecycle
///
/// ```text
///             reset_stopping()
///      ┌───────────────────────────┐
///      ▼                           │
///   ACCEPTING ──stop_services()──▶ STOPPING
/// ```
///
/// A finished service removes its own handle from the registry before it is
/// reported complete, so after `join_services` returns, `service_count` no
/// longer counts any service that was registered when the join began.
#[derive(Debug)]
pub struct Dispatcher {
    config: DispatcherConfig,
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Creates a standalone dispatcher. Most callers want [`Dispatcher::instance`].
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
        }
    }

    /// The process-wide dispatcher, created with the default configuration on
    /// first use unless [`Dispatcher::install`] ran first.
    pub fn instance() -> &'static Dispatcher {
        INSTANCE.get_or_init(|| Dispatcher::new(DispatcherConfig::default()))
    }

    /// Initializes the process-wide dispatcher with `config`.
    ///
    /// Fails with [`DispatchError::AlreadyInitialized`] once the singleton
    /// exists, and with [`DispatchError::InvalidConfig`] on a bad config.
    pub fn install(config: DispatcherConfig) -> Result<&'static Dispatcher, DispatchError> {
        config.validate()?;

        let mut installed = false;
        let dispatcher = INSTANCE.get_or_init(|| {
            installed = true;
            Dispatcher::new(config)
        });

        if installed {
            Ok(dispatcher)
        } else {
            Err(DispatchError::AlreadyInitialized)
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Starts `runnable` on a new thread and registers it.
    ///
    /// Rejected while stopping, and for an instance that already ran or is
    /// already scheduled. On success the service is counted by
    /// [`service_count`](Self::service_count) before this returns.
    pub fn add_service(&self, runnable: Arc<dyn Runnable>) -> Result<(), DispatchError> {
        let mut registry = self.shared.registry();

        if registry.stopping {
            debug!(service = %runnable.name(), "Dispatcher is stopping, rejecting service");
            return Err(DispatchError::Stopping(runnable.name().to_string()));
        }

        if !runnable.state().try_schedule() {
            debug!(service = %runnable.name(), "Rejecting service that already ran");
            return Err(DispatchError::AlreadyRun(runnable.name().to_string()));
        }

        registry.next_id += 1;
        let id = registry.next_id;
        let shared = Arc::clone(&self.shared);

        // The registry lock is held across the spawn: a service that finishes
        // immediately blocks in reclaim until its handle has been registered.
        let spawned = ServiceHandle::spawn(
            id,
            Arc::clone(&runnable),
            self.thread_builder(runnable.name()),
            move |id| shared.reclaim(id),
        );

        match spawned {
            Ok(handle) => {
                registry.services.push(handle);
                debug!(
                    service = %runnable.name(),
                    active = registry.services.len(),
                    "Service added"
                );
                Ok(())
            }
            Err(source) => {
                runnable.state().unschedule();
                error!(service = %runnable.name(), "Failed to spawn service thread: {source}");
                Err(DispatchError::Spawn {
                    name: runnable.name().to_string(),
                    source,
                })
            }
        }
    }

    /// Blocks until every service registered at call entry has finished and
    /// left the registry.
    ///
    /// Safe to call from several threads at once. When called from a service
    /// thread, that service's own handle is skipped.
    pub fn join_services(&self) {
        let pending = self.shared.registry().services.clone();
        if pending.is_empty() {
            return;
        }

        debug!(pending = pending.len(), "Joining services");
        for handle in pending {
            handle.join();
        }
    }

    /// Stops accepting services and, unless disabled in the config, interrupts
    /// the services still running.
    pub fn stop_services(&self) {
        let active = {
            let mut registry = self.shared.registry();
            registry.stopping = true;
            if self.config.interrupt_on_stop {
                registry.services.clone()
            } else {
                Vec::new()
            }
        };

        info!(interrupting = active.len(), "Stopping services");
        // Interrupt hooks run outside the registry lock. A panicking hook is
        // contained by the handle and the remaining services are still interrupted.
        for handle in active {
            handle.interrupt();
        }
    }

    /// Accepts services again after [`stop_services`](Self::stop_services).
    pub fn reset_stopping(&self) {
        self.shared.registry().stopping = false;
        debug!("Dispatcher accepting services");
    }

    pub fn service_count(&self) -> usize {
        self.shared.registry().services.len()
    }

    pub fn state(&self) -> DispatcherState {
        if self.shared.registry().stopping {
            DispatcherState::Stopping
        } else {
            DispatcherState::Accepting
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.state() == DispatcherState::Stopping
    }

    /// Names of the registered services, in registration order.
    pub fn active_services(&self) -> Vec<String> {
        self.shared
            .registry()
            .services
            .iter()
            .map(|handle| handle.name().to_string())
            .collect()
    }

    fn thread_builder(&self, service_name: &str) -> thread::Builder {
        let builder = thread::Builder::new().name(self.config.thread_name(service_name));
        match self.config.thread_stack_size {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }
}
