// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use service_dispatcher::{Dispatcher, Runnable, RunnableState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Logs a beat every interval until interrupted.
pub struct HeartbeatService {
    state: RunnableState,
    interval: Duration,
    beats: AtomicU64,
}

impl HeartbeatService {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: RunnableState::new("heartbeat"),
            interval,
            beats: AtomicU64::new(0),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

impl Runnable for HeartbeatService {
    fn start(&self) {
        while !self.interrupted() {
            let beats = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
            info!(beats, "Agent heartbeat");
            self.pause(self.interval);
        }
        debug!(beats = self.beats(), "Heartbeat stopped");
    }

    fn state(&self) -> &RunnableState {
        &self.state
    }
}

/// Stops every service once the configured run duration has elapsed.
pub struct ShutdownTimer {
    state: RunnableState,
    after: Duration,
    dispatcher: &'static Dispatcher,
}

impl ShutdownTimer {
    pub fn new(after: Duration, dispatcher: &'static Dispatcher) -> Self {
        Self {
            state: RunnableState::new("shutdown-timer"),
            after,
            dispatcher,
        }
    }
}

impl Runnable for ShutdownTimer {
    fn start(&self) {
        self.pause(self.after);
        if self.interrupted() {
            return;
        }

        info!(after = ?self.after, "Run duration elapsed, stopping services");
        self.dispatcher.stop_services();
    }

    fn state(&self) -> &RunnableState {
        &self.state
    }
}
