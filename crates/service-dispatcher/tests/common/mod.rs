// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use service_dispatcher::{Dispatcher, Runnable, RunnableState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Increments a counter shared by every instance, then exits.
pub struct CountingRunnable {
    state: RunnableState,
    counter: Arc<AtomicUsize>,
}

impl CountingRunnable {
    pub fn new(counter: &Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            state: RunnableState::new("CountingRunnable"),
            counter: Arc::clone(counter),
        })
    }
}

impl Runnable for CountingRunnable {
    fn start(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn state(&self) -> &RunnableState {
        &self.state
    }
}

/// Pauses for a very long time unless interrupted.
pub struct BlockingRunnable {
    state: RunnableState,
}

impl BlockingRunnable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RunnableState::new("BlockingRunnable"),
        })
    }
}

impl Runnable for BlockingRunnable {
    fn start(&self) {
        self.pause(Duration::from_secs(100));
    }

    fn state(&self) -> &RunnableState {
        &self.state
    }
}

/// Puts the singleton back into the accepting state when dropped.
pub struct ResetStopping;

impl Drop for ResetStopping {
    fn drop(&mut self) {
        Dispatcher::instance().reset_stopping();
    }
}
