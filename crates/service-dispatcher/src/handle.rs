// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::runnable::Runnable;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info_span, warn, Span};

/// A runnable paired with the thread executing it.
///
/// The handle owns the thread. Callers only ever see [`join`](Self::join) and
/// [`interrupt`](Self::interrupt); the `JoinHandle` never leaves this type.
pub struct ServiceHandle {
    id: u64,
    runnable: Arc<dyn Runnable>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: OnceLock<ThreadId>,
    joinable: AtomicBool,
    complete: Mutex<bool>,
    completed: Condvar,
}

impl ServiceHandle {
    /// Spawns the service thread.
    ///
    /// `on_exit` runs on the service thread after `start()` returns (or
    /// panics) and before the handle reports completion to joiners.
    pub(crate) fn spawn<F>(
        id: u64,
        runnable: Arc<dyn Runnable>,
        builder: thread::Builder,
        on_exit: F,
    ) -> io::Result<Arc<Self>>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let handle = Arc::new(Self {
            id,
            runnable,
            thread: Mutex::new(None),
            thread_id: OnceLock::new(),
            joinable: AtomicBool::new(true),
            complete: Mutex::new(false),
            completed: Condvar::new(),
        });

        // Created here so the service span nests under the caller's span.
        let span = info_span!("service", name = %handle.name());
        let worker = Arc::clone(&handle);
        let thread = builder.spawn(move || {
            execute(worker.runnable.as_ref(), &span);
            on_exit(worker.id);
            worker.mark_complete();
        })?;

        let _ = handle.thread_id.set(thread.thread().id());
        *lock(&handle.thread) = Some(thread);
        Ok(handle)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        self.runnable.name()
    }

    pub fn is_joinable(&self) -> bool {
        self.joinable.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        *lock(&self.complete)
    }

    /// Interrupts the service. A panicking `on_interrupt` hook is logged and
    /// contained here, on the interrupting thread.
    pub fn interrupt(&self) {
        let runnable = self.runnable.as_ref();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| runnable.interrupt())) {
            error!(
                service = %self.name(),
                "Interrupt hook panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    /// Blocks until the service thread has finished.
    ///
    /// Any number of threads may join the same handle; one of them joins the
    /// OS thread, the rest wait for the completion signal. Returns `false`
    /// without blocking when called from the service's own thread.
    pub fn join(&self) -> bool {
        if self.is_current_thread() {
            debug!(service = %self.name(), "Skipping self-join from service thread");
            return false;
        }

        let thread = lock(&self.thread).take();
        match thread {
            Some(thread) => {
                if thread.join().is_err() {
                    warn!(service = %self.name(), "Service thread exited abnormally");
                }
            }
            None => self.wait_complete(),
        }

        self.joinable.store(false, Ordering::Release);
        true
    }

    fn is_current_thread(&self) -> bool {
        self.thread_id.get() == Some(&thread::current().id())
    }

    fn mark_complete(&self) {
        *lock(&self.complete) = true;
        self.completed.notify_all();
    }

    fn wait_complete(&self) {
        let complete = lock(&self.complete);
        drop(
            self.completed
                .wait_while(complete, |complete| !*complete)
                .unwrap_or_else(PoisonError::into_inner),
        );
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("joinable", &self.is_joinable())
            .finish()
    }
}

/// Runs `start()` on the current thread, containing panics.
fn execute(runnable: &dyn Runnable, span: &Span) {
    let _entered = span.enter();
    let state = runnable.state();

    state.mark_running();
    debug!("Service started");

    match panic::catch_unwind(AssertUnwindSafe(|| runnable.start())) {
        Ok(()) => debug!("Service finished"),
        Err(payload) => error!("Service panicked: {}", panic_message(payload.as_ref())),
    }

    state.mark_finished();
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
