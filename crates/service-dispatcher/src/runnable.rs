// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The unit of work scheduled by the [`Dispatcher`](crate::dispatcher::Dispatcher).
//!
//! A concrete service embeds a [`RunnableState`] and implements [`Runnable`]
//! by providing `start()` and a `state()` accessor. Everything else
//! (interruption, interruptible pauses, run bookkeeping) is provided.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error};

const NOT_STARTED: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;

/// Execution state of a runnable. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// `start()` has not been entered yet.
    NotStarted,
    /// The service thread is inside `start()`.
    Running,
    /// `start()` returned or panicked.
    Finished,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            NOT_STARTED => RunState::NotStarted,
            RUNNING => RunState::Running,
            _ => RunState::Finished,
        }
    }
}

/// Bookkeeping shared by every runnable.
///
/// The interrupt flag has its own lock and condition variable, so interrupting
/// one service never contends with another service or with the dispatcher.
#[derive(Debug)]
pub struct RunnableState {
    name: String,
    run_state: AtomicU8,
    has_run: AtomicBool,
    /// Claimed by the dispatcher when the runnable is accepted.
    scheduled: AtomicBool,
    must_run: AtomicBool,
    interrupted: Mutex<bool>,
    wakeup: Condvar,
}

impl RunnableState {
    /// Creates the bookkeeping for a service called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_state: AtomicU8::new(NOT_STARTED),
            has_run: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
            must_run: AtomicBool::new(false),
            interrupted: Mutex::new(false),
            wakeup: Condvar::new(),
        }
    }

    /// Diagnostic name, also used for the service thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current execution state.
    pub fn run_state(&self) -> RunState {
        RunState::from_u8(self.run_state.load(Ordering::Acquire))
    }

    /// True once `start()` has been entered. Never resets.
    pub fn has_run(&self) -> bool {
        self.has_run.load(Ordering::Acquire)
    }

    /// True while the service thread is inside `start()`.
    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    /// Marks the service as expected to run before it is dropped.
    pub fn must_run(&self) {
        self.must_run.store(true, Ordering::Release);
    }

    /// True once an interrupt has been requested.
    pub fn is_interrupted(&self) -> bool {
        *lock(&self.interrupted)
    }

    /// Sets the interrupt flag and wakes a pending [`pause`](Self::pause).
    ///
    /// Returns `true` only for the call that actually raised the flag. Once the
    /// runnable has finished this is a no-op.
    pub fn request_interrupt(&self) -> bool {
        if self.run_state() == RunState::Finished {
            return false;
        }

        let mut interrupted = lock(&self.interrupted);
        if *interrupted {
            return false;
        }
        *interrupted = true;
        drop(interrupted);

        self.wakeup.notify_all();
        debug!(service = %self.name, "Interrupt requested");
        true
    }

    /// Blocks for up to `duration`, returning early once interrupted.
    pub fn pause(&self, duration: Duration) {
        let interrupted = lock(&self.interrupted);
        let _ = self
            .wakeup
            .wait_timeout_while(interrupted, duration, |interrupted| !*interrupted)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Claims the runnable for a single execution.
    ///
    /// Fails when the runnable already ran or another submission holds the claim.
    pub(crate) fn try_schedule(&self) -> bool {
        if self.has_run() {
            return false;
        }
        self.scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Gives the claim back after a submission that never started a thread.
    pub(crate) fn unschedule(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    pub(crate) fn mark_running(&self) {
        self.has_run.store(true, Ordering::Release);
        self.run_state.store(RUNNING, Ordering::Release);
    }

    pub(crate) fn mark_finished(&self) {
        self.run_state.store(FINISHED, Ordering::Release);
    }
}

impl Drop for RunnableState {
    fn drop(&mut self) {
        if *self.must_run.get_mut() && !*self.has_run.get_mut() {
            error!(
                service = %self.name,
                "Service was marked must-run but was dropped before it ran"
            );
        }
    }
}

/// A service: one unit of work, run at most once, on its own thread.
///
/// Implementations that idle must do so through [`pause`](Runnable::pause)
/// (or check [`interrupted`](Runnable::interrupted) regularly), otherwise
/// [`interrupt`](Runnable::interrupt) cannot end them.
///
/// ```
/// use service_dispatcher::{Runnable, RunnableState};
/// use std::time::Duration;
///
/// struct Poller {
///     state: RunnableState,
/// }
///
/// impl Runnable for Poller {
///     fn start(&self) {
///         while !self.interrupted() {
///             // poll something
///             self.pause(Duration::from_secs(10));
///         }
///     }
///
///     fn state(&self) -> &RunnableState {
///         &self.state
///     }
/// }
/// ```
pub trait Runnable: Send + Sync + 'static {
    /// The service body. Invoked exactly once, on the service's own thread.
    fn start(&self);

    /// The embedded run bookkeeping.
    fn state(&self) -> &RunnableState;

    /// Called once, from the interrupting thread, on the first effective
    /// [`interrupt`](Runnable::interrupt). Services blocked outside `pause`
    /// use it to unblock themselves.
    fn on_interrupt(&self) {}

    fn name(&self) -> &str {
        self.state().name()
    }

    /// Requests cooperative cancellation.
    fn interrupt(&self) {
        if self.state().request_interrupt() {
            self.on_interrupt();
        }
    }

    fn interrupted(&self) -> bool {
        self.state().is_interrupted()
    }

    /// Interruptible sleep.
    fn pause(&self, duration: Duration) {
        self.state().pause(duration);
    }

    fn has_run(&self) -> bool {
        self.state().has_run()
    }

    /// Marks this instance as expected to run before it is dropped.
    fn must_run(&self) {
        self.state().must_run();
    }

    fn run_state(&self) -> RunState {
        self.state().run_state()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;
    use tracing_test::traced_test;

    struct Sleeper {
        state: RunnableState,
        hook_calls: AtomicUsize,
    }

    impl Sleeper {
        fn new() -> Self {
            Self {
                state: RunnableState::new("sleeper"),
                hook_calls: AtomicUsize::new(0),
            }
        }
    }

    impl Runnable for Sleeper {
        fn start(&self) {
            self.pause(Duration::from_secs(100));
        }

        fn state(&self) -> &RunnableState {
            &self.state
        }

        fn on_interrupt(&self) {
            self.hook_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_initial_state() {
        let sleeper = Sleeper::new();
        assert_eq!(sleeper.name(), "sleeper");
        assert_eq!(sleeper.run_state(), RunState::NotStarted);
        assert!(!sleeper.has_run());
        assert!(!sleeper.interrupted());
        assert!(!sleeper.state().is_running());
    }

    #[test]
    fn test_pause_elapses_without_interrupt() {
        let state = RunnableState::new("pause");
        let started = Instant::now();
        state.pause(Duration::from_millis(50));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_pause_returns_immediately_when_already_interrupted() {
        let sleeper = Sleeper::new();
        sleeper.interrupt();

        let started = Instant::now();
        sleeper.pause(Duration::from_secs(100));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_interrupt_wakes_pause_on_another_thread() {
        let sleeper = Arc::new(Sleeper::new());
        let worker = Arc::clone(&sleeper);
        let started = Instant::now();
        let handle = thread::spawn(move || worker.start());

        thread::sleep(Duration::from_millis(20));
        sleeper.interrupt();
        handle.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(sleeper.interrupted());
    }

    #[test]
    fn test_interrupt_hook_runs_once() {
        let sleeper = Sleeper::new();
        sleeper.interrupt();
        sleeper.interrupt();
        sleeper.interrupt();
        assert_eq!(sleeper.hook_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interrupt_after_finish_is_noop() {
        let sleeper = Sleeper::new();
        sleeper.state().mark_running();
        sleeper.state().mark_finished();

        sleeper.interrupt();
        assert!(!sleeper.interrupted());
        assert_eq!(sleeper.hook_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_state_is_monotonic_through_lifecycle() {
        let state = RunnableState::new("lifecycle");
        state.mark_running();
        assert_eq!(state.run_state(), RunState::Running);
        assert!(state.has_run());
        state.mark_finished();
        assert_eq!(state.run_state(), RunState::Finished);
        assert!(state.has_run());
    }

    #[test]
    fn test_schedule_claim_is_exclusive() {
        let state = RunnableState::new("claim");
        assert!(state.try_schedule());
        assert!(!state.try_schedule());

        state.unschedule();
        assert!(state.try_schedule());
    }

    #[test]
    fn test_schedule_rejected_after_run() {
        let state = RunnableState::new("ran");
        state.mark_running();
        state.mark_finished();
        state.unschedule();
        assert!(!state.try_schedule());
    }

    #[test]
    fn test_concurrent_claims_admit_one() {
        let state = Arc::new(RunnableState::new("race"));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if state.try_schedule() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn test_must_run_violation_is_logged() {
        let sleeper = Sleeper::new();
        sleeper.must_run();
        drop(sleeper);

        assert!(logs_contain("marked must-run but was dropped"));
    }

    #[test]
    #[traced_test]
    fn test_must_run_satisfied_is_silent() {
        let state = RunnableState::new("satisfied");
        state.must_run();
        state.mark_running();
        state.mark_finished();
        drop(state);

        assert!(!logs_contain("marked must-run"));
    }
}
