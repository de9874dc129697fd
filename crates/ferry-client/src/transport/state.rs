//! Session state shared between the transport thread and its owner.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use strum::Display;

/// Lifecycle of the daemon session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    /// No session and no attempt in progress.
    Disconnected,
    /// Dialling the daemon.
    Connecting,
    /// Session established; requests are transmitted.
    Connected,
    /// The last attempt or session failed; a retry follows the backoff.
    Error,
}

/// Current [`SessionState`] plus a way to wait for changes.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: Mutex<SessionState>,
    changed: Condvar,
}

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Disconnected),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = next;
        self.changed.notify_all();
    }

    /// Blocks until the state equals `wanted` or `timeout` elapses.
    pub(crate) fn wait_for(&self, wanted: SessionState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while *state != wanted {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Stop flag whose waits can be interrupted.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub(crate) fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }

    pub(crate) fn reset(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `duration` unless stopped first; returns whether stopped.
    pub(crate) fn wait(&self, duration: Duration) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .wake
            .wait_timeout_while(stopped, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn stop_interrupts_a_long_wait() {
        let signal = Arc::new(StopSignal::default());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let started = Instant::now();
                let stopped = signal.wait(Duration::from_secs(30));
                (stopped, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        signal.stop();
        let (stopped, elapsed) = waiter.join().expect("waiter thread");
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn wait_without_stop_runs_to_completion() {
        let signal = StopSignal::default();
        assert!(!signal.wait(Duration::from_millis(10)));
    }

    #[test]
    fn state_waits_observe_transitions() {
        let cell = Arc::new(StateCell::new());
        let setter = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                cell.set(SessionState::Connected);
            })
        };
        assert!(cell.wait_for(SessionState::Connected, Duration::from_secs(2)));
        setter.join().expect("setter thread");
        assert!(!cell.wait_for(SessionState::Error, Duration::from_millis(10)));
    }
}
