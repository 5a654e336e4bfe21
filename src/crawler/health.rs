//! Run-wide health tracking: circuit breaker and shutdown flag
//!
//! Workers report every session outcome here. Failures from any worker count
//! toward one shared consecutive-failure total; any success resets it. When
//! the total passes the configured threshold the whole run shuts down.
//! Independent of per-session retry counts, this stops the pool from
//! hammering a target that is globally broken.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Shared run state: consecutive-failure counter + shutdown flag
pub struct RunHealth {
    max_consecutive_failures: u32,
    consecutive_failures: Mutex<u32>,
    shutdown: AtomicBool,
}

impl RunHealth {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            max_consecutive_failures,
            consecutive_failures: Mutex::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Records one session outcome
    ///
    /// A success resets the consecutive-failure counter; a failure increments
    /// it and trips shutdown once the counter exceeds the threshold.
    pub fn record_outcome(&self, success: bool) {
        let mut failures = self
            .consecutive_failures
            .lock()
            .expect("health lock poisoned");

        if self.should_stop() {
            return;
        }

        if success {
            *failures = 0;
        } else {
            *failures += 1;
            if *failures > self.max_consecutive_failures {
                tracing::warn!("maximum consecutive failures reached, shutting down workers");
                self.shutdown.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Whether workers should stop picking up new sessions
    pub fn should_stop(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Signals shutdown; returns true only for the call that tripped it
    pub fn trip(&self) -> bool {
        !self.shutdown.swap(true, Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn consecutive_failures(&self) -> u32 {
        *self
            .consecutive_failures
            .lock()
            .expect("health lock poisoned")
    }
}
