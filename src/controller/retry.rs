//! Per-object retry bookkeeping for the error policies.
//!
//! The kube runtime requeues whatever `error_policy` returns and never
//! gives up on its own. This tracker counts consecutive failures per object
//! key so the error policy can back off exponentially and drop a key once
//! it has failed `max_retries` times in a row.

use std::collections::HashMap;

use parking_lot::Mutex;

/// What the error policy should do after a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue; the value is the number of failures before this one.
    Retry(u32),
    /// The retry budget is spent; stop requeueing until the object changes.
    GiveUp,
}

/// Consecutive-failure counters keyed by object reference.
#[derive(Debug)]
pub struct RetryTracker {
    max_retries: u32,
    failures: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure for `key`.
    pub fn record_failure(&self, key: &str) -> RetryDecision {
        let mut failures = self.failures.lock();
        let previous = failures.get(key).copied().unwrap_or(0);
        if previous >= self.max_retries {
            failures.remove(key);
            return RetryDecision::GiveUp;
        }
        failures.insert(key.to_string(), previous + 1);
        RetryDecision::Retry(previous)
    }

    /// Forget failures for `key` after a successful reconcile.
    pub fn reset(&self, key: &str) {
        self.failures.lock().remove(key);
    }

    /// Failures currently recorded for `key`.
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }
}
