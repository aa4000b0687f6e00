use chrono::{DateTime, Duration, Utc};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use crate::{clock::Clock, error::DeliveryError};

/// Sliding-window limiter for OTP sends, keyed by order id.
///
/// State is process-local; a restart forgets every window.
#[derive(Debug)]
pub struct ResendLimiter {
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    attempts: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl ResendLimiter {
    pub fn new(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            clock,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn prune(entries: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
        while entries.front().is_some_and(|at| *at <= cutoff) {
            entries.pop_front();
        }
    }

    /// Prunes every key and drops the ones whose window has emptied.
    fn sweep(attempts: &mut HashMap<String, VecDeque<DateTime<Utc>>>, cutoff: DateTime<Utc>) {
        attempts.retain(|_, entries| {
            Self::prune(entries, cutoff);
            !entries.is_empty()
        });
    }

    pub fn try_acquire(&self, key: &str) -> Result<(), DeliveryError> {
        let now = self.clock.now();
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        Self::sweep(&mut attempts, now - self.window);
        let entries = attempts.entry(key.to_string()).or_default();

        if entries.len() >= self.limit {
            let oldest = entries.front().copied().unwrap_or(now);
            let wait = (oldest + self.window - now).num_milliseconds().max(0);
            let retry_after_secs = ((wait + 999) / 1000).max(1) as u64;
            return Err(DeliveryError::RateLimited { retry_after_secs });
        }
        entries.push_back(now);
        Ok(())
    }

    pub fn remaining(&self, key: &str) -> usize {
        let now = self.clock.now();
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        Self::sweep(&mut attempts, now - self.window);
        attempts
            .get(key)
            .map_or(self.limit, |entries| self.limit.saturating_sub(entries.len()))
    }

    /// Orders with at least one send inside the current window.
    pub fn tracked_orders(&self) -> usize {
        let now = self.clock.now();
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        Self::sweep(&mut attempts, now - self.window);
        attempts.len()
    }

    pub fn forget(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}
