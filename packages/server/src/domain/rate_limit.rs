//! Ephemeral, process-local rate limiting state.
//!
//! - [`TokenBucket`]: per-connection message budget over a fixed window
//! - [`LoginAttemptTracker`]: per-identity failed-login counter with lockout

use std::collections::HashMap;

/// Fixed-window message budget (`points` per `duration_millis`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucket {
    points: u32,
    duration_millis: i64,
    remaining: u32,
    window_start: i64,
}

impl TokenBucket {
    pub fn new(points: u32, duration_millis: i64, now: i64) -> Self {
        Self {
            points,
            duration_millis,
            remaining: points,
            window_start: now,
        }
    }

    /// Spend one point. On exhaustion returns the milliseconds until the
    /// window resets.
    pub fn try_consume(&mut self, now: i64) -> Result<(), u64> {
        if now - self.window_start >= self.duration_millis {
            self.window_start = now;
            self.remaining = self.points;
        }
        if self.remaining == 0 {
            let retry_after = self.window_start + self.duration_millis - now;
            return Err(retry_after.max(0) as u64);
        }
        self.remaining -= 1;
        Ok(())
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttemptRecord {
    failures: u32,
    first_failure_at: i64,
    locked_until: Option<i64>,
}

/// Failed login counter keyed by identity (normalized email).
///
/// Reaching `max_attempts` failures starts a lockout of `lockout_millis`.
/// Failures older than the lockout window are forgotten.
#[derive(Debug, Clone)]
pub struct LoginAttemptTracker {
    max_attempts: u32,
    lockout_millis: i64,
    records: HashMap<String, AttemptRecord>,
}

impl LoginAttemptTracker {
    pub fn new(max_attempts: u32, lockout_millis: i64) -> Self {
        Self {
            max_attempts,
            lockout_millis,
            records: HashMap::new(),
        }
    }

    /// `Err(remaining_millis)` while the identity is locked out
    pub fn check(&mut self, key: &str, now: i64) -> Result<(), u64> {
        let Some(record) = self.records.get(key).copied() else {
            return Ok(());
        };
        match record.locked_until {
            Some(until) if now < until => Err((until - now) as u64),
            Some(_) => {
                self.records.remove(key);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Count one failure; returns the failure count inside the current window
    pub fn record_failure(&mut self, key: &str, now: i64) -> u32 {
        let lockout_millis = self.lockout_millis;
        let max_attempts = self.max_attempts;
        let record = self
            .records
            .entry(key.to_string())
            .or_insert(AttemptRecord {
                failures: 0,
                first_failure_at: now,
                locked_until: None,
            });

        let lock_expired = record.locked_until.is_some_and(|until| now >= until);
        let window_expired =
            record.locked_until.is_none() && now - record.first_failure_at >= lockout_millis;
        if lock_expired || window_expired {
            *record = AttemptRecord {
                failures: 0,
                first_failure_at: now,
                locked_until: None,
            };
        }

        record.failures += 1;
        if record.failures >= max_attempts && record.locked_until.is_none() {
            record.locked_until = Some(now + lockout_millis);
        }
        record.failures
    }

    /// Check the lockout and count this attempt as a failure in one step.
    ///
    /// Returns the failure count including this attempt, or
    /// `Err(remaining_millis)` while locked. A login that turns out to be
    /// correct calls [`clear`](Self::clear) afterwards.
    pub fn reserve(&mut self, key: &str, now: i64) -> Result<u32, u64> {
        self.check(key, now)?;
        Ok(self.record_failure(key, now))
    }

    pub fn clear(&mut self, key: &str) {
        self.records.remove(key);
    }

    /// Drop records whose window or lockout has passed
    pub fn purge_expired(&mut self, now: i64) {
        let lockout_millis = self.lockout_millis;
        self.records.retain(|_, record| match record.locked_until {
            Some(until) => now < until,
            None => now - record.first_failure_at < lockout_millis,
        });
    }
}
