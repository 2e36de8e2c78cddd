//! Submission rate limiting
//!
//! Each user gets a fixed number of submissions per rolling window:
//! project reviews draw from a daily allowance, test generation and
//! grading from an hourly one. Counters live in shared maps injected
//! into the application state; a window resets lazily on the first
//! check after `reset_at` passes.

use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;

use crate::types::UltimaError;

/// Window for the daily project quota
pub const DAILY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Window for the hourly test limiter
pub const HOURLY_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy)]
struct QuotaWindow {
    count: u32,
    reset_at: i64,
}

/// Snapshot returned by a successful check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub used: u32,
    pub limit: u32,
    pub reset_at: i64,
}

impl QuotaStatus {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

/// Per-user rolling-window submission counter
pub struct RateLimiter {
    limit: u32,
    window_seconds: i64,
    counters: DashMap<String, QuotaWindow>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window_seconds: window.as_secs() as i64,
            counters: DashMap::new(),
        }
    }

    /// Limiter over a rolling 24 hour window
    pub fn daily(limit: u32) -> Self {
        Self::new(limit, DAILY_WINDOW)
    }

    /// Limiter over a rolling 60 minute window
    pub fn hourly(limit: u32) -> Self {
        Self::new(limit, HOURLY_WINDOW)
    }

    /// Consume one submission slot, or reject with the reset time.
    ///
    /// Rejection happens before any AI call or XP mutation; the counter
    /// is only advanced when a slot is granted.
    pub fn check_and_consume(&self, user_id: &str) -> Result<QuotaStatus, UltimaError> {
        self.check_and_consume_at(user_id, Utc::now().timestamp())
    }

    /// Current usage without consuming a slot
    pub fn status(&self, user_id: &str) -> QuotaStatus {
        self.status_at(user_id, Utc::now().timestamp())
    }

    fn check_and_consume_at(&self, user_id: &str, now: i64) -> Result<QuotaStatus, UltimaError> {
        let mut entry = self
            .counters
            .entry(user_id.to_string())
            .or_insert(QuotaWindow {
                count: 0,
                reset_at: now + self.window_seconds,
            });

        // Lazy reset once the window has passed
        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window_seconds;
        }

        if entry.count >= self.limit {
            return Err(UltimaError::RateLimited {
                reset_at: entry.reset_at,
            });
        }

        entry.count += 1;
        Ok(QuotaStatus {
            used: entry.count,
            limit: self.limit,
            reset_at: entry.reset_at,
        })
    }

    fn status_at(&self, user_id: &str, now: i64) -> QuotaStatus {
        match self.counters.get(user_id) {
            Some(entry) if now < entry.reset_at => QuotaStatus {
                used: entry.count,
                limit: self.limit,
                reset_at: entry.reset_at,
            },
            _ => QuotaStatus {
                used: 0,
                limit: self.limit,
                reset_at: now + self.window_seconds,
            },
        }
    }
}
