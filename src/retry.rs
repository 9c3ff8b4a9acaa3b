// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Exponential backoff for retried HTTP calls.
//!
//! Used by the webhook provider while negotiating with the webhook server.
//! Transient statuses (429, 5xx) and transport errors are retried; any other
//! failure is returned immediately.

use reqwest::StatusCode;
use std::time::Duration;

/// Maximum interval between retries (10 seconds)
const MAX_INTERVAL_SECS: u64 = 10;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: u32 = 2;

/// Exponential backoff over a bounded number of attempts.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    /// Interval returned by the next call to [`next_backoff`](Self::next_backoff)
    pub current_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Retries left before giving up
    pub remaining: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial_interval: Duration, max_interval: Duration, max_retries: u32) -> Self {
        Self {
            current_interval: initial_interval,
            max_interval,
            remaining: max_retries,
        }
    }

    /// Get the next backoff interval, or None once every retry is used.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let interval = self.current_interval;
        self.current_interval = (interval * BACKOFF_MULTIPLIER).min(self.max_interval);
        Some(interval)
    }
}

/// Backoff used for webhook negotiation.
///
/// Starts at `initial`, doubles each time up to 10 seconds, and allows
/// `max_retries` retries after the first attempt.
#[must_use]
pub fn webhook_backoff(initial: Duration, max_retries: u32) -> ExponentialBackoff {
    ExponentialBackoff::new(
        initial,
        Duration::from_secs(MAX_INTERVAL_SECS),
        max_retries,
    )
}

/// Determine if an HTTP status code is retryable.
///
/// 429 and every 5xx status are transient.
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
