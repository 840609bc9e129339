// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport retry schedule: exponential backoff with optional jitter.

use std::time::Duration;
use sw_config::RetryConfig;

/// Computes per-attempt delays: `min(base * exp_base^attempt, max)`,
/// multiplied by a uniform factor in [0.5, 1.0) when jitter is enabled.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay before the retry following `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.config.exponential_base.powi(attempt as i32);
        let mut delay = (self.config.base_delay * exp).min(self.config.max_delay);
        if self.config.jitter {
            delay *= 0.5 + fastrand::f64() * 0.5;
        }
        Duration::from_secs_f64(delay.max(0.0))
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
