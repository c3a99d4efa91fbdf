// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff bookkeeping for the change-feed reconnect loop.
//! The loop only ever asks "how long until I may connect again"; nothing
//! here sleeps on its own.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    failed_count: u32,
    next_attempt_at: Instant,
}

impl ReconnectBackoff {
    /// Marks a healthy connection, resetting counters and clearing any
    /// pending delay.
    pub fn ok(&mut self) {
        self.failed_count = 0;
        self.next_attempt_at = Instant::now();
    }

    /// Marks a failed connection attempt, growing the delay exponentially
    /// up to 30 seconds.
    pub fn fail(&mut self) {
        let delay = (Duration::from_millis(250) * 2u32.saturating_pow(self.failed_count))
            .min(Duration::from_secs(30));
        self.next_attempt_at = Instant::now() + delay;
        self.failed_count += 1;
    }

    /// Returns the remaining delay, if the caller should keep waiting.
    pub fn remaining(&self) -> Option<Duration> {
        self.next_attempt_at
            .checked_duration_since(Instant::now())
            .filter(|remaining| !remaining.is_zero())
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            failed_count: 0,
            next_attempt_at: Instant::now(),
        }
    }
}
