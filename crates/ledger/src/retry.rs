// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Explicit retry state for the claim-sync loop: attempt counter plus the
/// next linear-backoff delay. Modeled as data instead of nested timeouts
/// so cancellation and tests stay simple.
#[derive(Clone, Debug)]
pub struct RetrySchedule {
    max_attempts: u32,
    attempts_made: u32,
    next_delay: Duration,
    step: Duration,
}

impl RetrySchedule {
    pub fn new(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts,
            attempts_made: 0,
            next_delay: step,
            step,
        }
    }

    /// Records a failed attempt. Returns the delay to wait before the
    /// next try, or `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts_made += 1;
        if self.attempts_made >= self.max_attempts {
            return None;
        }
        let delay = self.next_delay;
        self.next_delay += self.step;
        Some(delay)
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_linearly_until_exhausted() {
        let mut schedule = RetrySchedule::new(4, Duration::from_secs(2));

        assert_eq!(schedule.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_secs(4)));
        assert_eq!(schedule.next_delay(), Some(Duration::from_secs(6)));
        assert_eq!(schedule.next_delay(), None);
        assert_eq!(schedule.attempts_made(), 4);
    }

    #[test]
    fn single_attempt_budget_never_waits() {
        let mut schedule = RetrySchedule::new(1, Duration::from_secs(2));
        assert_eq!(schedule.next_delay(), None);
        assert_eq!(schedule.attempts_made(), 1);
    }
}
