// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.


use std::time::Duration;

/// Pacing of the epoch loop and how it backs off after failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Pause after a successful epoch.
    pub epoch_interval: Duration,
    /// Pause after the first failed epoch in a row.
    pub error_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Give up after this many failed epochs in a row. `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            epoch_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(900),
            multiplier: 2.0,
            max_consecutive_failures: None,
        }
    }
}

impl RetryPolicy {
    /// Delay after `consecutive_failures` failed epochs (counting the one
    /// that just failed).
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        let exponent = i32::try_from(consecutive_failures.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let seconds = self.error_backoff.as_secs_f64() * factor;
        let ceiling = self.max_backoff.max(self.error_backoff);
        let capped = seconds.min(ceiling.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(ceiling)
    }

    pub fn budget_exhausted(&self, consecutive_failures: u32) -> bool {
        self.max_consecutive_failures
            .is_some_and(|max| consecutive_failures >= max)
    }
}

/// Counts failed epochs in a row.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive: u32,
}

impl FailureTracker {
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Returns the streak length including this failure.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
