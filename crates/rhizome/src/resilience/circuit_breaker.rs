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


use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
            success_threshold: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("Circuit '{0}' is open - rejecting call")]
    Open(String),

    #[error("Circuit '{0}' half-open call limit exceeded")]
    HalfOpenLimitExceeded(String),

    #[error("Operation failed: {0}")]
    CallFailed(E),
}

/// Trips after consecutive failures of a remote dependency and rejects calls
/// until the recovery timeout has passed, then lets a few probe calls
/// through before closing again.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: RwLock<BreakerState>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    half_open_calls: AtomicU32,
    rejected_calls: AtomicU64,
    last_state_change: RwLock<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState::Closed),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            half_open_calls: AtomicU32::new(0),
            rejected_calls: AtomicU64::new(0),
            last_state_change: RwLock::new(Instant::now()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> BreakerState {
        *self.state.read().await
    }

    pub fn rejected_calls(&self) -> u64 {
        self.rejected_calls.load(Ordering::Relaxed)
    }

    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(rejection) = self.admit().await {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            return Err(rejection);
        }

        match operation().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(error) => {
                self.on_failure().await;
                Err(BreakerError::CallFailed(error))
            }
        }
    }

    async fn admit<E>(&self) -> Result<(), BreakerError<E>> {
        match self.state().await {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let since = *self.last_state_change.read().await;
                if since.elapsed() < self.config.recovery_timeout {
                    return Err(BreakerError::Open(self.name.clone()));
                }
                self.transition(BreakerState::HalfOpen).await;
                self.half_open_calls.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            BreakerState::HalfOpen => {
                let calls = self.half_open_calls.fetch_add(1, Ordering::Relaxed);
                if calls < self.config.half_open_max_calls {
                    Ok(())
                } else {
                    self.release_probe();
                    Err(BreakerError::HalfOpenLimitExceeded(self.name.clone()))
                }
            }
        }
    }

    async fn on_success(&self) {
        match self.state().await {
            BreakerState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
                self.release_probe();
                if successes >= self.config.success_threshold {
                    self.transition(BreakerState::Closed).await;
                }
            }
            BreakerState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            BreakerState::Open => {
                tracing::warn!(breaker = %self.name, "success reported while open");
            }
        }
    }

    fn release_probe(&self) {
        let _ = self
            .half_open_calls
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some(c.saturating_sub(1))
            });
    }

    async fn on_failure(&self) {
        match self.state().await {
            BreakerState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition(BreakerState::Open).await;
                }
            }
            BreakerState::HalfOpen => self.transition(BreakerState::Open).await,
            BreakerState::Open => {}
        }
    }

    async fn transition(&self, next: BreakerState) {
        let mut state = self.state.write().await;
        if *state == next {
            return;
        }
        match next {
            BreakerState::Open => {
                tracing::warn!(breaker = %self.name, "circuit transitioning to OPEN");
            }
            BreakerState::HalfOpen | BreakerState::Closed => {
                tracing::info!(breaker = %self.name, state = ?next, "circuit transitioning");
            }
        }
        *state = next;
        *self.last_state_change.write().await = Instant::now();
        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.half_open_calls.store(0, Ordering::Relaxed);
    }

    pub async fn force_open(&self) {
        self.transition(BreakerState::Open).await;
    }

    pub async fn force_closed(&self) {
        self.transition(BreakerState::Closed).await;
    }
}
