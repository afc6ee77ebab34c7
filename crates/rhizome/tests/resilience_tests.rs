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


use async_trait::async_trait;
use rhizome::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker, Guarded};
use spore::{FeedMessage, FeedTransport, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{sleep, Duration};

#[derive(Debug, thiserror::Error)]
#[error("Test error: {message}")]
struct TestError {
    message: String,
}

impl TestError {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[tokio::test]
async fn closed_breaker_passes_results_through() {
    let breaker = CircuitBreaker::new("test", BreakerConfig::default());

    let result = breaker.call(|| async { Ok::<i32, TestError>(42) }).await;
    assert_eq!(result.unwrap(), 42);
    assert_eq!(breaker.state().await, BreakerState::Closed);
}

#[tokio::test]
async fn opens_after_consecutive_failures() {
    let config = BreakerConfig {
        failure_threshold: 2,
        ..Default::default()
    };
    let breaker = CircuitBreaker::new("test", config);

    let _ = breaker
        .call(|| async { Err::<i32, TestError>(TestError::new("error")) })
        .await;
    assert_eq!(breaker.state().await, BreakerState::Closed);

    let _ = breaker
        .call(|| async { Err::<i32, TestError>(TestError::new("error")) })
        .await;
    assert_eq!(breaker.state().await, BreakerState::Open);

    let result = breaker.call(|| async { Ok::<i32, TestError>(42) }).await;
    assert!(matches!(result, Err(BreakerError::Open(_))));
    assert_eq!(breaker.rejected_calls(), 1);
}

#[tokio::test]
async fn success_resets_failure_streak() {
    let config = BreakerConfig {
        failure_threshold: 2,
        ..Default::default()
    };
    let breaker = CircuitBreaker::new("test", config);

    let _ = breaker
        .call(|| async { Err::<i32, TestError>(TestError::new("error")) })
        .await;
    let _ = breaker.call(|| async { Ok::<i32, TestError>(1) }).await;
    let _ = breaker
        .call(|| async { Err::<i32, TestError>(TestError::new("error")) })
        .await;
    assert_eq!(breaker.state().await, BreakerState::Closed);
}

#[tokio::test]
async fn half_open_probe_closes_on_success() {
    let config = BreakerConfig {
        failure_threshold: 1,
        recovery_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let breaker = CircuitBreaker::new("test", config);

    let _ = breaker
        .call(|| async { Err::<i32, TestError>(TestError::new("error")) })
        .await;
    assert_eq!(breaker.state().await, BreakerState::Open);

    sleep(Duration::from_millis(150)).await;

    let result = breaker.call(|| async { Ok::<i32, TestError>(42) }).await;
    assert!(result.is_ok());
    assert_eq!(breaker.state().await, BreakerState::Closed);
}

#[tokio::test]
async fn half_open_probe_reopens_on_failure() {
    let config = BreakerConfig {
        failure_threshold: 1,
        recovery_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let breaker = CircuitBreaker::new("test", config);

    let _ = breaker
        .call(|| async { Err::<i32, TestError>(TestError::new("error")) })
        .await;
    sleep(Duration::from_millis(80)).await;
    let _ = breaker
        .call(|| async { Err::<i32, TestError>(TestError::new("still down")) })
        .await;
    assert_eq!(breaker.state().await, BreakerState::Open);
}

#[derive(Default)]
struct FlakyFeed {
    calls: AtomicUsize,
}

#[async_trait]
impl FeedTransport for FlakyFeed {
    async fn fetch_latest(
        &self,
        _tag: &str,
        _limit: usize,
    ) -> Result<Vec<FeedMessage>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Request("connection refused".into()))
    }

    async fn post(&self, _text: &str) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reply(&self, _id: &str, _author: &str, _text: &str) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn guarded_transport_stops_calling_a_dead_feed() {
    let config = BreakerConfig {
        failure_threshold: 2,
        recovery_timeout: Duration::from_secs(60),
        ..Default::default()
    };
    let feed = Guarded::new("feed", FlakyFeed::default(), config);

    for _ in 0..2 {
        let err = feed.fetch_latest("nutrial", 30).await.unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
    let err = feed.post("hello").await.unwrap_err();
    assert!(matches!(err, TransportError::Unavailable(_)));
    assert_eq!(feed.inner().calls.load(Ordering::SeqCst), 2);
}
