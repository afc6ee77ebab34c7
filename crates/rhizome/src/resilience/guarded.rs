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


use super::circuit_breaker::{BreakerConfig, BreakerError, CircuitBreaker};
use async_trait::async_trait;
use spore::{Binding, FeedMessage, FeedTransport, StoreTransport, TransportError};

/// Transport decorator that routes every call through a [`CircuitBreaker`].
#[derive(Debug)]
pub struct Guarded<T> {
    inner: T,
    breaker: CircuitBreaker,
}

impl<T> Guarded<T> {
    pub fn new(name: impl Into<String>, inner: T, config: BreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(name, config),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

fn flatten(error: BreakerError<TransportError>) -> TransportError {
    match error {
        BreakerError::CallFailed(inner) => inner,
        rejected => TransportError::Unavailable(rejected.to_string()),
    }
}

#[async_trait]
impl<T: FeedTransport> FeedTransport for Guarded<T> {
    async fn fetch_latest(
        &self,
        tag: &str,
        limit: usize,
    ) -> Result<Vec<FeedMessage>, TransportError> {
        self.breaker
            .call(|| self.inner.fetch_latest(tag, limit))
            .await
            .map_err(flatten)
    }

    async fn post(&self, text: &str) -> Result<(), TransportError> {
        self.breaker
            .call(|| self.inner.post(text))
            .await
            .map_err(flatten)
    }

    async fn reply(
        &self,
        message_id: &str,
        author: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        self.breaker
            .call(|| self.inner.reply(message_id, author, text))
            .await
            .map_err(flatten)
    }
}

#[async_trait]
impl<T: StoreTransport> StoreTransport for Guarded<T> {
    async fn update(&self, partition: &str, statement: &str) -> Result<(), TransportError> {
        self.breaker
            .call(|| self.inner.update(partition, statement))
            .await
            .map_err(flatten)
    }

    async fn select(&self, partition: &str, query: &str) -> Result<Vec<Binding>, TransportError> {
        self.breaker
            .call(|| self.inner.select(partition, query))
            .await
            .map_err(flatten)
    }
}
