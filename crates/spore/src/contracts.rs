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


use crate::error::{ModelError, TransportError};
use crate::types::{FeedMessage, FeedRequest, GradientVector, ModelState};
use async_trait::async_trait;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;

/// Short-message feed the agent discovers peers and answers requests on.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn fetch_latest(&self, tag: &str, limit: usize)
        -> Result<Vec<FeedMessage>, TransportError>;
    async fn post(&self, text: &str) -> Result<(), TransportError>;
    async fn reply(&self, message_id: &str, author: &str, text: &str)
        -> Result<(), TransportError>;
}

/// One row of a SELECT result: variable name to lexical value.
pub type Binding = HashMap<String, String>;

/// Triple-store style backend. `partition` is a dataset name or an absolute
/// dataset URL.
#[async_trait]
pub trait StoreTransport: Send + Sync {
    async fn update(&self, partition: &str, statement: &str) -> Result<(), TransportError>;
    async fn select(&self, partition: &str, query: &str) -> Result<Vec<Binding>, TransportError>;
}

#[async_trait]
impl<T: FeedTransport + ?Sized> FeedTransport for Arc<T> {
    async fn fetch_latest(
        &self,
        tag: &str,
        limit: usize,
    ) -> Result<Vec<FeedMessage>, TransportError> {
        (**self).fetch_latest(tag, limit).await
    }

    async fn post(&self, text: &str) -> Result<(), TransportError> {
        (**self).post(text).await
    }

    async fn reply(
        &self,
        message_id: &str,
        author: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        (**self).reply(message_id, author, text).await
    }
}

#[async_trait]
impl<T: StoreTransport + ?Sized> StoreTransport for Arc<T> {
    async fn update(&self, partition: &str, statement: &str) -> Result<(), TransportError> {
        (**self).update(partition, statement).await
    }

    async fn select(&self, partition: &str, query: &str) -> Result<Vec<Binding>, TransportError> {
        (**self).select(partition, query).await
    }
}

/// Which kind of contribution a learner exchanges with its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionKind {
    Gradient,
    State,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
    pub loss: f64,
    pub gradient: GradientVector,
}

/// Any gradient-based model the agent can train, share and query.
///
/// `train_step` only computes a gradient on a fresh batch; the orchestrator
/// decides whether it is applied directly or after aggregation.
pub trait Learner: Send + Sync {
    fn name(&self) -> &str;
    fn contribution_kind(&self) -> ContributionKind;
    fn predict(&self, request: &FeedRequest) -> Result<String, ModelError>;
    fn state(&self) -> ModelState;
    fn set_state(&mut self, state: ModelState) -> Result<(), ModelError>;
    fn train_step(&mut self, rng: &mut dyn RngCore) -> Result<TrainOutcome, ModelError>;
    fn apply_gradient(&mut self, gradient: &GradientVector) -> Result<(), ModelError>;

    /// Raw parameter vector, for learners that have one.
    fn raw_parameters_mut(&mut self) -> Option<&mut [f64]> {
        None
    }
}
