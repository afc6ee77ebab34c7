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


use spore::{EncodeError, ModelError, TransportError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("Self-weight must lie in [0, 1], got {0}")]
    InvalidSelfWeight(f64),
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to encode contribution: {0}")]
    Encode(#[from] EncodeError),

    #[error("Invalid store key '{0}'")]
    InvalidKey(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gave up after {failures} consecutive failed epochs, last error: {last}")]
    FaultBudgetExhausted { failures: u32, last: String },
}

impl AgentError {
    /// Whether the process should stop rather than retry the epoch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::FaultBudgetExhausted { .. })
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
