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


//! Coordination engine of a federated-learning agent.
//!
//! An agent reads a public feed to find training groups, trains its learner
//! together with the group through a shared knowledge store, answers requests
//! on the feed, and drifts its own parameters between epochs. Transports are
//! injected through the contracts in [`spore`].

pub mod agent;
pub mod aggregation;
pub mod config;
pub mod discovery;
pub mod error;
pub mod evolution;
pub mod feedback;
pub mod knowledge;
pub mod learners;
pub mod logging;
pub mod orchestrator;
pub mod supervisor;

pub use agent::Agent;
pub use aggregation::{Aggregated, Aggregator, SkippedContribution};
pub use config::{AgentConfig, ModelKind};
pub use discovery::{extract_locator, DiscoveryOutcome, PeerDiscovery};
pub use error::{AgentError, AgentResult, AggregationError, ConfigError};
pub use evolution::{EvolutionPolicy, EvolutionReport};
pub use feedback::{should_switch, FeedbackEvaluator, FeedbackRound};
pub use knowledge::KnowledgeStore;
pub use learners::{CatalogueLearner, LinearLearner};
pub use orchestrator::{EpochReport, Orchestrator, TrainingReport};
pub use supervisor::{FailureTracker, RetryPolicy};
