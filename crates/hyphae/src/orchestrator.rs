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


//! The epoch loop: discover, train with the group, answer the feed, decide
//! whether to move on, drift.

use crate::agent::Agent;
use crate::aggregation::{Aggregator, SkippedContribution};
use crate::config::AgentConfig;
use crate::discovery::{DiscoveryOutcome, PeerDiscovery};
use crate::error::{AgentError, AgentResult};
use crate::evolution::{EvolutionPolicy, EvolutionReport, DEFAULT_PARAMETER_SIGMA};
use crate::feedback::{should_switch, FeedbackEvaluator, FeedbackRound};
use crate::knowledge::KnowledgeStore;
use crate::learners;
use crate::logging::{log_epoch_failure, log_epoch_report, log_epoch_start};
use crate::supervisor::{FailureTracker, RetryPolicy};
use rand::rngs::StdRng;
use rand::SeedableRng;
use spore::{ContributionKind, FeedTransport, GroupLink, Learner, StoreTransport};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub kind: ContributionKind,
    pub loss: f64,
    pub merged: Vec<String>,
    pub skipped: Vec<SkippedContribution>,
}

/// Everything that happened in one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: u64,
    pub searched: bool,
    pub discovery: Option<DiscoveryOutcome>,
    pub group_link: Option<GroupLink>,
    pub training: Option<TrainingReport>,
    pub feedback: FeedbackRound,
    pub switch_team: bool,
    pub evolution: EvolutionReport,
}

pub struct Orchestrator<F, S> {
    agent: Agent,
    feed: F,
    store: KnowledgeStore<S>,
    learner: Box<dyn Learner>,
    discovery: PeerDiscovery,
    aggregator: Aggregator,
    feedback: FeedbackEvaluator,
    evolution: EvolutionPolicy,
    policy: RetryPolicy,
    advertise_group: bool,
    announce_updates: bool,
    advertised: Option<GroupLink>,
}

impl<F, S> Orchestrator<F, S>
where
    F: FeedTransport,
    S: StoreTransport,
{
    pub fn new(
        agent: Agent,
        feed: F,
        store: KnowledgeStore<S>,
        learner: Box<dyn Learner>,
    ) -> Self {
        let discovery = PeerDiscovery::new(vec![agent.active_tag().to_string()]);
        Self {
            agent,
            feed,
            store,
            learner,
            discovery,
            aggregator: Aggregator::default(),
            feedback: FeedbackEvaluator::default(),
            evolution: EvolutionPolicy::default(),
            policy: RetryPolicy::default(),
            advertise_group: false,
            announce_updates: false,
            advertised: None,
        }
    }

    /// Wires an orchestrator from configuration and the two transports.
    pub fn from_config(config: &AgentConfig, feed: F, store: S) -> AgentResult<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let learner = learners::build(config.model, &mut rng);

        let mut agent = Agent::new(
            config.agent_name.clone(),
            config.primary_tag(),
            config.feedback_threshold,
            rng,
        );
        if let Some(handle) = &config.agent_handle {
            agent = agent.with_handle(handle.clone());
        }

        Ok(Self::new(
            agent,
            feed,
            KnowledgeStore::new(store, config.store_dataset.clone()),
            learner,
        )
        .with_discovery(
            PeerDiscovery::new(config.discovery_tags.clone()).with_marker(config.join_marker.clone()),
        )
        .with_aggregator(Aggregator::new(config.self_weight)?)
        .with_feedback(FeedbackEvaluator::new(config.trigger.clone()))
        .with_evolution(EvolutionPolicy::new(
            config.mutation_chance,
            DEFAULT_PARAMETER_SIGMA,
        )?)
        .with_retry_policy(config.retry.clone())
        .with_group_advertising(config.advertise_group)
        .with_update_posts(config.announce_updates))
    }

    #[must_use]
    pub fn with_discovery(mut self, discovery: PeerDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    #[must_use]
    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: FeedbackEvaluator) -> Self {
        self.feedback = feedback;
        self
    }

    #[must_use]
    pub fn with_evolution(mut self, evolution: EvolutionPolicy) -> Self {
        self.evolution = evolution;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_group_advertising(mut self, enabled: bool) -> Self {
        self.advertise_group = enabled;
        self
    }

    /// Posts a short status line to the feed after each published
    /// contribution.
    #[must_use]
    pub fn with_update_posts(mut self, enabled: bool) -> Self {
        self.announce_updates = enabled;
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn learner(&self) -> &dyn Learner {
        self.learner.as_ref()
    }

    pub fn store(&self) -> &KnowledgeStore<S> {
        &self.store
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Runs a single epoch. Any transport, codec or model failure aborts the
    /// epoch; state already written by earlier steps is kept.
    pub async fn run_epoch(&mut self) -> AgentResult<EpochReport> {
        let epoch = self.agent.epoch();

        let searched = self.agent.switch_team() || !self.agent.joined_group();
        let mut discovery = None;
        if searched {
            let outcome = self.discovery.search(&self.feed, &mut self.agent).await?;
            let link = outcome.link().cloned();
            if link.is_some() {
                self.agent.set_joined_group(true);
            }
            self.agent.set_group_link(link);
            discovery = Some(outcome);
        }

        let group_link = self.agent.group_link().cloned();
        let training = match &group_link {
            Some(link) => Some(self.train_with_group(link).await?),
            None => {
                debug!(epoch = epoch, "No training group, skipping training");
                None
            }
        };

        let feedback = self
            .feedback
            .evaluate(&self.feed, &mut self.agent, self.learner.as_ref())
            .await?;

        let switch_team = should_switch(feedback.score, self.agent.feedback_threshold());
        self.agent.set_switch_team(switch_team);
        if switch_team {
            info!(
                score = feedback.score.value(),
                threshold = self.agent.feedback_threshold(),
                "Feedback below threshold, will look for another group"
            );
        }

        let evolution = self.evolution.evolve(&mut self.agent, self.learner.as_mut());

        Ok(EpochReport {
            epoch,
            searched,
            discovery,
            group_link,
            training,
            feedback,
            switch_team,
            evolution,
        })
    }

    async fn train_with_group(&mut self, link: &GroupLink) -> AgentResult<TrainingReport> {
        self.store.bind(Some(link));
        let kind = self.learner.contribution_kind();
        let own = self.agent.name().to_string();

        let report = match kind {
            ContributionKind::Gradient => {
                let peers: Vec<_> = self
                    .store
                    .get_gradients(Some(own.as_str()))
                    .await?
                    .into_iter()
                    .filter(|c| c.source != own)
                    .collect();
                let outcome = self.learner.train_step(self.agent.rng())?;
                let aggregated = self.aggregator.aggregate_gradients(&outcome.gradient, &peers);
                self.learner.apply_gradient(&aggregated.value)?;
                self.store.put_gradient(&own, &aggregated.value).await?;
                TrainingReport {
                    kind,
                    loss: outcome.loss,
                    merged: aggregated.merged,
                    skipped: aggregated.skipped,
                }
            }
            ContributionKind::State => {
                let peers: Vec<_> = self
                    .store
                    .get_model_states(link, Some(own.as_str()))
                    .await?
                    .into_iter()
                    .filter(|c| c.source != own)
                    .collect();
                let outcome = self.learner.train_step(self.agent.rng())?;
                self.learner.apply_gradient(&outcome.gradient)?;
                let aggregated = self.aggregator.aggregate_states(&self.learner.state(), &peers);
                self.learner.set_state(aggregated.value.clone())?;
                self.store.put_model_state(&own, &aggregated.value).await?;
                TrainingReport {
                    kind,
                    loss: outcome.loss,
                    merged: aggregated.merged,
                    skipped: aggregated.skipped,
                }
            }
        };

        if self.announce_updates {
            self.feed.post(&self.update_post(&report)).await?;
            debug!(loss = report.loss, "Announced model update");
        }

        if self.advertise_group && self.advertised.as_ref() != Some(link) {
            self.discovery
                .advertise(&self.feed, &self.agent, link)
                .await?;
            self.advertised = Some(link.clone());
        }

        Ok(report)
    }

    fn update_post(&self, report: &TrainingReport) -> String {
        format!(
            "Training complete. Updated model: {} (loss {:.4}, {} peers merged) #{}",
            self.learner.name(),
            report.loss,
            report.merged.len(),
            self.agent.active_tag()
        )
    }

    /// Runs epochs until the fault budget, if any, is exhausted. Never
    /// returns `Ok`.
    pub async fn run(&mut self) -> AgentResult<()> {
        let mut failures = FailureTracker::default();
        info!(
            agent = self.agent.name(),
            learner = self.learner.name(),
            tags = ?self.discovery.tags(),
            "Agent starting"
        );
        loop {
            let epoch = self.agent.epoch();
            log_epoch_start(
                epoch,
                self.agent.active_tag(),
                self.agent.switch_team(),
                self.agent.joined_group(),
            );
            match self.run_epoch().await {
                Ok(report) => {
                    failures.record_success();
                    log_epoch_report(&report);
                    tokio::time::sleep(self.policy.epoch_interval).await;
                    self.agent.advance_epoch();
                }
                Err(error) => {
                    let streak = failures.record_failure();
                    let delay = self.policy.backoff_for(streak);
                    log_epoch_failure(epoch, streak, &error, delay);
                    if error.is_fatal() {
                        return Err(error);
                    }
                    if self.policy.budget_exhausted(streak) {
                        return Err(AgentError::FaultBudgetExhausted {
                            failures: streak,
                            last: error.to_string(),
                        });
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
