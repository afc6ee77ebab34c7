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


//! Random drift applied at the end of every epoch: occasionally rescale the
//! feedback threshold, and occasionally jitter the learner's raw parameters.

use crate::agent::Agent;
use crate::error::ConfigError;
use crate::logging::{log_parameter_mutation, log_threshold_mutation};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use spore::Learner;
use std::ops::RangeInclusive;

pub const DEFAULT_MUTATION_CHANCE: f64 = 0.1;
pub const DEFAULT_PARAMETER_SIGMA: f64 = 0.1;
pub const THRESHOLD_FACTOR: RangeInclusive<f64> = 0.9..=1.1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvolutionReport {
    /// `(before, after)` when the threshold was rescaled.
    pub threshold: Option<(f64, f64)>,
    pub parameters_mutated: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EvolutionPolicy {
    mutation_chance: f64,
    noise: Normal<f64>,
}

impl Default for EvolutionPolicy {
    fn default() -> Self {
        Self {
            mutation_chance: DEFAULT_MUTATION_CHANCE,
            noise: Normal::new(0.0, DEFAULT_PARAMETER_SIGMA)
                .expect("default sigma is positive"),
        }
    }
}

impl EvolutionPolicy {
    pub fn new(mutation_chance: f64, parameter_sigma: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&mutation_chance) {
            return Err(ConfigError::invalid(
                "FUNGUS_MUTATION_CHANCE",
                format!("{mutation_chance} is outside [0, 1]"),
            ));
        }
        let noise = Normal::new(0.0, parameter_sigma)
            .map_err(|e| ConfigError::invalid("parameter_sigma", e.to_string()))?;
        Ok(Self {
            mutation_chance,
            noise,
        })
    }

    pub fn mutation_chance(&self) -> f64 {
        self.mutation_chance
    }

    /// Makes two independent draws against the mutation chance, one for the
    /// threshold and one for the parameters.
    pub fn evolve(&self, agent: &mut Agent, learner: &mut dyn Learner) -> EvolutionReport {
        let mut report = EvolutionReport::default();

        if agent.rng().gen::<f64>() < self.mutation_chance {
            let factor = agent.rng().gen_range(THRESHOLD_FACTOR);
            let before = agent.feedback_threshold();
            let after = before * factor;
            agent.set_feedback_threshold(after);
            log_threshold_mutation(before, after);
            report.threshold = Some((before, after));
        }

        if agent.rng().gen::<f64>() < self.mutation_chance {
            if let Some(parameters) = learner.raw_parameters_mut() {
                let rng = agent.rng();
                let mut drift = 0.0;
                for parameter in parameters.iter_mut() {
                    let delta = self.noise.sample(rng);
                    *parameter += delta;
                    drift += delta.abs();
                }
                log_parameter_mutation(parameters.len(), drift);
                report.parameters_mutated = true;
            }
        }

        report
    }
}
