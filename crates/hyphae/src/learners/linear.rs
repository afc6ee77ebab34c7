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


use rand::{Rng, RngCore};
use spore::codec::python_float_repr;
use spore::{
    ContributionKind, FeedRequest, GradientVector, Learner, ModelError, ModelState,
    ShapeMismatch, Tensor, TrainOutcome,
};

pub const DEFAULT_FEATURES: usize = 3;
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
pub const BATCH_SIZE: usize = 10;

const WEIGHTS_KEY: &str = "weights";

/// Linear scorer trained on synthetic data: a row is labelled 1 when its
/// features sum to more than half the feature count.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLearner {
    weights: Vec<f64>,
    learning_rate: f64,
}

impl LinearLearner {
    pub fn new(weights: Vec<f64>, learning_rate: f64) -> Self {
        Self {
            weights,
            learning_rate,
        }
    }

    /// Weights drawn uniformly from `[0, 1)`.
    pub fn random<R: Rng + ?Sized>(features: usize, learning_rate: f64, rng: &mut R) -> Self {
        let weights = (0..features).map(|_| rng.gen::<f64>()).collect();
        Self::new(weights, learning_rate)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn check_length(&self, found: usize) -> Result<(), ModelError> {
        if found == self.weights.len() {
            Ok(())
        } else {
            Err(ShapeMismatch::Length {
                expected: self.weights.len(),
                found,
            }
            .into())
        }
    }
}

impl Learner for LinearLearner {
    fn name(&self) -> &str {
        "linear"
    }

    fn contribution_kind(&self) -> ContributionKind {
        ContributionKind::Gradient
    }

    fn predict(&self, _request: &FeedRequest) -> Result<String, ModelError> {
        let weights: Vec<String> = self.weights.iter().map(|w| python_float_repr(*w)).collect();
        Ok(format!("My test model is [{}]", weights.join(", ")))
    }

    fn state(&self) -> ModelState {
        let mut state = ModelState::new();
        state.insert(WEIGHTS_KEY, Tensor::vector(self.weights.clone()));
        state
    }

    fn set_state(&mut self, state: ModelState) -> Result<(), ModelError> {
        self.state().check_compatible(&state)?;
        if let Some(weights) = state.into_iter().find_map(|(k, t)| (k == WEIGHTS_KEY).then_some(t)) {
            self.weights = weights.into_data();
        }
        Ok(())
    }

    fn train_step(&mut self, rng: &mut dyn RngCore) -> Result<TrainOutcome, ModelError> {
        let features = self.weights.len();
        if features == 0 {
            return Err(ModelError::Training("model has no weights".into()));
        }
        let cutoff = features as f64 / 2.0;

        let mut gradient = vec![0.0; features];
        let mut squared_error = 0.0;
        for _ in 0..BATCH_SIZE {
            let row: Vec<f64> = (0..features).map(|_| rng.gen::<f64>()).collect();
            let label = if row.iter().sum::<f64>() > cutoff { 1.0 } else { 0.0 };
            let prediction: f64 = row.iter().zip(&self.weights).map(|(x, w)| x * w).sum();
            let residual = prediction - label;
            squared_error += residual * residual;
            for (g, x) in gradient.iter_mut().zip(&row) {
                *g += x * residual;
            }
        }

        Ok(TrainOutcome {
            loss: squared_error / BATCH_SIZE as f64,
            gradient: GradientVector::new(gradient),
        })
    }

    fn apply_gradient(&mut self, gradient: &GradientVector) -> Result<(), ModelError> {
        self.check_length(gradient.len())?;
        if gradient.as_slice().iter().any(|g| !g.is_finite()) {
            return Err(ModelError::Training("gradient contains non-finite values".into()));
        }
        for (w, g) in self.weights.iter_mut().zip(gradient.as_slice()) {
            *w -= self.learning_rate * g;
        }
        Ok(())
    }

    fn raw_parameters_mut(&mut self) -> Option<&mut [f64]> {
        Some(&mut self.weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn prediction_reports_weights() {
        let learner = LinearLearner::new(vec![0.5, 1.0, -0.25], 0.01);
        assert_eq!(
            learner.predict(&FeedRequest::from_text("babyfungus")).unwrap(),
            "My test model is [0.5, 1.0, -0.25]"
        );
    }

    #[test]
    fn gradient_step_moves_against_gradient() {
        let mut learner = LinearLearner::new(vec![1.0, 1.0], 0.1);
        learner
            .apply_gradient(&GradientVector::new(vec![2.0, -1.0]))
            .unwrap();
        assert!((learner.weights()[0] - 0.8).abs() < 1e-12);
        assert!((learner.weights()[1] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn wrong_gradient_length_is_rejected() {
        let mut learner = LinearLearner::new(vec![1.0, 1.0], 0.1);
        assert!(matches!(
            learner.apply_gradient(&GradientVector::new(vec![1.0])),
            Err(ModelError::State(ShapeMismatch::Length { expected: 2, found: 1 }))
        ));
    }

    #[test]
    fn training_reduces_loss_over_time() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut learner = LinearLearner::new(vec![2.0, 2.0, 2.0], 0.01);
        let first = learner.train_step(&mut rng).unwrap();
        let mut last = first.clone();
        for _ in 0..300 {
            last = learner.train_step(&mut rng).unwrap();
            learner.apply_gradient(&last.gradient).unwrap();
        }
        assert_eq!(first.gradient.len(), 3);
        assert!(last.loss < first.loss);
    }

    #[test]
    fn state_round_trips_through_set_state() {
        let mut learner = LinearLearner::new(vec![0.0; 3], 0.01);
        let source = LinearLearner::new(vec![0.1, 0.2, 0.3], 0.01);
        learner.set_state(source.state()).unwrap();
        assert_eq!(learner.weights(), source.weights());
        assert!(learner.set_state(ModelState::new()).is_err());
    }
}
