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
use spore::{
    ContributionKind, FeedRequest, GradientVector, Learner, ModelError, ModelState,
    ShapeMismatch, Tensor, TrainOutcome,
};
use std::cmp::Ordering;

pub const FALLBACK_TITLE: &str = "Blinding Lights";
pub const DEFAULT_TOP_N: usize = 5;
pub const MAX_TOP_N: usize = 10;
pub const DEFAULT_LEARNING_RATE: f64 = 0.05;

const WEIGHT_KEY: &str = "scorer.weight";
const BIAS_KEY: &str = "scorer.bias";

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueItem {
    pub title: String,
    pub features: Vec<f64>,
    pub rating: f64,
}

impl CatalogueItem {
    pub fn new(title: impl Into<String>, features: Vec<f64>, rating: f64) -> Self {
        Self {
            title: title.into(),
            features,
            rating,
        }
    }
}

/// Song recommender: a linear scorer over item features, regressed onto
/// listener ratings. Its state is shared as named tensors.
///
/// Gradients are flattened in state key order, bias first.
#[derive(Debug, Clone)]
pub struct CatalogueLearner {
    items: Vec<CatalogueItem>,
    weight: Vec<f64>,
    bias: f64,
    learning_rate: f64,
}

impl CatalogueLearner {
    pub fn new(items: Vec<CatalogueItem>, weight: Vec<f64>, bias: f64, learning_rate: f64) -> Self {
        Self {
            items,
            weight,
            bias,
            learning_rate,
        }
    }

    /// The bundled catalogue with small random initial weights.
    pub fn with_default_catalogue<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let items = default_catalogue();
        let features = items.first().map_or(0, |item| item.features.len());
        let weight = (0..features).map(|_| rng.gen_range(-0.1..0.1)).collect();
        Self::new(items, weight, 0.0, DEFAULT_LEARNING_RATE)
    }

    pub fn items(&self) -> &[CatalogueItem] {
        &self.items
    }

    pub fn score(&self, item: &CatalogueItem) -> f64 {
        self.bias
            + item
                .features
                .iter()
                .zip(&self.weight)
                .map(|(x, w)| x * w)
                .sum::<f64>()
    }

    /// The catalogue title mentioned in `text`, preferring the longest match.
    pub fn find_title(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.items
            .iter()
            .filter(|item| haystack.contains(&item.title.to_lowercase()))
            .max_by_key(|item| item.title.len())
            .map(|item| item.title.as_str())
    }

    /// The `top_n` highest scoring titles other than `seed`.
    pub fn recommend(&self, seed: &str, top_n: usize) -> Vec<&str> {
        let mut ranked: Vec<(&CatalogueItem, f64)> = self
            .items
            .iter()
            .filter(|item| !item.title.eq_ignore_ascii_case(seed))
            .map(|item| (item, self.score(item)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked
            .into_iter()
            .take(top_n)
            .map(|(item, _)| item.title.as_str())
            .collect()
    }

    fn write_parameters(&mut self, gradient: &[f64]) {
        if let Some((bias, weights)) = gradient.split_first() {
            self.bias -= self.learning_rate * bias;
            for (w, g) in self.weight.iter_mut().zip(weights) {
                *w -= self.learning_rate * g;
            }
        }
    }
}

impl Learner for CatalogueLearner {
    fn name(&self) -> &str {
        "catalogue"
    }

    fn contribution_kind(&self) -> ContributionKind {
        ContributionKind::State
    }

    fn predict(&self, request: &FeedRequest) -> Result<String, ModelError> {
        if self.items.is_empty() {
            return Err(ModelError::Prediction("catalogue is empty".into()));
        }
        let seed = self.find_title(&request.text).unwrap_or(FALLBACK_TITLE);
        let top_n = request
            .leading_number
            .map_or(DEFAULT_TOP_N, |n| (n as usize).clamp(1, MAX_TOP_N));
        let picks = self.recommend(seed, top_n);
        Ok(format!("If you like {seed}, try: {}", picks.join(", ")))
    }

    fn state(&self) -> ModelState {
        let mut state = ModelState::new();
        let weight = Tensor::new(vec![1, self.weight.len()], self.weight.clone())
            .unwrap_or_else(|_| Tensor::vector(self.weight.clone()));
        state.insert(WEIGHT_KEY, weight);
        state.insert(BIAS_KEY, Tensor::vector(vec![self.bias]));
        state
    }

    fn set_state(&mut self, state: ModelState) -> Result<(), ModelError> {
        self.state().check_compatible(&state)?;
        for (key, tensor) in state {
            match key.as_str() {
                WEIGHT_KEY => self.weight = tensor.into_data(),
                BIAS_KEY => self.bias = tensor.data().first().copied().unwrap_or(self.bias),
                _ => {}
            }
        }
        Ok(())
    }

    fn train_step(&mut self, _rng: &mut dyn RngCore) -> Result<TrainOutcome, ModelError> {
        if self.items.is_empty() {
            return Err(ModelError::Training("catalogue is empty".into()));
        }
        let n = self.items.len() as f64;
        let mut grad_bias = 0.0;
        let mut grad_weight = vec![0.0; self.weight.len()];
        let mut squared_error = 0.0;
        for item in &self.items {
            let residual = self.score(item) - item.rating;
            squared_error += residual * residual;
            grad_bias += 2.0 * residual / n;
            for (g, x) in grad_weight.iter_mut().zip(&item.features) {
                *g += 2.0 * residual * x / n;
            }
        }

        let mut gradient = Vec::with_capacity(grad_weight.len() + 1);
        gradient.push(grad_bias);
        gradient.extend(grad_weight);
        Ok(TrainOutcome {
            loss: squared_error / n,
            gradient: GradientVector::new(gradient),
        })
    }

    fn apply_gradient(&mut self, gradient: &GradientVector) -> Result<(), ModelError> {
        let expected = self.weight.len() + 1;
        if gradient.len() != expected {
            return Err(ShapeMismatch::Length {
                expected,
                found: gradient.len(),
            }
            .into());
        }
        self.write_parameters(gradient.as_slice());
        Ok(())
    }
}

/// Features are tempo, length, energy and danceability, each scaled to [0, 1].
fn default_catalogue() -> Vec<CatalogueItem> {
    [
        ("Blinding Lights", [0.86, 0.35, 0.73, 0.51], 4.6),
        ("Bohemian Rhapsody", [0.36, 0.95, 0.40, 0.39], 4.9),
        ("Smells Like Teen Spirit", [0.59, 0.50, 0.91, 0.50], 4.5),
        ("Hotel California", [0.37, 0.80, 0.50, 0.58], 4.7),
        ("Billie Jean", [0.59, 0.48, 0.65, 0.92], 4.8),
        ("Shape of You", [0.48, 0.40, 0.65, 0.83], 4.1),
        ("Rolling in the Deep", [0.52, 0.39, 0.77, 0.73], 4.3),
        ("Hey Jude", [0.37, 1.00, 0.34, 0.45], 4.4),
        ("Levitating", [0.52, 0.33, 0.82, 0.70], 4.0),
        ("Take On Me", [0.84, 0.37, 0.90, 0.57], 4.2),
        ("Hey Ya!", [0.79, 0.40, 0.97, 0.73], 4.2),
        ("Dancing Queen", [0.50, 0.39, 0.87, 0.55], 4.4),
    ]
    .into_iter()
    .map(|(title, features, rating)| CatalogueItem::new(title, features.to_vec(), rating))
    .collect()
}
