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


//! Bundled learners. The agent only sees them through [`spore::Learner`].

mod catalogue;
mod linear;

pub use catalogue::{CatalogueItem, CatalogueLearner, FALLBACK_TITLE};
pub use linear::LinearLearner;

use crate::config::ModelKind;
use rand::Rng;
use spore::Learner;

/// Builds the learner named by `kind` with randomly initialised parameters.
pub fn build<R: Rng + ?Sized>(kind: ModelKind, rng: &mut R) -> Box<dyn Learner> {
    match kind {
        ModelKind::Linear => Box::new(LinearLearner::random(
            linear::DEFAULT_FEATURES,
            linear::DEFAULT_LEARNING_RATE,
            rng,
        )),
        ModelKind::Catalogue => Box::new(CatalogueLearner::with_default_catalogue(rng)),
    }
}
