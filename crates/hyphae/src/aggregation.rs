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


//! Weighted federated averaging.
//!
//! The local contribution keeps `self_weight`; the remaining mass is split
//! evenly across the compatible peers. With no compatible peers the local
//! contribution is returned unchanged.

use crate::error::AggregationError;
use crate::logging::log_skipped_contribution;
use spore::{Contribution, GradientVector, ModelState, ShapeMismatch};

pub const DEFAULT_SELF_WEIGHT: f64 = 0.5;

/// A contribution left out of an average, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedContribution {
    pub source: String,
    pub reason: ShapeMismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated<T> {
    pub value: T,
    pub merged: Vec<String>,
    pub skipped: Vec<SkippedContribution>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregator {
    self_weight: f64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            self_weight: DEFAULT_SELF_WEIGHT,
        }
    }
}

impl Aggregator {
    pub fn new(self_weight: f64) -> Result<Self, AggregationError> {
        if !(0.0..=1.0).contains(&self_weight) {
            return Err(AggregationError::InvalidSelfWeight(self_weight));
        }
        Ok(Self { self_weight })
    }

    pub fn self_weight(&self) -> f64 {
        self.self_weight
    }

    /// Weight given to each of `peers` compatible contributions.
    pub fn peer_weight(&self, peers: usize) -> f64 {
        if peers == 0 {
            0.0
        } else {
            (1.0 - self.self_weight) / peers as f64
        }
    }

    pub fn aggregate_states(
        &self,
        local: &ModelState,
        peers: &[Contribution<ModelState>],
    ) -> Aggregated<ModelState> {
        let (compatible, skipped) =
            partition_compatible(peers, |peer| local.check_compatible(peer));

        let mut value = local.clone();
        if !compatible.is_empty() {
            let peer_weight = self.peer_weight(compatible.len());
            for (key, tensor) in value.iter_mut() {
                let mut peer_sum = vec![0.0; tensor.len()];
                for peer in &compatible {
                    if let Some(theirs) = peer.payload.get(key) {
                        accumulate(&mut peer_sum, theirs.data());
                    }
                }
                blend(tensor.data_mut(), &peer_sum, self.self_weight, peer_weight);
            }
        }

        Aggregated {
            value,
            merged: compatible.iter().map(|c| c.source.clone()).collect(),
            skipped,
        }
    }

    pub fn aggregate_gradients(
        &self,
        local: &GradientVector,
        peers: &[Contribution<GradientVector>],
    ) -> Aggregated<GradientVector> {
        let (compatible, skipped) = partition_compatible(peers, |peer| {
            if peer.len() == local.len() {
                Ok(())
            } else {
                Err(ShapeMismatch::Length {
                    expected: local.len(),
                    found: peer.len(),
                })
            }
        });

        let mut values = local.as_slice().to_vec();
        if !compatible.is_empty() {
            let mut peer_sum = vec![0.0; values.len()];
            for peer in &compatible {
                accumulate(&mut peer_sum, peer.payload.as_slice());
            }
            blend(
                &mut values,
                &peer_sum,
                self.self_weight,
                self.peer_weight(compatible.len()),
            );
        }

        Aggregated {
            value: GradientVector::new(values),
            merged: compatible.iter().map(|c| c.source.clone()).collect(),
            skipped,
        }
    }
}

fn partition_compatible<'a, T>(
    peers: &'a [Contribution<T>],
    check: impl Fn(&T) -> Result<(), ShapeMismatch>,
) -> (Vec<&'a Contribution<T>>, Vec<SkippedContribution>) {
    let mut compatible = Vec::with_capacity(peers.len());
    let mut skipped = Vec::new();
    for peer in peers {
        match check(&peer.payload) {
            Ok(()) => compatible.push(peer),
            Err(reason) => {
                log_skipped_contribution(&peer.source, &reason);
                skipped.push(SkippedContribution {
                    source: peer.source.clone(),
                    reason,
                });
            }
        }
    }
    (compatible, skipped)
}

fn accumulate(sum: &mut [f64], values: &[f64]) {
    for (acc, v) in sum.iter_mut().zip(values) {
        *acc += v;
    }
}

fn blend(local: &mut [f64], peer_sum: &[f64], self_weight: f64, peer_weight: f64) {
    for (l, p) in local.iter_mut().zip(peer_sum) {
        *l = self_weight * *l + peer_weight * p;
    }
}
