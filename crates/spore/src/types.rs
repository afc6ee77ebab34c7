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


use crate::error::ShapeMismatch;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named model parameters, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelState(BTreeMap<String, Tensor>);

impl ModelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.0.insert(name.into(), tensor)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        self.0.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Tensor)> {
        self.0.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every value of every parameter, in key order.
    pub fn flatten(&self) -> Vec<f64> {
        self.0.values().flat_map(|t| t.data().iter().copied()).collect()
    }

    /// Checks that `other` has the same key set and per-key shapes.
    pub fn check_compatible(&self, other: &Self) -> Result<(), ShapeMismatch> {
        let missing: Vec<String> = self
            .0
            .keys()
            .filter(|k| !other.0.contains_key(*k))
            .cloned()
            .collect();
        let unexpected: Vec<String> = other
            .0
            .keys()
            .filter(|k| !self.0.contains_key(*k))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(ShapeMismatch::Keys {
                missing,
                unexpected,
            });
        }

        for (key, tensor) in &self.0 {
            if let Some(theirs) = other.0.get(key) {
                if tensor.shape() != theirs.shape() {
                    return Err(ShapeMismatch::Shape {
                        key: key.clone(),
                        expected: tensor.shape().to_vec(),
                        found: theirs.shape().to_vec(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, Tensor)> for ModelState {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ModelState {
    type Item = (String, Tensor);
    type IntoIter = std::collections::btree_map::IntoIter<String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Flat accumulated gradient, used by learners without named state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradientVector(Vec<f64>);

impl GradientVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for GradientVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// A peer's submission as fetched from the store. Fetching again produces a
/// fresh snapshot; the payload is never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution<T> {
    pub source: String,
    pub payload: T,
}

impl<T> Contribution<T> {
    pub fn new(source: impl Into<String>, payload: T) -> Self {
        Self {
            source: source.into(),
            payload,
        }
    }
}

/// Opaque locator of the store partition a group trains in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupLink(String);

impl GroupLink {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMessage {
    pub id: String,
    pub author: String,
    pub content: String,
}

impl FeedMessage {
    pub fn new(id: impl Into<String>, author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            content: content.into(),
        }
    }
}

/// What a feed message asks the learner for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub text: String,
    pub leading_number: Option<u32>,
}

impl FeedRequest {
    pub fn from_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            leading_number: leading_number(text),
        }
    }

    /// Like [`FeedRequest::from_text`], but the leading number is read from
    /// whatever follows the first `trigger` in the message.
    pub fn from_message(content: &str, trigger: &str) -> Self {
        let tail = content
            .find(trigger)
            .map_or(content, |idx| &content[idx + trigger.len()..]);
        Self {
            text: content.to_string(),
            leading_number: leading_number(tail),
        }
    }
}

fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == ',')
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Per-epoch engagement signal: starts at 1 and halves per answered message.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FeedbackScore(f64);

impl FeedbackScore {
    pub const INITIAL: Self = Self(1.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn halved(self) -> Self {
        Self(self.0 / 2.0)
    }
}

impl From<f64> for FeedbackScore {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl Default for FeedbackScore {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for FeedbackScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
