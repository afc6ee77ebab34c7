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


//! Store-side view of the federation: each agent writes its latest
//! contribution under its own key, and reads everyone else's back.

use crate::error::{AgentError, AgentResult};
use crate::logging::log_decode_failure;
use once_cell::sync::Lazy;
use regex::Regex;
use spore::{
    decode_gradient, decode_model_state, encode_gradient, encode_model_state, Binding,
    Contribution, DecodeError, GradientVector, GroupLink, ModelState, StoreTransport,
};
use tracing::{debug, info, warn};

pub const DEFAULT_NAMESPACE: &str = "http://example.org/";
pub const GRADIENT_FETCH_LIMIT: usize = 5;

const GRADIENT_PREDICATE: &str = "gradients";
const MODEL_STATE_PREDICATE: &str = "modelState";

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static key pattern is valid"));

/// Whether `key` can be embedded in a subject IRI without escaping.
pub fn is_valid_key(key: &str) -> bool {
    KEY_PATTERN.is_match(key)
}

pub struct KnowledgeStore<S> {
    transport: S,
    home: String,
    bound: Option<GroupLink>,
    namespace: String,
    gradient_limit: usize,
}

impl<S: StoreTransport> KnowledgeStore<S> {
    /// `home` is the dataset used until the agent binds to a group.
    pub fn new(transport: S, home: impl Into<String>) -> Self {
        Self {
            transport,
            home: home.into(),
            bound: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            gradient_limit: GRADIENT_FETCH_LIMIT,
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_gradient_limit(mut self, limit: usize) -> Self {
        self.gradient_limit = limit.max(1);
        self
    }

    pub fn transport(&self) -> &S {
        &self.transport
    }

    /// Points gradient reads and all writes at the group's partition, or
    /// back at the home dataset when `None`.
    pub fn bind(&mut self, link: Option<&GroupLink>) {
        if self.bound.as_ref() != link {
            debug!(partition = ?link.map(GroupLink::as_str), "Rebinding knowledge store");
        }
        self.bound = link.cloned();
    }

    pub fn partition(&self) -> &str {
        self.bound.as_ref().map_or(self.home.as_str(), GroupLink::as_str)
    }

    pub async fn put_gradient(&self, key: &str, gradient: &GradientVector) -> AgentResult<()> {
        let literal = encode_gradient(gradient)?;
        let statement = self.overwrite(key, GRADIENT_PREDICATE, &literal)?;
        self.transport.update(self.partition(), &statement).await?;
        info!(
            key = key,
            partition = self.partition(),
            values = gradient.len(),
            "Stored gradient"
        );
        Ok(())
    }

    /// Up to the gradient limit of stored gradients from the bound partition.
    /// The row stored under `exclude` is filtered out before the limit
    /// applies.
    pub async fn get_gradients(
        &self,
        exclude: Option<&str>,
    ) -> AgentResult<Vec<Contribution<GradientVector>>> {
        self.fetch(
            self.partition(),
            GRADIENT_PREDICATE,
            exclude,
            Some(self.gradient_limit),
            decode_gradient,
        )
        .await
    }

    pub async fn put_model_state(&self, name: &str, state: &ModelState) -> AgentResult<()> {
        let literal = encode_model_state(state)?;
        let statement = self.overwrite(name, MODEL_STATE_PREDICATE, &literal)?;
        self.transport.update(self.partition(), &statement).await?;
        info!(
            key = name,
            partition = self.partition(),
            parameters = state.len(),
            "Stored model state"
        );
        Ok(())
    }

    pub async fn get_model_states(
        &self,
        link: &GroupLink,
        exclude: Option<&str>,
    ) -> AgentResult<Vec<Contribution<ModelState>>> {
        self.fetch(
            link.as_str(),
            MODEL_STATE_PREDICATE,
            exclude,
            None,
            decode_model_state,
        )
        .await
    }

    fn subject(&self, key: &str) -> AgentResult<String> {
        if !is_valid_key(key) {
            return Err(AgentError::InvalidKey(key.to_string()));
        }
        Ok(format!("<{}{}>", self.namespace, key))
    }

    fn predicate(&self, local: &str) -> String {
        format!("<{}{}>", self.namespace, local)
    }

    fn overwrite(&self, key: &str, predicate: &str, literal: &str) -> AgentResult<String> {
        let subject = self.subject(key)?;
        let predicate = self.predicate(predicate);
        Ok(format!(
            "DELETE WHERE {{ {subject} {predicate} ?old }} ;\nINSERT DATA {{ {subject} {predicate} \"{}\" }}",
            escape_literal(literal)
        ))
    }

    async fn fetch<T>(
        &self,
        partition: &str,
        predicate: &str,
        exclude: Option<&str>,
        limit: Option<usize>,
        decode: fn(&str) -> Result<T, DecodeError>,
    ) -> AgentResult<Vec<Contribution<T>>> {
        let filter = match exclude {
            Some(key) => format!(" FILTER(?agent != {})", self.subject(key)?),
            None => String::new(),
        };
        let mut query = format!(
            "SELECT ?agent ?value WHERE {{ ?agent {} ?value{filter} }} ORDER BY ?agent",
            self.predicate(predicate)
        );
        if let Some(limit) = limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let rows = self.transport.select(partition, &query).await?;
        let fetched = rows.len();
        let contributions: Vec<Contribution<T>> = rows
            .into_iter()
            .filter_map(|row| self.decode_row(&row, decode))
            .collect();

        debug!(
            partition = partition,
            predicate = predicate,
            fetched = fetched,
            decoded = contributions.len(),
            "Fetched contributions"
        );
        Ok(contributions)
    }

    fn decode_row<T>(
        &self,
        row: &Binding,
        decode: fn(&str) -> Result<T, DecodeError>,
    ) -> Option<Contribution<T>> {
        let (Some(agent), Some(value)) = (row.get("agent"), row.get("value")) else {
            warn!(columns = ?row.keys().collect::<Vec<_>>(), "Skipping incomplete result row");
            return None;
        };
        let source = agent
            .strip_prefix(self.namespace.as_str())
            .unwrap_or(agent)
            .to_string();
        match decode(value) {
            Ok(payload) => Some(Contribution::new(source, payload)),
            Err(error) => {
                log_decode_failure(&source, &error);
                None
            }
        }
    }
}

fn escape_literal(literal: &str) -> String {
    literal.replace('\\', "\\\\").replace('"', "\\\"")
}
