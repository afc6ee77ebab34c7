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


use crate::{ensure_success, http_client};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use spore::{Binding, StoreTransport, TransportError};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct SelectResults {
    results: ResultSet,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    bindings: Vec<HashMap<String, Term>>,
}

#[derive(Debug, Deserialize)]
struct Term {
    value: String,
}

/// SPARQL 1.1 protocol client for a Fuseki-style server, where every
/// dataset exposes `/update` and `/query` endpoints.
#[derive(Debug, Clone)]
pub struct SparqlStore {
    client: Client,
    base: Url,
}

impl SparqlStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base = Url::parse(base_url)
            .map_err(|e| TransportError::Request(format!("Invalid store URL '{base_url}': {e}")))?;
        Ok(Self {
            client: http_client(timeout)?,
            base,
        })
    }

    /// Resolves a partition to its dataset URL. Absolute `http(s)` locators
    /// name the dataset directly; anything else is a dataset under the base.
    pub fn dataset_url(&self, partition: &str) -> Result<Url, TransportError> {
        if partition.starts_with("http://") || partition.starts_with("https://") {
            return Url::parse(partition)
                .map_err(|e| TransportError::Request(format!("Invalid locator '{partition}': {e}")));
        }
        self.extend(self.base.clone(), &[partition])
    }

    fn endpoint(&self, partition: &str, operation: &str) -> Result<Url, TransportError> {
        let dataset = self.dataset_url(partition)?;
        self.extend(dataset, &[operation])
    }

    fn extend(&self, mut url: Url, segments: &[&str]) -> Result<Url, TransportError> {
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| TransportError::Request(format!("URL cannot be a base: {}", self.base)))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }
}

#[async_trait]
impl StoreTransport for SparqlStore {
    async fn update(&self, partition: &str, statement: &str) -> Result<(), TransportError> {
        let url = self.endpoint(partition, "update")?;
        debug!(%url, "sparql update");
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/sparql-update")
            .body(statement.to_string())
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("HTTP request failed: {e}")))?;
        ensure_success(response, url.as_str()).await?;
        Ok(())
    }

    async fn select(&self, partition: &str, query: &str) -> Result<Vec<Binding>, TransportError> {
        let url = self.endpoint(partition, "query")?;
        debug!(%url, "sparql select");
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/sparql-results+json")
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("HTTP request failed: {e}")))?;
        let results: SelectResults = ensure_success(response, url.as_str())
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Malformed(format!("Failed to parse SELECT results: {e}")))?;

        Ok(results
            .results
            .bindings
            .into_iter()
            .map(|row| row.into_iter().map(|(var, term)| (var, term.value)).collect())
            .collect())
    }
}
