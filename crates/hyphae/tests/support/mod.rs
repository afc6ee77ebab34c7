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


//! In-memory transports for exercising the engine without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use regex::Regex;
use spore::{Binding, FeedMessage, FeedTransport, StoreTransport, TransportError};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct FeedInner {
    timelines: HashMap<String, Vec<FeedMessage>>,
    posts: Vec<String>,
    replies: Vec<(String, String, String)>,
    fetches: Vec<String>,
    offline: bool,
    reject_replies: bool,
}

/// Scripted feed. Clones share state, so a test can keep a handle while the
/// orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeFeed {
    inner: Arc<Mutex<FeedInner>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tag: &str, id: &str, author: &str, content: &str) {
        self.inner
            .lock()
            .unwrap()
            .timelines
            .entry(tag.to_string())
            .or_default()
            .push(FeedMessage::new(id, author, content));
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    pub fn reject_replies(&self, reject: bool) {
        self.inner.lock().unwrap().reject_replies = reject;
    }

    pub fn posts(&self) -> Vec<String> {
        self.inner.lock().unwrap().posts.clone()
    }

    pub fn replies(&self) -> Vec<(String, String, String)> {
        self.inner.lock().unwrap().replies.clone()
    }

    /// Tags read so far, in call order.
    pub fn fetches(&self) -> Vec<String> {
        self.inner.lock().unwrap().fetches.clone()
    }
}

fn offline() -> TransportError {
    TransportError::Unavailable("fake feed offline".into())
}

#[async_trait]
impl FeedTransport for FakeFeed {
    async fn fetch_latest(&self, tag: &str, limit: usize) -> Result<Vec<FeedMessage>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(offline());
        }
        inner.fetches.push(tag.to_string());
        Ok(inner
            .timelines
            .get(tag)
            .map(|messages| messages.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn post(&self, text: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(offline());
        }
        inner.posts.push(text.to_string());
        Ok(())
    }

    async fn reply(&self, message_id: &str, author: &str, text: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(offline());
        }
        if inner.reject_replies {
            return Err(TransportError::Status {
                endpoint: "statuses".into(),
                status: 422,
                body: "rejected".into(),
            });
        }
        inner
            .replies
            .push((message_id.to_string(), author.to_string(), text.to_string()));
        Ok(())
    }
}

type Triples = BTreeMap<(String, String), String>;

#[derive(Debug, Default)]
struct StoreInner {
    partitions: HashMap<String, Triples>,
    updates: Vec<(String, String)>,
    queries: Vec<(String, String)>,
    offline: bool,
}

/// Understands exactly the overwrite and select shapes the knowledge store
/// client emits.
#[derive(Debug, Clone)]
pub struct FakeStore {
    inner: Arc<Mutex<StoreInner>>,
    insert: Regex,
    delete: Regex,
    select: Regex,
    exclude: Regex,
    limit: Regex,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            insert: Regex::new(r#"INSERT DATA \{ <([^>]+)> <([^>]+)> "((?:[^"\\]|\\.)*)" \}"#).unwrap(),
            delete: Regex::new(r"DELETE WHERE \{ <([^>]+)> <([^>]+)> \?old \}").unwrap(),
            select: Regex::new(r"\?agent <([^>]+)> \?value").unwrap(),
            exclude: Regex::new(r"FILTER\(\?agent != <([^>]+)>\)").unwrap(),
            limit: Regex::new(r"LIMIT (\d+)").unwrap(),
        }
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw literal, as another agent would have written it.
    pub fn seed(&self, partition: &str, subject: &str, predicate: &str, literal: &str) {
        self.inner
            .lock()
            .unwrap()
            .partitions
            .entry(partition.to_string())
            .or_default()
            .insert((subject.to_string(), predicate.to_string()), literal.to_string());
    }

    pub fn literal(&self, partition: &str, subject: &str, predicate: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .partitions
            .get(partition)
            .and_then(|p| p.get(&(subject.to_string(), predicate.to_string())).cloned())
    }

    pub fn entries(&self, partition: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .partitions
            .get(partition)
            .map_or(0, BTreeMap::len)
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().updates.clone()
    }

    pub fn queries(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().queries.clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }
}

#[async_trait]
impl StoreTransport for FakeStore {
    async fn update(&self, partition: &str, statement: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(TransportError::Unavailable("fake store offline".into()));
        }
        inner
            .updates
            .push((partition.to_string(), statement.to_string()));
        let triples = inner.partitions.entry(partition.to_string()).or_default();
        if let Some(caps) = self.delete.captures(statement) {
            triples.remove(&(caps[1].to_string(), caps[2].to_string()));
        }
        let caps = self
            .insert
            .captures(statement)
            .ok_or_else(|| TransportError::Malformed(format!("unsupported update: {statement}")))?;
        let literal = caps[3].replace("\\\"", "\"").replace("\\\\", "\\");
        triples.insert((caps[1].to_string(), caps[2].to_string()), literal);
        Ok(())
    }

    async fn select(&self, partition: &str, query: &str) -> Result<Vec<Binding>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(TransportError::Unavailable("fake store offline".into()));
        }
        inner
            .queries
            .push((partition.to_string(), query.to_string()));
        let predicate = self
            .select
            .captures(query)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| TransportError::Malformed(format!("unsupported query: {query}")))?;
        let limit = self
            .limit
            .captures(query)
            .and_then(|caps| caps[1].parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        let excluded = self.exclude.captures(query).map(|caps| caps[1].to_string());

        Ok(inner
            .partitions
            .get(partition)
            .into_iter()
            .flat_map(|triples| triples.iter())
            .filter(|((_, p), _)| *p == predicate)
            .filter(|((subject, _), _)| excluded.as_deref() != Some(subject.as_str()))
            .take(limit)
            .map(|((subject, _), literal)| {
                Binding::from([
                    ("agent".to_string(), subject.clone()),
                    ("value".to_string(), literal.clone()),
                ])
            })
            .collect())
    }
}
