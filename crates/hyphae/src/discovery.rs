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


use crate::agent::Agent;
use rand::seq::SliceRandom;
use spore::{FeedTransport, GroupLink, TransportError};
use tracing::{info, warn};

pub const DEFAULT_JOIN_MARKER: &str = "model-link:";
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Result of one search for a training group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// A message on `tag` advertised `link`.
    Joined { link: GroupLink, tag: String },
    /// Nothing matched; a join request was posted on `tag`.
    Announced { tag: String },
    /// The channel returned no messages at all.
    NoMessages { tag: String },
}

impl DiscoveryOutcome {
    pub fn link(&self) -> Option<&GroupLink> {
        match self {
            Self::Joined { link, .. } => Some(link),
            Self::Announced { .. } | Self::NoMessages { .. } => None,
        }
    }
}

/// Finds training groups advertised on the feed.
#[derive(Debug, Clone)]
pub struct PeerDiscovery {
    tags: Vec<String>,
    marker: String,
    page_size: usize,
}

impl PeerDiscovery {
    pub fn new(tags: Vec<String>) -> Self {
        Self {
            tags,
            marker: DEFAULT_JOIN_MARKER.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Picks the channel to read this round, uniformly when several are
    /// configured. Falls back to the agent's active tag.
    pub fn select_tag(&self, agent: &mut Agent) -> String {
        match self.tags.as_slice() {
            [] => agent.active_tag().to_string(),
            [only] => only.clone(),
            many => many
                .choose(agent.rng())
                .cloned()
                .unwrap_or_else(|| agent.active_tag().to_string()),
        }
    }

    pub async fn search<F>(
        &self,
        feed: &F,
        agent: &mut Agent,
    ) -> Result<DiscoveryOutcome, TransportError>
    where
        F: FeedTransport + ?Sized,
    {
        let tag = self.select_tag(agent);
        let messages = feed.fetch_latest(&tag, self.page_size).await?;
        if messages.is_empty() {
            warn!(tag = %tag, "No messages on discovery channel");
            return Ok(DiscoveryOutcome::NoMessages { tag });
        }

        for message in &messages {
            if let Some(link) = extract_locator(&message.content, &self.marker) {
                info!(
                    tag = %tag,
                    link = %link,
                    author = %message.author,
                    "Found training group"
                );
                agent.set_active_tag(tag.clone());
                return Ok(DiscoveryOutcome::Joined { link, tag });
            }
        }

        let active = agent.active_tag().to_string();
        feed.post(&format!(
            "Request-to-join: Looking for a training group. #{active}"
        ))
        .await?;
        info!(tag = %active, scanned = messages.len(), "No group advertised, posted join request");
        Ok(DiscoveryOutcome::Announced { tag: active })
    }

    /// Announces `link` so other agents can find it.
    pub async fn advertise<F>(
        &self,
        feed: &F,
        agent: &Agent,
        link: &GroupLink,
    ) -> Result<(), TransportError>
    where
        F: FeedTransport + ?Sized,
    {
        feed.post(&format!(
            "Training group open: {}{} #{}",
            self.marker,
            link,
            agent.active_tag()
        ))
        .await?;
        info!(link = %link, tag = agent.active_tag(), "Advertised training group");
        Ok(())
    }
}

/// The locator following the first non-empty `marker` occurrence, up to the
/// next whitespace.
pub fn extract_locator(content: &str, marker: &str) -> Option<GroupLink> {
    if marker.is_empty() {
        return None;
    }
    content.match_indices(marker).find_map(|(idx, _)| {
        let rest = &content[idx + marker.len()..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let locator = &rest[..end];
        (!locator.is_empty()).then(|| GroupLink::new(locator))
    })
}
