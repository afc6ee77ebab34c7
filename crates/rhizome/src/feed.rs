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


use crate::{ensure_success, html, http_client};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use spore::{FeedMessage, FeedTransport, TransportError};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    content: String,
    account: Account,
}

#[derive(Debug, Deserialize)]
struct Account {
    username: String,
    #[serde(default)]
    acct: Option<String>,
}

/// Mastodon-compatible feed: hashtag timelines, statuses and replies.
#[derive(Debug, Clone)]
pub struct MastodonFeed {
    client: Client,
    instance: Url,
    api_token: String,
}

impl MastodonFeed {
    pub fn new(instance_url: &str, api_token: String, timeout: Duration) -> Result<Self, TransportError> {
        let instance = Url::parse(instance_url)
            .map_err(|e| TransportError::Request(format!("Invalid instance URL '{instance_url}': {e}")))?;
        Ok(Self {
            client: http_client(timeout)?,
            instance,
            api_token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.instance.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                TransportError::Request(format!("Instance URL cannot be a base: {}", self.instance))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn post_status(&self, payload: serde_json::Value) -> Result<(), TransportError> {
        let url = self.endpoint(&["api", "v1", "statuses"])?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("HTTP request failed: {e}")))?;
        ensure_success(response, url.as_str()).await?;
        Ok(())
    }
}

#[async_trait]
impl FeedTransport for MastodonFeed {
    async fn fetch_latest(
        &self,
        tag: &str,
        limit: usize,
    ) -> Result<Vec<FeedMessage>, TransportError> {
        let tag = tag.trim_start_matches('#');
        let url = self.endpoint(&["api", "v1", "timelines", "tag", tag])?;
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.api_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| TransportError::Request(format!("HTTP request failed: {e}")))?;
        let statuses: Vec<Status> = ensure_success(response, url.as_str())
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Malformed(format!("Failed to parse statuses: {e}")))?;

        info!(tag, count = statuses.len(), "fetched latest statuses");
        Ok(statuses
            .into_iter()
            .map(|status| {
                let author = status.account.acct.unwrap_or(status.account.username);
                FeedMessage::new(status.id, author, html::to_plain_text(&status.content))
            })
            .collect())
    }

    async fn post(&self, text: &str) -> Result<(), TransportError> {
        self.post_status(serde_json::json!({ "status": text })).await?;
        info!(status = text, "posted status");
        Ok(())
    }

    async fn reply(
        &self,
        message_id: &str,
        author: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        let status = format!("@{author} {text}");
        debug!(message_id, reply = %status, "replying to status");
        self.post_status(serde_json::json!({
            "status": status,
            "in_reply_to_id": message_id,
        }))
        .await
    }
}
