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
use crate::discovery::DEFAULT_PAGE_SIZE;
use crate::error::AgentResult;
use spore::{FeedRequest, FeedTransport, FeedbackScore, Learner};
use tracing::{debug, info, warn};

pub const DEFAULT_TRIGGER: &str = "babyfungus";

/// Outcome of one pass over the active channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRound {
    pub score: FeedbackScore,
    pub answered: Vec<String>,
}

/// Answers trigger messages with the learner's prediction and scores the
/// round: every reply halves the score, so a busy channel pushes it towards 0.
#[derive(Debug, Clone)]
pub struct FeedbackEvaluator {
    trigger: String,
    page_size: usize,
}

impl Default for FeedbackEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER)
    }
}

impl FeedbackEvaluator {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub async fn evaluate<F>(
        &self,
        feed: &F,
        agent: &mut Agent,
        learner: &dyn Learner,
    ) -> AgentResult<FeedbackRound>
    where
        F: FeedTransport + ?Sized,
    {
        let tag = agent.active_tag().to_string();
        let messages = feed.fetch_latest(&tag, self.page_size).await?;

        let mut score = FeedbackScore::INITIAL;
        let mut answered = Vec::new();
        for message in messages {
            if agent.has_answered(&message.id) {
                continue;
            }
            if agent
                .handle()
                .is_some_and(|handle| is_own_author(handle, &message.author))
            {
                debug!(id = %message.id, "Skipping own message");
                continue;
            }
            if !message.content.contains(&self.trigger) {
                continue;
            }

            let request = FeedRequest::from_message(&message.content, &self.trigger);
            let reply = match learner.predict(&request) {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(id = %message.id, error = %error, "Prediction failed, leaving message unanswered");
                    continue;
                }
            };
            feed.reply(&message.id, &message.author, &reply).await?;
            agent.mark_answered(&message.id);
            score = score.halved();
            debug!(id = %message.id, author = %message.author, "Answered trigger message");
            answered.push(message.id);
        }

        info!(
            tag = %tag,
            answered = answered.len(),
            score = score.value(),
            "Feedback round complete"
        );
        Ok(FeedbackRound { score, answered })
    }
}

/// The agent moves on when engagement drops strictly below the threshold.
/// Home-instance authors arrive without the domain, so a bare author is
/// compared against the local part of `user@instance`.
fn is_own_author(handle: &str, author: &str) -> bool {
    let handle = handle.trim_start_matches('@');
    let author = author.trim_start_matches('@');
    if author.contains('@') {
        return author.eq_ignore_ascii_case(handle);
    }
    let local_part = handle.split('@').next().unwrap_or(handle);
    author.eq_ignore_ascii_case(local_part)
}

pub fn should_switch(score: FeedbackScore, threshold: f64) -> bool {
    score.value() < threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_is_strictly_below_threshold() {
        let half = FeedbackScore::INITIAL.halved();
        assert!(!should_switch(half, 0.5));
        assert!(should_switch(half.halved(), 0.5));
        assert!(!should_switch(FeedbackScore::INITIAL, 0.5));
    }

    #[test]
    fn switch_accepts_arbitrary_scores() {
        assert!(should_switch(FeedbackScore::new(0.3), 0.5));
        assert!(!should_switch(FeedbackScore::from(0.6), 0.5));
        assert!(!should_switch(0.5.into(), 0.5));
    }

    #[test]
    fn own_author_matches_full_handle_or_local_part() {
        assert!(is_own_author("fungus@mastodon.example", "fungus"));
        assert!(is_own_author("fungus@mastodon.example", "Fungus@Mastodon.example"));
        assert!(is_own_author("@fungus@mastodon.example", "@fungus"));
        assert!(is_own_author("fungus", "fungus"));
        assert!(!is_own_author("fungus@mastodon.example", "fungus@other.example"));
        assert!(!is_own_author("fungus@mastodon.example", "fungusfan"));
    }
}
