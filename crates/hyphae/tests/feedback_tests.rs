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


mod support;

use hyphae::{should_switch, Agent, AgentError, FeedbackEvaluator, LinearLearner};
use rand::rngs::StdRng;
use rand::SeedableRng;
use support::FakeFeed;

fn agent() -> Agent {
    Agent::new("baby-fungus", "fungi", 0.5, StdRng::seed_from_u64(1))
}

fn learner() -> LinearLearner {
    LinearLearner::new(vec![0.5, 0.25, 1.0], 0.01)
}

#[tokio::test]
async fn each_answered_trigger_halves_the_score() {
    let feed = FakeFeed::new();
    feed.push("fungi", "1", "carol", "hey babyfungus what do you know?");
    feed.push("fungi", "2", "dave", "unrelated chatter");
    feed.push("fungi", "3", "erin", "babyfungus 2");
    feed.push("fungi", "4", "frank", "@babyfungus again");

    let mut agent = agent();
    let round = FeedbackEvaluator::default()
        .evaluate(&feed, &mut agent, &learner())
        .await
        .unwrap();

    assert!((round.score.value() - 0.125).abs() < f64::EPSILON);
    assert_eq!(round.answered, vec!["1", "3", "4"]);
    let replies = feed.replies();
    assert_eq!(replies.len(), 3);
    assert_eq!(
        replies[0],
        (
            "1".to_string(),
            "carol".to_string(),
            "My test model is [0.5, 0.25, 1.0]".to_string()
        )
    );
    assert!(should_switch(round.score, agent.feedback_threshold()));
}

#[tokio::test]
async fn messages_are_answered_once() {
    let feed = FakeFeed::new();
    feed.push("fungi", "1", "carol", "babyfungus?");
    feed.push("fungi", "1", "carol", "babyfungus?");

    let mut agent = agent();
    let evaluator = FeedbackEvaluator::default();
    let first = evaluator.evaluate(&feed, &mut agent, &learner()).await.unwrap();
    let second = evaluator.evaluate(&feed, &mut agent, &learner()).await.unwrap();

    assert!((first.score.value() - 0.5).abs() < f64::EPSILON);
    assert!((second.score.value() - 1.0).abs() < f64::EPSILON);
    assert!(second.answered.is_empty());
    assert_eq!(feed.replies().len(), 1);
    assert!(agent.has_answered("1"));
    assert!(!should_switch(second.score, agent.feedback_threshold()));
}

#[tokio::test]
async fn own_messages_are_ignored() {
    let feed = FakeFeed::new();
    feed.push("fungi", "1", "Fungus@Mastodon.Example", "babyfungus says hi");
    feed.push("fungi", "2", "carol", "babyfungus hi back");

    let mut agent = agent().with_handle("fungus@mastodon.example");
    let round = FeedbackEvaluator::default()
        .evaluate(&feed, &mut agent, &learner())
        .await
        .unwrap();

    assert_eq!(round.answered, vec!["2"]);
    assert!(!agent.has_answered("1"));
}

#[tokio::test]
async fn own_messages_by_local_name_are_ignored() {
    let feed = FakeFeed::new();
    feed.push("fungi", "1", "fungus", "babyfungus talking to myself");
    feed.push("fungi", "2", "fungus@elsewhere.example", "babyfungus namesake");

    let mut agent = agent().with_handle("fungus@mastodon.example");
    let round = FeedbackEvaluator::default()
        .evaluate(&feed, &mut agent, &learner())
        .await
        .unwrap();

    assert_eq!(round.answered, vec!["2"]);
    assert!(!agent.has_answered("1"));
}

#[tokio::test]
async fn failed_reply_leaves_message_unanswered() {
    let feed = FakeFeed::new();
    feed.push("fungi", "1", "carol", "babyfungus?");
    feed.reject_replies(true);

    let mut agent = agent();
    let evaluator = FeedbackEvaluator::default();
    let err = evaluator
        .evaluate(&feed, &mut agent, &learner())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Transport(_)));
    assert!(!agent.has_answered("1"));

    feed.reject_replies(false);
    let round = evaluator.evaluate(&feed, &mut agent, &learner()).await.unwrap();
    assert_eq!(round.answered, vec!["1"]);
}

#[tokio::test]
async fn quiet_channel_keeps_full_score() {
    let feed = FakeFeed::new();
    let mut agent = agent();
    let round = FeedbackEvaluator::new("custom-trigger")
        .evaluate(&feed, &mut agent, &learner())
        .await
        .unwrap();
    assert!((round.score.value() - 1.0).abs() < f64::EPSILON);
    assert_eq!(feed.fetches(), vec!["fungi"]);
}
