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


use rand::rngs::StdRng;
use spore::GroupLink;
use std::collections::HashSet;

/// Everything one agent knows about itself. Passed explicitly to every
/// component; nothing here is process-global.
#[derive(Debug)]
pub struct Agent {
    name: String,
    handle: Option<String>,
    group_link: Option<GroupLink>,
    feedback_threshold: f64,
    answered: HashSet<String>,
    active_tag: String,
    switch_team: bool,
    joined_group: bool,
    epoch: u64,
    rng: StdRng,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        active_tag: impl Into<String>,
        feedback_threshold: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            name: name.into(),
            handle: None,
            group_link: None,
            feedback_threshold,
            answered: HashSet::new(),
            active_tag: active_tag.into(),
            switch_team: true,
            joined_group: false,
            epoch: 0,
            rng,
        }
    }

    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub fn group_link(&self) -> Option<&GroupLink> {
        self.group_link.as_ref()
    }

    pub(crate) fn set_group_link(&mut self, link: Option<GroupLink>) {
        self.group_link = link;
    }

    pub fn feedback_threshold(&self) -> f64 {
        self.feedback_threshold
    }

    pub(crate) fn set_feedback_threshold(&mut self, threshold: f64) {
        self.feedback_threshold = threshold;
    }

    pub fn active_tag(&self) -> &str {
        &self.active_tag
    }

    pub(crate) fn set_active_tag(&mut self, tag: impl Into<String>) {
        self.active_tag = tag.into();
    }

    pub fn has_answered(&self, message_id: &str) -> bool {
        self.answered.contains(message_id)
    }

    /// Records a reply. Returns `false` if the message was already answered.
    pub(crate) fn mark_answered(&mut self, message_id: &str) -> bool {
        self.answered.insert(message_id.to_string())
    }

    pub fn answered_count(&self) -> usize {
        self.answered.len()
    }

    pub fn switch_team(&self) -> bool {
        self.switch_team
    }

    pub(crate) fn set_switch_team(&mut self, switch_team: bool) {
        self.switch_team = switch_team;
    }

    pub fn joined_group(&self) -> bool {
        self.joined_group
    }

    pub(crate) fn set_joined_group(&mut self, joined: bool) {
        self.joined_group = joined;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn advance_epoch(&mut self) {
        self.epoch += 1;
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
