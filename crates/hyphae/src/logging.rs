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


use crate::orchestrator::EpochReport;
use spore::DecodeError;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub fn log_epoch_start(epoch: u64, tag: &str, switch_team: bool, joined_group: bool) {
    info!(
        epoch = epoch,
        tag = tag,
        switch_team = switch_team,
        joined_group = joined_group,
        "Epoch started"
    );
}

pub fn log_epoch_report(report: &EpochReport) {
    info!(
        epoch = report.epoch,
        searched = report.searched,
        group = report.group_link.as_ref().map_or("-", |link| link.as_str()),
        loss = report.training.as_ref().map(|t| t.loss),
        merged = report.training.as_ref().map_or(0, |t| t.merged.len()),
        feedback = report.feedback.score.value(),
        answered = report.feedback.answered.len(),
        switch_team = report.switch_team,
        "Epoch complete"
    );
}

pub fn log_epoch_failure(epoch: u64, failures: u32, error: &dyn std::error::Error, delay: Duration) {
    error!(
        epoch = epoch,
        consecutive_failures = failures,
        error = %error,
        details = ?error,
        retry_in_secs = delay.as_secs_f64(),
        "Epoch failed"
    );
}

pub fn log_decode_failure(source: &str, error: &DecodeError) {
    warn!(source = source, error = %error, "Skipping undecodable contribution");
}

pub fn log_skipped_contribution(source: &str, reason: &dyn std::fmt::Display) {
    warn!(source = source, reason = %reason, "Skipping incompatible contribution");
}

pub fn log_threshold_mutation(before: f64, after: f64) {
    debug!(before = before, after = after, "Feedback threshold mutated");
}

pub fn log_parameter_mutation(parameters: usize, total_drift: f64) {
    debug!(
        parameters = parameters,
        total_drift = total_drift,
        "Learner parameters mutated"
    );
}
