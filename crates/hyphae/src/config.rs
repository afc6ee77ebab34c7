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


//! Environment-driven configuration. Every value is resolved once at start-up;
//! a missing or malformed value fails fast with a [`ConfigError`].

use crate::error::ConfigError;
use crate::knowledge::is_valid_key;
use crate::supervisor::RetryPolicy;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_STORE_BASE_URL: &str = "http://localhost:3030";
pub const DEFAULT_STORE_DATASET: &str = "my-knowledge-base";
pub const DEFAULT_FEEDBACK_THRESHOLD: f64 = 0.5;
pub const DEFAULT_AGENT_NAME: &str = "baby-fungus";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which bundled learner the agent trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    #[default]
    Linear,
    Catalogue,
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "catalogue" | "catalog" => Ok(Self::Catalogue),
            other => Err(format!("unknown model '{other}', expected 'linear' or 'catalogue'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub feed_instance_url: String,
    pub feed_api_token: String,
    pub discovery_tags: Vec<String>,
    pub store_base_url: String,
    pub store_dataset: String,
    pub feedback_threshold: f64,
    pub agent_name: String,
    pub agent_handle: Option<String>,
    pub trigger: String,
    pub join_marker: String,
    pub model: ModelKind,
    pub self_weight: f64,
    pub mutation_chance: f64,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub advertise_group: bool,
    pub announce_updates: bool,
    pub seed: Option<u64>,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup, so tests never
    /// touch the process environment.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let feed_instance_url = env.url("MASTODON_INSTANCE_URL", None)?;
        let feed_api_token = env.required("MASTODON_API_KEY")?;
        let discovery_tags = env.tags()?;
        let store_base_url = env.url("FUSEKI_BASE_URL", Some(DEFAULT_STORE_BASE_URL))?;
        let store_dataset = env
            .optional("FUSEKI_DATASET")
            .unwrap_or_else(|| DEFAULT_STORE_DATASET.to_string());

        let feedback_threshold =
            env.parse_or("FEEDBACK_THRESHOLD", DEFAULT_FEEDBACK_THRESHOLD)?;
        if !feedback_threshold.is_finite() || feedback_threshold <= 0.0 {
            return Err(ConfigError::invalid(
                "FEEDBACK_THRESHOLD",
                "must be a positive number",
            ));
        }

        let agent_name = env
            .optional("AGENT_NAME")
            .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string());
        if !is_valid_key(&agent_name) {
            return Err(ConfigError::invalid(
                "AGENT_NAME",
                "may only contain letters, digits, '.', '_' and '-'",
            ));
        }

        let trigger = env
            .optional("FUNGUS_TRIGGER")
            .unwrap_or_else(|| crate::feedback::DEFAULT_TRIGGER.to_string());
        let join_marker = env
            .optional("FUNGUS_JOIN_MARKER")
            .unwrap_or_else(|| crate::discovery::DEFAULT_JOIN_MARKER.to_string());

        let self_weight =
            env.parse_or("FUNGUS_SELF_WEIGHT", crate::aggregation::DEFAULT_SELF_WEIGHT)?;
        unit_interval("FUNGUS_SELF_WEIGHT", self_weight)?;
        let mutation_chance = env.parse_or(
            "FUNGUS_MUTATION_CHANCE",
            crate::evolution::DEFAULT_MUTATION_CHANCE,
        )?;
        unit_interval("FUNGUS_MUTATION_CHANCE", mutation_chance)?;

        let defaults = RetryPolicy::default();
        let multiplier = env.parse_or("FUNGUS_BACKOFF_MULTIPLIER", defaults.multiplier)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "FUNGUS_BACKOFF_MULTIPLIER",
                "must be at least 1.0",
            ));
        }
        let max_consecutive_failures = match env.optional("FUNGUS_MAX_CONSECUTIVE_FAILURES") {
            None => None,
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::invalid(
                        "FUNGUS_MAX_CONSECUTIVE_FAILURES",
                        format!("expected a positive integer, got '{raw}'"),
                    ))
                }
                Ok(n) => Some(n),
            },
        };
        let retry = RetryPolicy {
            epoch_interval: env.seconds("FUNGUS_EPOCH_INTERVAL_SECS", defaults.epoch_interval)?,
            error_backoff: env.seconds("FUNGUS_ERROR_BACKOFF_SECS", defaults.error_backoff)?,
            max_backoff: env.seconds("FUNGUS_MAX_BACKOFF_SECS", defaults.max_backoff)?,
            multiplier,
            max_consecutive_failures,
        };

        let request_timeout = env.seconds("FUNGUS_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT)?;
        if request_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "FUNGUS_REQUEST_TIMEOUT_SECS",
                "must be greater than zero",
            ));
        }

        Ok(Self {
            feed_instance_url,
            feed_api_token,
            discovery_tags,
            store_base_url,
            store_dataset,
            feedback_threshold,
            agent_name,
            agent_handle: env.optional("AGENT_HANDLE"),
            trigger: non_empty("FUNGUS_TRIGGER", trigger)?,
            join_marker: non_empty("FUNGUS_JOIN_MARKER", join_marker)?,
            model: env.parse_or("FUNGUS_MODEL", ModelKind::default())?,
            self_weight,
            mutation_chance,
            retry,
            request_timeout,
            advertise_group: env.flag("FUNGUS_ADVERTISE_GROUP"),
            announce_updates: env.flag("FUNGUS_ANNOUNCE_UPDATES"),
            seed: env.parse_opt("FUNGUS_SEED")?,
        })
    }

    /// The tag the agent starts out announcing on.
    pub fn primary_tag(&self) -> &str {
        self.discovery_tags
            .first()
            .map_or(crate::feedback::DEFAULT_TRIGGER, String::as_str)
    }
}

struct Lookup<L>(L);

impl<L: Fn(&str) -> Option<String>> Lookup<L> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn parse_opt<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| ConfigError::invalid(key, format!("'{raw}': {e}")))
            })
            .transpose()
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }

    fn seconds(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .parse_opt::<u64>(key)?
            .map_or(default, Duration::from_secs))
    }

    fn flag(&self, key: &str) -> bool {
        self.optional(key).is_some_and(|v| {
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        })
    }

    fn url(&self, key: &str, default: Option<&str>) -> Result<String, ConfigError> {
        let raw = match (self.optional(key), default) {
            (Some(raw), _) => raw,
            (None, Some(default)) => default.to_string(),
            (None, None) => return Err(ConfigError::Missing(key.to_string())),
        };
        let parsed = Url::parse(&raw).map_err(|e| ConfigError::invalid(key, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(key, "expected an http(s) URL"));
        }
        Ok(raw.trim_end_matches('/').to_string())
    }

    fn tags(&self) -> Result<Vec<String>, ConfigError> {
        let raw = self
            .optional("FUNGUS_TAGS")
            .or_else(|| self.optional("NUTRIAL_TAG"))
            .ok_or_else(|| ConfigError::Missing("FUNGUS_TAGS".to_string()))?;
        let mut tags: Vec<String> = Vec::new();
        for tag in raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(|t| t.trim_start_matches('#'))
            .filter(|t| !t.is_empty())
        {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        if tags.is_empty() {
            return Err(ConfigError::invalid("FUNGUS_TAGS", "no usable tag"));
        }
        Ok(tags)
    }
}

fn unit_interval(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, format!("{value} is outside [0, 1]")))
    }
}

fn non_empty(key: &str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::invalid(key, "must not be empty"))
    } else {
        Ok(value)
    }
}
