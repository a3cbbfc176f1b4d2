//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://spanner.googleapis.com";

/// How requests are authorized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// Ask the `gcloud` CLI for a fresh access token.
    #[default]
    Gcloud,
    /// A bearer token obtained elsewhere.
    Token(String),
    /// No authorization header, e.g. against a local emulator.
    None,
}

/// Cadence of the operation poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl PollConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms.max(self.initial_interval_ms))
    }

    /// The delay that follows `current`.
    /// Never exceeds `max_interval`, whatever the multiplier.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let max = self.max_interval();
        let next = current.as_secs_f64() * self.multiplier.max(1.0);
        if !next.is_finite() || next >= max.as_secs_f64() {
            return max;
        }
        Duration::try_from_secs_f64(next).map_or(max, |d| d.min(max))
    }
}

fn default_initial_interval_ms() -> u64 {
    1_000
}

fn default_max_interval_ms() -> u64 {
    45_000
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub poll: PollConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            credentials: Credentials::default(),
            request_timeout_secs: default_request_timeout_secs(),
            poll: PollConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Reads `SPANNER_EMULATOR_HOST`, `API_ENDPOINT` and
    /// `SPANNER_ACCESS_TOKEN` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("SPANNER_EMULATOR_HOST").filter(|h| !h.is_empty()) {
            config.endpoint = with_scheme(&host, "http");
            config.credentials = Credentials::None;
            return config;
        }
        if let Some(endpoint) = lookup("API_ENDPOINT").filter(|e| !e.is_empty()) {
            config.endpoint = with_scheme(&endpoint, "https");
        }
        if let Some(token) = lookup("SPANNER_ACCESS_TOKEN").filter(|t| !t.is_empty()) {
            config.credentials = Credentials::Token(token);
        }
        config
    }

    /// Like `from_env`, with `endpoint` taking the place of `API_ENDPOINT`.
    /// The emulator host still wins.
    pub fn from_env_with_endpoint(endpoint: Option<&str>) -> Self {
        Self::from_lookup_with_endpoint(|key| std::env::var(key).ok(), endpoint)
    }

    pub fn from_lookup_with_endpoint(
        lookup: impl Fn(&str) -> Option<String>,
        endpoint: Option<&str>,
    ) -> Self {
        let emulator = lookup("SPANNER_EMULATOR_HOST").is_some_and(|h| !h.is_empty());
        let config = Self::from_lookup(lookup);
        match endpoint {
            Some(endpoint) if !emulator => config.with_endpoint(endpoint),
            _ => config,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = with_scheme(endpoint, "https");
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `{endpoint}/v1`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}/v1", self.endpoint.trim_end_matches('/'))
    }
}

fn with_scheme(endpoint: &str, scheme: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("{scheme}://{endpoint}")
    }
}
