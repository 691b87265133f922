//! Runtime configuration for the planner and the generative backend.
//!
//! Both structs deserialize from the `[planner]` and `[provider]` sections
//! of the CLI config file; every field has a default.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Category used when a request names none.
pub const DEFAULT_CATEGORY: &str = "fitness";
/// Language used when a request names none.
pub const DEFAULT_LANGUAGE: &str = "en";
/// Seconds a generated plan stays in the cache.
pub const DEFAULT_PLAN_TTL_SECS: u64 = 60;

/// Planner tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub default_category: String,
    pub default_language: String,
    pub plan_ttl_secs: u64,
    /// Catalog items below this score are never selected.
    pub min_quality: f64,
    /// Minimum exposures before a creator can be flagged.
    pub toxic_min_sample: u32,
    /// Completion rate below which a creator is flagged.
    pub toxic_threshold: f64,
    /// Maximum flagged creators per plan.
    pub toxic_limit: usize,
    /// The curator is asked for `count * candidate_multiplier` items.
    pub candidate_multiplier: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_category: DEFAULT_CATEGORY.to_owned(),
            default_language: DEFAULT_LANGUAGE.to_owned(),
            plan_ttl_secs: DEFAULT_PLAN_TTL_SECS,
            min_quality: 0.7,
            toxic_min_sample: 5,
            toxic_threshold: 0.5,
            toxic_limit: 5,
            candidate_multiplier: 3,
        }
    }
}

impl PlannerConfig {
    pub fn plan_ttl(&self) -> Duration {
        Duration::from_secs(self.plan_ttl_secs)
    }
}

/// Which backend the gateway calls first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    Ollama,
    /// No primary backend; every plan comes from the fallback planner.
    #[default]
    Static,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::Static => "static",
        };
        f.write_str(s)
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "static" | "fallback" => Ok(Self::Static),
            other => Err(ProviderKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ProviderKind`] string.
#[derive(Debug, Clone)]
pub struct ProviderKindParseError(pub String);

impl fmt::Display for ProviderKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid provider: {:?} (expected anthropic, ollama or static)", self.0)
    }
}

impl std::error::Error for ProviderKindParseError {}

/// Backend selection and call policy.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model name; `None` uses the backend's default.
    pub model: Option<String>,
    /// Endpoint override; `None` uses the backend's default.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub max_attempts: u32,
    /// Delay after attempt *n* is `retry_delays_secs[n - 1]`; the last
    /// entry repeats if the list is short.
    pub retry_delays_secs: Vec<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: None,
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            max_tokens: 2048,
            max_attempts: 3,
            retry_delays_secs: vec![2, 4, 8],
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Sleep before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let idx = (attempt.saturating_sub(1)) as usize;
        let secs = self
            .retry_delays_secs
            .get(idx)
            .or(self.retry_delays_secs.last())
            .copied()
            .unwrap_or(0);
        Duration::from_secs(secs)
    }
}

// The API key must not end up in logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delays_secs", &self.retry_delays_secs)
            .finish()
    }
}
