use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static configuration for a single provider. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Short provider id, e.g. "sleeper". Used as the breaker operation
    /// suffix and as `RawAdditionRecord::source`.
    pub name: String,
    pub base_url: String,
    pub rate_limit: RateLimitConfig,
    pub enabled: bool,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            rate_limit: RateLimitConfig::default(),
            enabled: true,
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Admission limits for one provider, enforced independently per window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 1000,
        }
    }
}

/// Lookback window for a most-added query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    Week,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
        }
    }

    /// Lookback expressed in hours, for providers that take an hour count.
    pub fn lookback_hours(&self) -> u32 {
        match self {
            Timeframe::Day => 24,
            Timeframe::Week => 168,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Timeframe::Day),
            "week" => Ok(Timeframe::Week),
            _ => Err(format!("unknown timeframe: {s}")),
        }
    }
}

/// One provider's observation of a player's add volume.
///
/// Produced by a `SourceClient` fetch and never mutated afterwards; the
/// name/position/team fields are the provider's raw spelling until the
/// aggregator normalizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAdditionRecord {
    pub source: String,
    pub external_player_id: String,
    pub display_name: String,
    pub position: String,
    pub team: String,
    pub added_count: u64,
    pub observed_at: DateTime<Utc>,
}

/// Player metadata returned by `fetch_player_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub external_player_id: String,
    pub display_name: String,
    pub position: String,
    pub team: String,
    /// Provider-reported roster status ("Active", "IR", ...) when known.
    pub status: Option<String>,
}

/// The cross-source view of one player within a collection cycle.
///
/// Built by folding `RawAdditionRecord`s that share a canonical key:
/// counts add, timestamps take the max, sources accumulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedPlayerRecord {
    pub canonical_key: String,
    pub display_name: String,
    pub position: String,
    pub team: String,
    pub total_added_count: u64,
    pub contributing_sources: BTreeSet<String>,
    pub most_recent_observed_at: DateTime<Utc>,
}

/// Momentum bucket assigned during ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendingStatus {
    Hot,
    Rising,
    Steady,
}

impl TrendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendingStatus::Hot => "hot",
            TrendingStatus::Rising => "rising",
            TrendingStatus::Steady => "steady",
        }
    }
}

impl fmt::Display for TrendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ranked entry in the top-N output. Immutable once emitted; rank and
/// score are pure functions of the collected batch and are recomputed
/// every cycle, never persisted incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSummary {
    pub canonical_key: String,
    pub display_name: String,
    pub position: String,
    pub team: String,
    pub total_added_count: u64,
    pub contributing_sources: BTreeSet<String>,
    pub most_recent_observed_at: DateTime<Utc>,
    /// Estimated share of leagues that added this player. The ranking
    /// engine implies the denominator from the largest observed add
    /// count; it is an approximation, not a measurement.
    pub addition_percentage: f64,
    pub composite_score: f64,
    /// Dense 1-based rank within the emitted list.
    pub rank: u32,
    /// Add volume relative to the top entry, rounded to whole percent.
    pub relative_popularity: u32,
    pub trending_status: TrendingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_roundtrip() {
        for tf in [Timeframe::Day, Timeframe::Week] {
            let parsed: Timeframe = tf.as_str().parse().unwrap();
            assert_eq!(parsed, tf);
        }
        assert!("fortnight".parse::<Timeframe>().is_err());
    }

    #[test]
    fn timeframe_lookback_hours() {
        assert_eq!(Timeframe::Day.lookback_hours(), 24);
        assert_eq!(Timeframe::Week.lookback_hours(), 168);
    }

    #[test]
    fn source_config_builder() {
        let config = SourceConfig::new("sleeper", "https://api.sleeper.app")
            .with_rate_limit(RateLimitConfig {
                per_minute: 10,
                per_hour: 100,
            });
        assert!(config.enabled);
        assert_eq!(config.rate_limit.per_minute, 10);
        assert!(!config.disabled().enabled);
    }

    #[test]
    fn trending_status_serializes_lowercase() {
        let json = serde_json::to_string(&TrendingStatus::Hot).unwrap();
        assert_eq!(json, "\"hot\"");
    }
}
