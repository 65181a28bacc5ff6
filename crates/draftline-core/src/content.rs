//! Artifacts handed between pipeline stages.
//!
//! These are the wire contracts for the external collaborators: the
//! research, analysis, writing, and publishing stages all consume and
//! produce these shapes. They carry no behavior beyond construction
//! helpers, and once a stage emits one it is never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::RankedSummary;

/// One piece of supporting material gathered for a ranked player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchNote {
    /// Where the note came from, e.g. a stat feed or news wire.
    pub source: String,
    pub headline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Everything the research stage collected for a single ranked player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchBundle {
    pub summary: RankedSummary,
    pub notes: Vec<ResearchNote>,
    pub gathered_at: DateTime<Utc>,
}

/// Editorial stance the analysis stage assigns to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongAdd,
    SpeculativeAdd,
    Monitor,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::StrongAdd => "strong add",
            Recommendation::SpeculativeAdd => "speculative add",
            Recommendation::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the analysis stage for one research bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub canonical_key: String,
    pub display_name: String,
    /// One-line narrative hook for the write stage.
    pub angle: String,
    pub key_points: Vec<String>,
    pub recommendation: Recommendation,
}

/// Composed article produced by the write stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub title: String,
    pub body_markdown: String,
    pub player_count: usize,
    pub composed_at: DateTime<Utc>,
}

/// Acknowledgement returned by a successful publish. Publish failures
/// are errors, not a flag on this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
}
