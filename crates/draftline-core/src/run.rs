//! Pipeline run records and execution status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Timeframe;

/// The fixed stage sequence every pipeline run walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Collect,
    Research,
    Analyze,
    Write,
    Publish,
}

impl Stage {
    /// Execution order. The orchestrator iterates this, never a
    /// caller-supplied list.
    pub const ALL: [Stage; 5] = [
        Stage::Collect,
        Stage::Research,
        Stage::Analyze,
        Stage::Write,
        Stage::Publish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Collect => "collect",
            Stage::Research => "research",
            Stage::Analyze => "analyze",
            Stage::Write => "write",
            Stage::Publish => "publish",
        }
    }

    /// Circuit breaker key for this stage.
    pub fn operation(&self) -> String {
        format!("stage:{}", self.as_str())
    }

    /// 0-based position in [`Stage::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Stage::Collect => 0,
            Stage::Research => 1,
            Stage::Analyze => 2,
            Stage::Write => 3,
            Stage::Publish => 4,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
    StoppedByUser,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::StoppedByUser => "stopped_by_user",
        };
        f.write_str(label)
    }
}

/// Immutable record of one pipeline run, finalized exactly once at run
/// end and handed to the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub timeframe: Timeframe,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub stages_completed: Vec<Stage>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_artifact_id: Option<String>,
}

impl PipelineRun {
    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

/// Point-in-time execution status, safe to poll from any task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub is_running: bool,
    pub current_stage: Option<Stage>,
    /// Whole-run progress in percent, stepping by completed stages.
    pub progress_percent: u8,
    pub last_outcome: Option<RunOutcome>,
}

impl PipelineStatus {
    pub fn idle() -> Self {
        Self {
            is_running: false,
            current_stage: None,
            progress_percent: 0,
            last_outcome: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        let names: Vec<&str> = Stage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["collect", "research", "analyze", "write", "publish"]
        );
        for (position, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), position);
        }
    }

    #[test]
    fn stage_operation_keys_are_namespaced() {
        assert_eq!(Stage::Collect.operation(), "stage:collect");
        assert_eq!(Stage::Publish.operation(), "stage:publish");
    }

    #[test]
    fn run_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&RunOutcome::StoppedByUser).unwrap();
        assert_eq!(json, "\"stopped_by_user\"");
    }
}
