//! Core aggregation and pipeline machinery for draftline.
//!
//! The crate is organized leaf-first: [`rate_limit`], [`cache`], and
//! [`circuit_breaker`] are the resilience primitives; [`aggregator`]
//! fans out over the [`traits::SourceClient`] implementations and
//! merges what comes back; [`ranking`] turns merged records into a
//! bounded top-N; [`orchestrator`] drives the five content stages and
//! [`schedule`] triggers runs on a calendar rule.

pub mod aggregator;
pub mod cache;
pub mod circuit_breaker;
pub mod content;
pub mod error;
pub mod history;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod ranking;
pub mod rate_limit;
pub mod retry;
pub mod run;
pub mod schedule;
pub mod testutil;
pub mod traits;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use circuit_breaker::{BreakerConfig, CircuitBreaker};
pub use error::AppError;
pub use models::{MergedPlayerRecord, RankedSummary, SourceConfig, Timeframe};
pub use orchestrator::{OrchestratorConfig, PipelineOrchestrator};
pub use ranking::{RankingConfig, RankingEngine, RankingOutcome};
pub use run::{PipelineRun, PipelineStatus, RunOutcome, Stage};
pub use schedule::{ScheduleRule, run_on_schedule};
