//! Seams between the core and its collaborators.
//!
//! [`SourceClient`] is object-safe because the aggregator holds a
//! heterogeneous set of providers behind `Arc<dyn SourceClient>`. The
//! pipeline collaborators are generic parameters on the orchestrator,
//! so they stay plain traits returning futures.

use std::future::Future;

use async_trait::async_trait;

use crate::content::{Analysis, Draft, PublishReceipt, ResearchBundle};
use crate::error::AppError;
use crate::models::{PlayerInfo, RankedSummary, RawAdditionRecord, Timeframe};
use crate::run::PipelineRun;

/// One upstream fantasy data provider.
///
/// Implementations wrap their own rate limiter and response cache;
/// callers never see either. Every method may suspend while a rate
/// limit window drains.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Stable provider name, used for breaker keys and merge metadata.
    fn name(&self) -> &str;

    /// Disabled sources are skipped by the aggregator without counting
    /// against quorum.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Establishes credentials. Public sources return `Ok` immediately.
    async fn authenticate(&self) -> Result<(), AppError>;

    fn is_authenticated(&self) -> bool;

    async fn fetch_most_added(
        &self,
        timeframe: Timeframe,
    ) -> Result<Vec<RawAdditionRecord>, AppError>;

    async fn fetch_player_info(&self, external_player_id: &str) -> Result<PlayerInfo, AppError>;
}

/// Gathers supporting material for the ranked players.
pub trait Researcher: Send + Sync {
    fn gather_research(
        &self,
        summaries: &[RankedSummary],
    ) -> impl Future<Output = Result<Vec<ResearchBundle>, AppError>> + Send;
}

/// Turns one research bundle into an editorial analysis.
pub trait Analyst: Send + Sync {
    fn analyze(
        &self,
        bundle: &ResearchBundle,
    ) -> impl Future<Output = Result<Analysis, AppError>> + Send;
}

/// Composes the analyses into a publishable draft.
pub trait Writer: Send + Sync {
    fn compose(
        &self,
        analyses: &[Analysis],
    ) -> impl Future<Output = Result<Draft, AppError>> + Send;
}

/// Delivers a draft to the publishing platform.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        draft: &Draft,
    ) -> impl Future<Output = Result<PublishReceipt, AppError>> + Send;
}

/// Stores finalized run records.
pub trait HistoryStore: Send + Sync {
    fn record(&self, run: &PipelineRun) -> impl Future<Output = Result<(), AppError>> + Send;

    fn list(&self, limit: usize) -> impl Future<Output = Result<Vec<PipelineRun>, AppError>> + Send;
}

// Shared handles delegate, so callers can keep a reference to a
// collaborator after handing it to the orchestrator.

impl<T: Researcher> Researcher for std::sync::Arc<T> {
    fn gather_research(
        &self,
        summaries: &[RankedSummary],
    ) -> impl Future<Output = Result<Vec<ResearchBundle>, AppError>> + Send {
        T::gather_research(self, summaries)
    }
}

impl<T: Analyst> Analyst for std::sync::Arc<T> {
    fn analyze(
        &self,
        bundle: &ResearchBundle,
    ) -> impl Future<Output = Result<Analysis, AppError>> + Send {
        T::analyze(self, bundle)
    }
}

impl<T: Writer> Writer for std::sync::Arc<T> {
    fn compose(
        &self,
        analyses: &[Analysis],
    ) -> impl Future<Output = Result<Draft, AppError>> + Send {
        T::compose(self, analyses)
    }
}

impl<T: Publisher> Publisher for std::sync::Arc<T> {
    fn publish(
        &self,
        draft: &Draft,
    ) -> impl Future<Output = Result<PublishReceipt, AppError>> + Send {
        T::publish(self, draft)
    }
}

impl<T: HistoryStore> HistoryStore for std::sync::Arc<T> {
    fn record(&self, run: &PipelineRun) -> impl Future<Output = Result<(), AppError>> + Send {
        T::record(self, run)
    }

    fn list(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PipelineRun>, AppError>> + Send {
        T::list(self, limit)
    }
}
