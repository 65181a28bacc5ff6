//! Pipeline orchestrator: five stages, run strictly in order.
//!
//! Every stage goes through the same gate: breaker check, bounded
//! retry, breaker bookkeeping. A stage that fails after its retries
//! aborts the run; later stages never partially apply. Cancellation is
//! cooperative and takes effect between stages, so an in-flight stage
//! always finishes its current attempt.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::error::AppError;
use crate::models::Timeframe;
use crate::ranking::RankingEngine;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::run::{PipelineRun, PipelineStatus, RunOutcome, Stage};
use crate::traits::{Analyst, HistoryStore, Publisher, Researcher, Writer};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub timeframe: Timeframe,
    /// Retry policy applied to every stage.
    pub stage_retry: RetryPolicy,
    pub stop_poll_interval: Duration,
    /// How many polls `stop_and_wait` makes before giving up.
    pub stop_poll_limit: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::Week,
            stage_retry: RetryPolicy::default(),
            stop_poll_interval: Duration::from_secs(1),
            stop_poll_limit: 30,
        }
    }
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    current_stage: Option<Stage>,
    progress_percent: u8,
    last_outcome: Option<RunOutcome>,
    cancel: Option<CancellationToken>,
}

pub struct PipelineOrchestrator<R, A, W, P, H> {
    aggregator: Arc<Aggregator>,
    ranking: RankingEngine,
    researcher: R,
    analyst: A,
    writer: W,
    publisher: P,
    history: H,
    breaker: CircuitBreaker,
    config: OrchestratorConfig,
    state: Arc<Mutex<RunState>>,
}

impl<R, A, W, P, H> PipelineOrchestrator<R, A, W, P, H>
where
    R: Researcher,
    A: Analyst,
    W: Writer,
    P: Publisher,
    H: HistoryStore,
{
    /// The breaker registry must be the same instance the aggregator
    /// records into, so source and stage state share one map.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        aggregator: Arc<Aggregator>,
        ranking: RankingEngine,
        researcher: R,
        analyst: A,
        writer: W,
        publisher: P,
        history: H,
        breaker: CircuitBreaker,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            aggregator,
            ranking,
            researcher,
            analyst,
            writer,
            publisher,
            history,
            breaker,
            config,
            state: Arc::new(Mutex::new(RunState::default())),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("orchestrator recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    pub fn status(&self) -> PipelineStatus {
        let state = self.lock_state();
        PipelineStatus {
            is_running: state.running,
            current_stage: state.current_stage,
            progress_percent: state.progress_percent,
            last_outcome: state.last_outcome,
        }
    }

    pub fn breaker_stats(&self) -> std::collections::HashMap<String, BreakerSnapshot> {
        self.breaker.stats()
    }

    /// Asks the active run to stop at the next stage boundary. No-op
    /// when nothing is running.
    pub fn request_stop(&self) {
        let state = self.lock_state();
        match &state.cancel {
            Some(token) => {
                tracing::info!("pipeline stop requested");
                token.cancel();
            }
            None => tracing::debug!("stop requested with no active run"),
        }
    }

    /// Requests a stop and polls until the run ends or the poll budget
    /// is spent. Returns whether the pipeline is idle.
    pub async fn stop_and_wait(&self) -> bool {
        self.request_stop();
        for _ in 0..self.config.stop_poll_limit {
            if !self.status().is_running {
                return true;
            }
            tokio::time::sleep(self.config.stop_poll_interval).await;
        }
        !self.status().is_running
    }

    /// Runs the full stage sequence. Returns the finalized run record
    /// for every outcome; the only error is a second run requested
    /// while one is active.
    pub async fn run_pipeline(&self) -> Result<PipelineRun, AppError> {
        let cancel = CancellationToken::new();
        {
            let mut state = self.lock_state();
            if state.running {
                return Err(AppError::PipelineBusy);
            }
            state.running = true;
            state.current_stage = Some(Stage::Collect);
            state.progress_percent = 0;
            state.cancel = Some(cancel.clone());
        }

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(run_id = %id, timeframe = %self.config.timeframe, "pipeline run started");

        let mut stages_completed = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let (outcome, artifact_id) = self
            .execute(&cancel, &mut stages_completed, &mut errors, &mut warnings)
            .await;

        let run = PipelineRun {
            id,
            timeframe: self.config.timeframe,
            started_at,
            ended_at: Utc::now(),
            outcome,
            stages_completed,
            errors,
            warnings,
            published_artifact_id: artifact_id,
        };

        {
            let mut state = self.lock_state();
            state.running = false;
            state.current_stage = None;
            if outcome == RunOutcome::Completed {
                state.progress_percent = 100;
            }
            state.last_outcome = Some(outcome);
            state.cancel = None;
        }
        tracing::info!(
            run_id = %id,
            outcome = %run.outcome,
            stages = run.stages_completed.len(),
            "pipeline run finished"
        );

        if let Err(err) = self.history.record(&run).await {
            tracing::error!(run_id = %id, error = %err, "failed to record run in history");
        }
        Ok(run)
    }

    /// The stage sequence proper. Returns the terminal outcome and the
    /// published artifact id, if any.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        stages_completed: &mut Vec<Stage>,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> (RunOutcome, Option<String>) {
        if self.stop_requested(cancel, Stage::Collect) {
            return (RunOutcome::StoppedByUser, None);
        }
        self.enter_stage(Stage::Collect);
        let ranked = match self
            .guarded(Stage::Collect, || async {
                let records = self.aggregator.collect(self.config.timeframe).await?;
                Ok(self.ranking.select_top_n(&records))
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                errors.push(format!("collect: {err}"));
                return (RunOutcome::Failed, None);
            }
        };
        warnings.extend(ranked.warnings);
        let summaries = ranked.summaries;
        stages_completed.push(Stage::Collect);
        tracing::info!(players = summaries.len(), "collect stage completed");

        if self.stop_requested(cancel, Stage::Research) {
            return (RunOutcome::StoppedByUser, None);
        }
        self.enter_stage(Stage::Research);
        let bundles = match self
            .guarded(Stage::Research, || {
                self.researcher.gather_research(&summaries)
            })
            .await
        {
            Ok(bundles) => bundles,
            Err(err) => {
                errors.push(format!("research: {err}"));
                return (RunOutcome::Failed, None);
            }
        };
        stages_completed.push(Stage::Research);

        if self.stop_requested(cancel, Stage::Analyze) {
            return (RunOutcome::StoppedByUser, None);
        }
        self.enter_stage(Stage::Analyze);
        let analyses = match self
            .guarded(Stage::Analyze, || async {
                let mut analyses = Vec::with_capacity(bundles.len());
                for bundle in &bundles {
                    analyses.push(self.analyst.analyze(bundle).await?);
                }
                Ok(analyses)
            })
            .await
        {
            Ok(analyses) => analyses,
            Err(err) => {
                errors.push(format!("analyze: {err}"));
                return (RunOutcome::Failed, None);
            }
        };
        stages_completed.push(Stage::Analyze);

        if self.stop_requested(cancel, Stage::Write) {
            return (RunOutcome::StoppedByUser, None);
        }
        self.enter_stage(Stage::Write);
        let draft = match self
            .guarded(Stage::Write, || self.writer.compose(&analyses))
            .await
        {
            Ok(draft) => draft,
            Err(err) => {
                errors.push(format!("write: {err}"));
                return (RunOutcome::Failed, None);
            }
        };
        stages_completed.push(Stage::Write);

        if self.stop_requested(cancel, Stage::Publish) {
            return (RunOutcome::StoppedByUser, None);
        }
        self.enter_stage(Stage::Publish);
        let receipt = match self
            .guarded(Stage::Publish, || self.publisher.publish(&draft))
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                errors.push(format!("publish: {err}"));
                return (RunOutcome::Failed, None);
            }
        };
        stages_completed.push(Stage::Publish);
        tracing::info!(artifact_id = %receipt.artifact_id, "publish stage completed");

        (RunOutcome::Completed, Some(receipt.artifact_id))
    }

    fn stop_requested(&self, cancel: &CancellationToken, next: Stage) -> bool {
        if cancel.is_cancelled() {
            tracing::info!(stage = %next, "stopping run before stage");
            return true;
        }
        false
    }

    fn enter_stage(&self, stage: Stage) {
        let mut state = self.lock_state();
        state.current_stage = Some(stage);
        state.progress_percent = (stage.index() * 100 / Stage::ALL.len()) as u8;
        tracing::debug!(stage = %stage, "entering stage");
    }

    /// Breaker gate plus bounded retry for one stage. A fail-fast on an
    /// open breaker is not recorded as a new failure; a final stage
    /// failure always is.
    async fn guarded<T, F, Fut>(&self, stage: Stage, op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let operation = stage.operation();
        self.breaker.guard(&operation)?;

        let result = retry_with_backoff(&self.config.stage_retry, &operation, op).await;
        match &result {
            Ok(_) => self.breaker.record_success(&operation),
            Err(err) => {
                tracing::warn!(stage = %stage, error = %err, "stage failed");
                self.breaker.record_failure(&operation);
            }
        }
        result
    }
}
