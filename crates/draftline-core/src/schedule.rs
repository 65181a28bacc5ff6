//! Recurring calendar trigger for pipeline runs.
//!
//! One rule, one loop: sleep until the next (weekday, hour) in the
//! rule's UTC offset, fire, repeat. A trigger that lands while a run is
//! active is skipped and logged, never queued. Run failures are logged
//! and the loop keeps going; nothing thrown by a run can take the
//! scheduler down.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Utc, Weekday};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::orchestrator::PipelineOrchestrator;
use crate::traits::{Analyst, HistoryStore, Publisher, Researcher, Writer};

/// Fire on this weekday, at the top of this hour, in this UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRule {
    pub weekday: Weekday,
    pub hour: u32,
    pub utc_offset: FixedOffset,
}

impl ScheduleRule {
    pub fn new(weekday: Weekday, hour: u32, utc_offset: FixedOffset) -> Result<Self, AppError> {
        if hour > 23 {
            return Err(AppError::Config(format!(
                "schedule hour {hour} out of range 0-23"
            )));
        }
        Ok(Self {
            weekday,
            hour,
            utc_offset,
        })
    }

    /// First trigger time strictly after `after`.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let local = after.with_timezone(&self.utc_offset);
        let days_ahead = (self.weekday.num_days_from_monday() as i64
            - local.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        let date = local.date_naive() + chrono::Duration::days(days_ahead);

        let candidate = date
            .and_hms_opt(self.hour, 0, 0)
            .and_then(|naive| naive.and_local_timezone(self.utc_offset).single())
            .map(|local| local.with_timezone(&Utc))
            // Unreachable with a validated hour and a fixed offset.
            .unwrap_or(after + chrono::Duration::days(7));

        if candidate <= after {
            candidate + chrono::Duration::days(7)
        } else {
            candidate
        }
    }
}

/// Spawns the trigger loop. Cancel the token to stop it; the returned
/// handle resolves once the loop has exited.
pub fn run_on_schedule<R, A, W, P, H>(
    orchestrator: Arc<PipelineOrchestrator<R, A, W, P, H>>,
    rule: ScheduleRule,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    R: Researcher + 'static,
    A: Analyst + 'static,
    W: Writer + 'static,
    P: Publisher + 'static,
    H: HistoryStore + 'static,
{
    tokio::spawn(async move {
        tracing::info!(weekday = ?rule.weekday, hour = rule.hour, "pipeline schedule active");
        loop {
            let now = Utc::now();
            let next = rule.next_occurrence(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next = %next, wait_secs = wait.as_secs(), "waiting for next trigger");

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("pipeline schedule stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            if orchestrator.status().is_running {
                tracing::warn!("scheduled trigger skipped, a run is already active");
                continue;
            }
            match orchestrator.run_pipeline().await {
                Ok(run) => {
                    tracing::info!(
                        run_id = %run.id,
                        outcome = %run.outcome,
                        "scheduled run finished"
                    );
                }
                Err(err) => {
                    tracing::error!(error = %err, "scheduled run was rejected");
                }
            }
        }
    })
}
