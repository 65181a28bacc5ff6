//! Scripted collaborators for tests.
//!
//! Mocks here respond from a queue of canned replies, repeat the last
//! reply once the queue drains, and count their calls so tests can
//! assert on retry and short-circuit behavior.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::content::{Analysis, Draft, PublishReceipt, Recommendation, ResearchBundle, ResearchNote};
use crate::error::AppError;
use crate::models::{MergedPlayerRecord, PlayerInfo, RankedSummary, RawAdditionRecord, Timeframe};
use crate::normalize::normalize_record;
use crate::run::PipelineRun;
use crate::traits::{Analyst, HistoryStore, Publisher, Researcher, SourceClient, Writer};

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// One canned reply from a [`MockSource`].
#[derive(Debug, Clone)]
pub enum SourceReply {
    Records(Vec<RawAdditionRecord>),
    TransportError(Option<u16>),
    Timeout,
    AuthError,
}

#[derive(Debug, Default)]
struct ReplyScript {
    queue: VecDeque<SourceReply>,
    last: Option<SourceReply>,
}

impl ReplyScript {
    fn next(&mut self) -> SourceReply {
        match self.queue.pop_front() {
            Some(reply) => {
                self.last = Some(reply.clone());
                reply
            }
            None => self
                .last
                .clone()
                .unwrap_or(SourceReply::Records(Vec::new())),
        }
    }
}

/// Scripted [`SourceClient`].
pub struct MockSource {
    name: String,
    enabled: bool,
    script: Mutex<ReplyScript>,
    fetch_count: AtomicU32,
    auth_count: AtomicU32,
}

impl MockSource {
    /// Always returns the given records.
    pub fn ok(name: &str, records: Vec<RawAdditionRecord>) -> Self {
        Self::always(name, SourceReply::Records(records))
    }

    /// Always returns the given reply.
    pub fn always(name: &str, reply: SourceReply) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            script: Mutex::new(ReplyScript {
                queue: VecDeque::new(),
                last: Some(reply),
            }),
            fetch_count: AtomicU32::new(0),
            auth_count: AtomicU32::new(0),
        }
    }

    /// Replies in order, then repeats the final reply.
    pub fn script(name: &str, replies: Vec<SourceReply>) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            script: Mutex::new(ReplyScript {
                queue: replies.into(),
                last: None,
            }),
            fetch_count: AtomicU32::new(0),
            auth_count: AtomicU32::new(0),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn auth_calls(&self) -> u32 {
        self.auth_count.load(Ordering::SeqCst)
    }

    fn materialize(&self, reply: SourceReply) -> Result<Vec<RawAdditionRecord>, AppError> {
        match reply {
            SourceReply::Records(records) => Ok(records),
            SourceReply::TransportError(status) => Err(AppError::Transport {
                source_name: self.name.clone(),
                status,
                message: "mock transport failure".to_string(),
                body: None,
            }),
            SourceReply::Timeout => Err(AppError::Timeout {
                source_name: self.name.clone(),
                seconds: 1,
            }),
            SourceReply::AuthError => Err(AppError::Auth {
                source_name: self.name.clone(),
                reason: "mock auth rejection".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SourceClient for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn authenticate(&self) -> Result<(), AppError> {
        self.auth_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    async fn fetch_most_added(
        &self,
        _timeframe: Timeframe,
    ) -> Result<Vec<RawAdditionRecord>, AppError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let reply = lock_or_recover(&self.script).next();
        self.materialize(reply)
    }

    async fn fetch_player_info(&self, external_player_id: &str) -> Result<PlayerInfo, AppError> {
        Ok(PlayerInfo {
            external_player_id: external_player_id.to_string(),
            display_name: "Mock Player".to_string(),
            position: "RB".to_string(),
            team: "FA".to_string(),
            status: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline stage stubs
// ---------------------------------------------------------------------------

/// Countdown of failures a stub should serve before succeeding.
#[derive(Debug, Default)]
struct FailPlan {
    remaining: AtomicU32,
}

impl FailPlan {
    fn new(failures: u32) -> Self {
        Self {
            remaining: AtomicU32::new(failures),
        }
    }

    fn should_fail(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn stage_timeout(stage: &str) -> AppError {
    AppError::Timeout {
        source_name: stage.to_string(),
        seconds: 1,
    }
}

/// Stub research stage: one bundle per summary, with optional scripted
/// transient failures and an optional per-call delay.
#[derive(Debug, Default)]
pub struct StubResearcher {
    fail_plan: FailPlan,
    delay: Option<Duration>,
    count: AtomicU32,
}

impl StubResearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_times(failures: u32) -> Self {
        Self {
            fail_plan: FailPlan::new(failures),
            delay: None,
            count: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Researcher for StubResearcher {
    async fn gather_research(
        &self,
        summaries: &[RankedSummary],
    ) -> Result<Vec<ResearchBundle>, AppError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_plan.should_fail() {
            return Err(stage_timeout("research"));
        }
        Ok(summaries
            .iter()
            .map(|summary| ResearchBundle {
                summary: summary.clone(),
                notes: vec![ResearchNote {
                    source: "stub".to_string(),
                    headline: format!("{} keeps getting added", summary.display_name),
                    body: None,
                }],
                gathered_at: Utc::now(),
            })
            .collect())
    }
}

/// Stub analysis stage. `rejecting()` fails every call with a
/// non-retryable validation error.
#[derive(Debug, Default)]
pub struct StubAnalyst {
    reject: bool,
    fail_plan: FailPlan,
    count: AtomicU32,
}

impl StubAnalyst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn failing_times(failures: u32) -> Self {
        Self {
            fail_plan: FailPlan::new(failures),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Analyst for StubAnalyst {
    async fn analyze(&self, bundle: &ResearchBundle) -> Result<Analysis, AppError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(AppError::Validation("analysis rejected".to_string()));
        }
        if self.fail_plan.should_fail() {
            return Err(stage_timeout("analyze"));
        }
        Ok(Analysis {
            canonical_key: bundle.summary.canonical_key.clone(),
            display_name: bundle.summary.display_name.clone(),
            angle: format!("{} is trending", bundle.summary.display_name),
            key_points: vec![format!(
                "added {} times",
                bundle.summary.total_added_count
            )],
            recommendation: Recommendation::Monitor,
        })
    }
}

#[derive(Debug, Default)]
pub struct StubWriter {
    count: AtomicU32,
}

impl StubWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Writer for StubWriter {
    async fn compose(&self, analyses: &[Analysis]) -> Result<Draft, AppError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let body = analyses
            .iter()
            .map(|a| format!("## {}\n{}", a.display_name, a.angle))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Draft {
            title: "Most Added Players".to_string(),
            body_markdown: body,
            player_count: analyses.len(),
            composed_at: Utc::now(),
        })
    }
}

#[derive(Debug, Default)]
pub struct StubPublisher {
    fail_plan: FailPlan,
    count: AtomicU32,
}

impl StubPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_times(failures: u32) -> Self {
        Self {
            fail_plan: FailPlan::new(failures),
            count: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Publisher for StubPublisher {
    async fn publish(&self, _draft: &Draft) -> Result<PublishReceipt, AppError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.fail_plan.should_fail() {
            return Err(AppError::Transport {
                source_name: "publisher".to_string(),
                status: Some(502),
                message: "mock publish failure".to_string(),
                body: None,
            });
        }
        Ok(PublishReceipt {
            artifact_id: format!("artifact-{}", self.count.load(Ordering::SeqCst)),
            url: None,
            published_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingHistory
// ---------------------------------------------------------------------------

/// History store that remembers every recorded run.
#[derive(Debug, Default)]
pub struct RecordingHistory {
    runs: Mutex<Vec<PipelineRun>>,
    fail: bool,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every `record` call, for exercising the swallow-and-log
    /// path around history persistence.
    pub fn failing() -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn recorded(&self) -> Vec<PipelineRun> {
        lock_or_recover(&self.runs).clone()
    }
}

impl HistoryStore for RecordingHistory {
    async fn record(&self, run: &PipelineRun) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Transport {
                source_name: "history".to_string(),
                status: None,
                message: "mock history failure".to_string(),
                body: None,
            });
        }
        lock_or_recover(&self.runs).push(run.clone());
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<PipelineRun>, AppError> {
        let runs = lock_or_recover(&self.runs);
        Ok(runs.iter().rev().take(limit).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

/// Builds a raw addition record with a deterministic external id.
pub fn raw_record(
    source: &str,
    name: &str,
    team: &str,
    position: &str,
    count: u64,
) -> RawAdditionRecord {
    RawAdditionRecord {
        source: source.to_string(),
        external_player_id: format!("{source}-{}", name.to_lowercase().replace(' ', "-")),
        display_name: name.to_string(),
        position: position.to_string(),
        team: team.to_string(),
        added_count: count,
        observed_at: Utc::now(),
    }
}

/// Builds a merged record the way the aggregator would, with the given
/// contributing sources.
pub fn merged_record(
    name: &str,
    team: &str,
    position: &str,
    count: u64,
    sources: &[&str],
) -> MergedPlayerRecord {
    let raw = raw_record(sources.first().copied().unwrap_or("test"), name, team, position, count);
    let mut merged = normalize_record(&raw)
        .unwrap_or_else(|| panic!("builder given a malformed record: {name}/{team}/{position}"));
    merged.contributing_sources = sources.iter().map(|s| s.to_string()).collect();
    merged
}
