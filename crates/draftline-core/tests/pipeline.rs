//! End-to-end scenarios through the public crate surface.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use draftline_core::aggregator::{Aggregator, AggregatorConfig};
use draftline_core::circuit_breaker::{BreakerConfig, CircuitBreaker};
use draftline_core::models::Timeframe;
use draftline_core::orchestrator::{OrchestratorConfig, PipelineOrchestrator};
use draftline_core::ranking::RankingEngine;
use draftline_core::retry::RetryPolicy;
use draftline_core::run::{RunOutcome, Stage};
use draftline_core::schedule::{ScheduleRule, run_on_schedule};
use draftline_core::testutil::{
    MockSource, RecordingHistory, StubAnalyst, StubPublisher, StubResearcher, StubWriter,
    raw_record,
};
use draftline_core::traits::SourceClient;

fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts: attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential: false,
    }
}

fn consensus_sources() -> Vec<Arc<dyn SourceClient>> {
    let mut sleeper_records = vec![raw_record("sleeper", "Player X", "TB", "RB", 100)];
    let espn_records = vec![raw_record("espn", "Player X", "TB", "RB", 50)];
    for i in 0..15 {
        sleeper_records.push(raw_record(
            "sleeper",
            &format!("Bench Player {i}"),
            "NE",
            "WR",
            30 + i,
        ));
    }
    vec![
        Arc::new(MockSource::ok("sleeper", sleeper_records)),
        Arc::new(MockSource::ok("espn", espn_records)),
    ]
}

fn aggregator(sources: Vec<Arc<dyn SourceClient>>, breaker: CircuitBreaker) -> Arc<Aggregator> {
    Arc::new(Aggregator::new(
        sources,
        AggregatorConfig {
            minimum_successful_sources: 2,
            merged_ttl: Duration::from_secs(60),
            cache_capacity: 16,
            retry: fast_retry(2),
        },
        breaker,
    ))
}

#[tokio::test]
async fn cross_source_consensus_wins_the_top_spot() {
    let breaker = CircuitBreaker::default();
    let agg = aggregator(consensus_sources(), breaker);

    let merged = agg.collect(Timeframe::Week).await.unwrap();
    let outcome = RankingEngine::default().select_top_n(&merged);

    let top = &outcome.summaries[0];
    assert_eq!(top.display_name, "Player X");
    assert_eq!(top.rank, 1);
    assert_eq!(top.total_added_count, 150);
    assert_eq!(top.contributing_sources.len(), 2);
    assert_eq!(outcome.summaries.len(), 10);
}

#[tokio::test]
async fn full_pipeline_runs_collect_through_publish() {
    let breaker = CircuitBreaker::default();
    let agg = aggregator(consensus_sources(), breaker.clone());

    let history = Arc::new(RecordingHistory::new());
    let publisher = Arc::new(StubPublisher::new());
    let orchestrator = PipelineOrchestrator::new(
        agg,
        RankingEngine::default(),
        Arc::new(StubResearcher::new()),
        Arc::new(StubAnalyst::new()),
        Arc::new(StubWriter::new()),
        publisher.clone(),
        history.clone(),
        breaker,
        OrchestratorConfig {
            timeframe: Timeframe::Week,
            stage_retry: fast_retry(2),
            stop_poll_interval: Duration::from_millis(10),
            stop_poll_limit: 10,
        },
    );

    let run = orchestrator.run_pipeline().await.unwrap();

    assert_eq!(run.outcome, RunOutcome::Completed);
    assert_eq!(run.stages_completed.len(), 5);
    assert!(run.published_artifact_id.is_some());
    assert_eq!(publisher.calls(), 1);

    let recorded = history.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn repeated_stage_failures_open_the_breaker_across_runs() {
    let breaker = CircuitBreaker::new(BreakerConfig {
        failure_threshold: 3,
        failure_window: Duration::from_secs(300),
    });
    let agg = aggregator(consensus_sources(), breaker.clone());

    let researcher = Arc::new(StubResearcher::failing_times(u32::MAX));
    let orchestrator = PipelineOrchestrator::new(
        agg,
        RankingEngine::default(),
        researcher.clone(),
        Arc::new(StubAnalyst::new()),
        Arc::new(StubWriter::new()),
        Arc::new(StubPublisher::new()),
        Arc::new(RecordingHistory::new()),
        breaker.clone(),
        OrchestratorConfig {
            timeframe: Timeframe::Week,
            stage_retry: fast_retry(1),
            stop_poll_interval: Duration::from_millis(10),
            stop_poll_limit: 10,
        },
    );

    for _ in 0..3 {
        let run = orchestrator.run_pipeline().await.unwrap();
        assert_eq!(run.outcome, RunOutcome::Failed);
    }
    assert_eq!(researcher.calls(), 3);
    assert!(breaker.is_open(&Stage::Research.operation()));

    // The fourth run fails fast without touching the researcher.
    let run = orchestrator.run_pipeline().await.unwrap();
    assert_eq!(run.outcome, RunOutcome::Failed);
    assert_eq!(researcher.calls(), 3);
    assert!(run.errors[0].contains("circuit breaker"));
}

#[tokio::test]
async fn schedule_loop_stops_on_cancellation() {
    let breaker = CircuitBreaker::default();
    let agg = aggregator(consensus_sources(), breaker.clone());
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        agg,
        RankingEngine::default(),
        Arc::new(StubResearcher::new()),
        Arc::new(StubAnalyst::new()),
        Arc::new(StubWriter::new()),
        Arc::new(StubPublisher::new()),
        Arc::new(RecordingHistory::new()),
        breaker,
        OrchestratorConfig::default(),
    ));

    let rule = ScheduleRule::new(
        chrono::Weekday::Tue,
        9,
        chrono::FixedOffset::east_opt(0).unwrap(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    let handle = run_on_schedule(orchestrator, rule, cancel.clone());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("schedule loop should stop promptly")
        .unwrap();
}
