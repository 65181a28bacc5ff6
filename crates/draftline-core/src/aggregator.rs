//! Resilient multi-source collection.
//!
//! `collect` fans out to every enabled source concurrently, retries
//! each one independently, waits for all of them to settle, and only
//! then decides whether the cycle succeeded. Partial failure is data
//! until the quorum check. A failed quorum falls back to the last
//! cached merge, stale or not, before surfacing an error.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::cache::{CacheStats, TtlCache, TtlCacheConfig};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::AppError;
use crate::models::{MergedPlayerRecord, RawAdditionRecord, Timeframe};
use crate::normalize::normalize_record;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::traits::SourceClient;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Sources that must succeed for a cycle to count.
    pub minimum_successful_sources: usize,
    /// TTL on the cached merged result.
    pub merged_ttl: Duration,
    pub cache_capacity: usize,
    /// Per-source retry policy. Retries for one source never delay
    /// another.
    pub retry: RetryPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            minimum_successful_sources: 2,
            merged_ttl: Duration::from_secs(600),
            cache_capacity: 16,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Aggregator {
    sources: Vec<Arc<dyn SourceClient>>,
    cache: TtlCache<String, Vec<MergedPlayerRecord>>,
    breaker: CircuitBreaker,
    config: AggregatorConfig,
}

impl Aggregator {
    /// The breaker registry is shared with the orchestrator, so pass a
    /// clone of the process-wide instance.
    pub fn new(
        sources: Vec<Arc<dyn SourceClient>>,
        config: AggregatorConfig,
        breaker: CircuitBreaker,
    ) -> Self {
        let cache = TtlCache::new(TtlCacheConfig {
            capacity: config.cache_capacity,
            default_ttl: config.merged_ttl,
        });
        Self {
            sources,
            cache,
            breaker,
            config,
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn enabled_source_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_enabled()).count()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn merged_key(timeframe: Timeframe) -> String {
        format!("merged:{timeframe}")
    }

    /// Runs one collection cycle and returns the merged, deduplicated
    /// records. A fresh cached merge short-circuits the fan-out.
    pub async fn collect(
        &self,
        timeframe: Timeframe,
    ) -> Result<Vec<MergedPlayerRecord>, AppError> {
        let key = Self::merged_key(timeframe);
        if let Some(cached) = self.cache.get_if_fresh(&key) {
            tracing::debug!(%timeframe, records = cached.len(), "serving cached merged results");
            return Ok(cached);
        }

        let enabled: Vec<Arc<dyn SourceClient>> = self
            .sources
            .iter()
            .filter(|s| s.is_enabled())
            .cloned()
            .collect();
        tracing::info!(%timeframe, sources = enabled.len(), "collecting most-added players");

        let mut names = Vec::with_capacity(enabled.len());
        let mut handles = Vec::with_capacity(enabled.len());
        for source in enabled {
            names.push(source.name().to_string());
            let breaker = self.breaker.clone();
            let retry = self.config.retry.clone();
            handles.push(tokio::spawn(async move {
                fetch_one(source, timeframe, breaker, retry).await
            }));
        }

        // All-settled barrier: every source finishes or fails on its
        // own before the quorum decision.
        let mut successes: Vec<Vec<RawAdditionRecord>> = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(records)) => {
                    tracing::debug!(
                        source = %name,
                        records = records.len(),
                        "source fetch succeeded"
                    );
                    successes.push(records);
                }
                Ok(Err(err)) => {
                    tracing::warn!(source = %name, error = %err, "source fetch failed");
                }
                Err(join_err) => {
                    tracing::error!(source = %name, error = %join_err, "source fetch task aborted");
                }
            }
        }

        let required = self.config.minimum_successful_sources;
        if successes.len() < required {
            tracing::warn!(
                successful = successes.len(),
                required,
                "quorum not met, attempting stale cache fallback"
            );
            if let Some(stale) = self.cache.get_stale(&key) {
                tracing::info!(%timeframe, records = stale.len(), "serving stale merged results");
                return Ok(stale);
            }
            return Err(AppError::QuorumNotMet {
                successful: successes.len(),
                required,
            });
        }

        let merged = merge_records(successes.into_iter().flatten());
        if merged.is_empty() {
            // Quorum met but nothing usable came back. An empty slate
            // of additions is an upstream anomaly, not a valid result.
            return Err(AppError::NoData);
        }

        tracing::info!(%timeframe, players = merged.len(), "merged addition records");
        self.cache
            .set(key, merged.clone(), Some(self.config.merged_ttl));
        Ok(merged)
    }
}

/// One source's full fetch path: breaker gate, then bounded retry, then
/// breaker bookkeeping. Breaker-open skips are not new failures.
async fn fetch_one(
    source: Arc<dyn SourceClient>,
    timeframe: Timeframe,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
) -> Result<Vec<RawAdditionRecord>, AppError> {
    let operation = format!("source:{}", source.name());
    breaker.guard(&operation)?;

    let result = retry_with_backoff(&retry, &operation, || {
        let source = Arc::clone(&source);
        async move { source.fetch_most_added(timeframe).await }
    })
    .await;

    match &result {
        Ok(_) => breaker.record_success(&operation),
        Err(err) if err.should_trip_circuit() => breaker.record_failure(&operation),
        Err(_) => {}
    }
    result
}

/// Folds raw records into merged records keyed by canonical key.
/// Commutative and associative: any input permutation produces the
/// same output, including the display-name choice.
pub fn merge_records(
    records: impl IntoIterator<Item = RawAdditionRecord>,
) -> Vec<MergedPlayerRecord> {
    let mut merged: BTreeMap<String, MergedPlayerRecord> = BTreeMap::new();
    for record in records {
        let Some(single) = normalize_record(&record) else {
            tracing::debug!(source = %record.source, "skipping malformed addition record");
            continue;
        };
        match merged.entry(single.canonical_key.clone()) {
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.total_added_count += single.total_added_count;
                existing.most_recent_observed_at = existing
                    .most_recent_observed_at
                    .max(single.most_recent_observed_at);
                existing
                    .contributing_sources
                    .extend(single.contributing_sources);
                // Lexicographically first spelling, so the pick does
                // not depend on source arrival order.
                if single.display_name < existing.display_name {
                    existing.display_name = single.display_name;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(single);
            }
        }
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::BreakerConfig;
    use crate::testutil::{MockSource, SourceReply, raw_record};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            exponential: false,
        }
    }

    fn config(min: usize, ttl: Duration) -> AggregatorConfig {
        AggregatorConfig {
            minimum_successful_sources: min,
            merged_ttl: ttl,
            cache_capacity: 16,
            retry: fast_retry(),
        }
    }

    fn aggregator(sources: Vec<Arc<MockSource>>, cfg: AggregatorConfig) -> Aggregator {
        let sources = sources
            .into_iter()
            .map(|s| s as Arc<dyn SourceClient>)
            .collect();
        Aggregator::new(sources, cfg, CircuitBreaker::default())
    }

    #[tokio::test]
    async fn merges_the_same_player_across_sources() {
        let a = Arc::new(MockSource::ok(
            "sleeper",
            vec![raw_record("sleeper", "Player X", "TB", "RB", 100)],
        ));
        let b = Arc::new(MockSource::ok(
            "espn",
            vec![raw_record("espn", "Player X", "TB", "RB", 50)],
        ));

        let agg = aggregator(vec![a, b], config(2, Duration::from_secs(60)));
        let merged = agg.collect(Timeframe::Week).await.unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].total_added_count, 150);
        assert_eq!(
            merged[0].contributing_sources,
            ["sleeper", "espn"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[tokio::test]
    async fn fresh_cache_short_circuits_the_fan_out() {
        let a = Arc::new(MockSource::ok(
            "sleeper",
            vec![raw_record("sleeper", "Player X", "TB", "RB", 10)],
        ));
        let b = Arc::new(MockSource::ok(
            "espn",
            vec![raw_record("espn", "Player Y", "KC", "WR", 20)],
        ));

        let agg = aggregator(vec![a.clone(), b.clone()], config(2, Duration::from_secs(60)));
        let first = agg.collect(Timeframe::Week).await.unwrap();
        let second = agg.collect(Timeframe::Week).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(a.fetch_calls(), 1);
        assert_eq!(b.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn one_failing_source_does_not_sink_the_cycle() {
        let good_a = Arc::new(MockSource::ok(
            "sleeper",
            vec![raw_record("sleeper", "Player X", "TB", "RB", 10)],
        ));
        let good_b = Arc::new(MockSource::ok(
            "espn",
            vec![raw_record("espn", "Player Y", "KC", "WR", 20)],
        ));
        let bad = Arc::new(MockSource::always("yahoo", SourceReply::TransportError(Some(500))));

        let agg = aggregator(vec![good_a, good_b, bad.clone()], config(2, Duration::from_secs(60)));
        let merged = agg.collect(Timeframe::Week).await.unwrap();

        assert_eq!(merged.len(), 2);
        // The failing source was retried up to the attempt budget.
        assert_eq!(bad.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_retry_budget() {
        let flaky = Arc::new(MockSource::script(
            "sleeper",
            vec![
                SourceReply::Timeout,
                SourceReply::Records(vec![raw_record("sleeper", "Player X", "TB", "RB", 10)]),
            ],
        ));
        let steady = Arc::new(MockSource::ok(
            "espn",
            vec![raw_record("espn", "Player Y", "KC", "WR", 20)],
        ));

        let agg = aggregator(vec![flaky.clone(), steady], config(2, Duration::from_secs(60)));
        let merged = agg.collect(Timeframe::Week).await.unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(flaky.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn quorum_not_met_without_cache_is_an_error() {
        let good = Arc::new(MockSource::ok(
            "sleeper",
            vec![raw_record("sleeper", "Player X", "TB", "RB", 10)],
        ));
        let bad_a = Arc::new(MockSource::always("espn", SourceReply::TransportError(Some(503))));
        let bad_b = Arc::new(MockSource::always("yahoo", SourceReply::TransportError(None)));

        let agg = aggregator(vec![good, bad_a, bad_b], config(2, Duration::from_secs(60)));
        match agg.collect(Timeframe::Week).await {
            Err(AppError::QuorumNotMet {
                successful,
                required,
            }) => {
                assert_eq!(successful, 1);
                assert_eq!(required, 2);
            }
            other => panic!("expected QuorumNotMet, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn quorum_failure_falls_back_to_stale_cache() {
        let a = Arc::new(MockSource::script(
            "sleeper",
            vec![
                SourceReply::Records(vec![raw_record("sleeper", "Player X", "TB", "RB", 10)]),
                SourceReply::TransportError(Some(500)),
            ],
        ));
        let b = Arc::new(MockSource::script(
            "espn",
            vec![
                SourceReply::Records(vec![raw_record("espn", "Player X", "TB", "RB", 5)]),
                SourceReply::TransportError(Some(500)),
            ],
        ));

        // Tiny TTL so the second collect sees an expired cache entry.
        let agg = aggregator(vec![a, b], config(2, Duration::from_millis(30)));
        let first = agg.collect(Timeframe::Week).await.unwrap();
        assert_eq!(first[0].total_added_count, 15);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let fallback = agg.collect(Timeframe::Week).await.unwrap();
        assert_eq!(fallback, first, "stale merge should be served verbatim");
    }

    #[tokio::test]
    async fn quorum_met_with_zero_records_is_no_data() {
        let a = Arc::new(MockSource::ok("sleeper", vec![]));
        let b = Arc::new(MockSource::ok("espn", vec![]));

        let agg = aggregator(vec![a, b], config(2, Duration::from_secs(60)));
        assert!(matches!(
            agg.collect(Timeframe::Week).await,
            Err(AppError::NoData)
        ));
    }

    #[tokio::test]
    async fn disabled_sources_are_skipped_and_not_counted() {
        let live = Arc::new(MockSource::ok(
            "sleeper",
            vec![raw_record("sleeper", "Player X", "TB", "RB", 10)],
        ));
        let dark = Arc::new(MockSource::ok("espn", vec![]).disabled());

        let agg = aggregator(vec![live, dark.clone()], config(1, Duration::from_secs(60)));
        let merged = agg.collect(Timeframe::Week).await.unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(dark.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn open_breaker_skips_the_source_without_calling_it() {
        let blocked = Arc::new(MockSource::ok(
            "yahoo",
            vec![raw_record("yahoo", "Player Z", "DAL", "TE", 30)],
        ));
        let live = Arc::new(MockSource::ok(
            "sleeper",
            vec![raw_record("sleeper", "Player X", "TB", "RB", 10)],
        ));

        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            failure_window: Duration::from_secs(300),
        });
        breaker.record_failure("source:yahoo");

        let sources: Vec<Arc<dyn SourceClient>> =
            vec![blocked.clone() as Arc<dyn SourceClient>, live as Arc<dyn SourceClient>];
        let agg = Aggregator::new(sources, config(1, Duration::from_secs(60)), breaker.clone());
        let merged = agg.collect(Timeframe::Week).await.unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(blocked.fetch_calls(), 0);
        // A breaker-open skip is not a new failure.
        assert_eq!(breaker.snapshot("source:yahoo").consecutive_failures, 1);
    }

    #[test]
    fn merge_is_order_independent() {
        let records = vec![
            raw_record("sleeper", "Player X", "TB", "RB", 100),
            raw_record("espn", "player x", "TB", "RB", 50),
            raw_record("yahoo", "Player Y", "KC", "WR", 25),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let forward = merge_records(records);
        let backward = merge_records(reversed);
        assert_eq!(forward, backward);

        let player_x = forward
            .iter()
            .find(|r| r.total_added_count == 150)
            .unwrap();
        assert_eq!(player_x.contributing_sources.len(), 2);
    }

    #[test]
    fn malformed_records_are_dropped_from_the_merge() {
        let records = vec![
            raw_record("sleeper", "Player X", "TB", "RB", 100),
            raw_record("espn", "   ", "TB", "RB", 50),
            raw_record("yahoo", "Player Y", "", "WR", 25),
        ];
        let merged = merge_records(records);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].total_added_count, 100);
    }
}
