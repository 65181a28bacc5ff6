//! Ranking engine: merged records in, bounded ranked summaries out.
//!
//! Scores are pure functions of the collected batch. Nothing here is
//! persisted or incremental; every cycle recomputes from scratch.

use crate::models::{MergedPlayerRecord, RankedSummary, TrendingStatus};

/// Floor of the estimated league denominator.
const DENOMINATOR_FLOOR: u64 = 1000;
/// Multiplier applied to the max observed count when it implies a
/// larger league than the floor.
const DENOMINATOR_MULTIPLIER: u64 = 5;

/// Tuning knobs for the composite score. Defaults reproduce the
/// long-standing weighting; change them only with data in hand.
#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub top_n: usize,
    pub volume_weight: f64,
    pub percentage_weight: f64,
    pub diversity_weight: f64,
    /// Counts at or above this saturate the volume term.
    pub volume_cap: u64,
    /// Denominator of the cross-source diversity term. Usually the
    /// number of enabled sources.
    pub total_sources: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            volume_weight: 0.7,
            percentage_weight: 0.2,
            diversity_weight: 0.1,
            volume_cap: 1000,
            total_sources: 3,
        }
    }
}

/// Ranked output plus the warnings accumulated while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingOutcome {
    pub summaries: Vec<RankedSummary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RankingEngine {
    config: RankingConfig,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(RankingConfig::default())
    }
}

impl RankingEngine {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Scores, sorts, and truncates to the configured top N. Records
    /// missing a name, team, or position are dropped and reported in
    /// the outcome's warnings.
    pub fn select_top_n(&self, records: &[MergedPlayerRecord]) -> RankingOutcome {
        let mut warnings = Vec::new();
        let valid: Vec<&MergedPlayerRecord> = records
            .iter()
            .filter(|record| {
                if record.display_name.trim().is_empty()
                    || record.team.trim().is_empty()
                    || record.position.trim().is_empty()
                {
                    warnings.push(format!(
                        "dropped malformed record '{}' from ranking",
                        record.canonical_key
                    ));
                    false
                } else {
                    true
                }
            })
            .collect();

        if valid.is_empty() {
            return RankingOutcome {
                summaries: Vec::new(),
                warnings,
            };
        }

        let max_count = valid
            .iter()
            .map(|r| r.total_added_count)
            .max()
            .unwrap_or(0);
        // Estimated, not measured: the implied league count is derived
        // from the biggest observed addition volume. Treat the
        // resulting percentage as an approximation.
        let denominator =
            DENOMINATOR_FLOOR.max(max_count.saturating_mul(DENOMINATOR_MULTIPLIER)) as f64;

        let volume_cap = self.config.volume_cap.max(1);
        let total_sources = self.config.total_sources.max(1);

        let mut scored: Vec<(f64, f64, &MergedPlayerRecord)> = valid
            .into_iter()
            .map(|record| {
                let percentage = record.total_added_count as f64 / denominator * 100.0;
                let volume =
                    record.total_added_count.min(volume_cap) as f64 / volume_cap as f64 * 100.0;
                let diversity =
                    record.contributing_sources.len() as f64 / total_sources as f64 * 100.0;
                let score = self.config.volume_weight * volume
                    + self.config.percentage_weight * percentage
                    + self.config.diversity_weight * diversity;
                (score, percentage, record)
            })
            .collect();

        // Stable sort: equal scores keep their input order, so output
        // is deterministic for identical inputs.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(self.config.top_n);

        let top_count = scored
            .first()
            .map(|(_, _, record)| record.total_added_count)
            .unwrap_or(0);

        let summaries = scored
            .into_iter()
            .enumerate()
            .map(|(position, (score, percentage, record))| {
                let rank = (position + 1) as u32;
                let relative_popularity = if top_count == 0 {
                    0
                } else {
                    (record.total_added_count as f64 / top_count as f64 * 100.0).round() as u32
                };
                let trending_status = if rank <= 3 && record.contributing_sources.len() >= 2 {
                    TrendingStatus::Hot
                } else if rank <= 7 && percentage > 5.0 {
                    TrendingStatus::Rising
                } else {
                    TrendingStatus::Steady
                };
                RankedSummary {
                    canonical_key: record.canonical_key.clone(),
                    display_name: record.display_name.clone(),
                    position: record.position.clone(),
                    team: record.team.clone(),
                    total_added_count: record.total_added_count,
                    contributing_sources: record.contributing_sources.clone(),
                    most_recent_observed_at: record.most_recent_observed_at,
                    addition_percentage: percentage,
                    composite_score: score,
                    rank,
                    relative_popularity,
                    trending_status,
                }
            })
            .collect();

        RankingOutcome {
            summaries,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::merged_record;

    fn engine() -> RankingEngine {
        RankingEngine::default()
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let outcome = engine().select_top_n(&[]);
        assert!(outcome.summaries.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn fewer_records_than_n_rank_densely_from_one() {
        let records = vec![
            merged_record("Player A", "TB", "RB", 100, &["sleeper"]),
            merged_record("Player B", "KC", "WR", 50, &["espn"]),
        ];
        let outcome = engine().select_top_n(&records);
        assert_eq!(outcome.summaries.len(), 2);
        assert_eq!(outcome.summaries[0].rank, 1);
        assert_eq!(outcome.summaries[1].rank, 2);
    }

    #[test]
    fn widely_added_multi_source_player_ranks_first() {
        let mut records = vec![merged_record(
            "Player X",
            "TB",
            "RB",
            150,
            &["sleeper", "espn"],
        )];
        for i in 0..15 {
            records.push(merged_record(
                &format!("Filler {i}"),
                "KC",
                "WR",
                40 + i,
                &["sleeper"],
            ));
        }

        let outcome = engine().select_top_n(&records);
        assert_eq!(outcome.summaries.len(), 10);
        let top = &outcome.summaries[0];
        assert_eq!(top.display_name, "Player X");
        assert_eq!(top.rank, 1);
        assert_eq!(top.total_added_count, 150);
        assert_eq!(top.relative_popularity, 100);
        assert_eq!(top.trending_status, TrendingStatus::Hot);
    }

    #[test]
    fn ranking_is_deterministic() {
        let records = vec![
            merged_record("Player A", "TB", "RB", 300, &["sleeper", "espn"]),
            merged_record("Player B", "KC", "WR", 200, &["yahoo"]),
            merged_record("Player C", "DAL", "TE", 100, &["espn"]),
        ];
        let first = engine().select_top_n(&records);
        let second = engine().select_top_n(&records);
        assert_eq!(first, second);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let records = vec![
            merged_record("Player A", "TB", "RB", 100, &["sleeper"]),
            merged_record("Player B", "KC", "WR", 100, &["espn"]),
        ];
        let outcome = engine().select_top_n(&records);
        assert_eq!(outcome.summaries[0].display_name, "Player A");
        assert_eq!(outcome.summaries[1].display_name, "Player B");
    }

    #[test]
    fn addition_percentage_uses_floor_denominator_for_small_counts() {
        let records = vec![merged_record("Player A", "TB", "RB", 100, &["sleeper"])];
        let outcome = engine().select_top_n(&records);
        // max count 100 implies 500 leagues, below the floor of 1000.
        let pct = outcome.summaries[0].addition_percentage;
        assert!((pct - 10.0).abs() < 1e-9, "expected 10%, got {pct}");
    }

    #[test]
    fn addition_percentage_scales_denominator_for_large_counts() {
        let records = vec![merged_record("Player A", "TB", "RB", 400, &["sleeper"])];
        let outcome = engine().select_top_n(&records);
        // Denominator becomes 400 * 5 = 2000.
        let pct = outcome.summaries[0].addition_percentage;
        assert!((pct - 20.0).abs() < 1e-9, "expected 20%, got {pct}");
    }

    #[test]
    fn malformed_records_are_dropped_into_warnings() {
        let mut broken = merged_record("Player A", "TB", "RB", 100, &["sleeper"]);
        broken.team = String::new();
        let records = vec![
            broken,
            merged_record("Player B", "KC", "WR", 50, &["espn"]),
        ];

        let outcome = engine().select_top_n(&records);
        assert_eq!(outcome.summaries.len(), 1);
        assert_eq!(outcome.summaries[0].display_name, "Player B");
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("malformed"));
    }

    #[test]
    fn trending_statuses_follow_rank_and_diversity() {
        let mut records = vec![
            merged_record("Hot One", "TB", "RB", 900, &["sleeper", "espn", "yahoo"]),
            merged_record("Hot Two", "KC", "WR", 800, &["sleeper", "espn"]),
            // Rank 3 but single-source, so not hot.
            merged_record("Lone Three", "DAL", "TE", 700, &["yahoo"]),
        ];
        for i in 0..5 {
            records.push(merged_record(
                &format!("Mid {i}"),
                "NE",
                "WR",
                300 - i,
                &["sleeper"],
            ));
        }

        let outcome = engine().select_top_n(&records);
        let statuses: Vec<TrendingStatus> = outcome
            .summaries
            .iter()
            .map(|s| s.trending_status)
            .collect();

        assert_eq!(statuses[0], TrendingStatus::Hot);
        assert_eq!(statuses[1], TrendingStatus::Hot);
        // High percentage keeps rank 3 rising rather than steady.
        assert_eq!(statuses[2], TrendingStatus::Rising);
        // Ranks 8 and beyond are steady regardless of percentage.
        assert_eq!(statuses[7], TrendingStatus::Steady);
    }

    #[test]
    fn truncates_to_configured_top_n() {
        let records: Vec<_> = (0..6)
            .map(|i| merged_record(&format!("Player {i}"), "TB", "RB", 100 + i, &["sleeper"]))
            .collect();
        let engine = RankingEngine::new(RankingConfig {
            top_n: 3,
            ..RankingConfig::default()
        });
        let outcome = engine.select_top_n(&records);
        assert_eq!(outcome.summaries.len(), 3);
        assert_eq!(
            outcome.summaries.iter().map(|s| s.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }
}
