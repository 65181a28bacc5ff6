//! Built-in pipeline collaborators.
//!
//! The orchestrator only knows the seams in `draftline_core::traits`;
//! these are the stock implementations the binary wires in. Research
//! and analysis work from the collected stats themselves, the writer
//! renders markdown, and publish/history land on the local filesystem.

use std::io::Write as _;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use draftline_core::content::{
    Analysis, Draft, PublishReceipt, Recommendation, ResearchBundle, ResearchNote,
};
use draftline_core::error::AppError;
use draftline_core::models::{RankedSummary, TrendingStatus};
use draftline_core::run::PipelineRun;
use draftline_core::traits::{Analyst, HistoryStore, Publisher, Researcher, Writer};

/// Label attached to notes derived from the aggregated numbers rather
/// than an external feed.
const STATS_NOTE_SOURCE: &str = "aggregate-stats";

// --- research ---

/// Builds research bundles from the ranked summaries alone. No network
/// calls; everything it says is already in the collected numbers.
pub struct StatsResearcher;

impl Researcher for StatsResearcher {
    async fn gather_research(
        &self,
        summaries: &[RankedSummary],
    ) -> Result<Vec<ResearchBundle>, AppError> {
        let gathered_at = Utc::now();
        let bundles = summaries
            .iter()
            .map(|summary| {
                let mut notes = vec![ResearchNote {
                    source: STATS_NOTE_SOURCE.to_string(),
                    headline: format!(
                        "{} added {} times across {} source(s)",
                        summary.display_name,
                        summary.total_added_count,
                        summary.contributing_sources.len()
                    ),
                    body: None,
                }];
                if summary.contributing_sources.len() > 1 {
                    let roster: Vec<&str> = summary
                        .contributing_sources
                        .iter()
                        .map(String::as_str)
                        .collect();
                    notes.push(ResearchNote {
                        source: STATS_NOTE_SOURCE.to_string(),
                        headline: format!("Consensus pickup: reported by {}", roster.join(", ")),
                        body: None,
                    });
                }
                ResearchBundle {
                    summary: summary.clone(),
                    notes,
                    gathered_at,
                }
            })
            .collect();
        Ok(bundles)
    }
}

// --- analysis ---

/// Maps trending status and source agreement onto a recommendation.
pub struct RuleBasedAnalyst;

impl Analyst for RuleBasedAnalyst {
    async fn analyze(&self, bundle: &ResearchBundle) -> Result<Analysis, AppError> {
        let summary = &bundle.summary;
        let source_count = summary.contributing_sources.len();

        let recommendation = match summary.trending_status {
            TrendingStatus::Hot if source_count > 1 => Recommendation::StrongAdd,
            TrendingStatus::Hot | TrendingStatus::Rising => Recommendation::SpeculativeAdd,
            TrendingStatus::Steady => Recommendation::Monitor,
        };

        let angle = match summary.trending_status {
            TrendingStatus::Hot => format!(
                "{} is flying off waivers, added in roughly {:.1}% of leagues.",
                summary.display_name, summary.addition_percentage
            ),
            TrendingStatus::Rising => format!(
                "{} is gaining steam on the wire and worth a speculative claim.",
                summary.display_name
            ),
            TrendingStatus::Steady => format!(
                "{} is drawing steady interest; keep an eye on the situation.",
                summary.display_name
            ),
        };

        let mut key_points = vec![
            format!("{} adds in the window", summary.total_added_count),
            format!("reported by {} of the polled sources", source_count),
        ];
        if summary.rank > 1 {
            key_points.push(format!(
                "{}% of the top pickup's add volume",
                summary.relative_popularity
            ));
        }

        Ok(Analysis {
            canonical_key: summary.canonical_key.clone(),
            display_name: summary.display_name.clone(),
            angle,
            key_points,
            recommendation,
        })
    }
}

// --- writing ---

/// Renders the analyses into a markdown article body.
pub struct MarkdownWriter;

fn recommendation_label(recommendation: Recommendation) -> &'static str {
    match recommendation {
        Recommendation::StrongAdd => "Strong add",
        Recommendation::SpeculativeAdd => "Speculative add",
        Recommendation::Monitor => "Monitor",
    }
}

impl Writer for MarkdownWriter {
    async fn compose(&self, analyses: &[Analysis]) -> Result<Draft, AppError> {
        let composed_at = Utc::now();
        let title = format!(
            "Waiver Wire Report: Most Added Players ({})",
            composed_at.format("%B %-d, %Y")
        );

        let mut body = String::new();
        if analyses.is_empty() {
            body.push_str("No qualifying pickups this cycle.\n");
        } else {
            body.push_str(&format!(
                "The {} most added players across the leagues we track, ranked by add volume and source agreement.\n",
                analyses.len()
            ));
            for (position, analysis) in analyses.iter().enumerate() {
                body.push_str(&format!(
                    "\n## {}. {}\n\n{}\n",
                    position + 1,
                    analysis.display_name,
                    analysis.angle
                ));
                for point in &analysis.key_points {
                    body.push_str(&format!("- {point}\n"));
                }
                body.push_str(&format!(
                    "\n**Verdict:** {}\n",
                    recommendation_label(analysis.recommendation)
                ));
            }
        }

        Ok(Draft {
            title,
            body_markdown: body,
            player_count: analyses.len(),
            composed_at,
        })
    }
}

// --- publishing ---

/// Writes each draft to a timestamped markdown file under `out_dir`.
pub struct FilePublisher {
    out_dir: PathBuf,
}

impl FilePublisher {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl Publisher for FilePublisher {
    async fn publish(&self, draft: &Draft) -> Result<PublishReceipt, AppError> {
        std::fs::create_dir_all(&self.out_dir)?;
        let published_at = Utc::now();
        let artifact_id = format!("draft-{}", published_at.format("%Y%m%dT%H%M%SZ"));
        let path = self.out_dir.join(format!("{artifact_id}.md"));

        let document = format!("# {}\n\n{}", draft.title, draft.body_markdown);
        std::fs::write(&path, document)?;
        info!(path = %path.display(), players = draft.player_count, "draft published");

        Ok(PublishReceipt {
            artifact_id,
            url: Some(format!("file://{}", path.display())),
            published_at,
        })
    }
}

// --- history ---

/// Append-only run history as JSON lines, newest line last on disk.
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HistoryStore for FileHistory {
    async fn record(&self, run: &PipelineRun) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(run)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<PipelineRun>, AppError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut runs: Vec<PipelineRun> = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(run) => runs.push(run),
                Err(err) => warn!(error = %err, "skipping malformed history line"),
            }
        }
        runs.reverse();
        runs.truncate(limit);
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use draftline_core::models::Timeframe;
    use draftline_core::run::{RunOutcome, Stage};

    use super::*;

    fn summary(name: &str, rank: u32, sources: &[&str], status: TrendingStatus) -> RankedSummary {
        RankedSummary {
            canonical_key: format!("{}|fa|wr", name.to_lowercase()),
            display_name: name.to_string(),
            position: "WR".to_string(),
            team: "FA".to_string(),
            total_added_count: 500 / u64::from(rank),
            contributing_sources: sources.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            most_recent_observed_at: Utc::now(),
            addition_percentage: 12.5,
            composite_score: 0.8,
            rank,
            relative_popularity: 100 / rank,
            trending_status: status,
        }
    }

    fn finished_run(artifact: Option<&str>) -> PipelineRun {
        let started = Utc::now();
        PipelineRun {
            id: Uuid::new_v4(),
            timeframe: Timeframe::Week,
            started_at: started,
            ended_at: started + Duration::seconds(3),
            outcome: RunOutcome::Completed,
            stages_completed: Stage::ALL.to_vec(),
            errors: Vec::new(),
            warnings: Vec::new(),
            published_artifact_id: artifact.map(|a| a.to_string()),
        }
    }

    #[tokio::test]
    async fn researcher_notes_consensus_only_for_multi_source_players() {
        let summaries = vec![
            summary("Puka Nacua", 1, &["sleeper", "espn"], TrendingStatus::Hot),
            summary("Tyjae Spears", 2, &["sleeper"], TrendingStatus::Rising),
        ];
        let bundles = StatsResearcher.gather_research(&summaries).await.unwrap();

        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].notes.len(), 2);
        assert!(bundles[0].notes[1].headline.contains("espn, sleeper"));
        assert_eq!(bundles[1].notes.len(), 1);
    }

    #[tokio::test]
    async fn analyst_maps_status_and_agreement_to_recommendation() {
        let cases = [
            (
                summary("A", 1, &["sleeper", "espn"], TrendingStatus::Hot),
                Recommendation::StrongAdd,
            ),
            (
                summary("B", 2, &["sleeper"], TrendingStatus::Hot),
                Recommendation::SpeculativeAdd,
            ),
            (
                summary("C", 3, &["sleeper"], TrendingStatus::Rising),
                Recommendation::SpeculativeAdd,
            ),
            (
                summary("D", 4, &["sleeper"], TrendingStatus::Steady),
                Recommendation::Monitor,
            ),
        ];
        for (summary, expected) in cases {
            let bundle = ResearchBundle {
                summary,
                notes: Vec::new(),
                gathered_at: Utc::now(),
            };
            let analysis = RuleBasedAnalyst.analyze(&bundle).await.unwrap();
            assert_eq!(analysis.recommendation, expected);
        }
    }

    #[tokio::test]
    async fn analyst_mentions_relative_volume_below_the_top_spot() {
        let top = ResearchBundle {
            summary: summary("A", 1, &["sleeper"], TrendingStatus::Hot),
            notes: Vec::new(),
            gathered_at: Utc::now(),
        };
        let second = ResearchBundle {
            summary: summary("B", 2, &["sleeper"], TrendingStatus::Hot),
            notes: Vec::new(),
            gathered_at: Utc::now(),
        };

        let top_analysis = RuleBasedAnalyst.analyze(&top).await.unwrap();
        let second_analysis = RuleBasedAnalyst.analyze(&second).await.unwrap();

        assert!(!top_analysis.key_points.iter().any(|p| p.contains("top pickup")));
        assert!(second_analysis.key_points.iter().any(|p| p.contains("50%")));
    }

    #[tokio::test]
    async fn writer_renders_ranked_sections_with_verdicts() {
        let analyses = vec![
            Analysis {
                canonical_key: "a|kc|wr".to_string(),
                display_name: "Player One".to_string(),
                angle: "Hot pickup.".to_string(),
                key_points: vec!["500 adds in the window".to_string()],
                recommendation: Recommendation::StrongAdd,
            },
            Analysis {
                canonical_key: "b|kc|rb".to_string(),
                display_name: "Player Two".to_string(),
                angle: "Worth a look.".to_string(),
                key_points: Vec::new(),
                recommendation: Recommendation::Monitor,
            },
        ];

        let draft = MarkdownWriter.compose(&analyses).await.unwrap();

        assert_eq!(draft.player_count, 2);
        assert!(draft.title.starts_with("Waiver Wire Report"));
        assert!(draft.body_markdown.contains("## 1. Player One"));
        assert!(draft.body_markdown.contains("## 2. Player Two"));
        assert!(draft.body_markdown.contains("- 500 adds in the window"));
        assert!(draft.body_markdown.contains("**Verdict:** Strong add"));
        assert!(draft.body_markdown.contains("**Verdict:** Monitor"));
    }

    #[tokio::test]
    async fn writer_handles_an_empty_slate() {
        let draft = MarkdownWriter.compose(&[]).await.unwrap();
        assert_eq!(draft.player_count, 0);
        assert!(draft.body_markdown.contains("No qualifying pickups"));
    }

    #[tokio::test]
    async fn publisher_writes_the_draft_under_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FilePublisher::new(dir.path().join("reports"));
        let draft = Draft {
            title: "Waiver Wire Report".to_string(),
            body_markdown: "No qualifying pickups this cycle.\n".to_string(),
            player_count: 0,
            composed_at: Utc::now(),
        };

        let receipt = publisher.publish(&draft).await.unwrap();

        let path = dir
            .path()
            .join("reports")
            .join(format!("{}.md", receipt.artifact_id));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Waiver Wire Report"));
        assert!(written.contains("No qualifying pickups"));
        assert_eq!(receipt.url.as_deref(), Some(format!("file://{}", path.display()).as_str()));
    }

    #[tokio::test]
    async fn history_lists_newest_first_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistory::new(dir.path().join("runs.jsonl"));

        let first = finished_run(Some("draft-1"));
        let second = finished_run(Some("draft-2"));
        let third = finished_run(None);
        for run in [&first, &second, &third] {
            history.record(run).await.unwrap();
        }

        let listed = history.list(2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, third.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test]
    async fn history_is_empty_before_any_run() {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistory::new(dir.path().join("runs.jsonl"));
        assert!(history.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let history = FileHistory::new(&path);

        let run = finished_run(Some("draft-9"));
        history.record(&run).await.unwrap();
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("not json at all\n");
        std::fs::write(&path, raw).unwrap();
        history.record(&finished_run(None)).await.unwrap();

        let listed = history.list(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].id, run.id);
    }
}
