//! ESPN fantasy provider.
//!
//! Reads the league-manager players endpoint with an `X-Fantasy-Filter`
//! header selecting the biggest risers by ownership change. ESPN does
//! not publish raw add counts, so the count is estimated from the
//! ownership percentage change.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use draftline_core::error::AppError;
use draftline_core::models::{PlayerInfo, RawAdditionRecord, SourceConfig, Timeframe};
use draftline_core::traits::SourceClient;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::auth::StaticHeaderAuth;
use crate::provider::ProviderCore;
use crate::transport::Transport;

/// Players requested per fetch.
const PLAYER_LIMIT: u32 = 100;
/// Estimated adds represented by one percentage point of ownership
/// change. An estimate, tuned to land in the same magnitude as the
/// counting providers.
const ADDS_PER_OWNERSHIP_POINT: f64 = 100.0;

/// `defaultPositionId` to position code.
fn position_code(id: i64) -> Option<&'static str> {
    match id {
        1 => Some("QB"),
        2 => Some("RB"),
        3 => Some("WR"),
        4 => Some("TE"),
        5 => Some("K"),
        16 => Some("DST"),
        _ => None,
    }
}

/// `proTeamId` to franchise abbreviation. Zero is the free-agent pool.
fn pro_team_abbr(id: i64) -> &'static str {
    match id {
        1 => "ATL",
        2 => "BUF",
        3 => "CHI",
        4 => "CIN",
        5 => "CLE",
        6 => "DAL",
        7 => "DEN",
        8 => "DET",
        9 => "GB",
        10 => "TEN",
        11 => "IND",
        12 => "KC",
        13 => "LV",
        14 => "LAR",
        15 => "MIA",
        16 => "MIN",
        17 => "NE",
        18 => "NO",
        19 => "NYG",
        20 => "NYJ",
        21 => "PHI",
        22 => "ARI",
        23 => "PIT",
        24 => "LAC",
        25 => "SF",
        26 => "SEA",
        27 => "TB",
        28 => "WAS",
        29 => "CAR",
        30 => "JAC",
        33 => "BAL",
        34 => "HOU",
        _ => "FA",
    }
}

/// ESPN paths key on the season start year; the season runs into
/// February, so January and February still belong to the prior year.
fn season_year(now: DateTime<Utc>) -> i32 {
    if now.month() < 3 {
        now.year() - 1
    } else {
        now.year()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnPlayer {
    id: i64,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    default_position_id: Option<i64>,
    #[serde(default)]
    pro_team_id: Option<i64>,
    #[serde(default)]
    injury_status: Option<String>,
    #[serde(default)]
    ownership: Option<EspnOwnership>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnOwnership {
    #[serde(default)]
    percent_change: Option<f64>,
}

pub struct EspnSource {
    core: ProviderCore,
    enabled: bool,
}

impl EspnSource {
    pub fn new(config: &SourceConfig, transport: Arc<dyn Transport>, bearer_token: &str) -> Self {
        Self {
            enabled: config.enabled,
            core: ProviderCore::new(
                config,
                transport,
                Arc::new(StaticHeaderAuth::bearer(bearer_token)),
            ),
        }
    }

    fn players_path(&self) -> String {
        format!("/seasons/{}/players", season_year(Utc::now()))
    }

    async fn players_filtered(
        &self,
        filter: serde_json::Value,
    ) -> Result<Vec<EspnPlayer>, AppError> {
        self.core
            .request_json(
                &self.players_path(),
                &[("view", "players_wl".to_string())],
                &[("x-fantasy-filter", filter.to_string())],
                None,
            )
            .await
    }

    fn map_player(&self, player: &EspnPlayer) -> Option<(String, String, String)> {
        let Some(name) = player.full_name.clone() else {
            warn!(player_id = player.id, "espn player has no name, skipping");
            return None;
        };
        let Some(position) = player.default_position_id.and_then(position_code) else {
            warn!(
                player_id = player.id,
                "espn player has an unranked position, skipping"
            );
            return None;
        };
        let team = pro_team_abbr(player.pro_team_id.unwrap_or(0));
        Some((name, position.to_string(), team.to_string()))
    }
}

#[async_trait]
impl SourceClient for EspnSource {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn authenticate(&self) -> Result<(), AppError> {
        self.core.authenticate().await
    }

    fn is_authenticated(&self) -> bool {
        self.core.is_authenticated()
    }

    async fn fetch_most_added(
        &self,
        _timeframe: Timeframe,
    ) -> Result<Vec<RawAdditionRecord>, AppError> {
        // ESPN's ownership delta is a rolling seven-day figure; the
        // endpoint has no lookback parameter.
        let filter = json!({
            "players": {
                "limit": PLAYER_LIMIT,
                "sortPercChanged": {"sortPriority": 1, "sortAsc": false}
            }
        });
        let players = self.players_filtered(filter).await?;

        let observed_at = Utc::now();
        let mut records = Vec::with_capacity(players.len());
        for player in &players {
            let change = player
                .ownership
                .as_ref()
                .and_then(|o| o.percent_change)
                .unwrap_or(0.0);
            // Negative change means drops, not adds.
            if change <= 0.0 {
                continue;
            }
            let Some((display_name, position, team)) = self.map_player(player) else {
                continue;
            };
            records.push(RawAdditionRecord {
                source: self.core.name().to_string(),
                external_player_id: player.id.to_string(),
                display_name,
                position,
                team,
                added_count: (change * ADDS_PER_OWNERSHIP_POINT).round() as u64,
                observed_at,
            });
        }
        Ok(records)
    }

    async fn fetch_player_info(&self, external_player_id: &str) -> Result<PlayerInfo, AppError> {
        let id: i64 = external_player_id.parse().map_err(|_| {
            AppError::Validation(format!(
                "espn player id '{external_player_id}' is not numeric"
            ))
        })?;
        let filter = json!({"players": {"filterIds": {"value": [id]}}});
        let players = self.players_filtered(filter).await?;
        let player = players.into_iter().find(|p| p.id == id).ok_or_else(|| {
            AppError::Validation(format!("unknown espn player id '{external_player_id}'"))
        })?;

        let (display_name, position, team) = self.map_player(&player).ok_or_else(|| {
            AppError::Validation(format!(
                "espn player '{external_player_id}' is missing name or position"
            ))
        })?;
        Ok(PlayerInfo {
            external_player_id: external_player_id.to_string(),
            display_name,
            position,
            team,
            status: player.injury_status,
        })
    }
}
