//! Sleeper provider.
//!
//! Public API, no credentials. Trending adds come from
//! `/v1/players/nfl/trending/add`; the id-to-player mapping comes from
//! the full `/v1/players/nfl` dump, which is large and changes rarely,
//! so it is cached for hours rather than minutes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use draftline_core::error::AppError;
use draftline_core::models::{PlayerInfo, RawAdditionRecord, SourceConfig, Timeframe};
use draftline_core::traits::SourceClient;
use serde::Deserialize;
use tracing::warn;

use crate::auth::PublicAuth;
use crate::provider::ProviderCore;
use crate::transport::Transport;

/// Trending entries requested per fetch.
const TRENDING_LIMIT: u32 = 200;
/// TTL for the full player dump.
const PLAYERS_TTL: Duration = Duration::from_secs(6 * 3600);

#[derive(Debug, Deserialize)]
struct TrendingEntry {
    player_id: String,
    count: u64,
}

/// Subset of the Sleeper player object.
#[derive(Debug, Deserialize)]
struct SleeperPlayer {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    fantasy_positions: Option<Vec<String>>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl SleeperPlayer {
    /// Individual players have `full_name`; team defenses carry the
    /// franchise name split across `first_name`/`last_name`.
    fn display_name(&self) -> Option<String> {
        if let Some(name) = &self.full_name {
            return Some(name.clone());
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        }
    }

    fn position(&self) -> Option<String> {
        if let Some(position) = &self.position {
            if !position.is_empty() {
                return Some(position.clone());
            }
        }
        self.fantasy_positions
            .as_ref()
            .and_then(|positions| positions.first().cloned())
    }

    /// Free agents have no team; "FA" keeps them mergeable.
    fn team(&self) -> String {
        match &self.team {
            Some(team) if !team.is_empty() => team.clone(),
            _ => "FA".to_string(),
        }
    }
}

pub struct SleeperSource {
    core: ProviderCore,
    enabled: bool,
}

impl SleeperSource {
    pub fn new(config: &SourceConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            enabled: config.enabled,
            core: ProviderCore::new(config, transport, Arc::new(PublicAuth)),
        }
    }

    async fn players(&self) -> Result<HashMap<String, SleeperPlayer>, AppError> {
        self.core
            .get_json_with_ttl("/v1/players/nfl", &[], Some(PLAYERS_TTL))
            .await
    }
}

#[async_trait]
impl SourceClient for SleeperSource {
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
        timeframe: Timeframe,
    ) -> Result<Vec<RawAdditionRecord>, AppError> {
        let query = [
            ("lookback_hours", timeframe.lookback_hours().to_string()),
            ("limit", TRENDING_LIMIT.to_string()),
        ];
        let trending: Vec<TrendingEntry> = self
            .core
            .get_json("/v1/players/nfl/trending/add", &query)
            .await?;
        let players = self.players().await?;

        let observed_at = Utc::now();
        let mut records = Vec::with_capacity(trending.len());
        for entry in trending {
            let Some(player) = players.get(&entry.player_id) else {
                warn!(
                    player_id = %entry.player_id,
                    "trending id missing from player dump, skipping"
                );
                continue;
            };
            let (Some(display_name), Some(position)) = (player.display_name(), player.position())
            else {
                warn!(
                    player_id = %entry.player_id,
                    "player missing name or position, skipping"
                );
                continue;
            };
            records.push(RawAdditionRecord {
                source: self.core.name().to_string(),
                external_player_id: entry.player_id,
                display_name,
                position,
                team: player.team(),
                added_count: entry.count,
                observed_at,
            });
        }
        Ok(records)
    }

    async fn fetch_player_info(&self, external_player_id: &str) -> Result<PlayerInfo, AppError> {
        let players = self.players().await?;
        let player = players.get(external_player_id).ok_or_else(|| {
            AppError::Validation(format!(
                "unknown sleeper player id '{external_player_id}'"
            ))
        })?;
        Ok(PlayerInfo {
            external_player_id: external_player_id.to_string(),
            display_name: player
                .display_name()
                .unwrap_or_else(|| external_player_id.to_string()),
            position: player.position().unwrap_or_default(),
            team: player.team(),
            status: player.status.clone(),
        })
    }
}
