//! Yahoo fantasy provider.
//!
//! OAuth refresh-token auth against the login endpoint, then the v2
//! fantasy API. Yahoo responses nest heavily and mix fragment objects
//! inside arrays, so parsing walks `serde_json::Value` and folds each
//! player's fragment list into one flat map before field extraction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use draftline_core::error::AppError;
use draftline_core::models::{PlayerInfo, RawAdditionRecord, SourceConfig, Timeframe};
use draftline_core::traits::SourceClient;
use serde_json::{Map, Value};
use tracing::warn;

use crate::auth::{OAuthConfig, OAuthRefreshAuth};
use crate::provider::ProviderCore;
use crate::transport::Transport;

/// Yahoo's OAuth2 token endpoint.
pub const YAHOO_TOKEN_URL: &str = "https://api.login.yahoo.com/oauth2/get_token";

/// Players requested per fetch.
const PLAYER_COUNT: u32 = 50;
/// Estimated adds represented by one point of rostered-percentage
/// delta. An estimate, same magnitude reasoning as the ESPN client.
const ADDS_PER_OWNERSHIP_POINT: f64 = 100.0;

pub struct YahooSource {
    core: ProviderCore,
    enabled: bool,
}

impl YahooSource {
    pub fn new(config: &SourceConfig, transport: Arc<dyn Transport>, oauth: OAuthConfig) -> Self {
        let auth = Arc::new(OAuthRefreshAuth::new(
            &config.name,
            oauth,
            transport.clone(),
        ));
        Self {
            enabled: config.enabled,
            core: ProviderCore::new(config, transport, auth),
        }
    }
}

/// Folds a fragment array (`[{"player_key": ...}, {"name": {...}}, ...]`)
/// into one flat map.
fn fold_fragments(fragments: &[Value]) -> Map<String, Value> {
    let mut merged = Map::new();
    for fragment in fragments {
        if let Some(object) = fragment.as_object() {
            for (key, value) in object {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Collects every player's folded fragments from a players collection
/// (`{"0": {"player": [[...]]}, "1": ..., "count": N}`).
fn fold_players(body: &Value, pointer: &str) -> Vec<Map<String, Value>> {
    let Some(players) = body.pointer(pointer).and_then(Value::as_object) else {
        return Vec::new();
    };
    players
        .iter()
        .filter(|(key, _)| key.as_str() != "count")
        .filter_map(|(_, entry)| entry.pointer("/player/0").and_then(Value::as_array))
        .map(|fragments| fold_fragments(fragments))
        .collect()
}

/// Yahoo serializes numbers inconsistently, sometimes as strings.
fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn record_from(
    fragments: &Map<String, Value>,
    source: &str,
    observed_at: DateTime<Utc>,
) -> Option<RawAdditionRecord> {
    let delta = fragments
        .get("percent_owned")
        .and_then(|owned| owned.get("delta"))
        .and_then(value_f64)
        .unwrap_or(0.0);
    // Zero or negative delta means the player is not being added.
    if delta <= 0.0 {
        return None;
    }

    let Some(player_key) = fragments.get("player_key").and_then(value_string) else {
        warn!("yahoo player fragment missing player_key, skipping");
        return None;
    };
    let Some(name) = fragments
        .get("name")
        .and_then(|name| name.get("full"))
        .and_then(Value::as_str)
    else {
        warn!(%player_key, "yahoo player missing name, skipping");
        return None;
    };
    let Some(position) = fragments.get("display_position").and_then(Value::as_str) else {
        warn!(%player_key, "yahoo player missing position, skipping");
        return None;
    };
    // Multi-eligible players read "WR,TE"; the first listing is primary.
    let position = position.split(',').next().unwrap_or(position).trim();
    let team = fragments
        .get("editorial_team_abbr")
        .and_then(Value::as_str)
        .unwrap_or("FA");

    Some(RawAdditionRecord {
        source: source.to_string(),
        external_player_id: player_key,
        display_name: name.to_string(),
        position: position.to_string(),
        team: team.to_string(),
        added_count: (delta * ADDS_PER_OWNERSHIP_POINT).round() as u64,
        observed_at,
    })
}

#[async_trait]
impl SourceClient for YahooSource {
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
        let sort_type = match timeframe {
            Timeframe::Day => "date",
            Timeframe::Week => "lastweek",
        };
        let path = format!(
            "/game/nfl/players;status=A;sort=AR;sort_type={sort_type};count={PLAYER_COUNT};out=percent_owned"
        );
        let body: Value = self
            .core
            .get_json(&path, &[("format", "json".to_string())])
            .await?;

        let observed_at = Utc::now();
        Ok(fold_players(&body, "/fantasy_content/game/1/players")
            .iter()
            .filter_map(|fragments| record_from(fragments, self.core.name(), observed_at))
            .collect())
    }

    async fn fetch_player_info(&self, external_player_id: &str) -> Result<PlayerInfo, AppError> {
        let path = format!("/player/{external_player_id}");
        let body: Value = self
            .core
            .get_json(&path, &[("format", "json".to_string())])
            .await?;

        let Some(array) = body
            .pointer("/fantasy_content/player/0")
            .and_then(Value::as_array)
        else {
            return Err(AppError::Validation(format!(
                "yahoo player '{external_player_id}' not found"
            )));
        };
        let fragments = fold_fragments(array);

        let name = fragments
            .get("name")
            .and_then(|name| name.get("full"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "yahoo player '{external_player_id}' is missing a name"
                ))
            })?;
        let position = fragments
            .get("display_position")
            .and_then(Value::as_str)
            .unwrap_or("");
        let team = fragments
            .get("editorial_team_abbr")
            .and_then(Value::as_str)
            .unwrap_or("FA");

        Ok(PlayerInfo {
            external_player_id: external_player_id.to_string(),
            display_name: name.to_string(),
            position: position.split(',').next().unwrap_or(position).to_string(),
            team: team.to_string(),
            status: fragments
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}
