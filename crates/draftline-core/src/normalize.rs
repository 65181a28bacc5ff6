//! Canonicalization of provider-specific player fields.
//!
//! Providers disagree on position codes ("DEF", "D/ST", "DEFENSE"), team
//! abbreviations ("JAX" vs "JAC"), and whitespace. Everything that feeds
//! the merge step goes through here first so that one player folds into
//! one `MergedPlayerRecord` regardless of which sources reported them.

use crate::models::{MergedPlayerRecord, RawAdditionRecord};

/// Positions every provider code is mapped into.
pub const CANONICAL_POSITIONS: [&str; 6] = ["QB", "RB", "WR", "TE", "K", "DST"];

/// Map a provider position code to the canonical set.
///
/// Unknown codes are passed through uppercased rather than rejected;
/// a new position (or a flex label) should surface in output, not
/// silently drop a player.
pub fn canonical_position(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    match upper.as_str() {
        "DEF" | "D/ST" | "D-ST" | "DEFENSE" | "DST" => "DST".to_string(),
        "PK" | "K" => "K".to_string(),
        _ => upper,
    }
}

/// Canonicalize a team abbreviation.
///
/// Covers the abbreviation splits that actually occur across the three
/// providers; anything unrecognized is uppercased and passed through.
pub fn canonical_team(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    match upper.as_str() {
        "JAX" => "JAC".to_string(),
        "WSH" => "WAS".to_string(),
        "OAK" => "LV".to_string(),
        "SD" => "LAC".to_string(),
        "STL" | "LA" => "LAR".to_string(),
        _ => upper,
    }
}

/// Trim and collapse internal whitespace in a display name.
pub fn clean_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive the canonical key identifying "the same player" across sources:
/// lower-cased cleaned name + canonical team + canonical position.
pub fn canonical_key(name: &str, team: &str, position: &str) -> String {
    format!(
        "{}|{}|{}",
        clean_name(name).to_lowercase(),
        canonical_team(team),
        canonical_position(position)
    )
}

/// Normalize one raw record into merge-ready form.
///
/// Returns `None` when the record fails shape validation, meaning an
/// empty name, team, or position after trimming. Such rows are skipped,
/// not propagated.
pub fn normalize_record(raw: &RawAdditionRecord) -> Option<MergedPlayerRecord> {
    let name = clean_name(&raw.display_name);
    let team = canonical_team(&raw.team);
    let position = canonical_position(&raw.position);

    if name.is_empty() || team.is_empty() || position.is_empty() {
        return None;
    }

    let mut contributing_sources = std::collections::BTreeSet::new();
    contributing_sources.insert(raw.source.clone());

    Some(MergedPlayerRecord {
        canonical_key: canonical_key(&name, &team, &position),
        display_name: name,
        position,
        team,
        total_added_count: raw.added_count,
        contributing_sources,
        most_recent_observed_at: raw.observed_at,
    })
}
