//! Environment-driven provider assembly.
//!
//! Credentials and overrides come from `DRAFTLINE_*` variables, loaded
//! from the process environment or a `.env` file. Sleeper is public and
//! always on; ESPN and Yahoo join only when their credentials are set,
//! so a bare checkout still collects from one source.

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use draftline_core::error::AppError;
use draftline_core::models::SourceConfig;
use draftline_core::traits::SourceClient;
use draftline_sources::{
    EspnSource, OAuthConfig, SleeperSource, Transport, YAHOO_TOKEN_URL, YahooSource,
};

const SLEEPER_BASE_URL: &str = "https://api.sleeper.app";
const ESPN_BASE_URL: &str = "https://lm-api-reads.fantasy.espn.com/apis/v3/games/ffl";
const YAHOO_BASE_URL: &str = "https://fantasysports.yahooapis.com/fantasy/v2";

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_base_url(var: &str, value: String) -> Result<String, AppError> {
    Url::parse(&value)
        .map_err(|err| AppError::Config(format!("{var} is not a valid url ({err}): {value}")))?;
    Ok(value)
}

fn base_url(var: &str, default: &str) -> Result<String, AppError> {
    parse_base_url(var, env_opt(var).unwrap_or_else(|| default.to_string()))
}

/// Builds every provider with usable configuration.
pub fn build_sources(
    transport: Arc<dyn Transport>,
) -> Result<Vec<Arc<dyn SourceClient>>, AppError> {
    let mut sources: Vec<Arc<dyn SourceClient>> = Vec::new();

    let sleeper = SourceConfig::new(
        "sleeper",
        base_url("DRAFTLINE_SLEEPER_BASE_URL", SLEEPER_BASE_URL)?,
    );
    sources.push(Arc::new(SleeperSource::new(&sleeper, transport.clone())));

    match env_opt("DRAFTLINE_ESPN_TOKEN") {
        Some(token) => {
            let espn = SourceConfig::new(
                "espn",
                base_url("DRAFTLINE_ESPN_BASE_URL", ESPN_BASE_URL)?,
            );
            sources.push(Arc::new(EspnSource::new(&espn, transport.clone(), &token)));
        }
        None => info!("espn source disabled, DRAFTLINE_ESPN_TOKEN is not set"),
    }

    match yahoo_oauth()? {
        Some(oauth) => {
            let yahoo = SourceConfig::new(
                "yahoo",
                base_url("DRAFTLINE_YAHOO_BASE_URL", YAHOO_BASE_URL)?,
            );
            sources.push(Arc::new(YahooSource::new(&yahoo, transport.clone(), oauth)));
        }
        None => info!("yahoo source disabled, yahoo credentials are not set"),
    }

    Ok(sources)
}

/// The Yahoo OAuth triple is all-or-nothing. A partial set is a typo,
/// not a request for a degraded source.
fn yahoo_oauth() -> Result<Option<OAuthConfig>, AppError> {
    let client_id = env_opt("DRAFTLINE_YAHOO_CLIENT_ID");
    let client_secret = env_opt("DRAFTLINE_YAHOO_CLIENT_SECRET");
    let refresh_token = env_opt("DRAFTLINE_YAHOO_REFRESH_TOKEN");

    match (client_id, client_secret, refresh_token) {
        (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(Some(OAuthConfig {
            client_id,
            client_secret,
            refresh_token,
            token_url: YAHOO_TOKEN_URL.to_string(),
        })),
        (None, None, None) => Ok(None),
        _ => Err(AppError::Config(
            "partial yahoo credentials: set all of DRAFTLINE_YAHOO_CLIENT_ID, \
             DRAFTLINE_YAHOO_CLIENT_SECRET and DRAFTLINE_YAHOO_REFRESH_TOKEN, or none"
                .to_string(),
        )),
    }
}

/// Quorum requirement: explicit `DRAFTLINE_MIN_SOURCES`, else two of
/// the enabled set (one when only one source is configured).
pub fn minimum_sources(enabled: usize) -> Result<usize, AppError> {
    minimum_sources_from(env_opt("DRAFTLINE_MIN_SOURCES"), enabled)
}

fn minimum_sources_from(raw: Option<String>, enabled: usize) -> Result<usize, AppError> {
    let minimum = match raw {
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            AppError::Config(format!(
                "DRAFTLINE_MIN_SOURCES must be a positive integer, got {raw:?}"
            ))
        })?,
        None => return Ok(enabled.clamp(1, 2)),
    };
    if minimum == 0 {
        return Err(AppError::Config(
            "DRAFTLINE_MIN_SOURCES must be at least 1".to_string(),
        ));
    }
    if minimum > enabled {
        warn!(
            minimum,
            enabled, "DRAFTLINE_MIN_SOURCES exceeds the enabled source count, clamping"
        );
        return Ok(enabled);
    }
    Ok(minimum)
}
