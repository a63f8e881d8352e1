//! Engine configuration from environment variables.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

pub const RESERVE_MAX_ATTEMPTS: &str = "BREWFORCE_RESERVE_MAX_ATTEMPTS";
pub const TRANSITION_MAX_ATTEMPTS: &str = "BREWFORCE_TRANSITION_MAX_ATTEMPTS";
pub const LOG_FILTER: &str = "BREWFORCE_LOG";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "BREWFORCE_DB_MAX_CONNECTIONS";
pub const SLOT_CLAIM_TIMEOUT_SECS: &str = "BREWFORCE_SLOT_CLAIM_TIMEOUT_SECS";

const DEFAULT_SLOT_CLAIM_TIMEOUT_SECS: u32 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
}

/// Tunables of the order engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Optimistic attempts for stock reservations, releases and slot claims.
    pub reserve_max_attempts: u32,
    /// Optimistic attempts for order status transitions.
    pub transition_max_attempts: u32,
    /// How long an owner's slot may point at an order that was never placed
    /// before the next `create_order` of that owner reclaims it.
    pub slot_claim_timeout: Duration,
    /// `tracing` filter directives.
    pub log_filter: String,
    /// Enables the Postgres event store when set.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reserve_max_attempts: 8,
            transition_max_attempts: 8,
            slot_claim_timeout: Duration::from_secs(DEFAULT_SLOT_CLAIM_TIMEOUT_SECS as u64),
            log_filter: "info".to_string(),
            database_url: None,
            db_max_connections: 10,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests inject a map here).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let reserve_max_attempts =
            positive(&lookup, RESERVE_MAX_ATTEMPTS, defaults.reserve_max_attempts)?;
        let transition_max_attempts =
            positive(&lookup, TRANSITION_MAX_ATTEMPTS, defaults.transition_max_attempts)?;
        let db_max_connections = positive(&lookup, DB_MAX_CONNECTIONS, defaults.db_max_connections)?;
        let slot_claim_timeout = Duration::from_secs(u64::from(positive(
            &lookup,
            SLOT_CLAIM_TIMEOUT_SECS,
            DEFAULT_SLOT_CLAIM_TIMEOUT_SECS,
        )?));

        let log_filter = lookup(LOG_FILTER)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.log_filter);

        let database_url = lookup(DATABASE_URL).filter(|v| !v.trim().is_empty());
        if database_url.is_none() {
            warn!("{DATABASE_URL} not set; using the in-memory event store");
        }

        Ok(Self {
            reserve_max_attempts,
            transition_max_attempts,
            slot_claim_timeout,
            log_filter,
            database_url,
            db_max_connections,
        })
    }
}

fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidNumber { key, value: raw }),
        },
    }
}
