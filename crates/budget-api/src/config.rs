//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use budget_event_store::cipher::DataKey;
use budget_event_store::event_sourced_repository::SnapshotPolicy;

use crate::error::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SNAPSHOT_INTERVAL: u32 = 50;
const DEFAULT_PROJECTION_BATCH_SIZE: usize = 256;
const DEFAULT_PROJECTION_POLL_INTERVAL_MS: u64 = 1000;

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Master secret the per-user data keys are derived from.
    pub encryption_key: DataKey,
    /// Snapshot frequency.
    pub snapshot_policy: SnapshotPolicy,
    /// Events a projection reads from the log per round trip.
    pub projection_batch_size: usize,
    /// How often idle projections check the log without being woken.
    pub projection_poll_interval: Duration,
}

fn parse<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{name} is invalid: {e}"))),
    }
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".into()))?;
        let encryption_key = lookup("EVENT_ENCRYPTION_KEY")
            .ok_or_else(|| AppError::Config("EVENT_ENCRYPTION_KEY must be set".into()))
            .and_then(|raw| {
                DataKey::from_hex(&raw)
                    .map_err(|e| AppError::Config(format!("EVENT_ENCRYPTION_KEY: {e}")))
            })?;
        let snapshot_interval = parse(
            "SNAPSHOT_INTERVAL",
            lookup("SNAPSHOT_INTERVAL"),
            DEFAULT_SNAPSHOT_INTERVAL,
        )?;
        let projection_batch_size = parse(
            "PROJECTION_BATCH_SIZE",
            lookup("PROJECTION_BATCH_SIZE"),
            DEFAULT_PROJECTION_BATCH_SIZE,
        )?;
        let poll_interval_ms = parse(
            "PROJECTION_POLL_INTERVAL_MS",
            lookup("PROJECTION_POLL_INTERVAL_MS"),
            DEFAULT_PROJECTION_POLL_INTERVAL_MS,
        )?;
        if projection_batch_size == 0 || poll_interval_ms == 0 {
            return Err(AppError::Config(
                "PROJECTION_BATCH_SIZE and PROJECTION_POLL_INTERVAL_MS must be positive".into(),
            ));
        }
        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: parse("PORT", lookup("PORT"), DEFAULT_PORT)?,
            encryption_key,
            snapshot_policy: SnapshotPolicy::from_interval(snapshot_interval),
            projection_batch_size,
            projection_poll_interval: Duration::from_millis(poll_interval_ms),
        })
    }

    /// Returns the address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}
