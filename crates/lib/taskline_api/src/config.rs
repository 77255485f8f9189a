//! API server configuration.

use std::time::Duration;

use taskline_core::auth::jwt::{resolve_jwt_secret, resolve_refresh_secret};
use taskline_core::auth::refresh_store::DEFAULT_SWEEP_INTERVAL;
use taskline_core::auth::service::{RefreshRotation, TokenSettings};
use taskline_core::realtime::router::DEFAULT_PERSISTENCE_TIMEOUT;
use tracing::warn;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3200").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Access-token signing secret.
    pub jwt_secret: String,
    /// Refresh-token signing secret.
    pub jwt_refresh_secret: String,
    pub access_ttl: String,
    pub refresh_ttl: String,
    pub refresh_rotation: RefreshRotation,
    /// Bound on each persistence call made while routing socket events.
    pub persistence_timeout: Duration,
    pub refresh_sweep_interval: Duration,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                      | Default                              |
    /// |-------------------------------|--------------------------------------|
    /// | `BIND_ADDR`                   | `127.0.0.1:3200`                     |
    /// | `DATABASE_URL`                | `postgres://localhost:5432/taskline` |
    /// | `JWT_SECRET` / `AUTH_SECRET`  | generated & persisted to file        |
    /// | `JWT_REFRESH_SECRET`          | derived from the access secret       |
    /// | `JWT_ACCESS_EXPIRES_IN`       | `15m`                                |
    /// | `JWT_REFRESH_EXPIRES_IN`      | `7d`                                 |
    /// | `REFRESH_TOKEN_ROTATION`      | `reuse`                              |
    /// | `PERSISTENCE_TIMEOUT_MS`      | `5000`                               |
    /// | `REFRESH_SWEEP_INTERVAL_SECS` | `3600`                               |
    pub fn from_env() -> Self {
        let jwt_secret = resolve_jwt_secret();
        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:3200"),
            pg_connection_url: env_or("DATABASE_URL", "postgres://localhost:5432/taskline"),
            jwt_refresh_secret: resolve_refresh_secret(&jwt_secret),
            jwt_secret,
            access_ttl: env_or("JWT_ACCESS_EXPIRES_IN", "15m"),
            refresh_ttl: env_or("JWT_REFRESH_EXPIRES_IN", "7d"),
            refresh_rotation: std::env::var("REFRESH_TOKEN_ROTATION")
                .ok()
                .map(|raw| {
                    raw.parse().unwrap_or_else(|e| {
                        warn!(error = %e, "falling back to refresh token reuse");
                        RefreshRotation::Reuse
                    })
                })
                .unwrap_or_default(),
            persistence_timeout: env_millis("PERSISTENCE_TIMEOUT_MS")
                .unwrap_or(DEFAULT_PERSISTENCE_TIMEOUT),
            refresh_sweep_interval: env_secs("REFRESH_SWEEP_INTERVAL_SECS")
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
        }
    }

    /// Config with fixed secrets and default lifetimes, no environment lookups.
    pub fn with_secret(secret: &str) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".into(),
            pg_connection_url: String::new(),
            jwt_secret: secret.to_string(),
            jwt_refresh_secret: format!("{secret}:refresh"),
            access_ttl: "15m".into(),
            refresh_ttl: "7d".into(),
            refresh_rotation: RefreshRotation::Reuse,
            persistence_timeout: DEFAULT_PERSISTENCE_TIMEOUT,
            refresh_sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            access_secret: self.jwt_secret.clone(),
            refresh_secret: self.jwt_refresh_secret.clone(),
            access_ttl: self.access_ttl.clone(),
            refresh_ttl: self.refresh_ttl.clone(),
            rotation: self.refresh_rotation,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(key, value = %raw, "ignoring invalid numeric setting");
            None
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_millis)
}

fn env_secs(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_secs)
}
