use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `TALLY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let db_path = var_or("TALLY_DB_PATH", "tally.db");
        let host = var_or("TALLY_HOST", "0.0.0.0");
        let port: u16 = var_or("TALLY_PORT", "4000")
            .parse()
            .context("TALLY_PORT is not a valid port")?;
        let ttl_days: i64 = var_or("TALLY_TOKEN_TTL_DAYS", "30")
            .parse()
            .context("TALLY_TOKEN_TTL_DAYS is not a number")?;

        let jwt_secret = std::env::var("TALLY_JWT_SECRET").unwrap_or_else(|_| {
            warn!("TALLY_JWT_SECRET not set, using the development secret");
            DEV_JWT_SECRET.to_string()
        });

        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("Invalid listen address {host}:{port}"))?;

        Ok(Self {
            db_path: PathBuf::from(db_path),
            addr,
            jwt_secret,
            token_ttl: chrono::Duration::days(ttl_days.max(1)),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
