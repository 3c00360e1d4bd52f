use std::time::Duration;

use anyhow::Context;

/// Process configuration, read once at startup from the environment
/// (`.env` is loaded first, same as the deployment scripts expect).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub jwt_secret: String,
    /// Upper bound on any single message-store call. A send that blows
    /// past this is dropped, not retried.
    pub store_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let port = dotenv::var("PORT").unwrap_or_else(|_| "3001".to_string());
        let bind_addr = format!("0.0.0.0:{port}");

        let database_url = dotenv::var("DATABASE_URL")
            .context("DATABASE_URL not set")?;
        let jwt_secret = dotenv::var("JWT_SECRET")
            .context("JWT_SECRET not set")?;

        let store_timeout_ms = match dotenv::var("STORE_TIMEOUT_MS") {
            Ok(raw) => raw.parse().context("STORE_TIMEOUT_MS is not a number")?,
            Err(_) => 5_000,
        };

        Ok(Config {
            bind_addr,
            database_url,
            jwt_secret,
            store_timeout: Duration::from_millis(store_timeout_ms),
        })
    }
}
