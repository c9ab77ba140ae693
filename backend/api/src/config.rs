//! Application configuration loaded from environment variables.

use rewards_ledger::SystemClock;

use crate::errors::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database location (e.g. sqlite:./rewards.db)
    pub database_url: String,
    /// HMAC secret for signing session tokens
    pub jwt_secret: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Upper bound on pooled database connections
    pub db_max_connections: u32,
    /// Session token lifetime in days
    pub token_ttl_days: i64,
    /// bcrypt work factor
    pub bcrypt_cost: u32,
    /// UTC offset, in minutes, that defines the calendar day
    pub day_offset_minutes: i32,
    /// How often (in seconds) the referral reconciliation sweep runs
    pub reconcile_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Config {
            database_url: env_var("DATABASE_URL").map_err(|_| {
                ApiError::Config("DATABASE_URL environment variable is required".to_string())
            })?,
            jwt_secret: env_var("JWT_SECRET").map_err(|_| {
                ApiError::Config("JWT_SECRET environment variable is required".to_string())
            })?,
            api_port: parsed("API_PORT", "5000")?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", "5")?,
            token_ttl_days: parsed("TOKEN_TTL_DAYS", "7")?,
            bcrypt_cost: parsed("BCRYPT_COST", "12")?,
            day_offset_minutes: parsed("DAY_OFFSET_MINUTES", "0")?,
            reconcile_interval_secs: parsed("RECONCILE_INTERVAL_SECS", "300")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ApiError::Config("JWT_SECRET must not be empty".to_string()));
        }
        if self.token_ttl_days <= 0 {
            return Err(ApiError::Config("TOKEN_TTL_DAYS must be positive".to_string()));
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ApiError::Config("BCRYPT_COST must be between 4 and 31".to_string()));
        }
        if self.reconcile_interval_secs == 0 {
            return Err(ApiError::Config(
                "RECONCILE_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        self.clock()?;
        Ok(())
    }

    /// Wall clock for the configured calendar-day offset.
    pub fn clock(&self) -> Result<SystemClock> {
        SystemClock::with_offset_minutes(self.day_offset_minutes)
            .ok_or_else(|| ApiError::Config("Invalid DAY_OFFSET_MINUTES".to_string()))
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ApiError::Config(format!("Missing env var: {key}")))
}

fn parsed<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ApiError::Config(format!("Invalid {key}")))
}
