//! Server configuration loaded from environment variables

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string for regular queries (may point at a pooler).
    pub database_url: String,
    /// Direct connection string for migrations, if different.
    pub database_direct_url: Option<String>,
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let database_direct_url = std::env::var("DATABASE_DIRECT_URL").ok();

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            database_direct_url,
            bind_address,
            allowed_origins,
        })
    }
}
