use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// File name of the SQLite database inside `state_dir`.
pub const DATABASE_FILE: &str = "reviewer-state.db";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Seed for reviewer selection. When unset the generator is seeded from
    /// OS entropy once at startup.
    pub reviewer_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let reviewer_seed = parse_reviewer_seed(env::var("REVIEWER_SEED").ok())?;

        Ok(Config {
            port,
            state_dir,
            reviewer_seed,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}

/// Parse REVIEWER_SEED from an optional string value.
///
/// Missing or whitespace-only values mean "no seed".
pub fn parse_reviewer_seed(value: Option<String>) -> Result<Option<u64>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .context("REVIEWER_SEED must be an unsigned 64-bit integer"),
    }
}
