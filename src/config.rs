// ⚙️ Configuration - environment (+ .env) settings and logging bootstrap

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const ENV_DATABASE: &str = "DUMP_CONVERT_DATABASE";
pub const ENV_BACKUP_DIR: &str = "DUMP_CONVERT_BACKUP_DIR";
pub const ENV_BIND: &str = "DUMP_CONVERT_BIND";
pub const ENV_MAX_UPLOAD: &str = "DUMP_CONVERT_MAX_UPLOAD";
pub const ENV_SEED: &str = "DUMP_CONVERT_SEED";

pub const DEFAULT_DATABASE: &str = "converted.db";
pub const DEFAULT_BACKUP_DIR: &str = "backups";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_UPLOAD: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// SQLite file the sink loads into
    pub database: PathBuf,
    pub backup_dir: PathBuf,
    pub bind: String,
    /// Largest accepted request body, bytes
    pub max_upload: usize,
    /// Fixed seed for the random source; entropy when unset
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database: PathBuf::from(DEFAULT_DATABASE),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            bind: DEFAULT_BIND.to_string(),
            max_upload: DEFAULT_MAX_UPLOAD,
            seed: None,
        }
    }
}

impl Settings {
    /// Load `.env` (if present) then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(v) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            settings.database = PathBuf::from(v.trim());
        }
        if let Some(v) = lookup(ENV_BACKUP_DIR).filter(|v| !v.trim().is_empty()) {
            settings.backup_dir = PathBuf::from(v.trim());
        }
        if let Some(v) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
            settings.bind = v.trim().to_string();
        }
        if let Some(v) = lookup(ENV_MAX_UPLOAD).filter(|v| !v.trim().is_empty()) {
            settings.max_upload = v
                .trim()
                .parse()
                .with_context(|| format!("{} must be a byte count, got '{}'", ENV_MAX_UPLOAD, v))?;
        }
        if let Some(v) = lookup(ENV_SEED).filter(|v| !v.trim().is_empty()) {
            settings.seed = Some(
                v.trim()
                    .parse()
                    .with_context(|| format!("{} must be an unsigned integer, got '{}'", ENV_SEED, v))?,
            );
        }

        Ok(settings)
    }
}

/// Install the global subscriber: RUST_LOG, default `info`
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
