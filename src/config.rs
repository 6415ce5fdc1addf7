//! Configuration for the archive service binary.
//!
//! Two sections: the database connection and the archive scheduler settings.
//! Values load from a TOML file or from `MOTHBALL_*` environment variables,
//! with environment variables taking precedence in the binary.

use crate::{error::MothballError, scheduler::ArchiveSettings};
use serde::{Deserialize, Serialize};

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,

    /// Connection pool size.
    pub pool_size: u32,

    /// Connection timeout in seconds.
    pub connection_timeout_secs: u64,

    /// Whether to create tables on startup if they don't exist.
    pub create_tables: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/mothball".to_string(),
            pool_size: 10,
            connection_timeout_secs: 30,
            create_tables: true,
        }
    }
}

/// Top-level configuration.
///
/// # Examples
///
/// ```rust
/// use mothball::config::MothballConfig;
///
/// let config = MothballConfig::new()
///     .with_database_url("postgresql://localhost/influencers")
///     .with_batch_size(500);
/// assert_eq!(config.archive.batch_size, 500);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MothballConfig {
    /// Database configuration.
    pub database: DatabaseConfig,

    /// Archive scheduler settings.
    pub archive: ArchiveSettings,
}

impl MothballConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database_url(mut self, url: &str) -> Self {
        self.database.url = url.to_string();
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.archive.batch_size = batch_size;
        self
    }

    pub fn with_hours_threshold(mut self, hours: u32) -> Self {
        self.archive.hours_threshold = hours;
        self
    }

    pub fn with_aggressive_mode(mut self, enabled: bool) -> Self {
        self.archive.aggressive_mode = enabled;
        self
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &str) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from environment variables, starting from defaults.
    /// `DATABASE_URL` is honored, with `MOTHBALL_DATABASE_URL` taking
    /// precedence over it.
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();
        config.overlay_env();
        Ok(config)
    }

    /// Apply environment variable overrides on top of the current values.
    /// Unparseable values leave the existing value in place.
    pub fn overlay_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(url) = std::env::var("MOTHBALL_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(pool_size) = std::env::var("MOTHBALL_DATABASE_POOL_SIZE") {
            self.database.pool_size = pool_size.parse().unwrap_or(self.database.pool_size);
        }

        if let Ok(batch_size) = std::env::var("MOTHBALL_BATCH_SIZE") {
            self.archive.batch_size = batch_size.parse().unwrap_or(self.archive.batch_size);
        }
        if let Ok(hours) = std::env::var("MOTHBALL_HOURS_THRESHOLD") {
            self.archive.hours_threshold = hours.parse().unwrap_or(self.archive.hours_threshold);
        }
        if let Ok(tolerance) = std::env::var("MOTHBALL_TOLERANCE_HOURS") {
            self.archive.tolerance_hours =
                tolerance.parse().unwrap_or(self.archive.tolerance_hours);
        }
        if let Ok(minute) = std::env::var("MOTHBALL_RUN_MINUTE") {
            self.archive.run_minute = minute.parse().unwrap_or(self.archive.run_minute);
        }
        if let Ok(enabled) = std::env::var("MOTHBALL_ENABLE_BACKLOG") {
            self.archive.enable_backlog_processing = enabled
                .parse()
                .unwrap_or(self.archive.enable_backlog_processing);
        }
        if let Ok(aggressive) = std::env::var("MOTHBALL_AGGRESSIVE_MODE") {
            self.archive.aggressive_mode =
                aggressive.parse().unwrap_or(self.archive.aggressive_mode);
        }
        if let Ok(multiplier) = std::env::var("MOTHBALL_BACKLOG_BATCH_MULTIPLIER") {
            self.archive.backlog_batch_multiplier = multiplier
                .parse()
                .unwrap_or(self.archive.backlog_batch_multiplier);
        }
        if let Ok(max_age) = std::env::var("MOTHBALL_MAX_BACKLOG_AGE_DAYS") {
            self.archive.max_backlog_age_days = max_age
                .parse()
                .unwrap_or(self.archive.max_backlog_age_days);
        }
        if let Ok(timezone) = std::env::var("MOTHBALL_TIMEZONE") {
            self.archive.timezone = timezone;
        }
    }

    /// Check that the loaded configuration is usable.
    pub fn validate(&self) -> crate::Result<()> {
        if self.database.url.is_empty() {
            return Err(MothballError::Config(
                "database url must not be empty".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(MothballError::Config(
                "database pool_size must be at least 1".to_string(),
            ));
        }
        self.archive.validate()
    }
}
