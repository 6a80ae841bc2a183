use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 32;
pub const TELEMETRY_DIR_NAME: &str = "telemetry";

/// Runtime settings for a [`crate::VectorDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/telemetry` when unset.
    pub telemetry_dir: Option<PathBuf>,
    pub telemetry_enabled: bool,
    pub wal_sync_on_write: bool,
    pub checkpoint_interval: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            telemetry_dir: None,
            telemetry_enabled: true,
            wal_sync_on_write: true,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    pub fn with_telemetry_dir(mut self, telemetry_dir: impl Into<PathBuf>) -> Self {
        self.telemetry_dir = Some(telemetry_dir.into());
        self
    }

    pub fn with_telemetry_enabled(mut self, enabled: bool) -> Self {
        self.telemetry_enabled = enabled;
        self
    }

    pub fn with_wal_sync_on_write(mut self, sync: bool) -> Self {
        self.wal_sync_on_write = sync;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn from_env() -> Result<Self> {
        let data_dir = parse_optional_path("SKYVEC_DATA_DIR")?;
        let telemetry_dir = parse_optional_path("SKYVEC_TELEMETRY_DIR")?;
        let telemetry_enabled = parse_bool_env("SKYVEC_TELEMETRY_ENABLED", true)?;
        let wal_sync_on_write = parse_bool_env("SKYVEC_WAL_SYNC_ON_WRITE", true)?;
        let checkpoint_interval =
            parse_usize("SKYVEC_CHECKPOINT_INTERVAL", DEFAULT_CHECKPOINT_INTERVAL)?;

        let config = Self {
            data_dir,
            telemetry_dir,
            telemetry_enabled,
            wal_sync_on_write,
            checkpoint_interval,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval == 0 {
            return Err(Error::Config(
                "checkpoint_interval must be > 0".to_string(),
            ));
        }
        if self
            .data_dir
            .as_deref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return Err(Error::Config("data_dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Directory receiving `log.jsonl` and `stats.json`, if any.
    pub fn resolved_telemetry_dir(&self) -> Option<PathBuf> {
        if !self.telemetry_enabled {
            return None;
        }
        self.telemetry_dir.clone().or_else(|| {
            self.data_dir
                .as_deref()
                .map(|data_dir| data_dir.join(TELEMETRY_DIR_NAME))
        })
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool> {
    let raw = env::var(key).unwrap_or_else(|_| {
        if default {
            "true".to_string()
        } else {
            "false".to_string()
        }
    });

    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key} must be a boolean, got '{raw}'"))),
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|_| Error::Config(format!("{key} must be a positive integer, got '{raw}'")))
}

fn parse_optional_path(key: &str) -> Result<Option<PathBuf>> {
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Err(Error::Config(format!("{key} must not be empty"))),
        Ok(raw) => Ok(Some(PathBuf::from(raw))),
        Err(_) => Ok(None),
    }
}
