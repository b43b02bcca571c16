//! Configuration for the synchronization engine.
//!
//! Settings are loaded from `conf/config.toml` when present. Missing sections
//! or fields fall back to defaults and out-of-range values are clamped, so a
//! broken file never prevents a matching pass or a playback session.

use crate::align::DEFAULT_MIN_BLOCK_CHARS;
use crate::store::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "conf/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    pub matching: MatchingConfig,
    pub playback: PlaybackConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub batch_size: usize,
    pub min_block_chars: usize,
    pub max_batch_retries: u32,
    pub retry_backoff_ms: u64,
    pub on_batch_failure: BatchFailurePolicy,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            min_block_chars: DEFAULT_MIN_BLOCK_CHARS,
            max_batch_retries: 2,
            retry_backoff_ms: 200,
            on_batch_failure: BatchFailurePolicy::Continue,
        }
    }
}

impl MatchingConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// What a pass does once a batch has used up its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchFailurePolicy {
    #[default]
    Continue,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub suppression_window_ms: u64,
    pub bookmark_seek_offset_secs: f64,
    pub compact_layout: bool,
    pub auto_scroll: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            suppression_window_ms: 250,
            bookmark_seek_offset_secs: 0.05,
            compact_layout: false,
            auto_scroll: true,
        }
    }
}

impl PlaybackConfig {
    pub fn suppression_window(&self) -> Duration {
        Duration::from_millis(self.suppression_window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl SyncConfig {
    /// Pull every numeric setting back into its supported range.
    pub fn clamped(mut self) -> Self {
        let matching = &mut self.matching;
        matching.batch_size = matching.batch_size.clamp(1, DEFAULT_BATCH_SIZE);
        matching.min_block_chars = matching.min_block_chars.min(64);
        matching.max_batch_retries = matching.max_batch_retries.min(10);
        matching.retry_backoff_ms = matching.retry_backoff_ms.min(10_000);

        let playback = &mut self.playback;
        playback.suppression_window_ms = playback.suppression_window_ms.clamp(50, 2_000);
        playback.bookmark_seek_offset_secs = if playback.bookmark_seek_offset_secs.is_finite() {
            playback.bookmark_seek_offset_secs.clamp(0.0, 1.0)
        } else {
            PlaybackConfig::default().bookmark_seek_offset_secs
        };
        self
    }
}

pub fn parse_config(contents: &str) -> Result<SyncConfig, toml::de::Error> {
    toml::from_str::<SyncConfig>(contents).map(SyncConfig::clamped)
}

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> SyncConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return SyncConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err}");
            SyncConfig::default()
        }
    }
}
