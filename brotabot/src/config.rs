//! Persistent application configuration.
//!
//! Stored as JSON in a platform-appropriate config directory.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::env::PollIntervals;

/// On-disk configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target window application name (from `xcap::Window::app_name()`).
    ///
    /// This is reasonably stable across restarts. If multiple windows share
    /// the same app name, the first match is used.
    pub app_name: String,

    /// OCR model paths.
    pub ocr_detection: PathBuf,
    pub ocr_recognition: PathBuf,
    pub ocr_charset: PathBuf,

    /// Directory of scene reference thumbnails (`<ordinal>_<name>.png`).
    pub scene_templates: PathBuf,

    /// Retry interval (seconds) while the game window is absent.
    pub window_retry_s: f32,
    /// Re-poll interval (seconds) while the pause menu is up.
    pub pause_poll_s: f32,
    /// Poll interval (seconds) while waiting for a wave during reset.
    pub reset_poll_s: f32,
    /// Wait (seconds) after the final-wave timer stall before re-reading.
    pub boss_stall_s: f32,

    /// Synthetic key hold duration (seconds).
    pub key_hold_s: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Brotato".to_string(),
            ocr_detection: PathBuf::from("models/ocr/detection.mnn"),
            ocr_recognition: PathBuf::from("models/ocr/latin_recognition.mnn"),
            ocr_charset: PathBuf::from("models/ocr/latin_charset.txt"),
            scene_templates: PathBuf::from("models/scenes"),
            window_retry_s: 1.0,
            pause_poll_s: 3.0,
            reset_poll_s: 0.5,
            boss_stall_s: 0.2,
            key_hold_s: 0.075,
        }
    }
}

impl Config {
    /// Path to the config file.
    pub fn path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("config_dir() unavailable")?;
        Ok(base.join("brotabot.json"))
    }

    /// Load configuration from disk, falling back to defaults on missing file.
    pub fn load_or_default() -> Self {
        match Self::try_load() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load config; using defaults");
                Self::default()
            }
        }
    }

    /// Try to load configuration from disk.
    pub fn try_load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(&path).with_context(|| format!("read {:?}", path))?;
        let cfg = serde_json::from_str(&json).with_context(|| format!("parse {:?}", path))?;
        Ok(cfg)
    }

    /// Save configuration to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(&path, json).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }

    pub fn poll_intervals(&self) -> PollIntervals {
        PollIntervals {
            window_retry: Duration::from_secs_f32(self.window_retry_s),
            pause: Duration::from_secs_f32(self.pause_poll_s),
            reset: Duration::from_secs_f32(self.reset_poll_s),
            boss_stall: Duration::from_secs_f32(self.boss_stall_s),
        }
    }

    pub fn key_hold(&self) -> Duration {
        Duration::from_secs_f32(self.key_hold_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.app_name, cfg.app_name);
        assert_eq!(back.key_hold_s, cfg.key_hold_s);
    }
}
