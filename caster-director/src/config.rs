//! Director configuration
//!
//! Defaults match the settings file the desktop app writes on first run.
//! A `config.json` in the data directory can override them, and persisted
//! settings (see `RaceStore::set_setting`) override both.

use anyhow::{Context, Result};
use caster_core::{collaborators::League, detect::DetectorSettings, RaceStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// Seconds between director ticks
    pub director_update_freq: f64,

    /// Seconds an event may stay in the queue
    pub event_hist_len: f64,

    /// Seconds between ticks of the standalone detector loop
    pub events_update_freq: f64,

    /// Reserved for smoothing tuning
    pub telemetry_threshold: f64,

    /// Minimum distance per tick before a car counts as stopped
    pub stall_threshold: f32,

    /// Samples per moving-average window
    pub smoothing_window: usize,

    /// Camera groups to pick from when the selector cannot tell
    pub camera_count: usize,

    /// Seconds a commentary or camera call may take
    pub dispatch_timeout: f64,

    /// Running-order entries sent with each commentary request
    pub context_standings: usize,

    pub league_name: String,
    pub league_short_name: String,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            director_update_freq: 0.1,
            event_hist_len: 30.0,
            events_update_freq: 0.5,
            telemetry_threshold: 0.5,
            stall_threshold: caster_core::detect::DEFAULT_STALL_THRESHOLD,
            smoothing_window: caster_core::smoothing::DEFAULT_WINDOW,
            camera_count: 0,
            dispatch_timeout: 5.0,
            context_standings: 10,
            league_name: "My Awesome League".to_string(),
            league_short_name: "MAL".to_string(),
        }
    }
}

fn secs(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(value)
        .or_else(|_| Duration::try_from_secs_f64(fallback))
        .unwrap_or(Duration::ZERO)
}

impl DirectorConfig {
    /// Read a JSON config file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config.validated())
    }

    /// Like `load`, but falls back to defaults when the file is absent or bad
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file: {:#}", e);
                Self::default()
            }
        }
    }

    /// Overlay values persisted in the settings table
    pub fn apply_settings(&mut self, store: &dyn RaceStore) {
        fn read<T: FromStr>(store: &dyn RaceStore, key: &str, slot: &mut T) {
            match store.get_setting(key) {
                Ok(Some(raw)) => match raw.trim().parse() {
                    Ok(value) => *slot = value,
                    Err(_) => warn!(key, value = %raw, "Ignoring unparsable setting"),
                },
                Ok(None) => {}
                Err(e) => warn!(key, "Failed to read setting: {}", e),
            }
        }

        read(store, "director_update_freq", &mut self.director_update_freq);
        read(store, "event_hist_len", &mut self.event_hist_len);
        read(store, "events_update_freq", &mut self.events_update_freq);
        read(store, "telemetry_threshold", &mut self.telemetry_threshold);
        read(store, "stall_threshold", &mut self.stall_threshold);
        read(store, "smoothing_window", &mut self.smoothing_window);
        read(store, "camera_count", &mut self.camera_count);
        read(store, "dispatch_timeout", &mut self.dispatch_timeout);
        read(store, "context_standings", &mut self.context_standings);
        read(store, "league_name", &mut self.league_name);
        read(store, "league_short_name", &mut self.league_short_name);

        *self = std::mem::take(self).validated();
    }

    /// Replace non-positive intervals with their defaults
    fn validated(mut self) -> Self {
        fn fix(name: &str, value: &mut f64, default: f64) {
            if !value.is_finite() || *value <= 0.0 {
                warn!(key = name, value = *value, "Invalid interval, using {}", default);
                *value = default;
            }
        }

        let defaults = Self::default();
        fix("director_update_freq", &mut self.director_update_freq, defaults.director_update_freq);
        fix("event_hist_len", &mut self.event_hist_len, defaults.event_hist_len);
        fix("events_update_freq", &mut self.events_update_freq, defaults.events_update_freq);
        fix("dispatch_timeout", &mut self.dispatch_timeout, defaults.dispatch_timeout);
        if self.smoothing_window == 0 {
            self.smoothing_window = defaults.smoothing_window;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        secs(self.director_update_freq, 0.1)
    }

    pub fn event_horizon(&self) -> Duration {
        secs(self.event_hist_len, 30.0)
    }

    pub fn events_interval(&self) -> Duration {
        secs(self.events_update_freq, 0.5)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        secs(self.dispatch_timeout, 5.0)
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            stall_threshold: self.stall_threshold,
        }
    }

    pub fn league(&self) -> Option<League> {
        if self.league_name.is_empty() {
            return None;
        }
        Some(League {
            name: self.league_name.clone(),
            short_name: self.league_short_name.clone(),
        })
    }
}
