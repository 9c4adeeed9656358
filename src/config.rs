//! Board settings, persisted as `settings.json` in the OS config directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Allowed wall-clock window (UTC) for dropped operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    /// `[start, end)` must begin at or after the opening time and finish by
    /// the closing time of the day it starts on.
    pub fn admits(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let day_close = start.date_naive().and_time(self.end).and_utc();
        start.time() >= self.start && end <= day_close
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Drop times are rounded to this interval.
    pub snap_minutes: i64,
    /// Same-lane moves smaller than this are treated as no-ops.
    pub min_move_minutes: i64,
    pub commit_timeout_secs: u64,
    pub working_hours: Option<WorkingHours>,
    /// Protective buffer in front of drum operations.
    pub drum_buffer_before_minutes: i64,
    /// Gap between a drum operation and its successors.
    pub drum_buffer_after_minutes: i64,
    /// Flag critical-path operations on every strategy run.
    pub mark_critical_path: bool,
    pub default_zoom: f32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            snap_minutes: 15,
            min_move_minutes: 30,
            commit_timeout_secs: 10,
            working_hours: Some(WorkingHours::default()),
            drum_buffer_before_minutes: 60,
            drum_buffer_after_minutes: 30,
            mark_critical_path: false,
            default_zoom: 1.0,
        }
    }
}

impl BoardConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.commit_timeout_secs)
    }

    /// Default location of the settings file.
    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "ResourceGantt") {
            proj_dirs.config_dir().join("settings.json")
        } else {
            PathBuf::from(".").join("settings.json")
        }
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// malformed.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "malformed settings; using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(path, json).map_err(|e| e.to_string())
    }
}
