use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SETTINGS_PATH_ENV: &str = "DEFUSAL_SETTINGS_PATH";

/// Per-participant preferences, read once at startup.
///
/// Gains are multipliers in `0.0..=1.0`. The timer loop is scaled by
/// `master * timer`, the win/loss stingers by `master * result`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerSettings {
    pub master_gain: f32,
    pub timer_gain: f32,
    pub result_gain: f32,
    pub muted: bool,
    /// Freeze round and cooldown timers while the host window is unfocused.
    pub auto_pause_on_focus_loss: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            master_gain: 1.0,
            timer_gain: 1.0,
            result_gain: 1.0,
            muted: false,
            auto_pause_on_focus_loss: true,
        }
    }
}

impl PlayerSettings {
    pub fn sanitized(self) -> Self {
        let unit = |gain: f32| if gain.is_nan() { 1.0 } else { gain.clamp(0.0, 1.0) };
        Self {
            master_gain: unit(self.master_gain),
            timer_gain: unit(self.timer_gain),
            result_gain: unit(self.result_gain),
            ..self
        }
    }

    pub fn timer_loop_gain(&self) -> f32 {
        self.scaled(self.timer_gain)
    }

    pub fn result_cue_gain(&self) -> f32 {
        self.scaled(self.result_gain)
    }

    fn scaled(&self, channel: f32) -> f32 {
        if self.muted {
            0.0
        } else {
            self.master_gain * channel
        }
    }
}

/// Where player settings live: `$DEFUSAL_SETTINGS_PATH`, else
/// `$XDG_CONFIG_HOME/defusal/settings.json`, else `~/.config/defusal/settings.json`.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        if let Some(explicit) = std::env::var_os(SETTINGS_PATH_ENV) {
            return Self::new(explicit);
        }
        let config_dir = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(config_dir.join("defusal").join("settings.json"))
    }

    /// Missing or malformed settings fall back to defaults; they never stop a session.
    pub fn load(&self) -> PlayerSettings {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "no player settings, using defaults");
                return PlayerSettings::default();
            }
        };
        match serde_json::from_str::<PlayerSettings>(&text) {
            Ok(settings) => settings.sanitized(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring malformed player settings");
                PlayerSettings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_silences_both_channels() {
        let mut settings = PlayerSettings {
            master_gain: 0.5,
            timer_gain: 0.4,
            ..PlayerSettings::default()
        };
        assert!((settings.timer_loop_gain() - 0.2).abs() < 1e-6);
        assert!((settings.result_cue_gain() - 0.5).abs() < 1e-6);

        settings.muted = true;
        assert_eq!(settings.timer_loop_gain(), 0.0);
        assert_eq!(settings.result_cue_gain(), 0.0);
    }

    #[test]
    fn sanitized_pulls_gains_into_range() {
        let settings = PlayerSettings {
            master_gain: 2.0,
            timer_gain: -1.0,
            result_gain: f32::NAN,
            ..PlayerSettings::default()
        }
        .sanitized();

        assert_eq!(settings.master_gain, 1.0);
        assert_eq!(settings.timer_gain, 0.0);
        assert_eq!(settings.result_gain, 1.0);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"timerGain": 0.25, "autoPauseOnFocusLoss": false}"#).expect("write");

        let settings = SettingsStore::new(path).load();
        assert_eq!(settings.timer_gain, 0.25);
        assert_eq!(settings.master_gain, 1.0);
        assert!(!settings.auto_pause_on_focus_loss);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").expect("write");
        assert_eq!(SettingsStore::new(path).load(), PlayerSettings::default());
    }
}
