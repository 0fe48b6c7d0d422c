//! Persistent panel settings stored as a flat JSON object.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::DEFAULT_DEVICE;

/// Voice used when the voice directory is empty.
pub const FALLBACK_VOICE: &str = "en_GB-cori-high";

const DEFAULT_SPEED: f64 = 1.05;
const DEFAULT_NOISE: f64 = 0.5;

/// Parameters for a single utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    pub voice: String,
    pub speed: f64,
    pub noise: f64,
    pub volume: f64,
    pub output_device: String,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            voice: FALLBACK_VOICE.to_string(),
            speed: 1.0,
            noise: DEFAULT_NOISE,
            volume: 1.0,
            output_device: DEFAULT_DEVICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub voice: String,
    pub speed: f64,
    pub noise: f64,
    pub volume: f64,
    pub mute: bool,
    pub output_device: String,
    pub history: Vec<String>,
    pub favorites: Vec<String>,
    /// Keys written by other front ends are kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice: FALLBACK_VOICE.to_string(),
            speed: DEFAULT_SPEED,
            noise: DEFAULT_NOISE,
            volume: 1.0,
            mute: false,
            output_device: DEFAULT_DEVICE.to_string(),
            history: Vec::new(),
            favorites: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file is
    /// missing or unreadable. A voice that is not in `voices` is replaced by
    /// the first available one.
    pub fn load(path: &Path, voices: &[String]) -> Self {
        log::info!("Loading settings from: {}", path.display());
        let mut settings = if path.exists() {
            match Self::read(path) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("{e:#}; using defaults");
                    Self::default()
                }
            }
        } else {
            log::info!("No config file found, using defaults");
            Self::default()
        };

        if let Some(voice) = replacement_voice(&settings.voice, voices) {
            log::info!("Voice {} not found, using {voice}", settings.voice);
            settings.voice = voice;
        }
        settings.sanitize();
        settings
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Write the settings as pretty JSON. Returns false (after logging) if
    /// the file could not be written.
    pub fn save(&self, path: &Path) -> bool {
        match self.write(path) {
            Ok(()) => {
                log::debug!("Settings saved to {}", path.display());
                true
            }
            Err(e) => {
                log::error!("Failed to save settings: {e:#}");
                false
            }
        }
    }

    fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to serialise settings")?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Replace values the engine cannot use with their defaults.
    fn sanitize(&mut self) {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            self.speed = DEFAULT_SPEED;
        }
        self.noise = if self.noise.is_finite() {
            self.noise.clamp(0.0, 1.0)
        } else {
            DEFAULT_NOISE
        };
        if !(self.volume.is_finite() && self.volume >= 0.0) {
            self.volume = 1.0;
        }
        if self.output_device.trim().is_empty() {
            self.output_device = DEFAULT_DEVICE.to_string();
        }
    }

    pub fn playback(&self) -> PlaybackSettings {
        PlaybackSettings {
            voice: self.voice.clone(),
            speed: self.speed,
            noise: self.noise,
            volume: self.volume,
            output_device: self.output_device.clone(),
        }
    }
}

/// The voice to use instead of `current`, or `None` if `current` can stay.
/// With no voices installed the built-in name is kept as a placeholder.
fn replacement_voice(current: &str, voices: &[String]) -> Option<String> {
    if voices.iter().any(|v| v == current) {
        return None;
    }
    let fallback = voices.first().map_or(FALLBACK_VOICE, String::as_str);
    (fallback != current).then(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_file_uses_defaults_with_first_voice() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.json"), &voices(&["a", "b"]));

        assert_eq!(settings.voice, "a");
        assert_eq!(settings.speed, 1.05);
        assert_eq!(settings.noise, 0.5);
        assert_eq!(settings.volume, 1.0);
        assert!(!settings.mute);
        assert_eq!(settings.output_device, "default");
        assert!(settings.history.is_empty());
        assert!(settings.favorites.is_empty());
    }

    #[test]
    fn unknown_voice_is_replaced_by_first_available() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"voice": "z", "speed": 1.2}"#).unwrap();

        let settings = Settings::load(&path, &voices(&["a", "b"]));
        assert_eq!(settings.voice, "a");
        assert_eq!(settings.speed, 1.2);
    }

    #[test]
    fn no_voices_falls_back_to_builtin_name() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.json"), &[]);
        assert_eq!(settings.voice, FALLBACK_VOICE);
    }

    #[test]
    fn fallback_voice_is_not_replaced_by_itself() {
        assert_eq!(replacement_voice(FALLBACK_VOICE, &[]), None);
        assert_eq!(replacement_voice("a", &voices(&["a", "b"])), None);
        assert_eq!(replacement_voice("z", &[]), Some(FALLBACK_VOICE.to_string()));
        assert_eq!(replacement_voice("z", &voices(&["a", "b"])), Some("a".to_string()));
    }

    #[test]
    fn corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let settings = Settings::load(&path, &voices(&["b"]));
        assert_eq!(settings.voice, "b");
        assert_eq!(settings.speed, 1.05);
    }

    #[test]
    fn save_then_load_keeps_values_and_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"voice": "b", "volume": 1.5, "mute": true, "history": ["hi"], "window": {"w": 700}}"#,
        )
        .unwrap();

        let mut settings = Settings::load(&path, &voices(&["a", "b"]));
        settings.output_device = "speakers".to_string();
        assert!(settings.save(&path));

        let reloaded = Settings::load(&path, &voices(&["a", "b"]));
        assert_eq!(reloaded, settings);
        assert_eq!(reloaded.extra.get("window"), Some(&serde_json::json!({"w": 700})));
        assert_eq!(reloaded.history, vec!["hi"]);
        assert!(reloaded.mute);
    }

    #[test]
    fn save_to_unwritable_path_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        assert!(!Settings::default().save(&blocker.join("config.json")));
    }

    #[test]
    fn out_of_range_values_are_sanitised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"speed": -1.0, "noise": 3.0, "volume": -2.0, "output_device": ""}"#)
            .unwrap();

        let settings = Settings::load(&path, &voices(&["a"]));
        assert_eq!(settings.speed, 1.05);
        assert_eq!(settings.noise, 1.0);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.output_device, "default");
    }

    #[test]
    fn playback_view_copies_audio_fields() {
        let settings = Settings {
            voice: "a".into(),
            volume: 0.5,
            ..Settings::default()
        };
        let playback = settings.playback();
        assert_eq!(playback.voice, "a");
        assert_eq!(playback.volume, 0.5);
        assert_eq!(playback.speed, 1.05);
    }
}
