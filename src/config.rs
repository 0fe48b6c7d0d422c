//! Environment-driven configuration.
//!
//! Everything is optional. Variables are read after `dotenvy` has loaded a
//! `.env` file, so a checkout can carry its own synthesizer path:
//!
//!  * `PIPER_CONTROL_HOME`: base directory for `config.json`, `voices/` and
//!    the status files. Defaults to `~/.piper-control`.
//!  * `PIPER_VOICE_DIR`: where `*.onnx` voice models live. Defaults to
//!    `$PIPER_CONTROL_HOME/voices`.
//!  * `PIPER_BIN`: synthesizer executable. Defaults to `piper-tts`.
//!  * `PIPER_FILTER_BIN`: volume filter executable. Defaults to `sox`.
//!  * `PIPER_PLAYER_BIN`: player executable. Defaults to `pw-play` or
//!    `paplay`, depending on the detected backend.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub const DEFAULT_SYNTHESIZER: &str = "piper-tts";
pub const DEFAULT_FILTER: &str = "sox";

/// Settings the engine needs to find its external programs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub synthesizer: String,
    /// Volume filter program, or `None` to always play at unity gain.
    pub filter: Option<String>,
    /// Player override; `None` uses the backend's own player.
    pub player: Option<String>,
    pub voice_dir: PathBuf,
    /// Probe command used to detect PipeWire; `None` forces PulseAudio.
    pub backend_probe: Option<(String, Vec<String>)>,
}

impl EngineConfig {
    pub fn new(voice_dir: PathBuf) -> Self {
        Self {
            synthesizer: DEFAULT_SYNTHESIZER.to_string(),
            filter: Some(DEFAULT_FILTER.to_string()),
            player: None,
            voice_dir,
            backend_probe: Some((
                crate::backend::PIPEWIRE_PROBE.to_string(),
                vec!["info".to_string()],
            )),
        }
    }
}

/// Resolved application paths plus the engine configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub home: PathBuf,
    pub settings_path: PathBuf,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let home = match env::var_os("PIPER_CONTROL_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| anyhow!("cannot determine the home directory; set PIPER_CONTROL_HOME"))?
                .join(".piper-control"),
        };
        let voice_dir = env::var_os("PIPER_VOICE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("voices"));

        let mut engine = EngineConfig::new(voice_dir);
        if let Ok(bin) = env::var("PIPER_BIN") {
            engine.synthesizer = bin;
        }
        if let Ok(bin) = env::var("PIPER_FILTER_BIN") {
            engine.filter = Some(bin);
        }
        if let Ok(bin) = env::var("PIPER_PLAYER_BIN") {
            engine.player = Some(bin);
        }

        Ok(Self {
            settings_path: home.join("config.json"),
            home,
            engine,
        })
    }
}
