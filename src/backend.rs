//! Audio backend detection.
//!
//! The panel supports two audio servers. PipeWire is preferred when its
//! command line tools answer; anything else falls back to PulseAudio's
//! `paplay`, which also works against PipeWire's pulse shim.

use std::process::Stdio;

use tokio::process::Command;

/// Program used to probe for a running PipeWire daemon (`pw-cli info`).
pub const PIPEWIRE_PROBE: &str = "pw-cli";

/// The audio server the player talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    PipeWire,
    PulseAudio,
}

impl Backend {
    /// Run `program args...` and pick PipeWire only if it exits cleanly.
    /// A missing binary or any launch error counts as "no PipeWire".
    pub async fn detect_with(program: &str, args: &[&str]) -> Self {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => {
                log::info!("PipeWire detected, using pw-play");
                Backend::PipeWire
            }
            Ok(status) => {
                log::debug!("{program} exited with {status}; falling back to PulseAudio");
                Backend::PulseAudio
            }
            Err(e) => {
                log::debug!("failed to run {program}: {e}; falling back to PulseAudio");
                Backend::PulseAudio
            }
        }
    }

    /// Player command for this backend.
    pub fn player(self) -> &'static str {
        match self {
            Backend::PipeWire => "pw-play",
            Backend::PulseAudio => "paplay",
        }
    }

    /// `pw-play` has no per-call sink flag, so only PulseAudio can honour a
    /// device selection.
    pub fn supports_device_selection(self) -> bool {
        matches!(self, Backend::PulseAudio)
    }
}

/// Whether `command` resolves to an executable, either on `PATH` or as a
/// path of its own.
pub fn executable_in_path(command: &str) -> bool {
    which::which(command).is_ok()
}
