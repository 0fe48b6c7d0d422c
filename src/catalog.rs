//! Voice and output-device enumeration.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// Extension of Piper voice model files.
const VOICE_EXTENSION: &str = "onnx";

/// Sentinel device name meaning "whatever the audio server picks".
pub const DEFAULT_DEVICE: &str = "default";

/// List voice identifiers (model file names without `.onnx`) in `dir`,
/// sorted. A missing or unreadable directory yields an empty list.
pub fn list_voices(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("cannot read voice directory {}: {e}", dir.display());
            return Vec::new();
        }
    };
    let mut voices: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == VOICE_EXTENSION))
        .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .collect();
    voices.sort();
    voices
}

/// Output devices from `pactl list short sinks`, always led by `"default"`.
pub async fn list_audio_sinks() -> Vec<String> {
    list_audio_sinks_with("pactl", &["list", "short", "sinks"]).await
}

/// Same as [`list_audio_sinks`] with an explicit listing command. Any
/// failure degrades to just `["default"]`.
pub async fn list_audio_sinks_with(program: &str, args: &[&str]) -> Vec<String> {
    match run_listing(program, args).await {
        Ok(stdout) => parse_sinks(&stdout),
        Err(e) => {
            log::warn!("Failed to list sinks, using default: {e:#}");
            vec![DEFAULT_DEVICE.to_string()]
        }
    }
}

async fn run_listing(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to execute {program}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        bail!("{program} exited with {}: {stderr}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `pactl list short sinks` output: one sink per line, the name in the
/// second tab-separated column.
pub fn parse_sinks(stdout: &str) -> Vec<String> {
    let mut sinks = vec![DEFAULT_DEVICE.to_string()];
    sinks.extend(
        stdout
            .lines()
            .filter_map(|line| line.split('\t').nth(1))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
    );
    sinks
}
