//! Playback stage: optional volume filter piped into the backend's player.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};

use crate::backend::Backend;
use crate::catalog::DEFAULT_DEVICE;
use crate::error::{EngineError, Stage};
use crate::supervisor::{self, Slot, Supervisor};

/// Volumes closer than this to 1.0 are played unfiltered.
pub const UNITY_EPSILON: f64 = 1e-3;

/// Where and how audio is played. Resolved once when the engine starts.
#[derive(Debug, Clone)]
pub struct AudioOutput {
    pub backend: Backend,
    pub player: String,
    /// Volume filter program, present only if it was found on the system.
    pub filter: Option<String>,
}

impl AudioOutput {
    pub fn new(backend: Backend, player: Option<String>, filter: Option<String>) -> Self {
        Self {
            backend,
            player: player.unwrap_or_else(|| backend.player().to_string()),
            filter,
        }
    }
}

pub fn needs_volume_filter(volume: f64, filter_available: bool) -> bool {
    filter_available && (volume - 1.0).abs() > UNITY_EPSILON
}

/// Player arguments for `source` (a file path, or `-` for stdin).
pub fn player_args(backend: Backend, device: &str, source: impl Into<OsString>) -> Vec<OsString> {
    let mut args = Vec::new();
    if device != DEFAULT_DEVICE {
        if backend.supports_device_selection() {
            args.push(OsString::from("--device"));
            args.push(OsString::from(device));
        } else {
            // pw-play has no per-stream target flag.
            log::debug!("{backend:?} player cannot target '{device}'; using the default sink");
        }
    }
    args.push(source.into());
    args
}

fn filter_args(artifact: &Path, volume: f64) -> Vec<OsString> {
    vec![
        artifact.as_os_str().to_os_string(),
        "-t".into(),
        "wav".into(),
        "-".into(),
        "vol".into(),
        volume.to_string().into(),
    ]
}

fn launch_failed(stage: Stage, program: &str) -> impl FnOnce(std::io::Error) -> EngineError {
    let program = program.to_string();
    move |source| EngineError::LaunchFailed {
        stage,
        program,
        source,
    }
}

struct Pipeline {
    player: Child,
    filter: Option<Child>,
}

impl Pipeline {
    fn spawn(output: &AudioOutput, artifact: &Path, device: &str, volume: f64) -> Result<Self, EngineError> {
        let filter_program = output
            .filter
            .as_deref()
            .filter(|_| needs_volume_filter(volume, true));

        let Some(filter_program) = filter_program else {
            let mut cmd = Command::new(&output.player);
            cmd.args(player_args(output.backend, device, artifact))
                .stdin(Stdio::null())
                .kill_on_drop(true);
            log::debug!("launching player: {cmd:?}");
            let player = cmd
                .spawn()
                .map_err(launch_failed(Stage::Playback, &output.player))?;
            return Ok(Self { player, filter: None });
        };

        let mut filter_cmd = Command::new(filter_program);
        filter_cmd
            .args(filter_args(artifact, volume))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        log::debug!("launching volume filter: {filter_cmd:?}");
        let mut filter = filter_cmd
            .spawn()
            .map_err(launch_failed(Stage::Filter, filter_program))?;

        // Any early return below drops `filter`, which kills it.
        let pipe: Stdio = filter
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("filter stdout was not captured"))
            .and_then(TryInto::<Stdio>::try_into)
            .map_err(launch_failed(Stage::Filter, filter_program))?;

        let mut player_cmd = Command::new(&output.player);
        player_cmd
            .args(player_args(output.backend, device, "-"))
            .stdin(pipe)
            .kill_on_drop(true);
        log::debug!("launching player: {player_cmd:?}");
        let player = player_cmd
            .spawn()
            .map_err(launch_failed(Stage::Playback, &output.player))?;
        // Drop our copy of the pipe so the filter gets EPIPE if the player
        // exits early instead of blocking forever.
        drop(player_cmd);

        Ok(Self {
            player,
            filter: Some(filter),
        })
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = self.player.wait().await;
        if let Some(filter) = self.filter.as_mut() {
            match filter.wait().await {
                Ok(filter_status) if !filter_status.success() => {
                    log::debug!("volume filter exited with {filter_status}");
                }
                Ok(_) => {}
                Err(e) => log::warn!("failed to wait for volume filter: {e}"),
            }
        }
        status
    }

    async fn terminate(&mut self) {
        supervisor::terminate(&mut self.player, "player").await;
        if let Some(filter) = self.filter.as_mut() {
            supervisor::terminate(filter, "volume filter").await;
        }
    }
}

/// Play `artifact` on `device` at `volume`, blocking until the player exits
/// or [`Supervisor::stop`] cuts it short.
pub async fn play(
    supervisor: &Supervisor,
    output: &AudioOutput,
    artifact: &Path,
    device: &str,
    volume: f64,
) -> Result<(), EngineError> {
    let (mut pipeline, mut registration) = supervisor.launch(Slot::Playback, || {
        Pipeline::spawn(output, artifact, device, volume)
    })?;

    let finished = tokio::select! {
        status = pipeline.wait() => Some(status),
        () = registration.cancelled() => None,
    };

    let Some(status) = finished else {
        pipeline.terminate().await;
        return Err(EngineError::Terminated {
            stage: Stage::Playback,
        });
    };
    drop(registration);

    let status = status.map_err(|source| EngineError::WaitFailed {
        stage: Stage::Playback,
        source,
    })?;
    if !status.success() {
        return Err(EngineError::ExitFailure {
            stage: Stage::Playback,
            status,
        });
    }
    Ok(())
}
