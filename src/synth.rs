//! Synthesis stage: text in, WAV file out.
//!
//! Piper reads the text on stdin and writes the decoded audio to the path
//! given with `--output_file`. Every request gets its own scratch directory
//! so a second utterance can never overwrite a file that is still being
//! played.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use crate::config::EngineConfig;
use crate::error::{EngineError, Stage};
use crate::settings::PlaybackSettings;
use crate::supervisor::{terminate, Slot, Supervisor};

const ARTIFACT_NAME: &str = "utterance.wav";

/// Synthesized audio on disk. The scratch directory is removed when the
/// artifact is discarded or dropped.
#[derive(Debug)]
pub struct Artifact {
    dir: TempDir,
    path: PathBuf,
}

impl Artifact {
    fn create() -> Result<Self, EngineError> {
        let dir = tempfile::Builder::new()
            .prefix("piper-control-")
            .tempdir()
            .map_err(EngineError::Scratch)?;
        let path = dir.path().join(ARTIFACT_NAME);
        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the scratch directory. Failure is logged and otherwise ignored.
    pub fn discard(self) {
        let dir = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            log::warn!("failed to remove {}: {e}", dir.display());
        }
    }
}

/// Path of the model file for `voice`.
pub fn model_path(voice_dir: &Path, voice: &str) -> PathBuf {
    voice_dir.join(format!("{voice}.onnx"))
}

fn synthesis_command(program: &str, model: &Path, settings: &PlaybackSettings, output: &Path) -> Command {
    let mut cmd = Command::new(program);
    // Piper exposes two correlated noise knobs; both get the same value.
    cmd.arg("--model")
        .arg(model)
        .arg("--length_scale")
        .arg(settings.speed.to_string())
        .arg("--noise_scale")
        .arg(settings.noise.to_string())
        .arg("--noise_w")
        .arg(settings.noise.to_string())
        .arg("--output_file")
        .arg(output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// Run the synthesizer for `text` and return the resulting artifact.
///
/// The child is registered in the synthesis slot for the duration of the
/// wait, so [`Supervisor::stop`] can cut it short; in that case the result
/// is always [`EngineError::Terminated`], whatever the synthesizer managed to
/// write before it died.
pub async fn synthesize(
    supervisor: &Supervisor,
    config: &EngineConfig,
    text: &str,
    settings: &PlaybackSettings,
) -> Result<Artifact, EngineError> {
    let model = model_path(&config.voice_dir, &settings.voice);
    if !model.is_file() {
        return Err(EngineError::ModelNotFound { path: model });
    }

    let artifact = Artifact::create()?;
    let mut command = synthesis_command(&config.synthesizer, &model, settings, artifact.path());
    log::debug!("launching synthesizer: {command:?}");

    let (mut child, mut registration) = supervisor.launch(Slot::Synthesis, || {
        command.spawn().map_err(|source| EngineError::LaunchFailed {
            stage: Stage::Synthesis,
            program: config.synthesizer.clone(),
            source,
        })
    })?;
    let stdin = child.stdin.take();

    let finished = tokio::select! {
        status = feed_and_wait(&mut child, stdin, text) => Some(status),
        () = registration.cancelled() => None,
    };

    let Some(status) = finished else {
        terminate(&mut child, "synthesizer").await;
        return Err(EngineError::Terminated {
            stage: Stage::Synthesis,
        });
    };
    drop(registration);

    let status = status.map_err(|source| EngineError::WaitFailed {
        stage: Stage::Synthesis,
        source,
    })?;
    if !artifact.path().is_file() {
        return Err(EngineError::ArtifactMissing {
            path: artifact.path().to_path_buf(),
        });
    }
    if !status.success() {
        log::warn!("synthesizer exited with {status} but produced audio; playing it anyway");
    }
    Ok(artifact)
}

async fn feed_and_wait(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    text: &str,
) -> std::io::Result<ExitStatus> {
    if let Some(mut stdin) = stdin {
        // A synthesizer that dies early closes the pipe; its exit status
        // tells the rest of the story.
        if let Err(e) = stdin.write_all(text.as_bytes()).await {
            log::warn!("failed to write text to synthesizer: {e}");
        }
        // Close stdin to let Piper know the input is complete.
        stdin.shutdown().await.ok();
    }
    child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{eventually, FakeTools};

    fn settings(voice: &str) -> PlaybackSettings {
        PlaybackSettings {
            voice: voice.to_string(),
            speed: 1.05,
            noise: 0.5,
            ..PlaybackSettings::default()
        }
    }

    #[tokio::test]
    async fn writes_artifact_with_piper_arguments() {
        let tools = FakeTools::new();
        let config = tools.config(tools.synthesizer(), tools.player(), None);
        let supervisor = Supervisor::new();

        let artifact = synthesize(&supervisor, &config, "hello there", &settings("a"))
            .await
            .expect("synthesis should succeed");

        assert_eq!(std::fs::read_to_string(artifact.path()).unwrap(), "hello there");
        let launches = tools.launches();
        assert_eq!(launches.len(), 1);
        let model = model_path(&tools.voice_dir, "a");
        assert_eq!(
            launches[0],
            format!(
                "synth --model {} --length_scale 1.05 --noise_scale 0.5 --noise_w 0.5 --output_file {}",
                model.display(),
                artifact.path().display()
            )
        );
        assert!(!supervisor.is_active(Slot::Synthesis));

        let dir = artifact.path().parent().unwrap().to_path_buf();
        artifact.discard();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn unknown_voice_fails_before_spawning() {
        let tools = FakeTools::new();
        let config = tools.config(tools.synthesizer(), tools.player(), None);

        let err = synthesize(&Supervisor::new(), &config, "hello", &settings("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ModelNotFound { .. }));
        assert!(tools.launches().is_empty());
    }

    #[tokio::test]
    async fn missing_output_is_reported() {
        let tools = FakeTools::new();
        let config = tools.config(tools.silent_synthesizer(), tools.player(), None);

        let err = synthesize(&Supervisor::new(), &config, "hello", &settings("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let tools = FakeTools::new();
        let missing = tools.dir.path().join("no-such-synth").to_string_lossy().into_owned();
        let config = tools.config(missing, tools.player(), None);
        let supervisor = Supervisor::new();

        let err = synthesize(&supervisor, &config, "hello", &settings("a"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::LaunchFailed {
                stage: Stage::Synthesis,
                ..
            }
        ));
        assert!(!supervisor.is_active(Slot::Synthesis));
    }

    #[tokio::test]
    async fn stop_mid_synthesis_reports_terminated() {
        let tools = FakeTools::new();
        let config = tools.config(tools.hanging("synth"), tools.player(), None);
        let supervisor = Supervisor::new();

        let task = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { synthesize(&supervisor, &config, "hello", &settings("a")).await }
        });

        assert!(eventually(|| supervisor.is_active(Slot::Synthesis)).await);
        assert_eq!(supervisor.stop(), 1);
        assert!(!supervisor.is_active(Slot::Synthesis));

        let result = tokio::time::timeout(std::time::Duration::from_secs(10), task)
            .await
            .expect("synthesis should end after stop")
            .unwrap();
        assert!(matches!(
            result,
            Err(EngineError::Terminated {
                stage: Stage::Synthesis
            })
        ));
    }
}
