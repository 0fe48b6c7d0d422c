//! The speech engine: synthesis followed by playback, with mute and stop.
//!
//! [`Engine::run`] executes one utterance on the calling task. Front ends use
//! [`Engine::speak_with`], which runs the same pipeline on a background task and
//! refuses to start a second one while the first is still going.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::backend::{self, Backend};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::playback::{self, AudioOutput};
use crate::settings::PlaybackSettings;
use crate::supervisor::Supervisor;
use crate::synth;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Muted,
    EmptyText,
}

/// What happened to a single `run`.
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Skipped(SkipReason),
    Failed(EngineError),
}

/// Answer to a [`Engine::speak_with`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakStatus {
    Started,
    /// A previous utterance is still synthesizing or playing.
    Busy,
    Ignored(SkipReason),
}

pub struct Engine {
    config: EngineConfig,
    output: AudioOutput,
    supervisor: Supervisor,
    mute: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Detect the audio backend and locate the volume filter.
    pub async fn new(config: EngineConfig) -> Self {
        let backend = match &config.backend_probe {
            Some((program, args)) => {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                Backend::detect_with(program, &args).await
            }
            None => Backend::PulseAudio,
        };
        let filter = config.filter.clone().filter(|program| {
            let found = backend::executable_in_path(program);
            if !found {
                log::info!("{program} not found; volume changes will be ignored");
            }
            found
        });
        let output = AudioOutput::new(backend, config.player.clone(), filter);
        log::info!("audio backend: {backend:?}, player: {}", output.player);
        Self {
            config,
            output,
            supervisor: Supervisor::new(),
            mute: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> Backend {
        self.output.backend
    }

    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::SeqCst)
    }

    /// Set the mute flag and stop anything that is currently audible.
    ///
    /// Unmuting also stops, matching the toggle behaviour of the panel's
    /// mute button.
    pub fn set_mute(&self, state: bool) {
        self.mute.store(state, Ordering::SeqCst);
        self.stop();
    }

    /// Terminate the running synthesizer and player, if any. Returns how
    /// many live processes were signalled.
    pub fn stop(&self) -> usize {
        self.supervisor.stop()
    }

    fn skip_reason(&self, text: &str) -> Option<SkipReason> {
        if self.is_muted() {
            Some(SkipReason::Muted)
        } else if text.trim().is_empty() {
            Some(SkipReason::EmptyText)
        } else {
            None
        }
    }

    /// Synthesize `text` and play it. Failures are logged and returned as
    /// [`RunOutcome::Failed`]; nothing here panics or propagates.
    pub async fn run(&self, text: &str, settings: &PlaybackSettings) -> RunOutcome {
        if let Some(reason) = self.skip_reason(text) {
            log::debug!("nothing to speak: {reason:?}");
            return RunOutcome::Skipped(reason);
        }
        match self.pipeline(text, settings).await {
            Ok(()) => RunOutcome::Completed,
            Err(e) if e.is_terminated() => {
                log::info!("{e}");
                RunOutcome::Failed(e)
            }
            Err(e) => {
                log::error!("TTS failed: {e}");
                RunOutcome::Failed(e)
            }
        }
    }

    async fn pipeline(&self, text: &str, settings: &PlaybackSettings) -> Result<(), EngineError> {
        let artifact = synth::synthesize(&self.supervisor, &self.config, text, settings).await?;
        let result = playback::play(
            &self.supervisor,
            &self.output,
            artifact.path(),
            &settings.output_device,
            settings.volume,
        )
        .await;
        artifact.discard();
        result
    }

    /// Whether a background utterance started by [`Engine::speak_with`] is still
    /// in flight.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Run `text` on a background task, calling `on_finish` with the outcome
    /// once it is done. Only one background utterance runs at a time; a
    /// request made meanwhile is answered with [`SpeakStatus::Busy`] and
    /// `on_finish` is not called for it.
    pub fn speak_with<F>(self: &Arc<Self>, text: String, settings: PlaybackSettings, on_finish: F) -> SpeakStatus
    where
        F: FnOnce(RunOutcome) + Send + 'static,
    {
        if let Some(reason) = self.skip_reason(&text) {
            return SpeakStatus::Ignored(reason);
        }
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|task| !task.is_finished()) {
            log::info!("still speaking; request rejected");
            return SpeakStatus::Busy;
        }
        let engine = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let outcome = engine.run(&text, &settings).await;
            on_finish(outcome);
        }));
        SpeakStatus::Started
    }
}
