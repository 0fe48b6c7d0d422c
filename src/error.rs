//! Failure taxonomy for the synthesis/playback pipeline.
//!
//! Every stage reports its failures as an [`EngineError`]. The orchestrator
//! never lets one escape as a panic: [`crate::engine::Engine::run`] turns it
//! into a [`crate::engine::RunOutcome`] the front end can display.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// The pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Synthesis,
    Filter,
    Playback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Synthesis => "synthesis",
            Stage::Filter => "volume filter",
            Stage::Playback => "playback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("voice model not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    #[error("{stage} failed to launch '{program}': {source}")]
    LaunchFailed {
        stage: Stage,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for {stage}: {source}")]
    WaitFailed {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("synthesizer exited without writing {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("{stage} was stopped")]
    Terminated { stage: Stage },

    #[error("{stage} exited with {status}")]
    ExitFailure { stage: Stage, status: ExitStatus },

    #[error("failed to prepare scratch directory: {0}")]
    Scratch(#[source] io::Error),
}

impl EngineError {
    /// True when the failure was caused by `stop()` rather than a fault.
    pub fn is_terminated(&self) -> bool {
        matches!(self, EngineError::Terminated { .. })
    }
}
