use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::engine::{RunOutcome, SkipReason};

/// Small text files a panel applet can poll to show what the engine is doing.
pub struct StatusFiles {
    base: PathBuf,
}

impl StatusFiles {
    pub fn new(base: &Path) -> Result<Self> {
        std::fs::create_dir_all(base)
            .with_context(|| format!("failed to create {}", base.display()))?;
        Ok(Self {
            base: base.to_path_buf(),
        })
    }

    pub fn write_status(&self, status: &str) {
        let _ = std::fs::write(self.base.join("piper-control.status"), status);
    }

    pub fn write_spoken(&self, text: &str) {
        let _ = std::fs::write(self.base.join("piper-control.spoken"), text);
    }

    pub fn set_pid(&self) {
        let pid = std::process::id().to_string();
        let _ = std::fs::write(self.base.join("piper-control.pid"), pid);
    }

    pub fn record(&self, outcome: &RunOutcome) {
        self.write_status(&describe(outcome));
    }
}

/// Status line for a finished utterance.
pub fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => "idle".to_string(),
        RunOutcome::Skipped(SkipReason::Muted) => "muted".to_string(),
        RunOutcome::Skipped(SkipReason::EmptyText) => "idle".to_string(),
        RunOutcome::Failed(e) if e.is_terminated() => "stopped".to_string(),
        RunOutcome::Failed(e) => format!("failed: {e}"),
    }
}
