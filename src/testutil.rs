//! Fake synthesizer, filter and player scripts for exercising the pipeline
//! without Piper or an audio server.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use crate::config::EngineConfig;

pub struct FakeTools {
    pub dir: TempDir,
    pub log: PathBuf,
    pub voice_dir: PathBuf,
}

impl FakeTools {
    /// A scratch directory with a `voices/a.onnx` model and an empty launch log.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let voice_dir = dir.path().join("voices");
        std::fs::create_dir(&voice_dir).unwrap();
        std::fs::write(voice_dir.join("a.onnx"), b"model").unwrap();
        let log = dir.path().join("launches.log");
        Self { dir, log, voice_dir }
    }

    /// Write an executable `sh` script whose first action is to append
    /// `<name> <args>` to the launch log.
    pub fn script(&self, name: &str, body: &str) -> String {
        let path = self.dir.path().join(name);
        let contents = format!(
            "#!/bin/sh\necho \"{name} $*\" >> '{}'\n{body}\n",
            self.log.display()
        );
        std::fs::write(&path, contents).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// Copies stdin to the `--output_file` argument.
    pub fn synthesizer(&self) -> String {
        self.script(
            "synth",
            r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output_file" ]; then out="$2"; fi
  shift
done
cat > "$out""#,
        )
    }

    /// Consumes stdin and writes nothing.
    pub fn silent_synthesizer(&self) -> String {
        self.script("synth", "cat > /dev/null")
    }

    pub fn hanging(&self, name: &str) -> String {
        self.script(name, "exec sleep 30")
    }

    /// Streams the input file (first argument) to stdout.
    pub fn filter(&self) -> String {
        self.script("filter", r#"cat "$1""#)
    }

    pub fn player(&self) -> String {
        self.script("player", "cat > /dev/null")
    }

    pub fn config(&self, synthesizer: String, player: String, filter: Option<String>) -> EngineConfig {
        let mut config = EngineConfig::new(self.voice_dir.clone());
        config.synthesizer = synthesizer;
        config.player = Some(player);
        config.filter = filter;
        config.backend_probe = None;
        config
    }

    pub fn launches(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn launched(&self, name: &str) -> bool {
        self.launches().iter().any(|line| line.starts_with(&format!("{name} ")))
    }
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
