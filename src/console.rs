//! Line commands understood by the console panel.
//!
//! Anything that does not start with `/` is text to speak. Slider values are
//! clamped to the same ranges the graphical panel offers.

use std::io::{self, BufRead, BufReader, Read};
use std::ops::RangeInclusive;

use anyhow::{anyhow, bail, Result};
use tokio::sync::mpsc;

pub const SPEED_RANGE: RangeInclusive<f64> = 0.7..=1.5;
pub const NOISE_RANGE: RangeInclusive<f64> = 0.0..=1.0;
pub const VOLUME_RANGE: RangeInclusive<f64> = 0.0..=2.0;

pub const HELP: &str = "\
Type text and press Enter to speak it. Commands:
  /stop              stop the current utterance
  /mute, /unmute     toggle mute (also stops playback)
  /voice <id>        select a voice (see /voices)
  /device <id>       select an output device (see /devices)
  /speed <0.7-1.5>   length scale
  /noise <0-1>       synthesis noise
  /volume <0-2>      playback gain
  /voices, /devices  list what is available
  /settings          show the current settings
  /quit              exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Speak(String),
    Stop,
    Mute(bool),
    Voice(String),
    Device(String),
    Speed(f64),
    Noise(f64),
    Volume(f64),
    ListVoices,
    ListDevices,
    ShowSettings,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Returns `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Some(Command::Speak(trimmed.to_string())));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let command = match name.to_lowercase().as_str() {
            "stop" => Command::Stop,
            "mute" => Command::Mute(true),
            "unmute" => Command::Mute(false),
            "voice" => Command::Voice(required(name, arg)?.to_string()),
            "device" => Command::Device(required(name, arg)?.to_string()),
            "speed" => Command::Speed(slider(name, arg, SPEED_RANGE)?),
            "noise" => Command::Noise(slider(name, arg, NOISE_RANGE)?),
            "volume" => Command::Volume(slider(name, arg, VOLUME_RANGE)?),
            "voices" => Command::ListVoices,
            "devices" => Command::ListDevices,
            "settings" => Command::ShowSettings,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => bail!("unknown command '/{name}'; try /help"),
        };
        Ok(Some(command))
    }
}

fn required<'a>(name: &str, arg: &'a str) -> Result<&'a str> {
    if arg.is_empty() {
        bail!("/{name} needs an argument");
    }
    Ok(arg)
}

/// Parse a slider value, clamp it to `range` and round to 3 decimals.
fn slider(name: &str, arg: &str, range: RangeInclusive<f64>) -> Result<f64> {
    let value: f64 = required(name, arg)?
        .parse()
        .map_err(|_| anyhow!("/{name} expects a number, got '{arg}'"))?;
    if !value.is_finite() {
        bail!("/{name} expects a finite number");
    }
    let clamped = value.clamp(*range.start(), *range.end());
    Ok((clamped * 1000.0).round() / 1000.0)
}

/// Read lines from `input` on a plain OS thread and forward them.
///
/// Blocking reads stay off the runtime, so shutting it down never waits for
/// a line that may never come. The channel closes at end of input or after
/// the first read error, which is forwarded.
pub fn spawn_line_reader<R>(input: R) -> mpsc::Receiver<io::Result<String>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in BufReader::new(input).lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}
