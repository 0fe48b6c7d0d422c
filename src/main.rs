//! Entry point for Piper Control.
//!
//! A console control panel for the Piper text-to-speech engine:
//!
//!  * Each line typed on stdin is synthesized with `piper-tts` and played
//!    through PipeWire (`pw-play`) or PulseAudio (`paplay`).
//!  * Slash commands change the voice, output device, speed, noise and
//!    volume; every change is saved to `config.json` immediately.
//!  * `/stop` and `/mute` cut the current utterance short. Ctrl-C stops
//!    playback and exits.
//!
//! Configuration comes from environment variables (optionally via `.env`),
//! see `config.rs` for the full list. Logging is controlled by `RUST_LOG`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;

mod backend;
mod catalog;
mod config;
mod console;
mod engine;
mod error;
mod playback;
mod settings;
mod status;
mod supervisor;
mod synth;
#[cfg(test)]
mod testutil;

use config::AppConfig;
use console::Command;
use engine::{Engine, SpeakStatus};
use settings::Settings;
use status::StatusFiles;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from `.env` if present.
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env()?;
    let voices = catalog::list_voices(&config.engine.voice_dir);
    if voices.is_empty() {
        log::warn!(
            "No voices found in {}; download a Piper .onnx model there",
            config.engine.voice_dir.display()
        );
    }
    let mut settings = Settings::load(&config.settings_path, &voices);

    let status = Arc::new(StatusFiles::new(&config.home)?);
    status.set_pid();

    let engine = Arc::new(Engine::new(config.engine.clone()).await);
    if settings.mute {
        engine.set_mute(true);
    }
    status.write_status(if settings.mute { "muted" } else { "idle" });

    log::info!("Piper Control ready (voice {}, backend {:?})", settings.voice, engine.backend());
    println!("Piper Control. Type text to speak it, /help for commands.");

    let mut lines = console::spawn_line_reader(std::io::stdin());
    loop {
        let line = tokio::select! {
            line = lines.recv() => line.transpose().context("failed to read from stdin")?,
            res = signal::ctrl_c() => {
                if let Err(e) = res {
                    log::error!("Failed to listen for Ctrl-C: {e}");
                }
                log::info!("Received Ctrl-C, shutting down");
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        handle(command, &engine, &status, &mut settings, &config, &voices).await;
    }

    if engine.is_running() {
        engine.stop();
    }
    status.write_status("idle");
    Ok(())
}

async fn handle(
    command: Command,
    engine: &Arc<Engine>,
    status: &Arc<StatusFiles>,
    settings: &mut Settings,
    config: &AppConfig,
    voices: &[String],
) {
    match command {
        Command::Speak(text) => {
            // Written before the task starts so its final status wins.
            status.write_status("speaking");
            let status_for_task = Arc::clone(status);
            let result = engine.speak_with(text.clone(), settings.playback(), move |outcome| {
                status_for_task.record(&outcome);
            });
            match result {
                SpeakStatus::Started => status.write_spoken(&text),
                SpeakStatus::Busy => println!("Still speaking; /stop first."),
                SpeakStatus::Ignored(reason) => {
                    status.write_status(if engine.is_muted() { "muted" } else { "idle" });
                    println!("Not speaking: {reason:?}");
                }
            }
        }
        Command::Stop => {
            engine.stop();
            status.write_status("stopped");
        }
        Command::Mute(state) => {
            engine.set_mute(state);
            settings.mute = state;
            settings.save(&config.settings_path);
            status.write_status(if state { "muted" } else { "idle" });
        }
        Command::Voice(voice) => {
            if voices.contains(&voice) {
                settings.voice = voice;
                settings.save(&config.settings_path);
            } else {
                println!("Unknown voice '{voice}'. Available: {}", voices.join(", "));
            }
        }
        Command::Device(device) => {
            let sinks = catalog::list_audio_sinks().await;
            if !sinks.contains(&device) {
                println!("Unknown device '{device}'. Available: {}", sinks.join(", "));
                return;
            }
            if device != catalog::DEFAULT_DEVICE && !engine.backend().supports_device_selection() {
                println!("Note: pw-play always plays on the default sink.");
            }
            settings.output_device = device;
            settings.save(&config.settings_path);
        }
        Command::Speed(value) => {
            settings.speed = value;
            settings.save(&config.settings_path);
        }
        Command::Noise(value) => {
            settings.noise = value;
            settings.save(&config.settings_path);
        }
        Command::Volume(value) => {
            settings.volume = value;
            settings.save(&config.settings_path);
        }
        Command::ListVoices => {
            for voice in voices {
                let marker = if *voice == settings.voice { "*" } else { " " };
                println!("{marker} {voice}");
            }
        }
        Command::ListDevices => {
            for sink in catalog::list_audio_sinks().await {
                let marker = if sink == settings.output_device { "*" } else { " " };
                println!("{marker} {sink}");
            }
        }
        Command::ShowSettings => {
            println!(
                "voice={} device={} speed={:.2} noise={:.2} volume={:.2} mute={}",
                settings.voice,
                settings.output_device,
                settings.speed,
                settings.noise,
                settings.volume,
                engine.is_muted()
            );
        }
        Command::Help => println!("{}", console::HELP),
        Command::Quit => {}
    }
}
