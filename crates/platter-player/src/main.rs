//! platter-player - play a WAV file to completion from the command line
//!
//! Loads the file fully into memory, starts the output stream, and
//! polls until the feeder reports completion, logging progress and any
//! underruns along the way.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use platter_core::audio::{get_output_devices, start_playback, AudioConfig, DeviceId, Playback};
use platter_core::engine::{PlaybackController, PlaybackEvent, PlaybackOptions};
use platter_core::store::SampleStore;
use platter_core::types::frames_to_secs;

/// Supervisor poll interval while the stream runs
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "platter-player", about = "Deadline-driven WAV playback", version)]
struct Cli {
    /// WAV file to play (16-bit PCM)
    file: Option<PathBuf>,

    /// Restart from the beginning when the end is reached
    #[arg(long = "loop")]
    loop_playback: bool,

    /// Output device name (see --list-devices)
    #[arg(long)]
    device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Per-callback chunk cap in frames
    #[arg(long)]
    quantum: Option<u32>,

    /// Requested device buffer size in frames
    #[arg(long)]
    buffer_frames: Option<u32>,

    /// Config file path (default: ~/.config/platter-player/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if cli.list_devices {
        return list_devices();
    }

    let Some(file) = cli.file.clone() else {
        println!("Usage: platter-player <file.wav>");
        std::process::exit(1);
    };

    log::info!("platter-player starting up");

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let player_config = config::load_config(&config_path);
    let (audio_config, options) = resolve_settings(&cli, &player_config);

    let store = SampleStore::load(&file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    log::info!(
        "Opened {}: {} Hz, {} channels, {} frames ({:.3}s)",
        file.display(),
        store.sample_rate(),
        store.channel_count(),
        store.frame_count(),
        store.duration_seconds()
    );

    let store = Arc::new(store);
    let mut playback = start_playback(Arc::clone(&store), &audio_config, &options)
        .context("Failed to start audio stream")?;
    log::info!(
        "Streaming{} at {} Hz, {} frame buffer (~{:.1}ms latency)",
        if options.loop_enabled { " (looping)" } else { "" },
        playback.sample_rate(),
        playback.buffer_size(),
        playback.latency_ms()
    );

    run_until_done(&mut playback, &store);
    Ok(())
}

/// Merge command-line flags over the config file
fn resolve_settings(cli: &Cli, file_config: &config::PlayerConfig) -> (AudioConfig, PlaybackOptions) {
    let mut audio = AudioConfig::default();

    if let Some(name) = cli.device.clone().or_else(|| file_config.audio.device.clone()) {
        audio = audio.with_device(DeviceId::new(name));
    }
    if let Some(frames) = cli.buffer_frames.or(file_config.audio.buffer_frames) {
        audio = audio.with_buffer_frames(frames);
    }
    if let Some(rate) = file_config.audio.sample_rate {
        audio = audio.with_sample_rate(rate);
    }

    let options = PlaybackOptions::default()
        .with_loop(cli.loop_playback)
        .with_quantum(cli.quantum.unwrap_or(file_config.playback.quantum_frames));

    (audio, options)
}

/// Poll until the feeder reports completion, then tear the stream down
fn run_until_done(playback: &mut Playback, store: &SampleStore) {
    let started = Instant::now();
    while !playback.controller.is_done() {
        std::thread::sleep(POLL_INTERVAL);
        drain_events(&mut playback.controller);

        let position = playback.controller.position_frames();
        log::debug!(
            "pos: {} / {} frames ({:.3}s)",
            position,
            store.frame_count(),
            frames_to_secs(position, store.sample_rate())
        );
    }
    drain_events(&mut playback.controller);

    if let Err(e) = playback.stop() {
        log::warn!("Could not pause stream during shutdown: {}", e);
    }

    let underruns = playback.controller.underrun_count();
    if underruns > 0 {
        log::warn!("Playback finished with {} underruns", underruns);
    }
    log::info!(
        "Playback finished in {:.1}s",
        started.elapsed().as_secs_f64()
    );
}

fn drain_events(controller: &mut PlaybackController) {
    while let Some(event) = controller.poll_event() {
        match event {
            PlaybackEvent::Looped { cycle } => log::info!("Loop {} complete", cycle),
            PlaybackEvent::Underrun { frames_remaining } => {
                log::warn!("Underrun with {} frames still pending", frames_remaining);
            }
            PlaybackEvent::Finished => log::debug!("Drain complete"),
        }
    }
}

fn list_devices() -> Result<()> {
    let devices = get_output_devices().context("Failed to enumerate audio devices")?;
    println!("Output devices:");
    for device in &devices {
        println!("  {}", device);
    }
    Ok(())
}
