//! CLI host: loads a patch bank and a Standard MIDI File, binds them to a
//! [`Player`], and drives a `cpal` output stream that pulls audio from it.
//!
//! This binary is the thin driver around the core engine, not the engine
//! itself — it owns the audio device and the event loop, and nothing more.

use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use mdv_synth::player::SAMPLE_RATE;
use mdv_synth::{midi, Player};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Plays a Standard MIDI File through a loaded patch bank.
#[derive(Parser, Debug)]
#[command(name = "mdv-play")]
#[command(about = "Play a MIDI file through mdv-synth")]
struct Cli {
    /// Path to the .mid file to play.
    midi: std::path::PathBuf,

    /// Path to a bank.toml manifest naming the instrument patches.
    #[arg(long)]
    bank: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut player = Player::new();
    if let Some(bank_path) = &cli.bank {
        player
            .load_config(bank_path)
            .with_context(|| format!("loading bank {}", bank_path.display()))?;
    } else {
        tracing::warn!("no --bank given; unmatched notes will fall back to a plain square wave");
    }

    let sequence = midi::load_sequence(&cli.midi)
        .with_context(|| format!("loading MIDI file {}", cli.midi.display()))?;
    let total_ticks: u32 = sequence.events.last().map(|e| e.time).unwrap_or(0);
    let ticks_per_beat = sequence.ticks_per_beat;
    player.play_sequence(sequence);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default audio output device")?;
    let config = device
        .default_output_config()
        .context("no default output config")?;
    if config.sample_rate().0 != SAMPLE_RATE {
        tracing::warn!(
            device_rate = config.sample_rate().0,
            engine_rate = SAMPLE_RATE,
            "device sample rate does not match the engine's fixed rate; audio will play at the wrong pitch/speed"
        );
    }

    let player = Arc::new(Mutex::new(player));
    let stream_player = player.clone();
    let err_fn = |err| tracing::error!(%err, "audio stream error");
    let stream = device.build_output_stream(
        &config.into(),
        move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
            stream_player.lock().unwrap().get_audio(out);
        },
        err_fn,
        None,
    )?;
    stream.play().context("failed to start audio stream")?;

    // Sleep roughly for the sequence's length plus a short tail so release
    // envelopes and looping drum tails finish ringing out. Assumes the
    // default 120bpm tick length until the first SetTempo event, same as
    // the engine's own startup assumption.
    let approx_secs = total_ticks as f64 / ticks_per_beat.max(1) as f64 / 2.0 + 2.0;
    std::thread::sleep(Duration::from_secs_f64(approx_secs.max(1.0)));

    Ok(())
}
