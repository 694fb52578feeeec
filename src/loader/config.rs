//! `toml` manifest shapes for patch banks.
//!
//! One manifest names every melodic program and drum hit a [`Bank`] should
//! be populated with; [`super::load_config`] walks it and loads the WAV
//! file behind each sample entry.
//!
//! [`Bank`]: crate::bank::Bank

use serde::Deserialize;

/// Top-level `bank.toml` shape.
#[derive(Debug, Deserialize)]
pub struct PatchManifest {
    #[serde(default)]
    pub patches: Vec<PatchEntry>,
    #[serde(default)]
    pub drums: Vec<PatchEntry>,
}

/// One slot in [`PatchManifest`]. `index` selects the program (0..128) or
/// drum note (0..128) this entry fills.
#[derive(Debug, Deserialize)]
pub struct PatchEntry {
    pub index: u8,
    #[serde(flatten)]
    pub patch: PatchDef,
}

/// The patch body, shared between full-manifest entries and the
/// single-patch files loaded by `load_patch`/`load_drum`.
#[derive(Debug, Deserialize)]
pub struct PatchDef {
    #[serde(default)]
    pub fixed_note: Option<u8>,
    #[serde(default)]
    pub keep_envelope: bool,
    #[serde(default)]
    pub keep_loop: bool,
    #[serde(default = "default_volume")]
    pub volume: u8,
    pub samples: Vec<SampleEntry>,
}

fn default_volume() -> u8 {
    127
}

/// One sample entry. `path` is resolved relative to the manifest file.
#[derive(Debug, Deserialize)]
pub struct SampleEntry {
    pub path: String,
    /// Upper frequency bound (milliHz) this sample is selected for.
    pub high_freq: u32,
    /// Native pitch of the recording (milliHz). Falls back to the WAV's
    /// own sample rate if omitted — a reasonable default for samples
    /// recorded at their playback pitch.
    pub root_freq: Option<u32>,
    #[serde(default)]
    pub looping: bool,
    #[serde(default)]
    pub pingpong: bool,
    #[serde(default)]
    pub loop_start: u32,
    #[serde(default)]
    pub loop_end: u32,
    #[serde(default = "default_envelope_rates")]
    pub envelope_rates: [u32; 6],
    #[serde(default = "default_envelope_offsets")]
    pub envelope_offsets: [u32; 6],
    #[serde(default)]
    pub tremolo_sweep_increment: i32,
    #[serde(default)]
    pub tremolo_phase_increment: i32,
    #[serde(default)]
    pub tremolo_depth: i32,
}

/// A flat, instant attack/decay envelope: jump straight to full volume
/// and hold until release.
fn default_envelope_rates() -> [u32; 6] {
    [u32::MAX, u32::MAX, 0, u32::MAX, 0, 0]
}

fn default_envelope_offsets() -> [u32; 6] {
    [1023 << 20, 1023 << 20, 1023 << 20, 0, 0, 0]
}
