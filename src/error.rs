//! Error types for the control-path loaders. The render path (`get_audio`)
//! never fails; these are only returned by bank/sequence loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading a patch bank manifest or the samples it names.
#[derive(Debug, Error)]
pub enum BankLoadError {
    #[error("failed to read manifest {path}: {source}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("program slot {0} out of range (0..128)")]
    SlotOutOfRange(u32),
    #[error("failed to read sample {path}: {source}")]
    SampleIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode WAV sample {path}: {source}")]
    SampleDecode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("sample {path} must be mono 16-bit PCM, found {channels} channel(s) at {bits} bits")]
    UnsupportedSampleFormat {
        path: PathBuf,
        channels: u16,
        bits: u16,
    },
}

/// Errors from importing a Standard MIDI File into a [`Sequence`](crate::event::Sequence).
#[derive(Debug, Error)]
pub enum MidiLoadError {
    #[error("failed to read MIDI file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse MIDI file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: midly::Error,
    },
    #[error("MIDI file has no tracks")]
    NoTracks,
}
