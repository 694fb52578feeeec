//! Realtime General-MIDI-style sample playback engine.
//!
//! The core is [`player::Player`]: a tick-driven event dispatcher over a
//! fixed-capacity voice pool, rendering directly into a pull-callback audio
//! buffer. MIDI file import ([`midi`]) and patch bank loading ([`loader`])
//! are control-path collaborators that produce the [`event::Sequence`] and
//! [`bank::Bank`] values the player consumes; the player itself never
//! parses a file or touches an audio device.

pub mod bank;
pub mod channel;
pub mod error;
pub mod event;
pub mod loader;
pub mod midi;
pub mod player;
pub mod tables;
pub mod voice;

pub use bank::{Bank, Patch, Sample};
pub use error::{BankLoadError, MidiLoadError};
pub use event::{Event, EventKind, Sequence, TimedEvent};
pub use player::Player;
