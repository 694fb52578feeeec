//! Event and sequence wire types.
//!
//! These are produced by an external collaborator (the MIDI file loader in
//! [`crate::midi`]) and consumed read-only by [`crate::player::Player`].

/// A single MIDI-like event. `channel` is 0..16; for [`EventKind::SetTempo`]
/// the channel field instead holds the high byte of the tempo value (see
/// that variant's docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub channel: u8,
    pub param1: u8,
    pub param2: u8,
}

/// The closed set of event kinds the dispatcher understands. Anything a
/// MIDI file contains outside this set is dropped by the loader rather
/// than represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOff,
    NoteOn,
    /// `param1` is the controller number, `param2` the value.
    Controller,
    ProgramChange,
    /// `param1` is the low 7 bits, `param2` the high 7 bits.
    PitchBend,
    /// Meta tempo event. `channel<<16 | param1<<8 | param2` is
    /// microseconds per beat.
    SetTempo,
}

/// MIDI controller numbers the dispatcher recognizes.
pub mod controller {
    pub const VOLUME: u8 = 7;
    pub const EXPRESSION: u8 = 11;
    pub const PAN: u8 = 10;
}

/// An [`Event`] with an absolute tick offset from the start of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub time: u32,
    pub event: Event,
}

/// A complete, immutable timeline bound to a [`Player`](crate::player::Player)
/// by `play_sequence`.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub events: Vec<TimedEvent>,
    /// Ticks per beat (quarter note), used to convert tempo to tick length.
    pub ticks_per_beat: u32,
}

impl Sequence {
    pub fn new(events: Vec<TimedEvent>, ticks_per_beat: u32) -> Self {
        Self {
            events,
            ticks_per_beat,
        }
    }
}
