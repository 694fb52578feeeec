//! Per-channel controller state.

use crate::voice::NONE;

/// MIDI channel number reserved for percussion. `NoteOff` is ignored on
/// this channel and `NoteOn` selects a patch by note number, not program.
pub const DRUM_CHANNEL: u8 = 9;

/// The sixteen-channel controller bank. Each channel owns the head of its
/// own active-voice list; a voice always belongs to exactly one channel.
#[derive(Debug, Clone, Copy)]
pub struct Channel {
    pub program: u8,
    pub volume: u8,
    pub expression: u8,
    pub pan: i8,
    pub pitch_bend: i16,
    /// Head of this channel's active-voice list, `NONE` if empty.
    pub voices: u8,
}

impl Channel {
    pub const fn reset() -> Self {
        Self {
            program: 0,
            volume: 127,
            expression: 127,
            pan: 0,
            pitch_bend: 0,
            voices: NONE,
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::reset()
    }
}
