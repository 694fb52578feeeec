//! Standard MIDI File import.
//!
//! Flattens every track of a `.mid` file into one absolute-tick
//! [`Sequence`], mapping the subset of MIDI messages the player
//! understands onto its closed [`EventKind`] set. Anything else in the
//! file (aftertouch, sysex, most other meta events) is dropped here
//! rather than represented downstream.

use crate::error::MidiLoadError;
use crate::event::{Event, EventKind, Sequence, TimedEvent};
use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
use std::path::Path;

/// Parses a Standard MIDI File and merges all tracks into one
/// [`Sequence`] ordered by absolute tick. Ties are broken by track order
/// (a stable merge), matching how a single-track rendering would see
/// simultaneous events.
pub fn load_sequence(path: &Path) -> Result<Sequence, MidiLoadError> {
    let bytes = std::fs::read(path).map_err(|source| MidiLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let smf = Smf::parse(&bytes).map_err(|source| MidiLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if smf.tracks.is_empty() {
        return Err(MidiLoadError::NoTracks);
    }

    let ticks_per_beat = match smf.header.timing {
        midly::Timing::Metrical(tpb) => tpb.as_int() as u32,
        // SMPTE timing has no well-defined ticks-per-beat; 24 matches the
        // nominal frame rate used when a file opts into it without a
        // fractional-frame subdivision.
        midly::Timing::Timecode(_, _) => 24,
    };

    let mut merged: Vec<TimedEvent> = Vec::new();
    for track in &smf.tracks {
        let mut absolute_tick: u32 = 0;
        for track_event in track {
            absolute_tick = absolute_tick.saturating_add(track_event.delta.as_int());
            if let Some(event) = map_event(&track_event.kind) {
                merged.push(TimedEvent {
                    time: absolute_tick,
                    event,
                });
            }
        }
    }
    merged.sort_by_key(|te| te.time);

    tracing::debug!(
        path = %path.display(),
        events = merged.len(),
        ticks_per_beat,
        "midi sequence imported"
    );
    Ok(Sequence::new(merged, ticks_per_beat))
}

fn map_event(kind: &TrackEventKind) -> Option<Event> {
    match kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOff { key, .. } => Some(Event {
                    kind: EventKind::NoteOff,
                    channel,
                    param1: key.as_int(),
                    param2: 0,
                }),
                MidiMessage::NoteOn { key, vel } => Some(Event {
                    kind: EventKind::NoteOn,
                    channel,
                    param1: key.as_int(),
                    param2: vel.as_int(),
                }),
                MidiMessage::Controller { controller, value } => Some(Event {
                    kind: EventKind::Controller,
                    channel,
                    param1: controller.as_int(),
                    param2: value.as_int(),
                }),
                MidiMessage::ProgramChange { program } => Some(Event {
                    kind: EventKind::ProgramChange,
                    channel,
                    param1: program.as_int(),
                    param2: 0,
                }),
                MidiMessage::PitchBend { bend } => {
                    let raw = bend.0.as_int();
                    Some(Event {
                        kind: EventKind::PitchBend,
                        channel,
                        param1: (raw & 0x7f) as u8,
                        param2: ((raw >> 7) & 0x7f) as u8,
                    })
                }
                _ => None,
            }
        }
        TrackEventKind::Meta(MetaMessage::Tempo(usec_per_beat)) => {
            let usec = usec_per_beat.as_int();
            Some(Event {
                kind: EventKind::SetTempo,
                channel: ((usec >> 16) & 0xff) as u8,
                param1: ((usec >> 8) & 0xff) as u8,
                param2: (usec & 0xff) as u8,
            })
        }
        _ => None,
    }
}
