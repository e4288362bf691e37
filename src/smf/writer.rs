//! Standard MIDI File writer
//!
//! Converts per-track [`TrackEvent`] lists into `midly` events and lets midly
//! serialize them as a format 1 file. midly omits a channel status byte equal
//! to the previous one and restates the status after every meta or sysex
//! event.

use super::event::{ChannelMessage, MetaKind, TrackEvent, META};
use crate::vlq::{read_vlq, VlqOverflow, VLQ_MAX};
use crate::Result;
use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, PitchBend, Timing, TrackEventKind};

/// Header chunk magic
pub const HEADER_MAGIC: &[u8; 4] = b"MThd";

/// Track chunk magic
pub const TRACK_MAGIC: &[u8; 4] = b"MTrk";

const SYSEX: u8 = 0xF0;
const SYSEX_ESCAPE: u8 = 0xF7;

fn midi_message(kind: ChannelMessage, data: &[u8]) -> Option<MidiMessage> {
    let byte = |index: usize| data.get(index).map(|&value| u7::new(value));
    let message = match kind {
        ChannelMessage::NoteOff => MidiMessage::NoteOff {
            key: byte(0)?,
            vel: byte(1)?,
        },
        ChannelMessage::NoteOn => MidiMessage::NoteOn {
            key: byte(0)?,
            vel: byte(1)?,
        },
        ChannelMessage::PolyAftertouch => MidiMessage::Aftertouch {
            key: byte(0)?,
            vel: byte(1)?,
        },
        ChannelMessage::ControlChange => MidiMessage::Controller {
            controller: byte(0)?,
            value: byte(1)?,
        },
        ChannelMessage::ProgramChange => MidiMessage::ProgramChange { program: byte(0)? },
        ChannelMessage::ChannelAftertouch => MidiMessage::ChannelAftertouch { vel: byte(0)? },
        ChannelMessage::PitchBend => {
            let lsb = u16::from(byte(0)?.as_int());
            let msb = u16::from(byte(1)?.as_int());
            MidiMessage::PitchBend {
                bend: PitchBend(u14::new(msb << 7 | lsb)),
            }
        }
    };
    Some(message)
}

/// Sysex data after its length quantity
fn sysex_payload(contents: &[u8]) -> Option<&[u8]> {
    let (len, used) = read_vlq(contents)?;
    contents.get(used..used + len as usize)
}

fn event_kind(event: &TrackEvent) -> Option<TrackEventKind<'_>> {
    if let Some(kind) = event.message() {
        let channel = u4::new(event.event_type & 0x0F);
        let message = midi_message(kind, &event.contents)?;
        return Some(TrackEventKind::Midi { channel, message });
    }

    match event.event_type {
        META => {
            let (subtype, data) = event.meta_data()?;
            let meta = match (MetaKind::from_subtype(subtype), event.tempo()) {
                (Some(MetaKind::EndOfTrack), _) => MetaMessage::EndOfTrack,
                (_, Some(tempo)) => MetaMessage::Tempo(u24::new(tempo)),
                _ => MetaMessage::Unknown(subtype, data),
            };
            Some(TrackEventKind::Meta(meta))
        }
        SYSEX => sysex_payload(&event.contents).map(TrackEventKind::SysEx),
        SYSEX_ESCAPE => sysex_payload(&event.contents).map(TrackEventKind::Escape),
        _ => None,
    }
}

/// One track as midly events. Obsolete events are skipped and their deltas
/// carried into the next real event.
fn midly_track(
    events: &[TrackEvent],
) -> std::result::Result<Vec<midly::TrackEvent<'_>>, VlqOverflow> {
    let mut track = Vec::with_capacity(events.len());
    let mut pending_delta = 0u32;

    for event in events {
        pending_delta = pending_delta.saturating_add(event.delta_time);
        if event.obsolete_event {
            continue;
        }
        let Some(kind) = event_kind(event) else {
            tracing::debug!(
                "skipping malformed event {:#04x} at tick {}",
                event.event_type,
                event.absolute_time
            );
            continue;
        };

        if pending_delta > VLQ_MAX {
            return Err(VlqOverflow(pending_delta));
        }
        track.push(midly::TrackEvent {
            delta: u28::new(pending_delta),
            kind,
        });
        pending_delta = 0;
    }

    Ok(track)
}

/// Serialize tracks into a format 1 file.
///
/// Events flagged `obsolete_event` are skipped; their deltas are folded into
/// the next real event so absolute timing is preserved.
pub fn write_smf<T: AsRef<[TrackEvent]>>(tracks: &[T], division: u16) -> Result<Vec<u8>> {
    let tracks = tracks
        .iter()
        .map(|track| midly_track(track.as_ref()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let smf = midly::Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(u15::new(division)),
        },
        tracks,
    };
    let mut out = Vec::with_capacity(14 + smf.tracks.len() * 64);
    smf.write_std(&mut out)?;
    Ok(out)
}
