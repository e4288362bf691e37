//! Track event model shared by the decoder, the SMF writer and the reader

use crate::vlq::read_vlq;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::Serialize;

/// Status byte of meta events
pub const META: u8 = 0xFF;

/// Controller number marking a loop start
pub const LOOP_START_CONTROLLER: u8 = 102;

/// Controller number marking a loop end
pub const LOOP_END_CONTROLLER: u8 = 103;

/// Meta event subtypes the game format uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum MetaKind {
    /// Loop end with repeat count and backward offset (game format only)
    LoopEnd = 0x2D,
    /// Loop start with loop number (game format only)
    LoopStart = 0x2E,
    /// End of track
    EndOfTrack = 0x2F,
    /// Tempo in microseconds per quarter note
    Tempo = 0x51,
}

impl MetaKind {
    /// Subtype for a raw byte, if the game format defines it
    pub fn from_subtype(subtype: u8) -> Option<Self> {
        Self::from_u8(subtype)
    }
}

/// Channel voice message kinds, keyed by the status high nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ChannelMessage {
    /// 0x8n
    NoteOff = 0x8,
    /// 0x9n
    NoteOn = 0x9,
    /// 0xAn
    PolyAftertouch = 0xA,
    /// 0xBn
    ControlChange = 0xB,
    /// 0xCn
    ProgramChange = 0xC,
    /// 0xDn
    ChannelAftertouch = 0xD,
    /// 0xEn
    PitchBend = 0xE,
}

impl ChannelMessage {
    /// Message kind of a status byte (`None` for data bytes and system messages)
    pub fn from_status(status: u8) -> Option<Self> {
        Self::from_u8(status >> 4)
    }

    /// Number of data bytes following the status byte in standard MIDI
    pub fn data_len(self) -> usize {
        match self {
            ChannelMessage::ProgramChange | ChannelMessage::ChannelAftertouch => 1,
            _ => 2,
        }
    }
}

/// One MIDI event with both relative and absolute timing.
///
/// `delta_time` is the distance to the previous entry of the list, obsolete
/// or not. Obsolete events are skipped by the SMF writer, which carries their
/// delta forward into the next real event.
///
/// `contents` holds everything after the status byte. For meta events that is
/// the subtype, the SMF length quantity and the data (tempo is
/// `[0x51, 0x03, t0, t1, t2]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    /// Superseded event, skipped on output
    pub obsolete_event: bool,
    /// Ticks since the previous entry
    pub delta_time: u32,
    /// Game-format note length in ticks; zero for everything but note-ons
    pub duration_time: u32,
    /// Ticks since track start
    pub absolute_time: u32,
    /// Status byte, running status already resolved
    pub event_type: u8,
    /// Bytes after the status byte
    pub contents: Vec<u8>,
}

impl TrackEvent {
    /// Channel event at `absolute_time`
    pub fn channel(absolute_time: u32, status: u8, data: &[u8]) -> Self {
        Self {
            absolute_time,
            event_type: status,
            contents: data.to_vec(),
            ..Self::default()
        }
    }

    /// Meta event at `absolute_time` (data must be shorter than 128 bytes)
    pub fn meta(absolute_time: u32, subtype: u8, data: &[u8]) -> Self {
        debug_assert!(data.len() < 0x80);
        let mut contents = Vec::with_capacity(data.len() + 2);
        contents.push(subtype);
        contents.push(data.len() as u8);
        contents.extend_from_slice(data);
        Self {
            absolute_time,
            event_type: META,
            contents,
            ..Self::default()
        }
    }

    /// End-of-track meta event
    pub fn end_of_track(absolute_time: u32) -> Self {
        Self::meta(absolute_time, MetaKind::EndOfTrack as u8, &[])
    }

    /// Number of content bytes
    pub fn content_size(&self) -> usize {
        self.contents.len()
    }

    /// Channel (0-15) of a channel event
    pub fn channel_number(&self) -> Option<u8> {
        ChannelMessage::from_status(self.event_type).map(|_| self.event_type & 0x0F)
    }

    /// Channel message kind, `None` for meta and system events
    pub fn message(&self) -> Option<ChannelMessage> {
        ChannelMessage::from_status(self.event_type)
    }

    /// Note-on with non-zero velocity
    pub fn is_note_on(&self) -> bool {
        self.message() == Some(ChannelMessage::NoteOn)
            && self.contents.get(1).is_some_and(|&velocity| velocity > 0)
    }

    /// Note-off, or note-on with zero velocity
    pub fn is_note_off(&self) -> bool {
        match self.message() {
            Some(ChannelMessage::NoteOff) => true,
            Some(ChannelMessage::NoteOn) => self.contents.get(1) == Some(&0),
            _ => false,
        }
    }

    /// Controller number and value of a control change
    pub fn controller(&self) -> Option<(u8, u8)> {
        match (self.message(), self.contents.as_slice()) {
            (Some(ChannelMessage::ControlChange), [controller, value, ..]) => {
                Some((*controller, *value))
            }
            _ => None,
        }
    }

    /// Subtype and data of a meta event
    pub fn meta_data(&self) -> Option<(u8, &[u8])> {
        if self.event_type != META {
            return None;
        }
        let (&subtype, rest) = self.contents.split_first()?;
        let (len, used) = read_vlq(rest)?;
        let data = rest.get(used..used + len as usize)?;
        Some((subtype, data))
    }

    /// End-of-track meta event
    pub fn is_end_of_track(&self) -> bool {
        matches!(self.meta_data(), Some((subtype, _)) if subtype == MetaKind::EndOfTrack as u8)
    }

    /// Microseconds per quarter note of a tempo event
    pub fn tempo(&self) -> Option<u32> {
        match self.meta_data() {
            Some((subtype, &[a, b, c])) if subtype == MetaKind::Tempo as u8 => {
                Some(u32::from_be_bytes([0, a, b, c]))
            }
            _ => None,
        }
    }
}

/// Beats per minute for a tempo in microseconds per quarter note
pub fn tempo_to_bpm(micros_per_quarter: u32) -> f64 {
    if micros_per_quarter == 0 {
        return 0.0;
    }
    60_000_000.0 / f64::from(micros_per_quarter)
}

/// Rewrite every `delta_time` from the absolute times.
///
/// The list must already be sorted by `absolute_time`.
pub fn recompute_deltas(events: &mut [TrackEvent]) {
    let mut previous = 0u32;
    for event in events.iter_mut() {
        event.delta_time = event.absolute_time.saturating_sub(previous);
        previous = event.absolute_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_meta_constructor_layout() {
        let tempo = TrackEvent::meta(0, MetaKind::Tempo as u8, &[0x07, 0xA1, 0x20]);
        assert_eq!(tempo.event_type, META);
        assert_eq!(tempo.contents, vec![0x51, 0x03, 0x07, 0xA1, 0x20]);
        assert_eq!(tempo.content_size(), 5);
        assert_eq!(tempo.tempo(), Some(500_000));

        let end = TrackEvent::end_of_track(96);
        assert_eq!(end.contents, vec![0x2F, 0x00]);
        assert!(end.is_end_of_track());
        assert!(!tempo.is_end_of_track());
    }

    #[test]
    fn test_note_classification() {
        let on = TrackEvent::channel(0, 0x93, &[60, 100]);
        let zero_velocity = TrackEvent::channel(0, 0x93, &[60, 0]);
        let off = TrackEvent::channel(0, 0x83, &[60, 64]);
        assert!(on.is_note_on());
        assert!(!on.is_note_off());
        assert!(zero_velocity.is_note_off());
        assert!(off.is_note_off());
        assert_eq!(on.channel_number(), Some(3));
        assert_eq!(TrackEvent::end_of_track(0).channel_number(), None);
    }

    #[test]
    fn test_controller_accessor() {
        let cc = TrackEvent::channel(0, 0xB2, &[LOOP_START_CONTROLLER, 1]);
        assert_eq!(cc.controller(), Some((102, 1)));
        assert_eq!(TrackEvent::channel(0, 0xC2, &[5]).controller(), None);
    }

    #[test]
    fn test_message_kinds() {
        assert_eq!(ChannelMessage::from_status(0x9F), Some(ChannelMessage::NoteOn));
        assert_eq!(ChannelMessage::from_status(0xE0), Some(ChannelMessage::PitchBend));
        assert_eq!(ChannelMessage::from_status(0xFF), None);
        assert_eq!(ChannelMessage::from_status(0x3C), None);
        assert_eq!(ChannelMessage::ProgramChange.data_len(), 1);
        assert_eq!(ChannelMessage::PitchBend.data_len(), 2);
        assert_eq!(MetaKind::from_subtype(0x2D), Some(MetaKind::LoopEnd));
        assert_eq!(MetaKind::from_subtype(0x03), None);
    }

    #[test]
    fn test_tempo_to_bpm() {
        assert_relative_eq!(tempo_to_bpm(500_000), 120.0);
        assert_relative_eq!(tempo_to_bpm(600_000), 100.0);
        assert_relative_eq!(tempo_to_bpm(0), 0.0);
    }

    #[test]
    fn test_recompute_deltas() {
        let mut events = vec![
            TrackEvent::channel(10, 0x90, &[60, 100]),
            TrackEvent::channel(10, 0x90, &[64, 100]),
            TrackEvent::end_of_track(40),
        ];
        recompute_deltas(&mut events);
        let deltas: Vec<u32> = events.iter().map(|e| e.delta_time).collect();
        assert_eq!(deltas, vec![10, 0, 30]);
    }
}
