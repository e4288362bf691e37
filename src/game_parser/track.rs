//! Per-track event decoder
//!
//! Walks one track's byte stream from its table offset and turns it into
//! [`TrackEvent`]s. The same walker serves both decoder passes:
//!
//! - **measuring**: no events are kept and canonical loops never jump; the
//!   result is the tick the track ends on
//! - **emitting**: events are kept, and when a target length is given the
//!   track is padded by replaying its canonical loop and cut off at exactly
//!   that tick
//!
//! Bounded loops (count 1-254) are unrolled in both passes. Their remaining
//! repeats are keyed by the position of the loop-end event so nested loops
//! reseed correctly on every outer pass.

use super::cursor::ByteCursor;
use super::split::split_notes;
use crate::error::DecodeError;
use crate::smf::{ChannelMessage, MetaKind, TrackEvent, LOOP_END_CONTROLLER, LOOP_START_CONTROLLER, META};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Terminator byte after a loop-start number
const LOOP_START_TERMINATOR: u8 = 0xFF;

/// Registered parameter number controllers
const RPN_MSB: u8 = 0x65;
const RPN_LSB: u8 = 0x64;
const DATA_ENTRY_MSB: u8 = 0x06;
const DATA_ENTRY_LSB: u8 = 0x26;

/// Loop counts that mark the song's canonical (endless) loop
fn is_canonical_loop(count: u8) -> bool {
    count == 0x00 || count == 0xFF
}

/// One decoded track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedTrack {
    /// Table slot the track came from
    pub slot: usize,
    /// Events in time order, note-offs inserted, end-of-track last
    pub events: Vec<TrackEvent>,
    /// Tick of the end-of-track event
    pub end_time: u32,
    /// Tick of the first loop start seen
    pub loop_start: Option<u32>,
    /// Tick of the first canonical loop end seen
    pub loop_end: Option<u32>,
    /// Highest program number used
    pub max_instrument: Option<u8>,
}

impl AsRef<[TrackEvent]> for DecodedTrack {
    fn as_ref(&self) -> &[TrackEvent] {
        &self.events
    }
}

/// Byte-stream walker for a single track
#[derive(Debug)]
pub struct TrackWalker<'a> {
    cursor: ByteCursor<'a>,
    input_size: usize,
    track_start: usize,
    slot: usize,
    emit: bool,
    target_length: Option<u32>,
    pitch_bend_sensitivity: Option<u8>,

    absolute_time: u32,
    previous_status: Option<u8>,
    current_channel: u8,
    primed_channels: [bool; 16],
    events: Vec<TrackEvent>,

    remaining_repeats: HashMap<usize, u8>,
    loop_stack: Vec<(u8, usize)>,
    canonical_jumps: HashMap<usize, u32>,
    visited_markers: HashSet<usize>,

    loop_start: Option<u32>,
    loop_end: Option<u32>,
    max_instrument: Option<u8>,
    end_time: Option<u32>,
}

impl<'a> TrackWalker<'a> {
    fn new(data: &'a [u8], slot: usize, offset: u32, emit: bool) -> Self {
        let track_start = offset as usize;
        TrackWalker {
            cursor: ByteCursor::new(data, track_start),
            input_size: data.len(),
            track_start,
            slot,
            emit,
            target_length: None,
            pitch_bend_sensitivity: None,
            absolute_time: 0,
            previous_status: None,
            current_channel: 0,
            primed_channels: [false; 16],
            events: Vec::new(),
            remaining_repeats: HashMap::new(),
            loop_stack: Vec::new(),
            canonical_jumps: HashMap::new(),
            visited_markers: HashSet::new(),
            loop_start: None,
            loop_end: None,
            max_instrument: None,
            end_time: None,
        }
    }

    /// Walker for the measuring pass. `data` must already be cut to the
    /// input size.
    pub fn measuring(data: &'a [u8], slot: usize, offset: u32) -> Self {
        Self::new(data, slot, offset, false)
    }

    /// Walker for the emitting pass
    pub fn emitting(
        data: &'a [u8],
        slot: usize,
        offset: u32,
        target_length: Option<u32>,
        pitch_bend_sensitivity: Option<u8>,
    ) -> Self {
        let mut walker = Self::new(data, slot, offset, true);
        walker.target_length = target_length;
        walker.pitch_bend_sensitivity = pitch_bend_sensitivity;
        walker
    }

    /// Tick reached so far
    pub fn absolute_time(&self) -> u32 {
        self.absolute_time
    }

    /// Walk until end-of-track, end of input, or the first error.
    ///
    /// After an error the events decoded so far stay available through
    /// [`TrackWalker::finish`].
    pub fn run(&mut self) -> Result<(), DecodeError> {
        while self.end_time.is_none() {
            if !self.cursor.in_pattern() && self.cursor.position() >= self.input_size {
                tracing::debug!(
                    "track slot {} ran off the input at tick {} without an end event",
                    self.slot,
                    self.absolute_time
                );
                self.close();
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    /// Close the track if needed and hand over the result
    pub fn finish(mut self) -> DecodedTrack {
        if self.end_time.is_none() {
            self.close();
        }

        let events = if self.emit {
            split_notes(self.events, self.target_length.is_some())
        } else {
            Vec::new()
        };
        let end_time = events
            .last()
            .map(|event| event.absolute_time)
            .or(self.end_time)
            .unwrap_or(self.absolute_time);

        DecodedTrack {
            slot: self.slot,
            events,
            end_time,
            loop_start: self.loop_start,
            loop_end: self.loop_end,
            max_instrument: self.max_instrument,
        }
    }

    fn close(&mut self) {
        let time = match self.target_length {
            Some(target) => target.max(self.absolute_time),
            None => self.absolute_time,
        };
        self.push(TrackEvent::end_of_track(time));
        self.end_time = Some(time);
    }

    fn push(&mut self, event: TrackEvent) {
        if self.emit {
            self.events.push(event);
        }
    }

    fn next_data(&mut self, pending: &mut Option<u8>) -> Result<u8, DecodeError> {
        match pending.take() {
            Some(byte) => Ok(byte),
            None => self.cursor.read_byte(true),
        }
    }

    fn step(&mut self) -> Result<(), DecodeError> {
        let position = self.cursor.position();
        let delta = self.cursor.read_vlq(true)?;

        if let Some(target) = self.target_length {
            if self.absolute_time.saturating_add(delta) > target {
                self.absolute_time = target;
                self.close();
                return Ok(());
            }
        }
        self.absolute_time = self.absolute_time.saturating_add(delta);

        let first = self.cursor.read_byte(true)?;
        let (status, mut pending) = if first & 0x80 != 0 {
            (first, None)
        } else {
            match self.previous_status {
                Some(status) => (status, Some(first)),
                None => {
                    return Err(DecodeError::UnrecognizedStatus {
                        status: first,
                        position,
                    })
                }
            }
        };

        tracing::trace!(
            slot = self.slot,
            position,
            tick = self.absolute_time,
            "status {:#04x}",
            status
        );

        if status == META {
            self.previous_status = Some(status);
            return self.meta_event(position, &mut pending);
        }

        let Some(message) = ChannelMessage::from_status(status) else {
            return Err(DecodeError::UnrecognizedStatus { status, position });
        };
        let data = match message {
            ChannelMessage::NoteOn | ChannelMessage::ControlChange | ChannelMessage::PitchBend => {
                vec![self.next_data(&mut pending)?, self.next_data(&mut pending)?]
            }
            ChannelMessage::ProgramChange | ChannelMessage::ChannelAftertouch => {
                vec![self.next_data(&mut pending)?]
            }
            ChannelMessage::NoteOff | ChannelMessage::PolyAftertouch => {
                return Err(DecodeError::UnrecognizedStatus { status, position });
            }
        };
        let duration = if message == ChannelMessage::NoteOn {
            self.cursor.read_vlq(true)?
        } else {
            0
        };

        self.previous_status = Some(status);
        self.current_channel = status & 0x0F;
        self.prime_channel();

        if message == ChannelMessage::ProgramChange {
            self.max_instrument = self.max_instrument.max(Some(data[0]));
        }

        let mut event = TrackEvent::channel(self.absolute_time, status, &data);
        event.duration_time = duration;
        self.push(event);
        Ok(())
    }

    /// Emit the pitch-bend range RPN before a channel's first event
    fn prime_channel(&mut self) {
        let Some(semitones) = self.pitch_bend_sensitivity else {
            return;
        };
        let channel = usize::from(self.current_channel);
        if self.primed_channels[channel] {
            return;
        }
        self.primed_channels[channel] = true;

        let status = 0xB0 | self.current_channel;
        for data in [
            [RPN_MSB, 0],
            [RPN_LSB, 0],
            [DATA_ENTRY_MSB, semitones],
            [DATA_ENTRY_LSB, 0],
        ] {
            self.push(TrackEvent::channel(self.absolute_time, status, &data));
        }
    }

    fn loop_marker(&mut self, position: usize, controller: u8, value: u8) {
        let mut event = TrackEvent::channel(
            self.absolute_time,
            0xB0 | self.current_channel,
            &[controller, value],
        );
        event.obsolete_event = !self.visited_markers.insert(position);
        self.push(event);
    }

    fn meta_event(&mut self, position: usize, pending: &mut Option<u8>) -> Result<(), DecodeError> {
        let subtype = self.next_data(pending)?;
        match MetaKind::from_subtype(subtype) {
            Some(MetaKind::Tempo) => {
                let tempo = [
                    self.cursor.read_byte(true)?,
                    self.cursor.read_byte(true)?,
                    self.cursor.read_byte(true)?,
                ];
                self.push(TrackEvent::meta(self.absolute_time, subtype, &tempo));
                Ok(())
            }
            Some(MetaKind::LoopStart) => {
                let loop_number = self.cursor.read_byte(true)?;
                let terminator = self.cursor.read_byte(true)?;
                if terminator != LOOP_START_TERMINATOR {
                    tracing::debug!(
                        "track slot {}: loop start at {:#x} ends in {:#04x} instead of 0xff",
                        self.slot,
                        position,
                        terminator
                    );
                }
                self.loop_start.get_or_insert(self.absolute_time);
                self.loop_marker(position, LOOP_START_CONTROLLER, loop_number);
                self.loop_stack.push((loop_number, position));
                Ok(())
            }
            Some(MetaKind::LoopEnd) => self.loop_end_event(position),
            Some(MetaKind::EndOfTrack) => {
                self.close();
                Ok(())
            }
            None => Err(DecodeError::UnrecognizedMeta { subtype, position }),
        }
    }

    fn loop_end_event(&mut self, position: usize) -> Result<(), DecodeError> {
        let loop_count = self.cursor.read_byte(true)?;
        let _current_loop_count = self.cursor.read_byte(true)?;
        let offset = self.cursor.read_u32_be(true)?;
        let after = self.cursor.position();

        let loop_number = self.loop_stack.last().map_or(0, |&(number, _)| number);
        self.loop_marker(position, LOOP_END_CONTROLLER, loop_number);

        let jump = if is_canonical_loop(loop_count) {
            self.loop_end.get_or_insert(self.absolute_time);
            self.canonical_jump(position)
        } else {
            self.bounded_jump(position, loop_count)
        };

        if !jump {
            self.loop_stack.pop();
            return Ok(());
        }

        let target = after
            .checked_sub(offset as usize)
            .filter(|&target| target >= self.track_start)
            .ok_or(DecodeError::LoopTargetOutOfRange { position, offset })?;
        if self
            .loop_stack
            .last()
            .is_some_and(|&(_, start)| target <= start)
        {
            self.loop_stack.pop();
        }

        tracing::debug!(
            "track slot {}: loop end at {:#x} jumps back to {:#x} at tick {}",
            self.slot,
            position,
            target,
            self.absolute_time
        );
        self.cursor.seek(target);
        Ok(())
    }

    /// Canonical loops only replay while padding toward the target length
    fn canonical_jump(&mut self, position: usize) -> bool {
        let Some(target) = self.target_length else {
            return false;
        };
        if self.absolute_time >= target {
            return false;
        }
        // A body without ticks would spin forever
        if self.canonical_jumps.insert(position, self.absolute_time) == Some(self.absolute_time) {
            tracing::debug!(
                "track slot {}: canonical loop at {:#x} made no progress, not replaying",
                self.slot,
                position
            );
            return false;
        }
        true
    }

    fn bounded_jump(&mut self, position: usize, loop_count: u8) -> bool {
        let remaining = match self.remaining_repeats.get(&position) {
            Some(&remaining) => remaining.saturating_sub(1),
            None => loop_count - 1,
        };
        if remaining > 0 {
            self.remaining_repeats.insert(position, remaining);
            true
        } else {
            self.remaining_repeats.remove(&position);
            false
        }
    }
}
