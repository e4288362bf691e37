//! Track layout for encoding
//!
//! Turns a parsed SMF into game tracks: note-on/note-off pairs become notes
//! with a duration, CC 102/103 markers become loop events, and events the game
//! format cannot carry are dropped.
//!
//! Format 1 files map one track with channel events to one game track. Tracks
//! without channel events (conductor tracks) donate their tempo events to the
//! first game track and their loop markers to every track that has none of
//! its own. Format 0 files are split by channel, with tempo and markers
//! treated the same way.
//!
//! A note-on with no matching note-off is written with duration 0, the game's
//! form for a note that is never released. A note-off on the same tick as its
//! note-on becomes a one-tick note.
//!
//! Events keep their file order at equal ticks. Loops placed without markers
//! start before everything at tick 0 and end after everything at the track
//! end.

use crate::error::EncodeError;
use crate::smf::{ChannelMessage, Smf, TrackEvent, LOOP_END_CONTROLLER, LOOP_START_CONTROLLER};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Game track table capacity
const MAX_TRACKS: usize = 16;

/// Sort ranks at equal ticks
const RANK_DEFAULT_LOOP_START: u8 = 0;
const RANK_STREAM: u8 = 1;
const RANK_DEFAULT_LOOP_END: u8 = 2;
const RANK_END_OF_TRACK: u8 = 3;

/// Event kinds the game format can carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEventKind {
    /// Tempo in microseconds per quarter note, big-endian
    Tempo([u8; 3]),
    /// Canonical loop start with its loop number
    LoopStart(u8),
    /// Canonical loop end, jumping back to the matching start
    LoopEnd,
    /// Channel message; `duration` is only written for note-ons
    Channel {
        /// Status byte
        status: u8,
        /// Data bytes
        data: Vec<u8>,
        /// Note length in ticks
        duration: u32,
    },
    /// End of track
    EndOfTrack,
}

/// Game event at an absolute tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEvent {
    /// Ticks since track start
    pub time: u32,
    /// What happens
    pub kind: GameEventKind,
}

/// One track ready for serialization, sorted, end-of-track last
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameTrack {
    /// Events in output order
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone)]
struct Keyed {
    time: u32,
    rank: u8,
    seq: usize,
    kind: GameEventKind,
}

#[derive(Debug, Clone, Default)]
struct Markers {
    starts: Vec<(u32, u8, usize)>,
    ends: Vec<(u32, usize)>,
}

impl Markers {
    fn is_empty(&self) -> bool {
        self.starts.is_empty() && self.ends.is_empty()
    }

    fn append(&mut self, other: &mut Markers) {
        self.starts.append(&mut other.starts);
        self.ends.append(&mut other.ends);
    }
}

#[derive(Debug, Clone, Default)]
struct TrackBuilder {
    source: usize,
    events: Vec<Keyed>,
    open_notes: HashMap<(u8, u8), VecDeque<usize>>,
    markers: Markers,
    end_time: u32,
    channel_events: usize,
}

impl TrackBuilder {
    fn new(source: usize) -> Self {
        TrackBuilder {
            source,
            ..Self::default()
        }
    }

    fn push(&mut self, time: u32, seq: usize, kind: GameEventKind) {
        self.end_time = self.end_time.max(time);
        self.events.push(Keyed {
            time,
            rank: RANK_STREAM,
            seq,
            kind,
        });
    }

    /// Route one channel event; returns false when it is dropped
    fn channel_event(&mut self, event: &TrackEvent, seq: usize) -> bool {
        let time = event.absolute_time;
        let status = event.event_type;
        let key = (status & 0x0F, event.contents.first().copied().unwrap_or(0));

        if event.is_note_on() {
            self.open_notes.entry(key).or_default().push_back(self.events.len());
            self.channel_events += 1;
            self.push(
                time,
                seq,
                GameEventKind::Channel {
                    status: 0x90 | key.0,
                    data: event.contents.clone(),
                    duration: 0,
                },
            );
            return true;
        }

        if event.is_note_off() {
            self.end_time = self.end_time.max(time);
            let Some(index) = self.open_notes.get_mut(&key).and_then(VecDeque::pop_front) else {
                return false;
            };
            let on_time = self.events[index].time;
            // duration 0 means "no note-off", so a same-tick release lasts one tick
            if let GameEventKind::Channel { duration, .. } = &mut self.events[index].kind {
                *duration = time.saturating_sub(on_time).max(1);
            }
            return true;
        }

        match event.message() {
            Some(ChannelMessage::PolyAftertouch) | None => false,
            Some(_) => {
                self.channel_events += 1;
                self.push(
                    time,
                    seq,
                    GameEventKind::Channel {
                        status,
                        data: event.contents.clone(),
                        duration: 0,
                    },
                );
                true
            }
        }
    }

    /// Notes never released keep duration 0, which the game reads as a note
    /// without a note-off
    fn close_open_notes(&mut self) {
        for index in self.open_notes.drain().flat_map(|(_, queue)| queue) {
            tracing::trace!(
                "track {}: note at tick {} has no note-off",
                self.source,
                self.events[index].time
            );
        }
    }

    fn place_loop(&mut self, markers: &Markers) -> Result<(), EncodeError> {
        let error = |message: &str| EncodeError::LoopMarkers {
            track: self.source,
            message: message.to_string(),
        };
        if markers.starts.len() > 1 {
            return Err(error("more than one loop start (CC 102)"));
        }
        if markers.ends.len() > 1 {
            return Err(error("more than one loop end (CC 103)"));
        }

        let (start_time, loop_number, start_rank, start_seq) = match markers.starts.first() {
            Some(&(time, number, seq)) => (time, number, RANK_STREAM, seq),
            None => (0, 0, RANK_DEFAULT_LOOP_START, 0),
        };
        let (end_time, end_rank, end_seq) = match markers.ends.first() {
            Some(&(time, seq)) => (time, RANK_STREAM, seq),
            None => (self.end_time, RANK_DEFAULT_LOOP_END, 0),
        };

        if end_time < start_time {
            return Err(error("loop end (CC 103) comes before loop start (CC 102)"));
        }
        if markers.is_empty() && end_time == start_time {
            tracing::debug!("track {} has no length, not adding a loop", self.source);
            return Ok(());
        }

        self.events.push(Keyed {
            time: start_time,
            rank: start_rank,
            seq: start_seq,
            kind: GameEventKind::LoopStart(loop_number),
        });
        self.events.push(Keyed {
            time: end_time,
            rank: end_rank,
            seq: end_seq,
            kind: GameEventKind::LoopEnd,
        });
        self.end_time = self.end_time.max(end_time);
        Ok(())
    }

    fn finish(mut self) -> GameTrack {
        self.events.push(Keyed {
            time: self.end_time,
            rank: RANK_END_OF_TRACK,
            seq: 0,
            kind: GameEventKind::EndOfTrack,
        });
        self.events
            .sort_by_key(|event| (event.time, event.rank, event.seq));
        GameTrack {
            events: self
                .events
                .into_iter()
                .map(|event| GameEvent {
                    time: event.time,
                    kind: event.kind,
                })
                .collect(),
        }
    }
}

fn tempo_bytes(event: &TrackEvent) -> Option<[u8; 3]> {
    let [_, a, b, c] = event.tempo()?.to_be_bytes();
    Some([a, b, c])
}

/// Lay out the game tracks of `smf`
pub fn layout_tracks(smf: &Smf, loop_song: bool) -> Result<Vec<GameTrack>, EncodeError> {
    if smf.format > 1 {
        return Err(EncodeError::UnsupportedFormat(smf.format));
    }
    let split_by_channel = smf.format == 0;

    let mut song = TrackBuilder::new(0);
    let mut builders: BTreeMap<usize, TrackBuilder> = BTreeMap::new();
    let mut seq = 0usize;
    let mut dropped = 0usize;

    for (index, track) in smf.tracks.iter().enumerate() {
        for event in track {
            seq += 1;
            let time = event.absolute_time;
            let conductor = if split_by_channel {
                &mut song
            } else {
                builders.entry(index).or_insert_with(|| TrackBuilder::new(index))
            };

            if let Some(tempo) = tempo_bytes(event) {
                conductor.push(time, seq, GameEventKind::Tempo(tempo));
                continue;
            }
            if event.is_end_of_track() {
                conductor.end_time = conductor.end_time.max(time);
                continue;
            }

            let Some(channel) = event.channel_number() else {
                dropped += 1;
                continue;
            };
            match event.controller() {
                Some((LOOP_START_CONTROLLER, number)) => {
                    conductor.markers.starts.push((time, number, seq));
                    conductor.end_time = conductor.end_time.max(time);
                    continue;
                }
                Some((LOOP_END_CONTROLLER, _)) => {
                    conductor.markers.ends.push((time, seq));
                    conductor.end_time = conductor.end_time.max(time);
                    continue;
                }
                _ => {}
            }

            let key = if split_by_channel { usize::from(channel) } else { index };
            let builder = builders.entry(key).or_insert_with(|| TrackBuilder::new(index));
            if !builder.channel_event(event, seq) {
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        tracing::debug!("dropped {} events the game format cannot carry", dropped);
    }

    let mut game_tracks = Vec::new();
    for (_, mut builder) in builders {
        if builder.channel_events == 0 {
            song.markers.append(&mut builder.markers);
            song.end_time = song.end_time.max(builder.end_time);
            song.events.append(&mut builder.events);
        } else {
            game_tracks.push(builder);
        }
    }
    if game_tracks.len() > MAX_TRACKS {
        return Err(EncodeError::TooManyTracks(game_tracks.len()));
    }

    let song_events = std::mem::take(&mut song.events);
    if let Some(first) = game_tracks.first_mut() {
        first.events.extend(song_events);
    }

    let mut tracks = Vec::with_capacity(game_tracks.len());
    for mut builder in game_tracks {
        builder.end_time = builder.end_time.max(song.end_time).max(
            builder.events.iter().map(|event| event.time).max().unwrap_or(0),
        );
        builder.close_open_notes();

        let markers = if builder.markers.is_empty() {
            song.markers.clone()
        } else {
            std::mem::take(&mut builder.markers)
        };
        if loop_song {
            builder.place_loop(&markers)?;
        } else if !markers.is_empty() {
            tracing::debug!("track {}: ignoring loop markers", builder.source);
        }
        tracks.push(builder.finish());
    }

    Ok(tracks)
}
