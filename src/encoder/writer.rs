//! Game track serialization
//!
//! Track bodies are written in up to five runs: events before the loop, the
//! loop start, the loop body, the loop end and everything after. Loop events
//! are only escaped, never compressed, so the decoder always reads them from
//! the buffer itself and the loop end's backward offset lands exactly on the
//! first byte of the body.

use super::compress::{escape_into, escaped_len, RepeatPacker};
use super::layout::{GameEventKind, GameTrack};
use crate::error::EncodeError;
use crate::smf::{ChannelMessage, MetaKind, META};
use crate::vlq::write_vlq;

/// Loop count and current count written into every loop end
const CANONICAL_LOOP: u8 = 0xFF;

/// Terminator after the loop-start number
const LOOP_START_TERMINATOR: u8 = 0xFF;

/// Rounds allowed for the loop offset to settle
const MAX_OFFSET_ROUNDS: usize = 8;

#[derive(Debug, Default)]
struct Runs {
    prefix: Vec<u8>,
    loop_start: Option<Vec<u8>>,
    body: Vec<u8>,
    loop_end: Option<Vec<u8>>,
    suffix: Vec<u8>,
}

impl Runs {
    fn current(&mut self) -> &mut Vec<u8> {
        match (&self.loop_start, &self.loop_end) {
            (None, _) => &mut self.prefix,
            (Some(_), None) => &mut self.body,
            (Some(_), Some(_)) => &mut self.suffix,
        }
    }
}

/// Raw event bytes, loop end without its offset
fn event_runs(track: &GameTrack) -> Result<Runs, EncodeError> {
    let mut runs = Runs::default();
    let mut previous_time = 0u32;
    let mut running_status: Option<u8> = None;

    for event in &track.events {
        let mut bytes = Vec::with_capacity(8);
        write_vlq(event.time.saturating_sub(previous_time), &mut bytes)?;
        previous_time = event.time;

        match &event.kind {
            GameEventKind::Tempo(tempo) => {
                bytes.extend_from_slice(&[META, MetaKind::Tempo as u8]);
                bytes.extend_from_slice(tempo);
                running_status = None;
            }
            GameEventKind::LoopStart(number) => {
                bytes.extend_from_slice(&[
                    META,
                    MetaKind::LoopStart as u8,
                    *number,
                    LOOP_START_TERMINATOR,
                ]);
                running_status = None;
                runs.loop_start = Some(bytes);
                continue;
            }
            GameEventKind::LoopEnd => {
                bytes.extend_from_slice(&[
                    META,
                    MetaKind::LoopEnd as u8,
                    CANONICAL_LOOP,
                    CANONICAL_LOOP,
                ]);
                running_status = None;
                runs.loop_end = Some(bytes);
                continue;
            }
            GameEventKind::Channel {
                status,
                data,
                duration,
            } => {
                if running_status != Some(*status) {
                    bytes.push(*status);
                }
                running_status = Some(*status);
                bytes.extend_from_slice(data);
                if ChannelMessage::from_status(*status) == Some(ChannelMessage::NoteOn) {
                    write_vlq(*duration, &mut bytes)?;
                }
            }
            GameEventKind::EndOfTrack => {
                bytes.extend_from_slice(&[META, MetaKind::EndOfTrack as u8]);
                running_status = None;
            }
        }
        runs.current().extend_from_slice(&bytes);
    }

    Ok(runs)
}

/// Escaped loop end whose offset covers the body plus the loop end itself
fn loop_end_bytes(head: &[u8], body_len: usize, track: usize) -> Result<Vec<u8>, EncodeError> {
    let mut offset = body_len + escaped_len(head) + 4;
    for _ in 0..MAX_OFFSET_ROUNDS {
        let value = u32::try_from(offset).map_err(|_| EncodeError::SequenceTooLarge(offset))?;
        let mut raw = head.to_vec();
        raw.extend_from_slice(&value.to_be_bytes());

        let mut escaped = Vec::with_capacity(raw.len() + 2);
        escape_into(&raw, &mut escaped);
        let total = body_len + escaped.len();
        if total == offset {
            return Ok(escaped);
        }
        offset = total;
    }
    Err(EncodeError::UnstableLoopOffset { track })
}

/// Serialize one game track body
pub fn write_game_track(track: &GameTrack, index: usize, compress: bool) -> Result<Vec<u8>, EncodeError> {
    let runs = event_runs(track)?;
    let mut packer = RepeatPacker::new(compress);
    let mut out = Vec::with_capacity(runs.prefix.len() + runs.body.len() + runs.suffix.len() + 16);

    packer.pack(&runs.prefix, &mut out);
    if let Some(start) = &runs.loop_start {
        escape_into(start, &mut out);
        let body_start = out.len();
        packer.pack(&runs.body, &mut out);
        if let Some(head) = &runs.loop_end {
            let end = loop_end_bytes(head, out.len() - body_start, index)?;
            out.extend_from_slice(&end);
        }
    }
    packer.pack(&runs.suffix, &mut out);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::layout::GameEvent;

    fn event(time: u32, kind: GameEventKind) -> GameEvent {
        GameEvent { time, kind }
    }

    fn note(time: u32, status: u8, key: u8, velocity: u8, duration: u32) -> GameEvent {
        event(
            time,
            GameEventKind::Channel {
                status,
                data: vec![key, velocity],
                duration,
            },
        )
    }

    #[test]
    fn test_running_status_and_duration() {
        let track = GameTrack {
            events: vec![
                event(0, GameEventKind::Channel { status: 0xC0, data: vec![5], duration: 0 }),
                note(0, 0x90, 0x3C, 0x64, 480),
                note(480, 0x90, 0x3E, 0x50, 240),
                event(720, GameEventKind::EndOfTrack),
            ],
        };
        let bytes = write_game_track(&track, 0, false).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x00, 0xC0, 0x05, //
                0x00, 0x90, 0x3C, 0x64, 0x83, 0x60, //
                0x83, 0x60, 0x3E, 0x50, 0x81, 0x70, //
                0x81, 0x70, 0xFF, 0x2F,
            ]
        );
    }

    #[test]
    fn test_canonical_loop_offset() {
        let track = GameTrack {
            events: vec![
                event(0, GameEventKind::LoopStart(0)),
                note(0, 0x90, 0x3C, 0x64, 480),
                event(480, GameEventKind::LoopEnd),
                event(480, GameEventKind::EndOfTrack),
            ],
        };
        let bytes = write_game_track(&track, 0, false).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x00, 0xFF, 0x2E, 0x00, 0xFF, //
                0x00, 0x90, 0x3C, 0x64, 0x83, 0x60, //
                0x83, 0x60, 0xFF, 0x2D, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x10, //
                0x00, 0xFF, 0x2F,
            ]
        );
    }

    #[test]
    fn test_tempo_resets_running_status() {
        let track = GameTrack {
            events: vec![
                note(0, 0x90, 0x3C, 0x64, 1),
                event(0, GameEventKind::Tempo([0x07, 0xA1, 0x20])),
                note(0, 0x90, 0x3E, 0x64, 1),
                event(1, GameEventKind::EndOfTrack),
            ],
        };
        let bytes = write_game_track(&track, 0, false).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x00, 0x90, 0x3C, 0x64, 0x01, //
                0x00, 0xFF, 0x51, 0x07, 0xA1, 0x20, //
                0x00, 0x90, 0x3E, 0x64, 0x01, //
                0x01, 0xFF, 0x2F,
            ]
        );
    }

    #[test]
    fn test_marker_bytes_are_escaped() {
        // 0x3F7E encodes as FE 7E
        let track = GameTrack {
            events: vec![
                note(0, 0x90, 0x3C, 0x64, 0x3F7E),
                event(0x3F7E, GameEventKind::EndOfTrack),
            ],
        };
        let bytes = write_game_track(&track, 0, false).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x00, 0x90, 0x3C, 0x64, 0xFE, 0xFE, 0x7E, //
                0xFE, 0xFE, 0x7E, 0xFF, 0x2F,
            ]
        );
    }

    #[test]
    fn test_loop_offset_counts_escapes_in_itself() {
        let head = [0x00, 0xFF, 0x2D, 0xFF, 0xFF];
        let end = loop_end_bytes(&head, 0xFDFB, 0).unwrap();
        assert_eq!(end.len(), 10);
        assert_eq!(&end[5..], &[0x00, 0x00, 0xFE, 0xFE, 0x05]);
    }

    #[test]
    fn test_unsettled_loop_offset() {
        let head = [0x00, 0xFF, 0x2D, 0xFF, 0xFF];
        // 0x1FE needs one more byte once escaped, 0x1FF one less
        assert_eq!(
            loop_end_bytes(&head, 0x1FE - 9, 3),
            Err(EncodeError::UnstableLoopOffset { track: 3 })
        );
    }
}
