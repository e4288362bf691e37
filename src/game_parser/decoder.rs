//! Game track format decoder
//!
//! Two passes over the track table: the first measures every track to find
//! the longest one, the second emits events (padding and cutting tracks to
//! that length when extension is enabled). The result is written as an SMF
//! format 1 file.

use super::table::GameTrackTable;
use super::track::{DecodedTrack, TrackWalker};
use crate::config::{DecodeOptions, ErrorPolicy};
use crate::error::DecodeError;
use crate::smf::write_smf;
use crate::{Result, Transcoder};

/// Largest division an SMF header can carry in ticks-per-quarter form
const MAX_DIVISION: u32 = 0x7FFF;

/// A track that failed while decoding under [`ErrorPolicy::BestEffort`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFailure {
    /// Table slot of the track
    pub slot: usize,
    /// What went wrong
    pub error: DecodeError,
}

/// Everything a decode produced
#[derive(Debug, Clone)]
pub struct DecodeReport {
    /// The Standard MIDI File
    pub smf: Vec<u8>,
    /// Decoded tracks in slot order
    pub tracks: Vec<DecodedTrack>,
    /// Tracks that failed part way (empty under fail-fast)
    pub track_errors: Vec<TrackFailure>,
    /// Longest track length found by the measuring pass
    pub highest_track_length: u32,
    /// Ticks per quarter note
    pub division: u16,
}

/// Game track format to SMF decoder
#[derive(Debug, Clone, Default)]
pub struct GameMidiDecoder {
    options: DecodeOptions,
}

impl GameMidiDecoder {
    /// Decoder with the given options
    pub fn new(options: DecodeOptions) -> Self {
        GameMidiDecoder { options }
    }

    /// Options in use
    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decode the first `input_size` bytes of `source`
    pub fn decode(&self, source: &[u8], input_size: usize) -> Result<DecodeReport> {
        self.options.validate()?;
        if input_size > source.len() {
            return Err(DecodeError::InputSizeOutOfRange {
                input_size,
                buffer_len: source.len(),
            }
            .into());
        }
        let data = &source[..input_size];

        let table = GameTrackTable::parse(data)?;
        if table.division() > MAX_DIVISION {
            return Err(DecodeError::InvalidDivision(table.division()).into());
        }
        let division = table.division() as u16;

        let highest_track_length = Self::measure(data, &table);
        tracing::debug!(
            "{} tracks, division {}, longest track {} ticks",
            table.track_count(),
            division,
            highest_track_length
        );

        let target_length = self
            .options
            .extend_tracks_to_highest
            .then_some(highest_track_length);

        let mut tracks = Vec::with_capacity(table.track_count());
        let mut track_errors = Vec::new();
        for (slot, offset) in table.tracks() {
            let mut walker = TrackWalker::emitting(
                data,
                slot,
                offset,
                target_length,
                self.options.pitch_bend_sensitivity,
            );

            let result = if offset as usize >= input_size {
                Err(DecodeError::TrackOffsetOutOfRange {
                    slot,
                    offset,
                    input_size,
                })
            } else {
                walker.run()
            };

            if let Err(error) = result {
                if self.options.error_policy == ErrorPolicy::FailFast {
                    return Err(DecodeError::Track {
                        slot,
                        source: Box::new(error),
                    }
                    .into());
                }
                tracing::warn!(
                    "track slot {} stopped at tick {}: {}",
                    slot,
                    walker.absolute_time(),
                    error
                );
                track_errors.push(TrackFailure { slot, error });
            }

            tracks.push(walker.finish());
        }

        let smf = write_smf(&tracks, division)?;
        Ok(DecodeReport {
            smf,
            tracks,
            track_errors,
            highest_track_length,
            division,
        })
    }

    /// Longest track, following bounded loops but not canonical ones
    fn measure(data: &[u8], table: &GameTrackTable) -> u32 {
        table
            .tracks()
            .filter(|&(_, offset)| (offset as usize) < data.len())
            .map(|(slot, offset)| {
                let mut walker = TrackWalker::measuring(data, slot, offset);
                if let Err(error) = walker.run() {
                    tracing::trace!("measuring track slot {}: {}", slot, error);
                }
                walker.finish().end_time
            })
            .max()
            .unwrap_or(0)
    }
}

impl Transcoder for GameMidiDecoder {
    fn transcode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(self.decode(data, data.len())?.smf)
    }

    fn name(&self) -> &str {
        "Game track format to MIDI"
    }
}

/// Decode a game sequence into a Standard MIDI File
pub fn decode_game_midi(source: &[u8], input_size: usize, options: &DecodeOptions) -> Result<Vec<u8>> {
    let report = GameMidiDecoder::new(options.clone()).decode(source, input_size)?;
    Ok(report.smf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_parser::table::{TABLE_SIZE, TRACK_SLOTS};
    use crate::smf::read_smf;
    use crate::GameMidiError;

    /// Sequence with the given track bodies laid out after the table
    fn sequence(division: u32, tracks: &[&[u8]]) -> Vec<u8> {
        let mut offsets = [0u32; TRACK_SLOTS];
        let mut bodies = Vec::new();
        for (slot, body) in tracks.iter().enumerate() {
            offsets[slot] = (TABLE_SIZE + bodies.len()) as u32;
            bodies.extend_from_slice(body);
        }
        let mut data = GameTrackTable::new(offsets, division).to_bytes();
        data.extend_from_slice(&bodies);
        data
    }

    const ONE_NOTE: &[u8] = &[0x00, 0x90, 0x3C, 0x64, 0x83, 0x60, 0x00, 0xFF, 0x2F];

    #[test]
    fn test_single_note_file_bytes() {
        let data = sequence(480, &[ONE_NOTE]);
        let smf = decode_game_midi(&data, data.len(), &DecodeOptions::default()).unwrap();
        let mut expected = b"MThd".to_vec();
        expected.extend_from_slice(&[0, 0, 0, 6, 0, 1, 0, 1, 0x01, 0xE0]);
        expected.extend_from_slice(b"MTrk");
        expected.extend_from_slice(&[0, 0, 0, 12]);
        expected.extend_from_slice(&[
            0x00, 0x90, 0x3C, 0x64, //
            0x83, 0x60, 0x3C, 0x00, //
            0x00, 0xFF, 0x2F, 0x00,
        ]);
        assert_eq!(smf, expected);
    }

    #[test]
    fn test_empty_table_gives_empty_file() {
        let data = vec![0u8; TABLE_SIZE];
        let smf = decode_game_midi(&data, data.len(), &DecodeOptions::default()).unwrap();
        assert_eq!(&smf[..14], b"MThd\x00\x00\x00\x06\x00\x01\x00\x00\x00\x00");
        assert_eq!(smf.len(), 14);
    }

    #[test]
    fn test_header_errors() {
        let options = DecodeOptions::default();
        let short = vec![0u8; 0x20];
        assert!(matches!(
            decode_game_midi(&short, short.len(), &options),
            Err(GameMidiError::Decode(DecodeError::TableTooSmall { len: 0x20 }))
        ));

        let data = sequence(480, &[ONE_NOTE]);
        assert!(matches!(
            decode_game_midi(&data, data.len() + 1, &options),
            Err(GameMidiError::Decode(DecodeError::InputSizeOutOfRange { .. }))
        ));

        let data = sequence(0x8000, &[ONE_NOTE]);
        assert!(matches!(
            decode_game_midi(&data, data.len(), &options),
            Err(GameMidiError::Decode(DecodeError::InvalidDivision(0x8000)))
        ));
    }

    #[test]
    fn test_input_size_limits_tracks() {
        let data = sequence(480, &[ONE_NOTE]);
        // Cut off the end event: the track is closed at the tick reached
        let report = GameMidiDecoder::default()
            .decode(&data, data.len() - 3)
            .unwrap();
        assert!(report.track_errors.is_empty());
        assert!(report.tracks[0].events.last().unwrap().is_end_of_track());
    }

    #[test]
    fn test_best_effort_isolates_failing_track() {
        let broken: &[u8] = &[0x00, 0x90, 0x3C, 0x64, 0x10, 0x00, 0x80, 0x3C, 0x00];
        let data = sequence(96, &[broken, ONE_NOTE]);
        let report = GameMidiDecoder::default().decode(&data, data.len()).unwrap();

        assert_eq!(report.tracks.len(), 2);
        assert_eq!(report.track_errors.len(), 1);
        assert_eq!(report.track_errors[0].slot, 0);
        assert!(matches!(
            report.track_errors[0].error,
            DecodeError::UnrecognizedStatus { status: 0x80, .. }
        ));

        let smf = read_smf(&report.smf).unwrap();
        assert_eq!(smf.tracks.len(), 2);
        assert!(smf.tracks[0].iter().any(|event| event.is_note_on()));
        assert_eq!(smf.tracks[1].len(), 3);
    }

    #[test]
    fn test_fail_fast_aborts() {
        let broken: &[u8] = &[0x00, 0x90, 0x3C, 0x64, 0x10, 0x00, 0x80, 0x3C, 0x00];
        let data = sequence(96, &[ONE_NOTE, broken]);
        let err = GameMidiDecoder::new(DecodeOptions::strict())
            .decode(&data, data.len())
            .unwrap_err();
        match err {
            GameMidiError::Decode(DecodeError::Track { slot, source }) => {
                assert_eq!(slot, 1);
                assert!(matches!(*source, DecodeError::UnrecognizedStatus { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_offset_out_of_range() {
        let mut data = sequence(96, &[ONE_NOTE]);
        data[4..8].copy_from_slice(&0x1000u32.to_be_bytes());
        let report = GameMidiDecoder::default().decode(&data, data.len()).unwrap();
        assert_eq!(report.tracks.len(), 2);
        assert_eq!(
            report.track_errors,
            vec![TrackFailure {
                slot: 1,
                error: DecodeError::TrackOffsetOutOfRange {
                    slot: 1,
                    offset: 0x1000,
                    input_size: data.len()
                }
            }]
        );
        assert_eq!(report.tracks[1].events.len(), 1);

        assert!(GameMidiDecoder::new(DecodeOptions::strict())
            .decode(&data, data.len())
            .is_err());
    }

    #[test]
    fn test_extend_pads_shorter_tracks() {
        let long: &[u8] = &[0x00, 0x90, 0x3C, 0x64, 0x60, 0x83, 0x60, 0xFF, 0x2F];
        let looping: &[u8] = &[
            0x00, 0xFF, 0x2E, 0x00, 0xFF, //
            0x00, 0x91, 0x40, 0x64, 0x60, //
            0x60, 0xFF, 0x2D, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x0E, //
            0x00, 0xFF, 0x2F,
        ];
        let data = sequence(96, &[long, looping]);

        let plain = GameMidiDecoder::default().decode(&data, data.len()).unwrap();
        assert_eq!(plain.highest_track_length, 480);
        assert_eq!(plain.tracks[1].end_time, 96);

        let options = DecodeOptions::default().with_extend_tracks(true);
        let report = GameMidiDecoder::new(options).decode(&data, data.len()).unwrap();
        assert_eq!(report.tracks[0].end_time, 480);
        assert_eq!(report.tracks[1].end_time, 480);
        let notes = report.tracks[1]
            .events
            .iter()
            .filter(|event| event.is_note_on())
            .count();
        assert_eq!(notes, 5);
    }

    #[test]
    fn test_transcoder_uses_whole_buffer() {
        let data = sequence(480, &[ONE_NOTE]);
        let decoder = GameMidiDecoder::default();
        let smf = decoder.transcode(&data).unwrap();
        assert_eq!(smf, decode_game_midi(&data, data.len(), &DecodeOptions::default()).unwrap());
        assert!(!decoder.name().is_empty());
    }

    #[test]
    fn test_invalid_pitch_bend_option() {
        let data = sequence(480, &[ONE_NOTE]);
        let options = DecodeOptions::default().with_pitch_bend_sensitivity(200);
        assert!(matches!(
            decode_game_midi(&data, data.len(), &options),
            Err(GameMidiError::ConfigError(_))
        ));
    }
}
