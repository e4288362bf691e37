//! SMF to Game Track Format Encoder
//!
//! Reads a format 0 or 1 Standard MIDI File, lays it out as at most 16 game
//! tracks and writes the offset table followed by the track bodies.
//!
//! Loops: with [`EncodeOptions::loop_song`] every track gets one canonical
//! loop (count 0xFF). CC 102 marks the loop start (its value becomes the loop
//! number) and CC 103 the loop end; without markers the whole track loops.

pub mod compress;
pub mod layout;
pub mod writer;

pub use layout::{layout_tracks, GameEvent, GameEventKind, GameTrack};
pub use writer::write_game_track;

use crate::config::EncodeOptions;
use crate::error::EncodeError;
use crate::game_parser::table::{GameTrackTable, TABLE_SIZE, TRACK_SLOTS};
use crate::smf::read_smf;
use crate::Transcoder;

/// SMF to game track format encoder
#[derive(Debug, Clone, Default)]
pub struct GameMidiEncoder {
    options: EncodeOptions,
}

impl GameMidiEncoder {
    /// Encoder with the given options
    pub fn new(options: EncodeOptions) -> Self {
        GameMidiEncoder { options }
    }

    /// Options in use
    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Encode a Standard MIDI File
    pub fn encode(&self, smf: &[u8]) -> Result<Vec<u8>, EncodeError> {
        let smf = read_smf(smf)?;
        let tracks = layout_tracks(&smf, self.options.loop_song)?;

        let mut offsets = [0u32; TRACK_SLOTS];
        let mut bodies = Vec::new();
        for (index, track) in tracks.iter().enumerate() {
            let offset = TABLE_SIZE + bodies.len();
            offsets[index] =
                u32::try_from(offset).map_err(|_| EncodeError::SequenceTooLarge(offset))?;
            bodies.extend(write_game_track(track, index, self.options.compress_repeats)?);
        }

        let mut out = GameTrackTable::new(offsets, u32::from(smf.division)).to_bytes();
        out.extend_from_slice(&bodies);
        tracing::debug!(
            "encoded {} tracks into {} bytes (format {}, division {})",
            tracks.len(),
            out.len(),
            smf.format,
            smf.division
        );
        Ok(out)
    }
}

impl Transcoder for GameMidiEncoder {
    fn transcode(&self, data: &[u8]) -> crate::Result<Vec<u8>> {
        Ok(self.encode(data)?)
    }

    fn name(&self) -> &str {
        "MIDI to game track format"
    }
}

/// Encode a Standard MIDI File into a game sequence
pub fn encode_game_midi(smf: &[u8], options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
    GameMidiEncoder::new(options.clone()).encode(smf)
}
