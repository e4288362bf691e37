//! Sequence Loader
//!
//! Loads sequence data from disk. Game sequences usually live inside a ROM
//! image, so a byte range can be cut out at a caller-given offset.

use crate::game_parser::table::{GameTrackTable, TABLE_SIZE};
use crate::smf::writer::HEADER_MAGIC;
use crate::Result;
use std::fs;
use std::path::Path;

/// Largest division a MIDI header can carry
const MAX_DIVISION: u32 = 0x7FFF;

/// Kind of data found in a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFormat {
    /// Game track table followed by track bodies
    GameTracks,
    /// Standard MIDI File
    StandardMidi,
    /// Neither
    Unknown,
}

/// Loads sequences from disk
pub struct SequenceLoader;

impl SequenceLoader {
    /// Read `length` bytes (or the rest of the file) starting at `offset`
    pub fn load<P: AsRef<Path>>(path: P, offset: usize, length: Option<usize>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let mut data = fs::read(path)
            .map_err(|e| format!("Failed to read file '{}': {}", path.display(), e))?;

        if offset > data.len() {
            return Err(format!(
                "Offset {:#x} is beyond the end of '{}' ({} bytes)",
                offset,
                path.display(),
                data.len()
            )
            .into());
        }
        let end = match length {
            Some(length) => offset
                .checked_add(length)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| {
                    format!(
                        "Range {:#x}+{:#x} runs past the end of '{}' ({} bytes)",
                        offset,
                        length,
                        path.display(),
                        data.len()
                    )
                })?,
            None => data.len(),
        };

        data.truncate(end);
        data.drain(..offset);
        tracing::debug!("loaded {} bytes from {}", data.len(), path.display());
        Ok(data)
    }

    /// Detect the format from magic bytes and table plausibility
    pub fn detect_format(data: &[u8]) -> SequenceFormat {
        if data.len() >= 4 && &data[0..4] == HEADER_MAGIC {
            return SequenceFormat::StandardMidi;
        }

        let Ok(table) = GameTrackTable::parse(data) else {
            return SequenceFormat::Unknown;
        };
        let plausible_division = (1..=MAX_DIVISION).contains(&table.division());
        let plausible_offsets = table.track_count() > 0
            && table
                .tracks()
                .all(|(_, offset)| (TABLE_SIZE..data.len()).contains(&(offset as usize)));

        if plausible_division && plausible_offsets {
            SequenceFormat::GameTracks
        } else {
            SequenceFormat::Unknown
        }
    }
}
