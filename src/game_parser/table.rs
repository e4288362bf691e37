//! Game track table
//!
//! The first 0x44 bytes of a sequence: sixteen big-endian track offsets
//! (zero marks an unused slot) followed by the division in ticks per quarter
//! note.

use crate::error::DecodeError;
use nom::{multi::count, number::complete::be_u32, IResult};

/// Number of track slots
pub const TRACK_SLOTS: usize = 16;

/// Slots including the trailing division
pub const TABLE_SLOTS: usize = TRACK_SLOTS + 1;

/// Table size in bytes, also the offset of the first track body
pub const TABLE_SIZE: usize = TABLE_SLOTS * 4;

/// Parsed track table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameTrackTable {
    offsets: [u32; TRACK_SLOTS],
    division: u32,
}

fn slots(input: &[u8]) -> IResult<&[u8], Vec<u32>> {
    count(be_u32, TABLE_SLOTS)(input)
}

impl GameTrackTable {
    /// Table with the given offsets and division
    pub fn new(offsets: [u32; TRACK_SLOTS], division: u32) -> Self {
        GameTrackTable { offsets, division }
    }

    /// Read the table from the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let (_, values) = slots(data).map_err(|_| DecodeError::TableTooSmall { len: data.len() })?;

        let mut offsets = [0u32; TRACK_SLOTS];
        offsets.copy_from_slice(&values[..TRACK_SLOTS]);
        Ok(GameTrackTable {
            offsets,
            division: values[TRACK_SLOTS],
        })
    }

    /// Serialize back to the 0x44-byte layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TABLE_SIZE);
        for offset in &self.offsets {
            out.extend_from_slice(&offset.to_be_bytes());
        }
        out.extend_from_slice(&self.division.to_be_bytes());
        out
    }

    /// Ticks per quarter note as stored
    pub fn division(&self) -> u32 {
        self.division
    }

    /// Offset stored in `slot` (zero when unused or out of range)
    pub fn offset(&self, slot: usize) -> u32 {
        self.offsets.get(slot).copied().unwrap_or(0)
    }

    /// Used slots and their offsets, in slot order
    pub fn tracks(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.offsets
            .iter()
            .enumerate()
            .filter(|(_, offset)| **offset != 0)
            .map(|(slot, &offset)| (slot, offset))
    }

    /// Number of used slots
    pub fn track_count(&self) -> usize {
        self.tracks().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_bytes(offsets: &[(usize, u32)], division: u32) -> Vec<u8> {
        let mut data = vec![0u8; TABLE_SIZE];
        for &(slot, offset) in offsets {
            data[slot * 4..slot * 4 + 4].copy_from_slice(&offset.to_be_bytes());
        }
        data[64..68].copy_from_slice(&division.to_be_bytes());
        data
    }

    #[test]
    fn test_parse_slots_and_division() {
        let data = table_bytes(&[(0, 0x44), (3, 0x80)], 480);
        let table = GameTrackTable::parse(&data).unwrap();
        assert_eq!(table.division(), 480);
        assert_eq!(table.track_count(), 2);
        assert_eq!(table.tracks().collect::<Vec<_>>(), vec![(0, 0x44), (3, 0x80)]);
        assert_eq!(table.offset(3), 0x80);
        assert_eq!(table.offset(1), 0);
        assert_eq!(table.offset(40), 0);
    }

    #[test]
    fn test_empty_table() {
        let table = GameTrackTable::parse(&[0u8; TABLE_SIZE]).unwrap();
        assert_eq!(table.track_count(), 0);
        assert_eq!(table.division(), 0);
    }

    #[test]
    fn test_short_buffer() {
        assert_eq!(
            GameTrackTable::parse(&[0u8; 0x40]),
            Err(DecodeError::TableTooSmall { len: 0x40 })
        );
    }

    #[test]
    fn test_to_bytes_matches_layout() {
        let data = table_bytes(&[(0, 0x44), (15, 0x1234)], 96);
        let table = GameTrackTable::parse(&data).unwrap();
        assert_eq!(table.to_bytes(), data);

        let mut offsets = [0u32; TRACK_SLOTS];
        offsets[0] = 0x44;
        offsets[15] = 0x1234;
        assert_eq!(GameTrackTable::new(offsets, 96), table);
    }
}
