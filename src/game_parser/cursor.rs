//! Byte cursor over game track data
//!
//! Reads bytes and variable-length quantities while expanding the two 0xFE
//! escapes of the game format:
//! - `FE FE` is a literal 0xFE
//! - `FE hi lo count` replays `count` earlier bytes starting
//!   `hi << 8 | lo` bytes before the marker
//!
//! While a replay is active its bytes are served verbatim (no nested escape
//! expansion) and the cursor returns to the main buffer once it is drained.

use crate::error::DecodeError;
use crate::vlq::VLQ_MAX_BYTES;
use ghakuf::formats::VLQBuilder;

/// Escape byte introducing a literal 0xFE or a repeat pattern
pub const REPEAT_MARKER: u8 = 0xFE;

/// Read position plus any active repeat-pattern substitution
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buffer: &'a [u8],
    position: usize,
    alt_pattern: Option<Vec<u8>>,
    alt_offset: usize,
}

impl<'a> ByteCursor<'a> {
    /// Cursor at `position` in `buffer`
    pub fn new(buffer: &'a [u8], position: usize) -> Self {
        ByteCursor {
            buffer,
            position,
            alt_pattern: None,
            alt_offset: 0,
        }
    }

    /// Position in the main buffer (past the marker while a pattern plays)
    pub fn position(&self) -> usize {
        self.position
    }

    /// True while bytes are served from a repeat pattern
    pub fn in_pattern(&self) -> bool {
        self.alt_pattern.is_some()
    }

    /// Jump to `position`, dropping any active pattern
    pub fn seek(&mut self, position: usize) {
        self.position = position;
        self.alt_pattern = None;
        self.alt_offset = 0;
    }

    fn raw(&self, position: usize) -> Result<u8, DecodeError> {
        self.buffer
            .get(position)
            .copied()
            .ok_or(DecodeError::UnexpectedEof { position })
    }

    /// Read one byte, expanding escapes when `allow_escapes` is set
    pub fn read_byte(&mut self, allow_escapes: bool) -> Result<u8, DecodeError> {
        if let Some(pattern) = &self.alt_pattern {
            let byte = pattern[self.alt_offset];
            self.alt_offset += 1;
            if self.alt_offset >= pattern.len() {
                self.alt_pattern = None;
                self.alt_offset = 0;
            }
            return Ok(byte);
        }

        let marker = self.position;
        let byte = self.raw(marker)?;
        self.position += 1;
        if !allow_escapes || byte != REPEAT_MARKER {
            return Ok(byte);
        }

        if self.raw(self.position)? == REPEAT_MARKER {
            self.position += 1;
            return Ok(REPEAT_MARKER);
        }

        let distance = u16::from_be_bytes([self.raw(self.position)?, self.raw(self.position + 1)?]);
        let length = self.raw(self.position + 2)?;
        self.position += 3;
        self.start_pattern(marker, distance, length)?;
        self.read_byte(allow_escapes)
    }

    fn start_pattern(&mut self, marker: usize, distance: u16, length: u8) -> Result<(), DecodeError> {
        if length == 0 {
            return Err(DecodeError::EmptyRepeatPattern { position: marker });
        }
        let back = usize::from(distance);
        if back == 0 || back > marker {
            return Err(DecodeError::RepeatPatternOutOfRange {
                position: marker,
                distance,
            });
        }
        let start = marker - back;
        let end = start + usize::from(length);
        if end > marker {
            return Err(DecodeError::OverlappingRepeatPattern {
                position: marker,
                distance,
                length,
            });
        }

        self.alt_pattern = Some(self.buffer[start..end].to_vec());
        self.alt_offset = 0;
        Ok(())
    }

    /// Read a variable-length quantity (1-4 bytes)
    pub fn read_vlq(&mut self, allow_escapes: bool) -> Result<u32, DecodeError> {
        let start = self.position;
        let mut vlq = VLQBuilder::new();
        for _ in 0..VLQ_MAX_BYTES {
            let byte = self.read_byte(allow_escapes)?;
            vlq.push(byte);
            if byte & 0x80 == 0 {
                return Ok(vlq.build().val());
            }
        }
        Err(DecodeError::VlqTooLong { position: start })
    }

    /// Read a big-endian u32
    pub fn read_u32_be(&mut self, allow_escapes: bool) -> Result<u32, DecodeError> {
        let mut bytes = [0u8; 4];
        for byte in bytes.iter_mut() {
            *byte = self.read_byte(allow_escapes)?;
        }
        Ok(u32::from_be_bytes(bytes))
    }
}
