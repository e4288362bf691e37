//! 0xFE escaping and repeat compression
//!
//! Every literal 0xFE in a track body is written as `FE FE`. With compression
//! enabled, byte runs that already occur earlier in the same track are
//! replaced by `FE hi lo count`, where `hi << 8 | lo` is the distance from the
//! marker back to the earlier copy.
//!
//! The decoder replays referenced bytes verbatim, so a source range must not
//! contain 0xFE itself, and it must end at or before the marker. A distance
//! whose high byte is 0xFE would read back as a literal and is never used.

use crate::game_parser::REPEAT_MARKER;
use std::collections::HashMap;

/// Shortest run worth a four-byte marker
pub const MIN_REPEAT: usize = 5;

/// Longest run one marker can replay
pub const MAX_REPEAT: usize = 0xFF;

/// Farthest a marker can reach back
const MAX_DISTANCE: usize = 0xFFFF;

/// Candidate positions checked per lookup
const MAX_CANDIDATES: usize = 64;

/// Append `raw` to `out`, doubling every 0xFE
pub fn escape_into(raw: &[u8], out: &mut Vec<u8>) {
    for &byte in raw {
        out.push(byte);
        if byte == REPEAT_MARKER {
            out.push(REPEAT_MARKER);
        }
    }
}

/// Length of `raw` once escaped
pub fn escaped_len(raw: &[u8]) -> usize {
    raw.len() + raw.iter().filter(|&&byte| byte == REPEAT_MARKER).count()
}

/// Writes one track's bytes, optionally replacing repeats with back-references.
///
/// The packer indexes everything already in the output buffer, so it must
/// see every byte of a single track and nothing else.
#[derive(Debug, Default)]
pub struct RepeatPacker {
    compress: bool,
    index: HashMap<[u8; 3], Vec<usize>>,
    indexed: usize,
}

impl RepeatPacker {
    /// Packer for one track
    pub fn new(compress: bool) -> Self {
        RepeatPacker {
            compress,
            ..Self::default()
        }
    }

    /// Append `raw` to `out`. References never reach past the end of `raw`,
    /// so a run boundary can be placed between two calls.
    pub fn pack(&mut self, raw: &[u8], out: &mut Vec<u8>) {
        let mut position = 0;
        while position < raw.len() {
            if self.compress {
                self.update_index(out);
                if let Some((distance, length)) = self.longest_match(&raw[position..], out) {
                    out.push(REPEAT_MARKER);
                    out.extend_from_slice(&distance.to_be_bytes());
                    out.push(length as u8);
                    position += length;
                    continue;
                }
            }
            escape_into(&raw[position..position + 1], out);
            position += 1;
        }
    }

    fn update_index(&mut self, out: &[u8]) {
        let end = out.len().saturating_sub(2);
        for start in self.indexed..end {
            let key = [out[start], out[start + 1], out[start + 2]];
            if !key.contains(&REPEAT_MARKER) {
                self.index.entry(key).or_default().push(start);
            }
        }
        self.indexed = self.indexed.max(end);
    }

    fn longest_match(&self, rest: &[u8], out: &[u8]) -> Option<(u16, usize)> {
        if rest.len() < MIN_REPEAT {
            return None;
        }
        let key = [rest[0], rest[1], rest[2]];
        let candidates = self.index.get(&key)?;
        let marker = out.len();

        let mut best: Option<(u16, usize)> = None;
        for &start in candidates.iter().rev().take(MAX_CANDIDATES) {
            let distance = marker - start;
            if distance > MAX_DISTANCE {
                break;
            }
            if (distance >> 8) as u8 == REPEAT_MARKER {
                continue;
            }

            let limit = rest.len().min(MAX_REPEAT).min(distance);
            let length = out[start..start + limit]
                .iter()
                .zip(rest)
                .take_while(|&(&source, &wanted)| source != REPEAT_MARKER && source == wanted)
                .count();
            if length >= MIN_REPEAT && best.map_or(true, |(_, longest)| length > longest) {
                best = Some((distance as u16, length));
                if length == MAX_REPEAT {
                    break;
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_parser::ByteCursor;

    /// Read `out` back through the decoder's cursor
    fn expand(out: &[u8], len: usize) -> Vec<u8> {
        let mut cursor = ByteCursor::new(out, 0);
        (0..len).map(|_| cursor.read_byte(true).unwrap()).collect()
    }

    #[test]
    fn test_escape() {
        let mut out = Vec::new();
        escape_into(&[0x01, 0xFE, 0x02], &mut out);
        assert_eq!(out, vec![0x01, 0xFE, 0xFE, 0x02]);
        assert_eq!(escaped_len(&[0xFE, 0xFE, 0x00]), 5);
    }

    #[test]
    fn test_plain_packer_only_escapes() {
        let raw = [1, 2, 3, 4, 5, 6, 1, 2, 3, 4, 5, 6, 0xFE];
        let mut out = Vec::new();
        RepeatPacker::new(false).pack(&raw, &mut out);
        assert_eq!(out.len(), raw.len() + 1);
    }

    #[test]
    fn test_repeat_becomes_reference() {
        let raw = [1, 2, 3, 4, 5, 6, 1, 2, 3, 4, 5, 6, 7];
        let mut out = Vec::new();
        RepeatPacker::new(true).pack(&raw, &mut out);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 0xFE, 0x00, 0x06, 0x06, 7]);
        assert_eq!(expand(&out, raw.len()), raw);
    }

    #[test]
    fn test_short_repeats_stay_literal() {
        let raw = [1, 2, 3, 4, 9, 1, 2, 3, 4];
        let mut out = Vec::new();
        RepeatPacker::new(true).pack(&raw, &mut out);
        assert_eq!(out, raw);
    }

    #[test]
    fn test_source_with_marker_byte_is_skipped() {
        let raw = [1, 2, 0xFE, 4, 5, 6, 1, 2, 0xFE, 4, 5, 6];
        let mut out = Vec::new();
        RepeatPacker::new(true).pack(&raw, &mut out);
        assert!(out.len() >= raw.len());
        assert_eq!(expand(&out, raw.len()), raw);
    }

    #[test]
    fn test_references_span_calls() {
        let mut packer = RepeatPacker::new(true);
        let mut out = Vec::new();
        packer.pack(&[10, 11, 12, 13, 14, 15], &mut out);
        packer.pack(&[10, 11, 12, 13, 14, 15], &mut out);
        assert_eq!(out.len(), 10);
        assert_eq!(expand(&out, 12), vec![10, 11, 12, 13, 14, 15, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_long_run_is_split() {
        let block: Vec<u8> = (0..=255u16).map(|value| (value % 0xF0) as u8).collect();
        let mut raw = block.clone();
        raw.extend_from_slice(&block);
        let mut out = Vec::new();
        RepeatPacker::new(true).pack(&raw, &mut out);
        assert!(out.len() < raw.len());
        assert_eq!(expand(&out, raw.len()), raw);
    }
}
