//! MIDI Variable-Length Quantities
//!
//! Seven bits per byte, most significant group first, continuation bit set on
//! every byte but the last. Both the game format and SMF limit values to four
//! bytes (28 bits); the byte work itself is ghakuf's `VLQ`.

use ghakuf::formats::{VLQBuilder, VLQ};

/// Largest value a four-byte quantity can carry
pub const VLQ_MAX: u32 = 0x0FFF_FFFF;

/// Longest legal encoding in bytes
pub const VLQ_MAX_BYTES: usize = 4;

/// Value too large for a four-byte quantity
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("value {0:#x} exceeds the 28-bit variable-length quantity range")]
pub struct VlqOverflow(pub u32);

/// Append the encoding of `value` to `out`.
pub fn write_vlq(value: u32, out: &mut Vec<u8>) -> Result<(), VlqOverflow> {
    out.append(&mut vlq_bytes(value)?);
    Ok(())
}

/// Encoding of `value` as a fresh buffer
pub fn vlq_bytes(value: u32) -> Result<Vec<u8>, VlqOverflow> {
    if value > VLQ_MAX {
        return Err(VlqOverflow(value));
    }
    Ok(VLQ::new(value).binary())
}

/// Number of bytes `value` encodes to (values above [`VLQ_MAX`] report 4)
pub fn vlq_len(value: u32) -> usize {
    VLQ::new(value.min(VLQ_MAX)).binary().len()
}

/// Decode a quantity from the start of `data`.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// data ends mid-quantity or the quantity runs longer than four bytes.
pub fn read_vlq(data: &[u8]) -> Option<(u32, usize)> {
    let mut vlq = VLQBuilder::new();
    for (index, &byte) in data.iter().take(VLQ_MAX_BYTES).enumerate() {
        vlq.push(byte);
        if byte & 0x80 == 0 {
            return Some((vlq.build().val(), index + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encodings() {
        assert_eq!(vlq_bytes(0).unwrap(), vec![0x00]);
        assert_eq!(vlq_bytes(0x40).unwrap(), vec![0x40]);
        assert_eq!(vlq_bytes(0x7F).unwrap(), vec![0x7F]);
        assert_eq!(vlq_bytes(0x80).unwrap(), vec![0x81, 0x00]);
        assert_eq!(vlq_bytes(480).unwrap(), vec![0x83, 0x60]);
        assert_eq!(vlq_bytes(0x2000).unwrap(), vec![0xC0, 0x00]);
        assert_eq!(vlq_bytes(0x3FFF).unwrap(), vec![0xFF, 0x7F]);
        assert_eq!(vlq_bytes(0x4000).unwrap(), vec![0x81, 0x80, 0x00]);
        assert_eq!(vlq_bytes(0x10_0000).unwrap(), vec![0xC0, 0x80, 0x00]);
        assert_eq!(vlq_bytes(VLQ_MAX).unwrap(), vec![0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_overflow_rejected() {
        let mut out = Vec::new();
        assert_eq!(write_vlq(VLQ_MAX + 1, &mut out), Err(VlqOverflow(VLQ_MAX + 1)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_decode_inverts_encode_at_group_boundaries() {
        for shift in 0..28 {
            for value in [1u32 << shift, (1u32 << shift) - 1, (1u32 << shift) + 1] {
                let value = value.min(VLQ_MAX);
                let bytes = vlq_bytes(value).unwrap();
                assert_eq!(bytes.len(), vlq_len(value));
                assert_eq!(read_vlq(&bytes), Some((value, bytes.len())));
            }
        }
    }

    #[test]
    fn test_read_stops_at_terminator() {
        assert_eq!(read_vlq(&[0x83, 0x60, 0x90, 0x3C]), Some((480, 2)));
    }

    #[test]
    fn test_read_rejects_truncated_and_overlong() {
        assert_eq!(read_vlq(&[0x81]), None);
        assert_eq!(read_vlq(&[]), None);
        assert_eq!(read_vlq(&[0x80, 0x80, 0x80, 0x80, 0x00]), None);
    }
}
