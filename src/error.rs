//! # Error Types
//!
//! Structured errors for the three byte formats this crate touches.
//!
//! ## Error Types
//! - [`DecodeError`] - game track data that cannot be decoded, always with the
//!   byte position (and track slot where known) of the problem
//! - [`SmfError`] - Standard MIDI Files the reader cannot make sense of
//! - [`EncodeError`] - MIDI content the game format cannot represent
//!
//! All three convert into [`crate::GameMidiError`] with `?`.

use crate::vlq::VlqOverflow;

/// Failure while decoding game track data
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer cannot hold the 17-slot track table
    #[error("buffer of {len} bytes is too small for the track table")]
    TableTooSmall {
        /// Bytes available
        len: usize,
    },

    /// Caller-supplied input size is larger than the buffer
    #[error("input size {input_size} exceeds buffer length {buffer_len}")]
    InputSizeOutOfRange {
        /// Requested input size
        input_size: usize,
        /// Actual buffer length
        buffer_len: usize,
    },

    /// Division slot does not fit a MIDI header
    #[error("division {0} cannot be stored in a MIDI header")]
    InvalidDivision(u32),

    /// A track offset points outside the input
    #[error("track slot {slot} offset {offset:#x} lies outside the input ({input_size} bytes)")]
    TrackOffsetOutOfRange {
        /// Table slot (0-15)
        slot: usize,
        /// Offset found in the slot
        offset: u32,
        /// Input size the offset was checked against
        input_size: usize,
    },

    /// Read past the end of the buffer
    #[error("unexpected end of data at {position:#x}")]
    UnexpectedEof {
        /// Position of the failed read
        position: usize,
    },

    /// Variable-length quantity with more than four bytes
    #[error("variable-length quantity at {position:#x} is longer than four bytes")]
    VlqTooLong {
        /// Position of the first VLQ byte
        position: usize,
    },

    /// Status byte the game format does not define
    #[error("unrecognized status byte {status:#04x} at {position:#x}")]
    UnrecognizedStatus {
        /// Offending byte
        status: u8,
        /// Position of the event
        position: usize,
    },

    /// Meta event subtype the game format does not define
    #[error("unrecognized meta event {subtype:#04x} at {position:#x}")]
    UnrecognizedMeta {
        /// Offending subtype
        subtype: u8,
        /// Position of the event
        position: usize,
    },

    /// 0xFE repeat marker with a zero byte count
    #[error("repeat pattern at {position:#x} has zero length")]
    EmptyRepeatPattern {
        /// Position of the 0xFE marker
        position: usize,
    },

    /// 0xFE repeat marker reaching before the start of the buffer
    #[error("repeat pattern at {position:#x} reaches {distance} bytes back, outside the buffer")]
    RepeatPatternOutOfRange {
        /// Position of the 0xFE marker
        position: usize,
        /// Backward distance from the marker
        distance: u16,
    },

    /// 0xFE repeat marker whose source range runs into the marker itself
    #[error("repeat pattern at {position:#x} ({length} bytes from {distance} back) overlaps its own marker")]
    OverlappingRepeatPattern {
        /// Position of the 0xFE marker
        position: usize,
        /// Backward distance from the marker
        distance: u16,
        /// Number of bytes to replay
        length: u8,
    },

    /// Loop end whose backward jump leaves the track
    #[error("loop end at {position:#x} jumps {offset} bytes back, before the track start")]
    LoopTargetOutOfRange {
        /// Position of the loop end event
        position: usize,
        /// Backward jump distance
        offset: u32,
    },

    /// Failure inside one track, raised when the error policy is fail-fast
    #[error("track slot {slot}: {source}")]
    Track {
        /// Table slot of the failing track
        slot: usize,
        /// Underlying failure
        source: Box<DecodeError>,
    },
}

/// Failure while reading a Standard MIDI File
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SmfError {
    /// Missing or truncated `MThd` chunk
    #[error("missing MThd header")]
    MissingHeader,

    /// `MThd` chunk shorter than six bytes
    #[error("header length {0} is shorter than 6")]
    HeaderLength(u32),

    /// Division uses SMPTE frames instead of ticks per quarter note
    #[error("SMPTE time division {0:#06x} is not supported")]
    SmpteDivision(u16),

    /// Format other than 0, 1 or 2
    #[error("MIDI format {0} is not supported")]
    UnsupportedFormat(u16),

    /// Chunk header or body runs past the end of the file
    #[error("track {track} is truncated")]
    TruncatedTrack {
        /// Zero-based track index
        track: usize,
    },

    /// Event that cannot be parsed
    #[error("track {track}: malformed event at byte {offset}")]
    MalformedEvent {
        /// Zero-based track index
        track: usize,
        /// Byte offset inside the track chunk
        offset: usize,
    },
}

/// Failure while converting MIDI into the game format
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Input is not a readable MIDI file
    #[error(transparent)]
    Smf(#[from] SmfError),

    /// MIDI format the encoder does not handle
    #[error("MIDI format {0} cannot be converted")]
    UnsupportedFormat(u16),

    /// More tracks than the table has slots
    #[error("{0} tracks with channel events; the game format holds at most 16")]
    TooManyTracks(usize),

    /// Loop markers that cannot be expressed as one game loop
    #[error("track {track}: {message}")]
    LoopMarkers {
        /// Zero-based MIDI track index
        track: usize,
        /// What is wrong with the markers
        message: String,
    },

    /// Delta time or duration beyond the 28-bit VLQ range
    #[error("value {0:#x} does not fit a variable-length quantity")]
    ValueTooLarge(u32),

    /// Loop offset escaping never reached a fixed length
    #[error("loop offset for game track {track} did not settle")]
    UnstableLoopOffset {
        /// Zero-based game track index
        track: usize,
    },

    /// Encoded sequence too large for 32-bit table offsets
    #[error("encoded sequence of {0} bytes is too large")]
    SequenceTooLarge(usize),
}

impl From<VlqOverflow> for EncodeError {
    fn from(err: VlqOverflow) -> Self {
        EncodeError::ValueTooLarge(err.0)
    }
}
