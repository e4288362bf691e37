//! N64 Game MIDI Transcoder
//!
//! Converts the sequenced-audio track format used by Mario Party on the N64
//! into Standard MIDI Files and back. The game format is a compact MIDI
//! dialect: a 17-slot offset table, note-on events with an inline duration
//! instead of note-off events, loop meta events that jump backward through the
//! byte stream, and a 0xFE escape that replays an earlier byte range.
//!
//! # Features
//! - Two-pass decoder with bounded loop unrolling and optional track extension
//! - Note splitting (inline durations become note-off events)
//! - Running-status compressed SMF format 1 writer and a nom-based SMF reader
//! - Encoder with loop marker re-insertion and optional repeat compression
//! - Configurable per-track error isolation
//!
//! # Crate feature flags
//! - `cli` (default): the `n64midi` command line front end
//!
//! # Quick start
//! ## Decode a game sequence
//! ```no_run
//! use n64midi::{decode_game_midi, DecodeOptions};
//! let data = std::fs::read("sequence.bin").unwrap();
//! let smf = decode_game_midi(&data, data.len(), &DecodeOptions::default()).unwrap();
//! std::fs::write("sequence.mid", smf).unwrap();
//! ```
//!
//! ## Encode a MIDI file for insertion
//! ```no_run
//! use n64midi::{encode_game_midi, EncodeOptions};
//! let smf = std::fs::read("song.mid").unwrap();
//! let options = EncodeOptions { loop_song: true, ..EncodeOptions::default() };
//! match encode_game_midi(&smf, &options) {
//!     Ok(game) => std::fs::write("song.bin", game).unwrap(),
//!     Err(e) => eprintln!("could not process MIDI for insertion into the game: {e}"),
//! }
//! ```

#![warn(missing_docs)]

pub mod config; // Decode/encode options and config files
pub mod encoder; // SMF -> game track format
pub mod error; // Decode/encode error taxonomy
pub mod game_parser; // Game track format -> SMF
pub mod loader; // File I/O and format detection
pub mod smf; // Standard MIDI File model, writer and reader
pub mod vlq; // Variable-length quantities

/// Error types for transcoder operations
#[derive(thiserror::Error, Debug)]
pub enum GameMidiError {
    /// Game track data could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// MIDI data could not be converted to the game format
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Standard MIDI File could not be read
    #[error("MIDI file error: {0}")]
    Smf(#[from] SmfError),

    /// A delta time or duration exceeded the 28-bit VLQ range
    #[error("{0}")]
    VlqOverflow(#[from] vlq::VlqOverflow),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed or written
    #[error("Config file error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for GameMidiError {
    /// Converts a String into `GameMidiError::Other`.
    ///
    /// Prefer the specific variants where one applies; this conversion exists
    /// for ad-hoc messages such as file paths attached to IO failures.
    fn from(msg: String) -> Self {
        GameMidiError::Other(msg)
    }
}

impl From<&str> for GameMidiError {
    /// Converts a string slice into `GameMidiError::Other`.
    fn from(msg: &str) -> Self {
        GameMidiError::Other(msg.to_string())
    }
}

/// Result type for transcoder operations
pub type Result<T> = std::result::Result<T, GameMidiError>;

/// A one-directional byte-buffer conversion.
///
/// Implemented by [`GameMidiDecoder`] and [`GameMidiEncoder`] so callers can
/// pick a direction at runtime and treat both the same way.
pub trait Transcoder {
    /// Convert `data`, returning the transcoded buffer
    fn transcode(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Human-readable name of the conversion
    fn name(&self) -> &str;
}

// Public API exports
pub use config::{DecodeOptions, EncodeOptions, ErrorPolicy, TranscodeConfig};
pub use encoder::{encode_game_midi, GameMidiEncoder};
pub use error::{DecodeError, EncodeError, SmfError};
pub use game_parser::{
    decode_game_midi, DecodeReport, DecodedTrack, GameMidiDecoder, GameTrackTable, TrackFailure,
};
pub use loader::{SequenceFormat, SequenceLoader};
pub use smf::{read_smf, write_smf, Smf, TrackEvent};
