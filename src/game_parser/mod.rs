//! Game Track Format Decoder
//!
//! Layout of a game sequence:
//! - 0x00: 16 big-endian u32 track offsets (0 = unused slot)
//! - 0x40: big-endian u32 division (ticks per quarter note)
//! - 0x44: track bodies
//!
//! Track bodies are MIDI-like event streams with these differences:
//! - note-on carries a VLQ duration after the velocity; there are no note-offs
//! - meta events have no length byte
//! - `FF 2E n FF` starts loop `n`, `FF 2D count current offset32` ends it by
//!   jumping `offset` bytes back from the end of the event
//! - `FE hi lo count` replays `count` bytes found `hi << 8 | lo` bytes before
//!   the marker, and `FE FE` is a literal 0xFE

pub mod cursor;
pub mod decoder;
pub mod split;
pub mod table;
pub mod track;

pub use cursor::{ByteCursor, REPEAT_MARKER};
pub use decoder::{decode_game_midi, DecodeReport, GameMidiDecoder, TrackFailure};
pub use split::split_notes;
pub use table::{GameTrackTable, TABLE_SIZE, TRACK_SLOTS};
pub use track::{DecodedTrack, TrackWalker};
