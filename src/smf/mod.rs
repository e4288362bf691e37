//! Standard MIDI File Domain
//!
//! The intermediate [`TrackEvent`] model plus the SMF writer (decode output)
//! and reader (encode input).

pub mod event;
pub mod reader;
pub mod writer;

pub use event::{
    recompute_deltas, tempo_to_bpm, ChannelMessage, MetaKind, TrackEvent, LOOP_END_CONTROLLER,
    LOOP_START_CONTROLLER, META,
};
pub use reader::read_smf;
pub use writer::write_smf;

/// A parsed Standard MIDI File
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smf {
    /// 0 (single track), 1 (synchronous tracks) or 2 (independent patterns)
    pub format: u16,
    /// Ticks per quarter note
    pub division: u16,
    /// Per-track events, running status resolved
    pub tracks: Vec<Vec<TrackEvent>>,
}
