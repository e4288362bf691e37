//! Sequence Loader Domain
//!
//! File I/O for the command line front end: reading whole files or byte
//! ranges out of ROM images, and telling game sequences from MIDI files.

pub mod loader;

pub use loader::{SequenceFormat, SequenceLoader};

use crate::Result;
use std::path::Path;

/// Convenience function to load a whole file from disk
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    SequenceLoader::load(path, 0, None)
}
