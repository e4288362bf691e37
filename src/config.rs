//! Transcoder Configuration
//!
//! Options for both conversion directions. All option structs deserialize
//! from partial JSON (missing fields take their defaults), so a config file
//! only needs to name what it changes:
//!
//! ```json
//! { "decode": { "extendTracksToHighest": true, "pitchBendSensitivity": 12 } }
//! ```

use crate::{GameMidiError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest value a MIDI data byte can carry
const MAX_DATA_BYTE: u8 = 0x7F;

/// What the decoder does when one track fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Keep the events decoded so far, close the track and continue with the
    /// remaining tracks. Failures are returned alongside the output.
    #[default]
    BestEffort,
    /// Abort the whole decode on the first failing track
    FailFast,
}

/// Options for game track → SMF decoding
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecodeOptions {
    /// Emit an RPN 0 pitch-bend range (in semitones) before each channel's
    /// first event
    pub pitch_bend_sensitivity: Option<u8>,
    /// Replay canonical loops and pad every track so all tracks end at the
    /// length of the longest one
    pub extend_tracks_to_highest: bool,
    /// Per-track failure handling
    pub error_policy: ErrorPolicy,
}

impl DecodeOptions {
    /// Options that abort on the first malformed track
    pub fn strict() -> Self {
        Self {
            error_policy: ErrorPolicy::FailFast,
            ..Self::default()
        }
    }

    /// Enable or disable track extension
    pub fn with_extend_tracks(mut self, extend: bool) -> Self {
        self.extend_tracks_to_highest = extend;
        self
    }

    /// Set the pitch-bend range emitted per channel
    pub fn with_pitch_bend_sensitivity(mut self, semitones: u8) -> Self {
        self.pitch_bend_sensitivity = Some(semitones);
        self
    }

    /// Check values that must fit MIDI data bytes
    pub fn validate(&self) -> Result<()> {
        match self.pitch_bend_sensitivity {
            Some(semitones) if semitones > MAX_DATA_BYTE => Err(GameMidiError::ConfigError(
                format!("pitch bend sensitivity {semitones} exceeds {MAX_DATA_BYTE}"),
            )),
            _ => Ok(()),
        }
    }
}

/// Options for SMF → game track encoding
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EncodeOptions {
    /// Give every track a canonical loop, placed at the CC 102/103 markers
    /// when present and around the whole track otherwise
    #[serde(rename = "loop")]
    pub loop_song: bool,
    /// Replace repeated byte runs with 0xFE back-references
    pub compress_repeats: bool,
}

impl EncodeOptions {
    /// Looping encode, as used for background music
    pub fn looping() -> Self {
        Self {
            loop_song: true,
            ..Self::default()
        }
    }
}

/// Combined configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Decode direction options
    pub decode: DecodeOptions,
    /// Encode direction options
    pub encode: EncodeOptions,
}

impl TranscodeConfig {
    /// Parse a JSON config string
    pub fn from_json(text: &str) -> Result<Self> {
        let config: TranscodeConfig = serde_json::from_str(text)?;
        config.decode.validate()?;
        Ok(config)
    }

    /// Load a JSON config file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        Self::from_json(&text)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DecodeOptions::default();
        assert_eq!(options.pitch_bend_sensitivity, None);
        assert!(!options.extend_tracks_to_highest);
        assert_eq!(options.error_policy, ErrorPolicy::BestEffort);
        assert!(!EncodeOptions::default().loop_song);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            TranscodeConfig::from_json(r#"{ "decode": { "extendTracksToHighest": true } }"#)
                .unwrap();
        assert!(config.decode.extend_tracks_to_highest);
        assert_eq!(config.decode.error_policy, ErrorPolicy::BestEffort);
        assert_eq!(config.encode, EncodeOptions::default());
    }

    #[test]
    fn test_field_names() {
        let config = TranscodeConfig::from_json(
            r#"{
                "decode": { "pitchBendSensitivity": 12, "errorPolicy": "fail-fast" },
                "encode": { "loop": true, "compressRepeats": true }
            }"#,
        )
        .unwrap();
        assert_eq!(config.decode.pitch_bend_sensitivity, Some(12));
        assert_eq!(config.decode.error_policy, ErrorPolicy::FailFast);
        assert!(config.encode.loop_song);
        assert!(config.encode.compress_repeats);
    }

    #[test]
    fn test_json_round_trip() {
        let config = TranscodeConfig {
            decode: DecodeOptions::strict()
                .with_extend_tracks(true)
                .with_pitch_bend_sensitivity(2),
            encode: EncodeOptions::looping(),
        };
        let text = config.to_json().unwrap();
        assert_eq!(TranscodeConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn test_rejects_out_of_range_pitch_bend() {
        let result = TranscodeConfig::from_json(r#"{ "decode": { "pitchBendSensitivity": 200 } }"#);
        assert!(matches!(result, Err(GameMidiError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = TranscodeConfig::from_json("{ decode: ");
        assert!(matches!(result, Err(GameMidiError::Json(_))));
    }
}
