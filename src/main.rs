#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!(
        "The n64midi CLI requires the \"cli\" feature. Rebuild with `--features cli` to enable it."
    );
}

#[cfg(feature = "cli")]
mod cli {
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    use anyhow::{bail, Context, Result};
    use clap::{Parser, Subcommand, ValueEnum};
    use serde::Serialize;

    use n64midi::smf::{tempo_to_bpm, TrackEvent};
    use n64midi::{
        DecodeReport, EncodeOptions, GameMidiDecoder, GameMidiEncoder, SequenceFormat,
        SequenceLoader, TranscodeConfig,
    };

    #[derive(Parser)]
    #[command(name = "n64midi")]
    #[command(about = "Convert N64 game sequences to MIDI and back")]
    #[command(version)]
    struct Cli {
        #[command(subcommand)]
        command: Commands,
    }

    #[derive(Subcommand)]
    enum Commands {
        /// Decode a game sequence into a Standard MIDI File
        Decode {
            /// Game sequence or ROM image
            input: PathBuf,

            /// Output .mid file
            output: PathBuf,

            /// Start of the sequence inside the input (decimal or 0x hex)
            #[arg(long, value_parser = parse_number, default_value = "0")]
            offset: usize,

            /// Sequence length in bytes (default: rest of the file)
            #[arg(long, value_parser = parse_number)]
            length: Option<usize>,

            /// Pad all tracks to the longest one by replaying loops
            #[arg(long)]
            extend: bool,

            /// Pitch-bend range in semitones to announce on every channel
            #[arg(long)]
            pitch_bend: Option<u8>,

            /// Stop at the first malformed track
            #[arg(long)]
            strict: bool,

            /// JSON config file
            #[arg(short, long)]
            config: Option<PathBuf>,
        },

        /// Encode a Standard MIDI File into a game sequence
        Encode {
            /// Input .mid file
            input: PathBuf,

            /// Output game sequence
            output: PathBuf,

            /// Loop the song (CC 102/103 mark the loop, whole song otherwise)
            #[arg(long = "loop")]
            loop_song: bool,

            /// Compress repeated byte runs
            #[arg(long)]
            compress: bool,

            /// JSON config file
            #[arg(short, long)]
            config: Option<PathBuf>,
        },

        /// Print the decoded events of a game sequence
        Dump {
            /// Game sequence or ROM image
            input: PathBuf,

            /// Start of the sequence inside the input (decimal or 0x hex)
            #[arg(long, value_parser = parse_number, default_value = "0")]
            offset: usize,

            /// Output format
            #[arg(long, value_enum, default_value_t = DumpFormat::Text)]
            format: DumpFormat,
        },
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
    enum DumpFormat {
        Text,
        Csv,
        Json,
    }

    #[derive(Serialize)]
    struct DumpRow<'a> {
        slot: usize,
        tick: u32,
        delta: u32,
        status: String,
        data: String,
        duration: u32,
        obsolete: bool,
        #[serde(skip)]
        event: &'a TrackEvent,
    }

    fn parse_number(value: &str) -> Result<usize, String> {
        let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
            Some(hex) => usize::from_str_radix(hex, 16),
            None => value.parse(),
        };
        parsed.map_err(|e| format!("invalid number '{value}': {e}"))
    }

    fn load_config(path: Option<&Path>) -> Result<TranscodeConfig> {
        match path {
            Some(path) => TranscodeConfig::load(path)
                .with_context(|| format!("loading config {}", path.display())),
            None => Ok(TranscodeConfig::default()),
        }
    }

    fn hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn rows(report: &DecodeReport) -> Vec<DumpRow<'_>> {
        report
            .tracks
            .iter()
            .flat_map(|track| {
                track.events.iter().map(move |event| DumpRow {
                    slot: track.slot,
                    tick: event.absolute_time,
                    delta: event.delta_time,
                    status: format!("{:02X}", event.event_type),
                    data: hex(&event.contents),
                    duration: event.duration_time,
                    obsolete: event.obsolete_event,
                    event,
                })
            })
            .collect()
    }

    fn decode_sequence(
        input: &Path,
        offset: usize,
        length: Option<usize>,
        config: &TranscodeConfig,
    ) -> Result<DecodeReport> {
        let data = SequenceLoader::load(input, offset, length)?;
        if SequenceLoader::detect_format(&data) != SequenceFormat::GameTracks {
            tracing::warn!(
                "{} at {:#x} does not look like a game sequence, decoding anyway",
                input.display(),
                offset
            );
        }

        let decoder = GameMidiDecoder::new(config.decode.clone());
        let report = decoder
            .decode(&data, data.len())
            .with_context(|| format!("decoding {}", input.display()))?;
        if !report.track_errors.is_empty() {
            tracing::warn!(
                "{} of {} tracks were cut short",
                report.track_errors.len(),
                report.tracks.len()
            );
        }
        Ok(report)
    }

    fn print_text(report: &DecodeReport) {
        println!(
            "{} tracks, division {}, longest track {} ticks",
            report.tracks.len(),
            report.division,
            report.highest_track_length
        );
        for track in &report.tracks {
            println!();
            println!(
                "Track slot {} ({} events, ends at {})",
                track.slot,
                track.events.len(),
                track.end_time
            );
            if let (Some(start), Some(end)) = (track.loop_start, track.loop_end) {
                println!("  loop {start}..{end}");
            }
            if let Some(instrument) = track.max_instrument {
                println!("  highest instrument {instrument}");
            }
        }
        for row in rows(report) {
            let mut line = format!(
                "{:>2} {:>8} {:>6}  {} {}",
                row.slot, row.tick, row.delta, row.status, row.data
            );
            if row.duration > 0 {
                line.push_str(&format!("  dur {}", row.duration));
            }
            if let Some(tempo) = row.event.tempo() {
                line.push_str(&format!("  {:.2} bpm", tempo_to_bpm(tempo)));
            }
            if row.obsolete {
                line.push_str("  (obsolete)");
            }
            println!("{line}");
        }
    }

    fn dump(input: &Path, offset: usize, format: DumpFormat) -> Result<()> {
        let report = decode_sequence(input, offset, None, &TranscodeConfig::default())?;
        match format {
            DumpFormat::Text => print_text(&report),
            DumpFormat::Csv => {
                let mut writer = csv::Writer::from_writer(io::stdout());
                for row in rows(&report) {
                    writer.serialize(row)?;
                }
                writer.flush()?;
            }
            DumpFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report.tracks)?);
            }
        }
        Ok(())
    }

    pub fn run() -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(io::stderr)
            .init();

        let cli = Cli::parse();
        match cli.command {
            Commands::Decode {
                input,
                output,
                offset,
                length,
                extend,
                pitch_bend,
                strict,
                config,
            } => {
                let mut config = load_config(config.as_deref())?;
                config.decode.extend_tracks_to_highest |= extend;
                if let Some(semitones) = pitch_bend {
                    config.decode.pitch_bend_sensitivity = Some(semitones);
                }
                if strict {
                    config.decode.error_policy = n64midi::ErrorPolicy::FailFast;
                }

                let report = decode_sequence(&input, offset, length, &config)?;
                fs::write(&output, &report.smf)
                    .with_context(|| format!("writing {}", output.display()))?;
                tracing::info!(
                    "wrote {} ({} tracks, {} bytes)",
                    output.display(),
                    report.tracks.len(),
                    report.smf.len()
                );
            }
            Commands::Encode {
                input,
                output,
                loop_song,
                compress,
                config,
            } => {
                let config = load_config(config.as_deref())?;
                let options = EncodeOptions {
                    loop_song: config.encode.loop_song || loop_song,
                    compress_repeats: config.encode.compress_repeats || compress,
                };

                let data = n64midi::loader::load_file(&input)?;
                if SequenceLoader::detect_format(&data) != SequenceFormat::StandardMidi {
                    bail!("{} is not a Standard MIDI File", input.display());
                }
                let game = match GameMidiEncoder::new(options).encode(&data) {
                    Ok(game) => game,
                    Err(e) => bail!("could not process MIDI for insertion into the game: {e}"),
                };
                fs::write(&output, &game)
                    .with_context(|| format!("writing {}", output.display()))?;
                tracing::info!("wrote {} ({} bytes)", output.display(), game.len());
            }
            Commands::Dump {
                input,
                offset,
                format,
            } => dump(&input, offset, format)?,
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_number() {
            assert_eq!(parse_number("1234"), Ok(1234));
            assert_eq!(parse_number("0x1F40"), Ok(0x1F40));
            assert_eq!(parse_number("0XFF"), Ok(0xFF));
            assert!(parse_number("0xZZ").is_err());
            assert!(parse_number("-1").is_err());
        }

        #[test]
        fn test_cli_arguments() {
            let cli = Cli::try_parse_from([
                "n64midi", "decode", "rom.z64", "out.mid", "--offset", "0x1A2B", "--extend",
            ])
            .unwrap();
            match cli.command {
                Commands::Decode { offset, extend, strict, .. } => {
                    assert_eq!(offset, 0x1A2B);
                    assert!(extend);
                    assert!(!strict);
                }
                _ => panic!("expected decode"),
            }

            let cli = Cli::try_parse_from(["n64midi", "dump", "seq.bin", "--format", "csv"]).unwrap();
            assert!(matches!(cli.command, Commands::Dump { format: DumpFormat::Csv, .. }));
        }
    }
}

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
