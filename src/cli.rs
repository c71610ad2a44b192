use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use varispeed::analysis::AnalysisKind;

#[derive(Parser, Debug)]
#[command(name = "varispeed", about = "Variable-speed audio player and analyzer")]
pub struct Cli {
    /// Config file (defaults to varispeed.toml or the global config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect onsets, pitch and tempo and print them as JSON
    Analyze {
        /// Input audio file (WAV, MP3, FLAC, OGG)
        input: PathBuf,

        /// Which analysis to run
        #[arg(short, long, value_enum, default_value_t = KindArg::All)]
        kind: KindArg,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },

    /// Play a file through the engine and record the output to WAV
    Bounce {
        /// Input audio file (WAV, MP3, FLAC, OGG)
        input: PathBuf,

        /// Output WAV file
        #[arg(short, long, default_value = "bounce.wav")]
        output: PathBuf,

        /// Playback speed (0.25-4.0)
        #[arg(long)]
        speed: Option<f64>,

        /// Output volume (0.0-2.0)
        #[arg(long)]
        volume: Option<f64>,

        /// Start position in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// Loop start in seconds (requires --loop-end)
        #[arg(long, requires = "loop_end")]
        loop_start: Option<f64>,

        /// Loop end in seconds
        #[arg(long, requires = "loop_start")]
        loop_end: Option<f64>,

        /// Stop recording after this many seconds (required when looping)
        #[arg(long)]
        seconds: Option<f64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Onset,
    Pitch,
    Tempo,
    All,
}

impl KindArg {
    pub fn kinds(self) -> Vec<AnalysisKind> {
        match self {
            KindArg::Onset => vec![AnalysisKind::Onset],
            KindArg::Pitch => vec![AnalysisKind::Pitch],
            KindArg::Tempo => vec![AnalysisKind::Tempo],
            // onsets come back with the tempo estimate
            KindArg::All => vec![AnalysisKind::Tempo, AnalysisKind::Pitch],
        }
    }
}
