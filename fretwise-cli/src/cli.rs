//! Command-line definitions for the `fretwise` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fretwise - guitar tuner and chord verification from the terminal
#[derive(Parser, Debug)]
#[command(name = "fretwise")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print engine events as JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Tune live from the default microphone
    ///
    /// Type commands on stdin while running: `v [label]` starts a chord
    /// verification, `l <label>` delivers a vision label, `c` closes the
    /// session, `p <preset>` switches preset, `s <string>|auto` pins a string,
    /// `r` resumes tuning, `q` quits.
    #[command(name = "tune")]
    Tune {
        /// Tuning preset to start with
        #[arg(short, long)]
        preset: Option<String>,

        /// Pin a target string, e.g. D3
        #[arg(short, long)]
        string: Option<String>,
    },

    /// Run one chord verification session and exit
    #[command(name = "verify")]
    Verify {
        /// Label reported by the vision classifier
        #[arg(short, long)]
        label: Option<String>,

        /// Read the take from a WAV file instead of the microphone
        #[arg(long)]
        clip: Option<PathBuf>,
    },

    /// Infer the chord played in a WAV file
    #[command(name = "analyze")]
    Analyze {
        /// WAV file to analyze
        path: PathBuf,
    },

    /// List available tuning presets
    #[command(name = "presets")]
    Presets,

    /// Write the effective configuration to a file
    #[command(name = "write-config")]
    WriteConfig {
        /// Destination path
        path: PathBuf,
    },
}
