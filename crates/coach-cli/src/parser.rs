//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Console driver for the game companion's voice.
///
/// `run` simulates a game from typed commands and drives the voice
/// subsystem against the real speaker, microphone and speech provider.
#[derive(Parser)]
#[command(name = "coach")]
#[command(about = "Drive the game companion voice from a console")]
#[command(version)]
pub struct Cli {
    /// Directory holding the reflex voice lines
    #[arg(long = "assets-dir", global = true, env = "COACH_ASSETS_DIR")]
    pub assets_dir: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Simulate a game session from console commands
    Run {
        /// Seed reflex delays and sound picks for a reproducible session
        #[arg(long)]
        seed: Option<u64>,

        /// Introduce the companion at the first loss instead of waiting
        #[arg(long)]
        eager: bool,
    },
    /// Show which reflex voice lines were found
    Assets,
    /// List audio input devices
    Devices,
    /// Show how many ElevenLabs characters are left
    Credits,
}
