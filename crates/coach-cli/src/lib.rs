//! Console driver for the game companion voice subsystem.
//!
//! `coach run` stands a simulated game in for the real one so the reflex,
//! speech and listening arbitration can be exercised against real audio
//! devices and the remote speech provider.
#![deny(unsafe_code)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

// Used by the binary only
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod console;
pub mod handlers;
pub mod parser;

pub use bootstrap::{CliConfig, CoachContext, bootstrap, elevenlabs_client};
pub use console::{ConsoleCommand, ConsoleError, SimulatedGame};
pub use parser::{Cli, Commands};
