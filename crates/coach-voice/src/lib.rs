//! Speech and audio arbitration for a real-time game companion.
//!
//! Two kinds of voice share one speaker and one microphone:
//!
//! - **reflex lines**: short pre-recorded reactions to game events, played
//!   on the reflex channel after a human-feeling delay;
//! - **generated speech**: text from an external language model,
//!   synthesized remotely and played on the agent-speech channel.
//!
//! The [`Orchestrator`] owns every component and is ticked once per game
//! frame. It never blocks: synthesis, transcription and capture run on tokio
//! tasks that post results into single-slot hand-offs.
//!
//! ```text
//!   game events ──▶ ReflexScheduler ───────────────┐
//!                                                  ├──▶ ChannelRegistry ──▶ speaker
//!   reply text ───▶ SpeechSynthesisPipeline ───────┘
//!   microphone ───▶ ListeningController ──▶ transcript ──▶ (conversation logic)
//!                         ▲
//!                         └── BusyStateAggregator gates listening and reflexes
//! ```
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod busy;
pub mod capture;
pub mod channel;
pub mod config;
pub mod elevenlabs;
pub mod error;
pub mod gate;
pub mod listening;
pub mod orchestrator;
pub mod playback;
pub mod provider;
pub mod reflex;
pub mod sounds;
pub mod synthesis;
pub mod triggers;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export key types for convenience
pub use busy::{BusySignal, BusyStateAggregator};
pub use channel::{AudioChannelProvider, ChannelId, ChannelRegistry};
pub use config::{CoachConfig, ElevenLabsConfig, duration_from_secs};
pub use error::{ProviderError, VoiceError};
pub use gate::{EchoGate, EchoGateWriter};
pub use listening::{ListenRejection, ListeningController, SessionOutcome};
pub use orchestrator::{Orchestrator, OrchestratorParts, TickReport};
pub use reflex::{PriorityTier, ReflexCategory, ReflexDecision, ReflexEvent, ReflexScheduler, ReflexState};
pub use sounds::{SoundBank, SoundHandle};
pub use synthesis::{SpeechDecision, SpeechOutcome, SpeechState, SpeechSynthesisPipeline};
pub use triggers::{CoachAction, DeathCause, GameEvent, GameSnapshot, GameWatcher};
