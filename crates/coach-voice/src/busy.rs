//! Busy-state aggregation.
//!
//! [`BusySignal`] is a snapshot recomputed from the components every time it
//! is needed. The aggregator itself only stores what cannot be derived:
//! the language-model flag set by the surrounding agent loop, and when the
//! agent last stopped speaking (for the listening cooldown).

use std::time::Instant;

use crate::channel::{ChannelId, ChannelRegistry};
use crate::listening::ListeningController;
use crate::reflex::ReflexScheduler;
use crate::synthesis::SpeechSynthesisPipeline;

/// Point-in-time view of everything that occupies the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusySignal {
    /// A synthesis request is fetching or waiting to play.
    pub generating: bool,
    pub agent_channel_busy: bool,
    pub reflex_channel_busy: bool,
    pub reflex_scheduled: bool,
    pub listening: bool,
    /// The external conversation logic is producing a reply.
    pub language_model_busy: bool,
    /// When the agent last went from speaking to silent.
    pub last_speech_end: Option<Instant>,
}

impl BusySignal {
    /// Generating speech, or either channel audible.
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.generating || self.agent_channel_busy || self.reflex_channel_busy
    }

    /// Whether a new reflex must be rejected outright.
    #[must_use]
    pub const fn blocks_reflex(&self) -> bool {
        self.generating || self.agent_channel_busy || self.language_model_busy
    }

    /// Whether the agent is doing anything at all. The game loop only
    /// prompts the player for voice input when this is false.
    #[must_use]
    pub const fn is_occupied(&self) -> bool {
        self.is_speaking() || self.reflex_scheduled || self.listening || self.language_model_busy
    }
}

/// Combines channel, pipeline, scheduler and session state into a [`BusySignal`].
#[derive(Debug, Default)]
pub struct BusyStateAggregator {
    language_model_busy: bool,
    was_speaking: bool,
    last_speech_end: Option<Instant>,
}

impl BusyStateAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the external language model as busy or idle.
    pub fn set_language_model_busy(&mut self, busy: bool) {
        if self.language_model_busy != busy {
            tracing::debug!(busy, "Language model busy flag changed");
        }
        self.language_model_busy = busy;
    }

    #[must_use]
    pub const fn language_model_busy(&self) -> bool {
        self.language_model_busy
    }

    /// Most recent observed end of speech.
    #[must_use]
    pub const fn last_speech_end(&self) -> Option<Instant> {
        self.last_speech_end
    }

    /// Recompute the signal from the live components.
    #[must_use]
    pub fn snapshot(
        &self,
        channels: &ChannelRegistry,
        reflex: &ReflexScheduler,
        speech: &SpeechSynthesisPipeline,
        listening: &ListeningController,
    ) -> BusySignal {
        BusySignal {
            generating: speech.is_generating(),
            agent_channel_busy: channels.is_busy(ChannelId::AgentSpeech),
            reflex_channel_busy: channels.is_busy(ChannelId::Reflex),
            reflex_scheduled: reflex.is_scheduled(),
            listening: listening.is_active(),
            language_model_busy: self.language_model_busy,
            last_speech_end: self.last_speech_end,
        }
    }

    /// Record a speaking→silent edge at `now`, returning the signal with the
    /// updated end-of-speech time.
    pub fn observe(&mut self, signal: BusySignal, now: Instant) -> BusySignal {
        let speaking = signal.is_speaking();
        if self.was_speaking && !speaking {
            tracing::debug!("Agent stopped speaking");
            self.last_speech_end = Some(now);
        }
        self.was_speaking = speaking;
        BusySignal {
            last_speech_end: self.last_speech_end,
            ..signal
        }
    }
}
