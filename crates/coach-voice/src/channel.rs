//! Channel registry: the two exclusive playback resources.
//!
//! The companion owns exactly two logical playback channels: one for scripted
//! reflex lines and one for generated agent speech. Both are reserved at
//! startup so no unrelated sound effect can occupy them, and each holds at
//! most one occupant at a time: playing a new sound replaces the old one.

use crate::error::VoiceError;
use crate::sounds::SoundHandle;

/// Identity of a reserved playback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// Scripted, pre-recorded reflex voice lines.
    Reflex,
    /// Dynamically generated (language-model) speech.
    AgentSpeech,
}

impl ChannelId {
    /// Every channel, in reservation order.
    pub const ALL: [Self; 2] = [Self::Reflex, Self::AgentSpeech];

    const fn index(self) -> usize {
        match self {
            Self::Reflex => 0,
            Self::AgentSpeech => 1,
        }
    }
}

// ── Provider boundary ──────────────────────────────────────────────

/// Abstraction over the mixer/hardware that actually renders the channels.
///
/// # Implementations
/// - [`SpeakerChannels`](crate::playback::SpeakerChannels): rodio sinks on
///   the default output device
/// - `VirtualChannels` (feature `test-utils`): in-memory, driven by tests
#[cfg_attr(test, mockall::automock)]
pub trait AudioChannelProvider: Send {
    /// Claim `channel` for exclusive use. Called once per channel at startup.
    fn reserve(&mut self, channel: ChannelId) -> Result<(), VoiceError>;

    /// Start `sound` on `channel`, replacing whatever was playing there.
    fn play(&mut self, channel: ChannelId, sound: &SoundHandle) -> Result<(), VoiceError>;

    /// Silence `channel` immediately.
    fn stop(&mut self, channel: ChannelId);

    /// Whether `channel` is currently audible.
    fn is_busy(&self, channel: ChannelId) -> bool;
}

// ── Registry ───────────────────────────────────────────────────────

#[derive(Debug)]
struct Channel {
    id: ChannelId,
    occupant: Option<SoundHandle>,
}

/// Owner of both playback channels; the only component that touches the
/// audio provider.
pub struct ChannelRegistry {
    provider: Box<dyn AudioChannelProvider>,
    channels: [Channel; 2],
}

impl ChannelRegistry {
    /// Reserve both channels on `provider`.
    pub fn new(mut provider: Box<dyn AudioChannelProvider>) -> Result<Self, VoiceError> {
        for id in ChannelId::ALL {
            provider.reserve(id)?;
            tracing::debug!(channel = ?id, "Reserved playback channel");
        }
        Ok(Self {
            provider,
            channels: ChannelId::ALL.map(|id| Channel { id, occupant: None }),
        })
    }

    /// Play `sound` on `channel`, replacing the current occupant.
    ///
    /// A missing sound is a no-op. Provider failures (undecodable payload,
    /// dead output device) are logged and leave the channel idle.
    /// Returns whether playback started.
    pub fn play(&mut self, channel: ChannelId, sound: Option<&SoundHandle>) -> bool {
        let Some(sound) = sound else {
            tracing::debug!(channel = ?channel, "No sound to play");
            return false;
        };

        let slot = &mut self.channels[channel.index()];
        match self.provider.play(channel, sound) {
            Ok(()) => {
                tracing::info!(channel = ?slot.id, sound = sound.label(), "Playing");
                slot.occupant = Some(sound.clone());
                true
            }
            Err(e) => {
                tracing::warn!(channel = ?slot.id, sound = sound.label(), error = %e, "Playback failed");
                slot.occupant = None;
                false
            }
        }
    }

    /// Silence `channel` and clear its occupant.
    pub fn stop(&mut self, channel: ChannelId) {
        self.provider.stop(channel);
        self.channels[channel.index()].occupant = None;
    }

    /// Poll the provider for `channel`'s playback status.
    #[must_use]
    pub fn is_busy(&self, channel: ChannelId) -> bool {
        self.provider.is_busy(channel)
    }

    /// The sound currently audible on `channel`, if any.
    #[must_use]
    pub fn occupant(&self, channel: ChannelId) -> Option<&SoundHandle> {
        if self.is_busy(channel) {
            self.channels[channel.index()].occupant.as_ref()
        } else {
            None
        }
    }
}
