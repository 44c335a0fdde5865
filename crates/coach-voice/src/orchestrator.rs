//! Orchestrator: the one owned aggregate the game loop talks to.
//!
//! Call [`Orchestrator::tick`] once per frame. A tick:
//! 1. recomputes the busy signal (recording any end-of-speech edge);
//! 2. advances the reflex scheduler (fire a due reflex or drop it);
//! 3. drains the synthesis result slot and plays ready audio;
//! 4. drains the listening outcome slot;
//! 5. republishes the speaking state to the microphone echo gate.
//!
//! Nothing in a tick waits on I/O. Events raised before the tick are
//! arbitrated in the order they were raised, so a loss raised after a
//! high score in the same frame preempts it before either plays.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;

use crate::busy::{BusySignal, BusyStateAggregator};
use crate::channel::{AudioChannelProvider, ChannelId, ChannelRegistry};
use crate::config::CoachConfig;
use crate::error::VoiceError;
use crate::gate::{EchoGate, EchoGateWriter};
use crate::listening::{ListenRejection, ListeningController, SessionOutcome};
use crate::provider::{Microphone, SpeechSynthesizer, SpeechTranscriber, TranscriptionOptions, VoiceSelection};
use crate::reflex::{ReflexCategory, ReflexDecision, ReflexEvent, ReflexScheduler, ReflexState};
use crate::sounds::SoundBank;
use crate::synthesis::{SpeechDecision, SpeechOutcome, SpeechState, SpeechSynthesisPipeline};
use crate::triggers::{CoachAction, GameEvent, GameSnapshot, GameWatcher};

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reflex_played: Option<ReflexCategory>,
    pub speech: Option<SpeechOutcome>,
    pub listening: Option<SessionOutcome>,
}

impl TickReport {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.reflex_played.is_none() && self.speech.is_none() && self.listening.is_none()
    }
}

/// Hardware and provider collaborators the orchestrator is built from.
pub struct OrchestratorParts {
    pub channels: Box<dyn AudioChannelProvider>,
    pub sounds: SoundBank,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub transcriber: Arc<dyn SpeechTranscriber>,
    pub microphone: Arc<dyn Microphone>,
    /// Fixed RNG seed for reflex delays and sound picks.
    pub reflex_seed: Option<u64>,
}

/// Owns every arbitration component. Single-threaded: lives on the game
/// loop's thread; background work reaches it only through result slots.
pub struct Orchestrator {
    channels: ChannelRegistry,
    reflex: ReflexScheduler,
    speech: SpeechSynthesisPipeline,
    listening: ListeningController,
    busy: BusyStateAggregator,
    echo: EchoGateWriter,
    default_listen: Duration,
}

impl Orchestrator {
    /// Wire the components. Background work is spawned on `runtime`.
    pub fn build(
        config: &CoachConfig,
        parts: OrchestratorParts,
        echo: EchoGateWriter,
        runtime: &Handle,
    ) -> Result<Self, VoiceError> {
        let channels = ChannelRegistry::new(parts.channels)?;

        let reflex = match parts.reflex_seed {
            Some(seed) => ReflexScheduler::with_seed(parts.sounds, &config.reflex, seed),
            None => ReflexScheduler::new(parts.sounds, &config.reflex),
        };

        let voice = VoiceSelection {
            voice_id: config.elevenlabs.voice_id().to_string(),
            model_id: config.elevenlabs.tts_model().to_string(),
        };
        let speech = SpeechSynthesisPipeline::new(parts.synthesizer, voice, config.speech, runtime.clone());

        let options = TranscriptionOptions {
            model_id: config.elevenlabs.stt_model().to_string(),
            language_hint: Some(config.elevenlabs.language().to_string()),
        };
        let listening = ListeningController::new(
            parts.microphone,
            parts.transcriber,
            options,
            config.listening.cooldown,
            runtime.clone(),
        );

        Ok(Self {
            channels,
            reflex,
            speech,
            listening,
            busy: BusyStateAggregator::new(),
            echo,
            default_listen: config.listening.default_duration,
        })
    }

    /// Advance every component by one frame. Never blocks.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let before = self.signal(now);

        let reflex_played = self.reflex.tick(now, &mut self.channels, before.agent_channel_busy);
        let speech = self.speech.poll(now, &mut self.channels);
        let listening = self.listening.poll();

        let after = self.signal(now);
        self.echo.set_speaking(after.is_speaking());

        TickReport {
            reflex_played,
            speech,
            listening,
        }
    }

    // ── Reflexes ───────────────────────────────────────────────────

    /// Raise a reflex for `category`, picking a sound from its pool.
    pub fn raise(&mut self, category: ReflexCategory, now: Instant) -> ReflexDecision {
        let signal = self.signal(now);
        self.reflex.accept_category(category, &signal, now)
    }

    /// Offer a fully resolved reflex event.
    pub fn accept_event(&mut self, event: ReflexEvent, now: Instant) -> ReflexDecision {
        let signal = self.signal(now);
        self.reflex.accept_event(event, &signal, now)
    }

    #[must_use]
    pub const fn reflex_state(&self) -> ReflexState {
        self.reflex.state()
    }

    #[must_use]
    pub const fn is_reflex_scheduled(&self) -> bool {
        self.reflex.is_scheduled()
    }

    #[must_use]
    pub const fn sounds(&self) -> &SoundBank {
        self.reflex.bank()
    }

    // ── Generated speech ───────────────────────────────────────────

    /// Synthesize and speak `text`, interrupting any listening session first.
    pub fn request_speech(&mut self, text: &str, now: Instant) -> SpeechDecision {
        self.speech.request_speech(text, &mut self.listening, now)
    }

    /// Forget in-flight speech (e.g. the round restarted).
    pub fn abandon_speech(&mut self) -> bool {
        self.speech.abandon()
    }

    #[must_use]
    pub fn speech_state(&self) -> SpeechState {
        self.speech.state()
    }

    // ── Listening ──────────────────────────────────────────────────

    /// Open the microphone for `duration`.
    pub fn start_listening(&mut self, duration: Duration, now: Instant) -> Result<(), ListenRejection> {
        let signal = self.signal(now);
        self.listening.start_listening(duration, &signal, now)
    }

    /// Open the microphone for the configured default duration.
    pub fn start_listening_default(&mut self, now: Instant) -> Result<(), ListenRejection> {
        self.start_listening(self.default_listen, now)
    }

    pub fn interrupt_listening(&mut self) -> bool {
        self.listening.interrupt()
    }

    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening.is_active()
    }

    /// Take the latest player transcript.
    pub fn take_transcript(&mut self) -> Option<String> {
        self.listening.take_transcript()
    }

    // ── Busy state ─────────────────────────────────────────────────

    /// Current busy signal, recomputed now.
    pub fn busy_signal(&mut self, now: Instant) -> BusySignal {
        self.signal(now)
    }

    /// Generating speech or either channel audible.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.snapshot().is_speaking()
    }

    /// Anything at all in progress; the game should not prompt the player.
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.snapshot().is_occupied()
    }

    /// Mark the external language model busy; reflexes are held off meanwhile.
    pub fn set_language_model_busy(&mut self, busy: bool) {
        self.busy.set_language_model_busy(busy);
    }

    /// A reader for the microphone echo gate this orchestrator drives.
    #[must_use]
    pub fn echo_gate(&self) -> EchoGate {
        self.echo.reader()
    }

    // ── Game integration ───────────────────────────────────────────

    /// Feed one frame of game state through `watcher` and attempt the
    /// resulting actions. Returns the actions that were accepted.
    ///
    /// Listening is skipped when a reflex raised earlier in the same frame
    /// is now pending.
    pub fn follow_game(
        &mut self,
        watcher: &mut GameWatcher,
        snapshot: &GameSnapshot,
        events: &[GameEvent],
        now: Instant,
    ) -> Vec<CoachAction> {
        let signal = self.signal(now);
        let mut accepted = Vec::new();
        for action in watcher.observe(snapshot, events, &signal) {
            let taken = match action {
                CoachAction::Reflex(category) => self.raise(category, now).is_accepted(),
                CoachAction::Listen(_) if self.signal(now).is_occupied() => false,
                CoachAction::Listen(duration) => {
                    let started = self.start_listening(duration, now).is_ok();
                    if started {
                        watcher.mark_listened(snapshot.loss_count);
                    }
                    started
                }
            };
            if taken {
                accepted.push(action);
            }
        }
        accepted
    }

    /// Silence everything: stop both channels, interrupt listening, abandon speech.
    pub fn shutdown(&mut self) {
        self.listening.interrupt();
        self.speech.abandon();
        for channel in ChannelId::ALL {
            self.channels.stop(channel);
        }
        self.echo.set_speaking(false);
        tracing::info!("Voice orchestrator stopped");
    }

    fn snapshot(&self) -> BusySignal {
        self.busy
            .snapshot(&self.channels, &self.reflex, &self.speech, &self.listening)
    }

    fn signal(&mut self, now: Instant) -> BusySignal {
        let snapshot = self.snapshot();
        self.busy.observe(snapshot, now)
    }
}
