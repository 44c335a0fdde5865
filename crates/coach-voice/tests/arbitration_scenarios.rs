//! End-to-end arbitration scenarios driven through the [`Orchestrator`].
//!
//! Everything runs against in-memory doubles: a virtual mixer whose
//! channels stay busy until the test finishes them, scripted synthesis and
//! transcription, and a microphone that "records" on tokio time. The game
//! clock is a plain `Instant` advanced by hand, so reaction delays and the
//! listening cooldown are deterministic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use coach_voice::reflex::DropReason;
use coach_voice::testing::{ScriptedMicrophone, ScriptedSynthesizer, ScriptedTranscriber, VirtualChannels};
use coach_voice::{
    ChannelId, CoachAction, CoachConfig, DeathCause, EchoGate, GameEvent, GameSnapshot, GameWatcher, ListenRejection,
    Orchestrator, OrchestratorParts, ProviderError, ReflexCategory, ReflexDecision, ReflexState, SessionOutcome,
    SoundBank, SoundHandle, SpeechDecision, SpeechOutcome, SpeechState, TickReport,
};

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    coach: Orchestrator,
    mixer: VirtualChannels,
    synth: Arc<ScriptedSynthesizer>,
    stt: Arc<ScriptedTranscriber>,
    mic: Arc<ScriptedMicrophone>,
    gate: EchoGate,
    clock: Instant,
}

fn bank() -> SoundBank {
    SoundBank::from_pools(ReflexCategory::ALL.map(|category| {
        let name = category.file_names().remove(0);
        (category, vec![SoundHandle::from_bytes(name, vec![0u8; 16])])
    }))
}

fn harness_with(synth: ScriptedSynthesizer) -> Harness {
    let mixer = VirtualChannels::new();
    let synth = Arc::new(synth);
    let stt = Arc::new(ScriptedTranscriber::default());
    let mic = Arc::new(ScriptedMicrophone::new());
    let (gate, writer) = EchoGate::new();

    let parts = OrchestratorParts {
        channels: Box::new(mixer.clone()),
        sounds: bank(),
        synthesizer: synth.clone(),
        transcriber: stt.clone(),
        microphone: mic.clone(),
        reflex_seed: Some(7),
    };
    let coach = Orchestrator::build(&CoachConfig::default(), parts, writer, &tokio::runtime::Handle::current())
        .expect("virtual channels always reserve");

    Harness {
        coach,
        mixer,
        synth,
        stt,
        mic,
        gate,
        clock: Instant::now(),
    }
}

fn harness() -> Harness {
    harness_with(ScriptedSynthesizer::new())
}

impl Harness {
    fn advance(&mut self, by: Duration) -> TickReport {
        self.clock += by;
        self.coach.tick(self.clock)
    }

    /// Tick (without moving the game clock) until `done` accepts a report,
    /// letting background tasks run in between.
    async fn settle(&mut self, mut done: impl FnMut(&TickReport) -> bool) -> TickReport {
        for _ in 0..400 {
            let report = self.coach.tick(self.clock);
            if done(&report) {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scenario never settled");
    }

    /// Play one reflex to completion-in-progress (channel busy afterwards).
    fn play_reflex(&mut self, category: ReflexCategory) {
        assert!(self.coach.raise(category, self.clock).is_accepted());
        let report = self.advance(Duration::from_millis(500));
        assert_eq!(report.reflex_played, Some(category));
    }
}

const HALF_WINDOW: Duration = Duration::from_millis(100);
const FULL_WINDOW: Duration = Duration::from_millis(500);

// ── Reflex scheduling ──────────────────────────────────────────────

#[tokio::test]
async fn ground_loss_plays_once_after_reaction_delay() {
    let mut h = harness();

    let decision = h.coach.raise(ReflexCategory::GroundLoss, h.clock);
    assert!(matches!(decision, ReflexDecision::Scheduled { .. }));
    assert_eq!(h.coach.reflex_state(), ReflexState::Scheduled);

    let early = h.advance(HALF_WINDOW);
    assert_eq!(early.reflex_played, None, "never fires before the 200 ms floor");
    assert!(h.mixer.plays().is_empty());

    let fired = h.advance(FULL_WINDOW);
    assert_eq!(fired.reflex_played, Some(ReflexCategory::GroundLoss));
    assert_eq!(h.coach.reflex_state(), ReflexState::Playing);
    assert!(h.coach.is_speaking());

    h.mixer.finish(ChannelId::Reflex);
    h.advance(HALF_WINDOW);
    assert_eq!(h.coach.reflex_state(), ReflexState::Idle);
    assert!(!h.coach.is_speaking());
    assert_eq!(h.mixer.plays_on(ChannelId::Reflex), vec!["ground_loss_1.mp3"]);
}

#[tokio::test]
async fn critical_preempts_scheduled_normal() {
    let mut h = harness();

    assert!(h.coach.raise(ReflexCategory::HighScore, h.clock).is_accepted());
    let decision = h.coach.raise(ReflexCategory::PipeLoss, h.clock);
    assert!(matches!(
        decision,
        ReflexDecision::Preempted {
            replaced: ReflexCategory::HighScore,
            ..
        }
    ));

    assert_eq!(h.advance(FULL_WINDOW).reflex_played, Some(ReflexCategory::PipeLoss));
    h.mixer.finish(ChannelId::Reflex);
    for _ in 0..10 {
        h.advance(FULL_WINDOW);
    }
    assert_eq!(h.mixer.plays_on(ChannelId::Reflex), vec!["pipe_loss_1.mp3"]);
}

#[tokio::test]
async fn back_to_back_criticals_play_exactly_once() {
    let mut h = harness();

    h.coach.raise(ReflexCategory::GroundLoss, h.clock);
    h.advance(HALF_WINDOW);
    let second = h.coach.raise(ReflexCategory::PipeLoss, h.clock);
    assert!(matches!(second, ReflexDecision::Preempted { .. }));

    for _ in 0..4 {
        h.advance(HALF_WINDOW * 2);
    }
    h.mixer.finish(ChannelId::Reflex);
    for _ in 0..4 {
        h.advance(HALF_WINDOW * 2);
    }

    assert_eq!(h.mixer.plays_on(ChannelId::Reflex), vec!["pipe_loss_1.mp3"]);
}

#[tokio::test]
async fn normal_never_displaces_pending_critical() {
    let mut h = harness();

    h.coach.raise(ReflexCategory::PipeLoss, h.clock);
    let win = h.coach.raise(ReflexCategory::Win, h.clock);
    assert_eq!(win, ReflexDecision::Dropped(DropReason::AlreadyPending));
}

#[tokio::test]
async fn events_during_reflex_playback_are_dropped() {
    let mut h = harness();
    h.play_reflex(ReflexCategory::Intro);

    let decision = h.coach.raise(ReflexCategory::Win, h.clock);
    assert_eq!(decision, ReflexDecision::Dropped(DropReason::ChannelBusy));
    assert_eq!(h.coach.reflex_state(), ReflexState::Playing);
}

#[tokio::test]
async fn generated_speech_rejects_reflexes() {
    let (synth, _release) = ScriptedSynthesizer::new().gated();
    let mut h = harness_with(synth);

    assert_eq!(h.coach.request_speech("nice run", h.clock), SpeechDecision::Started);
    let decision = h.coach.raise(ReflexCategory::PipeLoss, h.clock);
    assert_eq!(decision, ReflexDecision::Dropped(DropReason::AgentBusy));
    assert!(!h.coach.is_reflex_scheduled());
}

#[tokio::test]
async fn busy_language_model_holds_off_reflexes() {
    let mut h = harness();
    h.coach.set_language_model_busy(true);
    assert_eq!(
        h.coach.raise(ReflexCategory::GroundLoss, h.clock),
        ReflexDecision::Dropped(DropReason::AgentBusy)
    );

    h.coach.set_language_model_busy(false);
    assert!(h.coach.raise(ReflexCategory::GroundLoss, h.clock).is_accepted());
    assert!(h.coach.is_reflex_scheduled());
}

// ── Generated speech ───────────────────────────────────────────────

#[tokio::test]
async fn is_speaking_covers_generation_and_playback() {
    let (synth, release) = ScriptedSynthesizer::new().gated();
    let mut h = harness_with(synth);
    assert!(!h.coach.is_speaking());

    h.coach.request_speech("you got this", h.clock);
    assert!(h.coach.is_speaking(), "fetching counts as speaking");
    assert_eq!(h.coach.speech_state(), SpeechState::Fetching);

    release.notify_one();
    let report = h.settle(|r| r.speech.is_some()).await;
    assert_eq!(
        report.speech,
        Some(SpeechOutcome::Spoken {
            text: "you got this".into()
        })
    );
    assert!(h.coach.is_speaking(), "agent channel busy");
    assert!(h.gate.is_speaking(), "echo gate follows playback");

    h.mixer.finish(ChannelId::AgentSpeech);
    h.advance(HALF_WINDOW);
    assert!(!h.coach.is_speaking());
    assert!(!h.gate.is_speaking());
    assert_eq!(h.synth.requests(), vec!["you got this".to_string()]);
}

#[tokio::test]
async fn failed_synthesis_leaves_agent_silent_and_free() {
    let mut h = harness_with(ScriptedSynthesizer::new().with_response(Err(ProviderError::Auth("bad key".into()))));

    h.coach.request_speech("hello", h.clock);
    let report = h.settle(|r| r.speech.is_some()).await;

    assert!(matches!(report.speech, Some(SpeechOutcome::Failed { .. })));
    assert!(!h.coach.is_speaking());
    assert!(h.mixer.plays_on(ChannelId::AgentSpeech).is_empty());
    assert!(h.coach.raise(ReflexCategory::Win, h.clock).is_accepted());
}

#[tokio::test]
async fn abandoned_speech_is_never_played() {
    let (synth, release) = ScriptedSynthesizer::new().gated();
    let mut h = harness_with(synth);

    h.coach.request_speech("about that last round", h.clock);
    assert!(h.coach.abandon_speech());
    release.notify_one();

    for _ in 0..20 {
        let report = h.advance(HALF_WINDOW);
        assert!(report.speech.is_none());
        tokio::task::yield_now().await;
    }
    assert!(h.mixer.plays_on(ChannelId::AgentSpeech).is_empty());
    assert_eq!(h.coach.request_speech("fresh start", h.clock), SpeechDecision::Started);
}

#[tokio::test]
async fn speech_waits_for_reflex_to_finish() {
    let mut h = harness();
    h.play_reflex(ReflexCategory::GroundLoss);

    h.coach.request_speech("ouch", h.clock);
    for _ in 0..20 {
        assert!(h.advance(Duration::ZERO).speech.is_none());
        tokio::task::yield_now().await;
    }
    assert_eq!(h.coach.speech_state(), SpeechState::Ready);
    assert!(h.mixer.now_playing(ChannelId::AgentSpeech).is_none());

    h.mixer.finish(ChannelId::Reflex);
    let report = h.settle(|r| r.speech.is_some()).await;
    assert!(matches!(report.speech, Some(SpeechOutcome::Spoken { .. })));
}

// ── Listening ──────────────────────────────────────────────────────

#[tokio::test]
async fn listening_rejected_while_speaking() {
    let mut h = harness();
    h.play_reflex(ReflexCategory::Win);

    let result = h.coach.start_listening(Duration::from_secs(3), h.clock);
    assert_eq!(result, Err(ListenRejection::Speaking));
    tokio::task::yield_now().await;
    assert!(!h.coach.is_listening());
    assert_eq!(h.mic.recordings(), 0);
}

#[tokio::test]
async fn listening_respects_post_speech_cooldown() {
    let mut h = harness();
    h.play_reflex(ReflexCategory::Win);

    h.mixer.finish(ChannelId::Reflex);
    h.advance(Duration::ZERO);

    let soon = h.clock + Duration::from_millis(500);
    assert!(matches!(
        h.coach.start_listening(Duration::from_secs(3), soon),
        Err(ListenRejection::Cooldown { .. })
    ));

    let later = h.clock + Duration::from_secs(1);
    assert!(h.coach.start_listening(Duration::from_secs(3), later).is_ok());
    assert!(h.coach.is_listening());
}

#[tokio::test(start_paused = true)]
async fn completed_session_yields_transcript() {
    let mut h = harness();

    h.coach.start_listening(Duration::from_secs(1), h.clock).unwrap();
    let report = h.settle(|r| r.listening.is_some()).await;

    assert_eq!(report.listening, Some(SessionOutcome::Transcribed("hello coach".into())));
    assert_eq!(h.coach.take_transcript().as_deref(), Some("hello coach"));
    assert!(!h.coach.is_listening());
}

#[tokio::test(start_paused = true)]
async fn interrupted_capture_never_transcribes() {
    let mut h = harness();

    h.coach.start_listening(Duration::from_secs(3), h.clock).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.coach.interrupt_listening());

    let report = h.settle(|r| r.listening.is_some()).await;
    assert_eq!(report.listening, Some(SessionOutcome::Interrupted));
    assert_eq!(h.stt.calls(), 0);
    assert!(h.coach.take_transcript().is_none());
}

#[tokio::test(start_paused = true)]
async fn speech_request_interrupts_listening_first() {
    let mut h = harness();

    h.coach.start_listening(Duration::from_secs(3), h.clock).unwrap();
    assert_eq!(h.coach.request_speech("hold on", h.clock), SpeechDecision::Started);

    let report = h.settle(|r| r.listening.is_some()).await;
    assert_eq!(report.listening, Some(SessionOutcome::Interrupted));
    assert_eq!(h.stt.calls(), 0);
}

// ── Game integration ───────────────────────────────────────────────

#[tokio::test]
async fn high_score_death_only_voices_the_loss() {
    let mut h = harness();
    let mut watcher = GameWatcher::new(CoachConfig::default().triggers);

    let game_over = GameSnapshot {
        score: 0,
        high_score: 0,
        loss_count: 2,
        is_alive: false,
        is_game_active: false,
        ticks_played: 300,
    };
    let actions = h.coach.follow_game(&mut watcher, &game_over, &[], h.clock);
    assert!(watcher.agent_enabled());
    assert_eq!(
        actions,
        vec![CoachAction::Reflex(ReflexCategory::Intro)],
        "no listening while the intro is pending"
    );
    h.advance(FULL_WINDOW);
    h.mixer.finish(ChannelId::Reflex);
    h.advance(Duration::from_secs(2));

    let record = GameSnapshot {
        score: 12,
        high_score: 12,
        loss_count: 3,
        ..game_over
    };
    h.coach.follow_game(
        &mut watcher,
        &record,
        &[GameEvent::Died {
            cause: DeathCause::Pipe,
        }],
        h.clock,
    );
    h.advance(FULL_WINDOW);

    let reflexes = h.mixer.plays_on(ChannelId::Reflex);
    assert_eq!(reflexes.last().map(String::as_str), Some("pipe_loss_1.mp3"));
    assert!(!reflexes.iter().any(|label| label.starts_with("score_")));
}
