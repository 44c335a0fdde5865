//! Listening controller: one half-duplex microphone session at a time.
//!
//! A session runs as a tokio task: record → (unless interrupted) transcribe →
//! post a [`SessionOutcome`] into a oneshot slot. The controller keeps the
//! session alive until that outcome has been drained, so the microphone is
//! never opened twice even while an interrupted capture is winding down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use crate::busy::BusySignal;
use crate::provider::{Microphone, SpeechTranscriber, TranscriptionOptions};

/// Why `start_listening` refused to open the microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenRejection {
    /// The agent is speaking or generating speech.
    Speaking,
    /// A session is already active.
    SessionActive,
    /// The agent stopped speaking too recently.
    Cooldown { remaining: Duration },
    /// A zero-length session was requested.
    InvalidDuration,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The player said something; the text is in the transcript slot.
    Transcribed(String),
    /// Stopped early; audio discarded without transcription.
    Interrupted,
    /// Nothing intelligible was said.
    Silent,
    /// Capture or transcription failed.
    Failed(String),
}

/// The active capture session.
#[derive(Debug)]
pub struct ListeningSession {
    duration: Duration,
    started_at: Instant,
    interrupted: bool,
    stop: CancellationToken,
    outcome: oneshot::Receiver<SessionOutcome>,
}

impl ListeningSession {
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        self.interrupted
    }
}

/// Owns the microphone and the transcript slot.
pub struct ListeningController {
    microphone: Arc<dyn Microphone>,
    transcriber: Arc<dyn SpeechTranscriber>,
    options: TranscriptionOptions,
    cooldown: Duration,
    runtime: Handle,
    session: Option<ListeningSession>,
    transcript: Option<String>,
}

impl ListeningController {
    #[must_use]
    pub fn new(
        microphone: Arc<dyn Microphone>,
        transcriber: Arc<dyn SpeechTranscriber>,
        options: TranscriptionOptions,
        cooldown: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            microphone,
            transcriber,
            options,
            cooldown,
            runtime,
            session: None,
            transcript: None,
        }
    }

    /// Whether a session exists (recording, transcribing, or winding down).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub const fn session(&self) -> Option<&ListeningSession> {
        self.session.as_ref()
    }

    /// Begin capturing for `duration`.
    pub fn start_listening(
        &mut self,
        duration: Duration,
        busy: &BusySignal,
        now: Instant,
    ) -> Result<(), ListenRejection> {
        if duration.is_zero() {
            return Err(ListenRejection::InvalidDuration);
        }
        if busy.is_speaking() {
            tracing::debug!("Listen rejected: agent speaking");
            return Err(ListenRejection::Speaking);
        }
        if self.session.is_some() {
            tracing::debug!("Listen rejected: session already active");
            return Err(ListenRejection::SessionActive);
        }
        if let Some(end) = busy.last_speech_end {
            let quiet = now.saturating_duration_since(end);
            if quiet < self.cooldown {
                let remaining = self.cooldown - quiet;
                tracing::debug!(remaining_ms = remaining.as_millis(), "Listen rejected: cooldown");
                return Err(ListenRejection::Cooldown { remaining });
            }
        }

        let stop = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let microphone = Arc::clone(&self.microphone);
        let transcriber = Arc::clone(&self.transcriber);
        let options = self.options.clone();
        let worker_stop = stop.clone();
        self.runtime.spawn(async move {
            let outcome = run_session(microphone, transcriber, options, duration, worker_stop).await;
            // Receiver is only dropped with the controller.
            let _ = tx.send(outcome);
        });

        tracing::info!(duration_ms = duration.as_millis(), "Listening started");
        self.session = Some(ListeningSession {
            duration,
            started_at: now,
            interrupted: false,
            stop,
            outcome: rx,
        });
        Ok(())
    }

    /// Stop the active capture early. Its audio will never be transcribed.
    /// Returns whether a session was interrupted.
    pub fn interrupt(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.interrupted {
            session.interrupted = true;
            session.stop.cancel();
            tracing::info!("Listening interrupted");
        }
        true
    }

    /// Drain the session's outcome slot. Never blocks.
    pub fn poll(&mut self) -> Option<SessionOutcome> {
        let session = self.session.as_mut()?;
        let outcome = match session.outcome.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => SessionOutcome::Failed("capture task exited".to_string()),
        };
        let interrupted = session.interrupted;
        self.session = None;

        let outcome = match outcome {
            SessionOutcome::Transcribed(_) if interrupted => SessionOutcome::Interrupted,
            other => other,
        };
        match &outcome {
            SessionOutcome::Transcribed(text) => {
                tracing::info!(text = %text, "Player speech transcribed");
                self.transcript = Some(text.clone());
            }
            SessionOutcome::Failed(reason) => tracing::warn!(reason = %reason, "Listening failed"),
            SessionOutcome::Interrupted | SessionOutcome::Silent => {
                tracing::debug!(?outcome, "Listening ended without transcript");
            }
        }
        Some(outcome)
    }

    /// Take the most recent transcript, leaving the slot empty.
    pub fn take_transcript(&mut self) -> Option<String> {
        self.transcript.take()
    }
}

async fn run_session(
    microphone: Arc<dyn Microphone>,
    transcriber: Arc<dyn SpeechTranscriber>,
    options: TranscriptionOptions,
    duration: Duration,
    stop: CancellationToken,
) -> SessionOutcome {
    let clip = match microphone.record(duration, stop.clone()).await {
        Ok(clip) => clip,
        Err(e) => return SessionOutcome::Failed(e.to_string()),
    };
    if stop.is_cancelled() {
        return SessionOutcome::Interrupted;
    }
    if clip.is_empty() {
        return SessionOutcome::Silent;
    }

    let wav = match clip.to_wav() {
        Ok(wav) => wav,
        Err(e) => return SessionOutcome::Failed(e.to_string()),
    };
    tracing::debug!(
        samples = clip.samples.len(),
        secs = clip.duration().as_secs_f32(),
        "Uploading capture for transcription"
    );

    if stop.is_cancelled() {
        return SessionOutcome::Interrupted;
    }

    let result = tokio::select! {
        result = transcriber.transcribe(wav, &options) => result,
        () = stop.cancelled() => {
            tracing::debug!("Transcription abandoned after interrupt");
            return SessionOutcome::Interrupted;
        }
    };
    match result {
        Ok(_) if stop.is_cancelled() => SessionOutcome::Interrupted,
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                SessionOutcome::Silent
            } else {
                SessionOutcome::Transcribed(text.to_string())
            }
        }
        Err(e) => SessionOutcome::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::testing::{ScriptedMicrophone, ScriptedTranscriber};

    fn controller(mic: Arc<ScriptedMicrophone>, stt: Arc<ScriptedTranscriber>) -> ListeningController {
        ListeningController::new(
            mic,
            stt,
            TranscriptionOptions {
                model_id: "scribe_v1".into(),
                language_hint: Some("eng".into()),
            },
            Duration::from_secs(1),
            Handle::current(),
        )
    }

    async fn drain(listening: &mut ListeningController) -> SessionOutcome {
        for _ in 0..500 {
            if let Some(outcome) = listening.poll() {
                return outcome;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("session never finished");
    }

    const SECS_3: Duration = Duration::from_secs(3);

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let mut listening = controller(Arc::default(), Arc::default());
        let result = listening.start_listening(Duration::ZERO, &BusySignal::default(), Instant::now());
        assert_eq!(result, Err(ListenRejection::InvalidDuration));
    }

    #[tokio::test]
    async fn speaking_agent_blocks_capture() {
        let mic = Arc::new(ScriptedMicrophone::new());
        let mut listening = controller(Arc::clone(&mic), Arc::default());
        let busy = BusySignal {
            generating: true,
            ..BusySignal::default()
        };

        assert_eq!(
            listening.start_listening(SECS_3, &busy, Instant::now()),
            Err(ListenRejection::Speaking)
        );
        tokio::task::yield_now().await;
        assert!(!listening.is_active());
        assert_eq!(mic.recordings(), 0);
    }

    #[tokio::test]
    async fn only_one_session_at_a_time() {
        let mut listening = controller(Arc::default(), Arc::default());
        let now = Instant::now();
        listening.start_listening(SECS_3, &BusySignal::default(), now).unwrap();
        assert_eq!(
            listening.start_listening(SECS_3, &BusySignal::default(), now),
            Err(ListenRejection::SessionActive)
        );
    }

    #[tokio::test]
    async fn cooldown_after_speech_end() {
        let mut listening = controller(Arc::default(), Arc::default());
        let ended = Instant::now();
        let busy = BusySignal {
            last_speech_end: Some(ended),
            ..BusySignal::default()
        };

        let early = listening.start_listening(SECS_3, &busy, ended + Duration::from_millis(400));
        assert_eq!(
            early,
            Err(ListenRejection::Cooldown {
                remaining: Duration::from_millis(600)
            })
        );
        assert!(!listening.is_active());

        assert!(listening.start_listening(SECS_3, &busy, ended + Duration::from_secs(1)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn completed_session_publishes_transcript() {
        let stt = Arc::new(ScriptedTranscriber::new("  watch the gap  "));
        let mut listening = controller(Arc::default(), Arc::clone(&stt));
        listening.start_listening(SECS_3, &BusySignal::default(), Instant::now()).unwrap();

        let outcome = drain(&mut listening).await;
        assert_eq!(outcome, SessionOutcome::Transcribed("watch the gap".into()));
        assert!(!listening.is_active());
        assert_eq!(listening.take_transcript().as_deref(), Some("watch the gap"));
        assert!(listening.take_transcript().is_none());
        assert_eq!(stt.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_session_is_never_transcribed() {
        let stt = Arc::new(ScriptedTranscriber::default());
        let mut listening = controller(Arc::default(), Arc::clone(&stt));
        listening.start_listening(SECS_3, &BusySignal::default(), Instant::now()).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(listening.interrupt());
        assert!(listening.is_active(), "session lives until the capture winds down");

        let outcome = drain(&mut listening).await;
        assert_eq!(outcome, SessionOutcome::Interrupted);
        assert_eq!(stt.calls(), 0);
        assert!(listening.take_transcript().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_during_upload_ends_session_promptly() {
        let stt = Arc::new(ScriptedTranscriber::default().with_latency(Duration::from_secs(30)));
        let mut listening = controller(Arc::default(), Arc::clone(&stt));
        let start = Instant::now();
        listening.start_listening(Duration::from_secs(1), &BusySignal::default(), start).unwrap();

        // Capture is over and the upload is in flight.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(stt.calls(), 1);
        assert!(listening.poll().is_none());

        assert!(listening.interrupt());
        let before = tokio::time::Instant::now();
        let outcome = drain(&mut listening).await;
        assert_eq!(outcome, SessionOutcome::Interrupted);
        assert!(before.elapsed() < Duration::from_secs(1));
        assert!(!listening.is_active());
        assert_eq!(stt.answered(), 0);
        assert!(listening.take_transcript().is_none());

        let again = start + Duration::from_secs(2);
        assert!(listening.start_listening(SECS_3, &BusySignal::default(), again).is_ok());
    }

    #[tokio::test]
    async fn interrupt_without_session_is_noop() {
        let mut listening = controller(Arc::default(), Arc::default());
        assert!(!listening.interrupt());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_transcript_is_silent() {
        let stt = Arc::new(ScriptedTranscriber::new("   "));
        let mut listening = controller(Arc::default(), stt);
        listening.start_listening(SECS_3, &BusySignal::default(), Instant::now()).unwrap();

        assert_eq!(drain(&mut listening).await, SessionOutcome::Silent);
        assert!(listening.take_transcript().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failure_ends_session_quietly() {
        let stt = Arc::new(ScriptedTranscriber::default().with_response(Err(ProviderError::Network("timeout".into()))));
        let mut listening = controller(Arc::default(), stt);
        listening.start_listening(SECS_3, &BusySignal::default(), Instant::now()).unwrap();

        assert!(matches!(drain(&mut listening).await, SessionOutcome::Failed(_)));
        assert!(!listening.is_active());
        assert!(listening.take_transcript().is_none());
    }
}
