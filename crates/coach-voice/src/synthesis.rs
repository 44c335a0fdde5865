//! Speech synthesis pipeline: text in, agent-speech channel out.
//!
//! ```text
//!   Idle ──request_speech──▶ Fetching ──bytes──▶ Ready ──reflex channel idle──▶ (played) Idle
//!                               │
//!                               └── error / stale / abandon ──▶ Idle (discarded)
//! ```
//!
//! The fetch runs as a tokio task that owns the sending half of a oneshot
//! slot. The orchestrator polls the receiving half once per tick with
//! `try_recv`, so the frame loop never waits on the network. Fetches cannot
//! be cancelled; [`SpeechSynthesisPipeline::abandon`] drops the receiver and
//! whatever the task produces afterwards goes nowhere.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::channel::{ChannelId, ChannelRegistry};
use crate::config::SpeechConfig;
use crate::error::ProviderError;
use crate::listening::ListeningController;
use crate::provider::{SpeechSynthesizer, VoiceSelection};
use crate::sounds::SoundHandle;

type FetchResult = Result<Vec<u8>, ProviderError>;

/// Pipeline state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    Idle,
    Fetching,
    /// Audio arrived and is waiting for the reflex channel to fall silent.
    Ready,
}

/// Why `request_speech` did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechRejection {
    /// A request is already fetching or waiting to play.
    AlreadyInFlight,
    /// Blank text.
    EmptyText,
}

/// Result of `request_speech`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechDecision {
    Started,
    Rejected(SpeechRejection),
}

/// What became of a request, reported by [`SpeechSynthesisPipeline::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Audio is now playing on the agent-speech channel.
    Spoken { text: String },
    /// The provider failed; nothing will be said.
    Failed { text: String, error: ProviderError },
    /// Audio arrived but the channel refused it (undecodable payload).
    Unplayable { text: String },
    /// Audio arrived too late to still be relevant.
    Stale { text: String, age: Duration },
}

#[derive(Debug)]
enum Stage {
    Fetching(oneshot::Receiver<FetchResult>),
    Ready(SoundHandle),
}

/// The single in-flight synthesis request.
#[derive(Debug)]
pub struct SpeechRequest {
    id: u64,
    text: String,
    started_at: Instant,
    stage: Stage,
}

impl SpeechRequest {
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    #[must_use]
    pub const fn state(&self) -> SpeechState {
        match self.stage {
            Stage::Fetching(_) => SpeechState::Fetching,
            Stage::Ready(_) => SpeechState::Ready,
        }
    }
}

enum Step {
    Pending(SpeechRequest),
    Done(SpeechOutcome),
}

/// Fetches synthesized speech off the tick path and plays it when ready.
pub struct SpeechSynthesisPipeline {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: VoiceSelection,
    config: SpeechConfig,
    runtime: Handle,
    request: Option<SpeechRequest>,
    next_id: u64,
}

impl SpeechSynthesisPipeline {
    /// Create a pipeline whose fetches run on `runtime`.
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voice: VoiceSelection,
        config: SpeechConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            synthesizer,
            voice,
            config,
            runtime,
            request: None,
            next_id: 1,
        }
    }

    #[must_use]
    pub fn state(&self) -> SpeechState {
        self.request.as_ref().map_or(SpeechState::Idle, SpeechRequest::state)
    }

    /// Whether a request is fetching or holding audio that has not played yet.
    #[must_use]
    pub const fn is_generating(&self) -> bool {
        self.request.is_some()
    }

    /// The in-flight request, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&SpeechRequest> {
        self.request.as_ref()
    }

    /// Start synthesizing `text`.
    ///
    /// Any active listening session is interrupted before the fetch is
    /// spawned so the microphone never records the agent's own voice.
    pub fn request_speech(
        &mut self,
        text: &str,
        listening: &mut ListeningController,
        now: Instant,
    ) -> SpeechDecision {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("Speech request ignored: empty text");
            return SpeechDecision::Rejected(SpeechRejection::EmptyText);
        }
        if let Some(current) = &self.request {
            tracing::debug!(pending = %current.text, "Speech request rejected: one already in flight");
            return SpeechDecision::Rejected(SpeechRejection::AlreadyInFlight);
        }

        if listening.interrupt() {
            tracing::info!("Interrupted listening session for outgoing speech");
        }

        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        let synthesizer = Arc::clone(&self.synthesizer);
        let voice = self.voice.clone();
        let owned = text.to_string();
        self.runtime.spawn(async move {
            let result = synthesizer.synthesize(&owned, &voice).await;
            if tx.send(result).is_err() {
                tracing::debug!(request = id, "Speech result discarded: request abandoned");
            }
        });

        tracing::info!(request = id, chars = text.len(), "Speech synthesis started");
        self.request = Some(SpeechRequest {
            id,
            text: text.to_string(),
            started_at: now,
            stage: Stage::Fetching(rx),
        });
        SpeechDecision::Started
    }

    /// Drain the result slot and, when possible, play the audio.
    ///
    /// Ready audio is held while the reflex channel is audible.
    pub fn poll(&mut self, now: Instant, channels: &mut ChannelRegistry) -> Option<SpeechOutcome> {
        let request = self.request.take()?;
        match self.advance(request, now, channels) {
            Step::Pending(request) => {
                self.request = Some(request);
                None
            }
            Step::Done(outcome) => Some(outcome),
        }
    }

    /// Forget the in-flight request. Its result will be dropped on arrival.
    /// Returns whether there was one.
    pub fn abandon(&mut self) -> bool {
        match self.request.take() {
            Some(request) => {
                tracing::info!(request = request.id, "Speech request abandoned");
                true
            }
            None => false,
        }
    }

    fn advance(&self, mut request: SpeechRequest, now: Instant, channels: &mut ChannelRegistry) -> Step {
        if let Stage::Fetching(rx) = &mut request.stage {
            let result = match rx.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => return Step::Pending(request),
                Err(TryRecvError::Closed) => Err(ProviderError::Network("synthesis task exited".into())),
            };

            let bytes = match result {
                Ok(bytes) if bytes.is_empty() => {
                    return Self::failed(request, ProviderError::InvalidResponse("empty audio".into()));
                }
                Ok(bytes) => bytes,
                Err(error) => return Self::failed(request, error),
            };

            tracing::debug!(request = request.id, bytes = bytes.len(), "Speech audio ready");
            let label = format!("speech #{}", request.id);
            request.stage = Stage::Ready(SoundHandle::from_bytes(label, bytes));
        }

        // Audio parked behind a long reflex ages too.
        let age = now.saturating_duration_since(request.started_at);
        if age > self.config.max_result_age {
            tracing::warn!(request = request.id, age_ms = age.as_millis(), "Dropping stale speech result");
            return Step::Done(SpeechOutcome::Stale {
                text: request.text,
                age,
            });
        }

        if channels.is_busy(ChannelId::Reflex) {
            return Step::Pending(request);
        }

        let Stage::Ready(sound) = &request.stage else {
            return Step::Pending(request);
        };
        if channels.play(ChannelId::AgentSpeech, Some(sound)) {
            Step::Done(SpeechOutcome::Spoken { text: request.text })
        } else {
            Step::Done(SpeechOutcome::Unplayable { text: request.text })
        }
    }

    fn failed(request: SpeechRequest, error: ProviderError) -> Step {
        tracing::warn!(request = request.id, error = %error, "Speech synthesis failed");
        Step::Done(SpeechOutcome::Failed {
            text: request.text,
            error,
        })
    }
}
