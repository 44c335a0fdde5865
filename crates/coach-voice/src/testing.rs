//! In-memory providers for driving the arbitration core without hardware
//! or network access.
//!
//! Available to this crate's own tests and, through the `test-utils`
//! feature, to integration tests and downstream crates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::channel::{AudioChannelProvider, ChannelId};
use crate::error::{ProviderError, VoiceError};
use crate::provider::{AudioClip, Microphone, SpeechSynthesizer, SpeechTranscriber, TranscriptionOptions, VoiceSelection};
use crate::sounds::SoundHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Channels ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ChannelsState {
    reserved: Vec<ChannelId>,
    playing: Vec<(ChannelId, String)>,
    history: Vec<(ChannelId, String)>,
    fail_next_play: bool,
}

/// Virtual mixer: a channel stays busy until the test calls [`finish`](Self::finish).
///
/// Clones share state, so a test keeps one clone and hands another to the
/// registry.
#[derive(Debug, Clone, Default)]
pub struct VirtualChannels {
    state: Arc<Mutex<ChannelsState>>,
}

impl VirtualChannels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate `channel` reaching the end of its sound.
    pub fn finish(&self, channel: ChannelId) {
        lock(&self.state).playing.retain(|(id, _)| *id != channel);
    }

    /// Label of the sound currently playing on `channel`.
    #[must_use]
    pub fn now_playing(&self, channel: ChannelId) -> Option<String> {
        lock(&self.state)
            .playing
            .iter()
            .find(|(id, _)| *id == channel)
            .map(|(_, label)| label.clone())
    }

    /// Every sound ever started, in order.
    #[must_use]
    pub fn plays(&self) -> Vec<(ChannelId, String)> {
        lock(&self.state).history.clone()
    }

    /// Labels started on `channel`, in order.
    #[must_use]
    pub fn plays_on(&self, channel: ChannelId) -> Vec<String> {
        lock(&self.state)
            .history
            .iter()
            .filter(|(id, _)| *id == channel)
            .map(|(_, label)| label.clone())
            .collect()
    }

    #[must_use]
    pub fn reserved(&self) -> Vec<ChannelId> {
        lock(&self.state).reserved.clone()
    }

    /// Make the next `play` fail as if the payload could not be decoded.
    pub fn fail_next_play(&self) {
        lock(&self.state).fail_next_play = true;
    }
}

impl AudioChannelProvider for VirtualChannels {
    fn reserve(&mut self, channel: ChannelId) -> Result<(), VoiceError> {
        let mut state = lock(&self.state);
        if !state.reserved.contains(&channel) {
            state.reserved.push(channel);
        }
        Ok(())
    }

    fn play(&mut self, channel: ChannelId, sound: &SoundHandle) -> Result<(), VoiceError> {
        let mut state = lock(&self.state);
        if !state.reserved.contains(&channel) {
            return Err(VoiceError::ChannelNotReserved(channel));
        }
        if std::mem::take(&mut state.fail_next_play) {
            return Err(VoiceError::Decode {
                label: sound.label().to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        let label = sound.label().to_string();
        state.playing.retain(|(id, _)| *id != channel);
        state.playing.push((channel, label.clone()));
        state.history.push((channel, label));
        Ok(())
    }

    fn stop(&mut self, channel: ChannelId) {
        self.finish(channel);
    }

    fn is_busy(&self, channel: ChannelId) -> bool {
        lock(&self.state).playing.iter().any(|(id, _)| *id == channel)
    }
}

// ── Synthesis ──────────────────────────────────────────────────────

/// Synthesizer that answers from a script, optionally holding each answer
/// until the test releases it.
#[derive(Debug, Default)]
pub struct ScriptedSynthesizer {
    responses: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
    release: Option<Arc<Notify>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    /// Answers every request with a few bytes of fake audio.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a specific answer for the next request.
    #[must_use]
    pub fn with_response(self, response: Result<Vec<u8>, ProviderError>) -> Self {
        lock(&self.responses).push_back(response);
        self
    }

    /// Hold every answer until `release.notify_one()` is called (once per request).
    #[must_use]
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        self.release = Some(Arc::clone(&release));
        (self, release)
    }

    /// Texts received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &VoiceSelection) -> Result<Vec<u8>, ProviderError> {
        lock(&self.requests).push(text.to_string());
        if let Some(release) = &self.release {
            release.notified().await;
        }
        let scripted = lock(&self.responses).pop_front();
        scripted.unwrap_or_else(|| Ok(b"ID3-fake-audio".to_vec()))
    }
}

// ── Transcription ──────────────────────────────────────────────────

/// Transcriber that answers from a script, optionally after a simulated
/// upload latency.
#[derive(Debug)]
pub struct ScriptedTranscriber {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    fallback: String,
    latency: Duration,
    calls: AtomicUsize,
    answered: AtomicUsize,
}

impl Default for ScriptedTranscriber {
    fn default() -> Self {
        Self::new("hello coach")
    }
}

impl ScriptedTranscriber {
    /// Answers every request with `text`.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: text.into(),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            answered: AtomicUsize::new(0),
        }
    }

    /// Wait `latency` (tokio time) before answering each request.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a specific answer for the next request.
    #[must_use]
    pub fn with_response(self, response: Result<String, ProviderError>) -> Self {
        lock(&self.responses).push_back(response);
        self
    }

    /// Number of transcription requests made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of requests that ran to completion.
    #[must_use]
    pub fn answered(&self) -> usize {
        self.answered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechTranscriber for ScriptedTranscriber {
    async fn transcribe(&self, _wav: Vec<u8>, _options: &TranscriptionOptions) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.answered.fetch_add(1, Ordering::SeqCst);
        let scripted = lock(&self.responses).pop_front();
        scripted.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

// ── Microphone ─────────────────────────────────────────────────────

/// Microphone that "records" a fixed clip for the requested duration
/// (tokio time, so it honours a paused clock) or until stopped.
#[derive(Debug)]
pub struct ScriptedMicrophone {
    clip: AudioClip,
    recordings: AtomicUsize,
}

impl Default for ScriptedMicrophone {
    fn default() -> Self {
        Self::with_clip(AudioClip::new(vec![0.1; 1_600], 16_000))
    }
}

impl ScriptedMicrophone {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_clip(clip: AudioClip) -> Self {
        Self {
            clip,
            recordings: AtomicUsize::new(0),
        }
    }

    /// Number of recordings started.
    #[must_use]
    pub fn recordings(&self) -> usize {
        self.recordings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Microphone for ScriptedMicrophone {
    async fn record(&self, duration: Duration, stop: CancellationToken) -> Result<AudioClip, VoiceError> {
        self.recordings.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = stop.cancelled() => {}
        }
        Ok(self.clip.clone())
    }
}
