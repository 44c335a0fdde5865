//! Voice subsystem error types.

use std::path::PathBuf;

use crate::channel::ChannelId;

/// Failure reported by a remote speech provider (synthesis or transcription).
///
/// These never propagate past the pipeline/controller boundary: they are
/// logged, the in-flight work is discarded, and the busy flags are released.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Transport failure, timeout, or a server-side (5xx) error.
    #[error("Provider network error: {0}")]
    Network(String),

    /// Credentials were missing or rejected.
    #[error("Provider rejected credentials: {0}")]
    Auth(String),

    /// Account quota or rate limit exhausted.
    #[error("Provider quota exhausted: {0}")]
    Quota(String),

    /// The provider answered, but the payload could not be used.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Classify a non-success HTTP status into the provider taxonomy.
    ///
    /// Quota exhaustion is reported by some providers as a 401 with a
    /// `quota_exceeded` detail, so the body is inspected before the status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {status}: {}", truncate(body, 200));
        if status == 402 || status == 429 || body.to_ascii_lowercase().contains("quota") {
            return Self::Quota(detail);
        }
        match status {
            401 | 403 => Self::Auth(detail),
            400..=499 => Self::InvalidResponse(detail),
            _ => Self::Network(detail),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors that can occur in the voice subsystem.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// A sound asset file is absent. Logged and skipped, never fatal.
    #[error("Sound resource missing at {0}")]
    ResourceMissing(PathBuf),

    /// A remote provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A playback channel was used before it was reserved.
    #[error("Audio channel {0:?} was not reserved")]
    ChannelNotReserved(ChannelId),

    /// No audio input device found.
    #[error("No audio input device found")]
    NoInputDevice,

    /// Failed to open audio input stream.
    #[error("Failed to open audio input stream: {0}")]
    InputStreamError(String),

    /// Failed to open audio output stream.
    #[error("Failed to open audio output stream: {0}")]
    OutputStreamError(String),

    /// The dedicated audio output thread exited unexpectedly.
    #[error("Audio thread exited unexpectedly")]
    AudioThreadDied,

    /// A sound payload could not be decoded for playback.
    #[error("Failed to decode sound '{label}': {reason}")]
    Decode { label: String, reason: String },

    /// Captured audio could not be encoded for upload.
    #[error("Failed to encode captured audio: {0}")]
    Encode(String),

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    ResampleError(String),

    /// A duration argument was zero, negative, or not a number.
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Configuration is incomplete or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (asset files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
