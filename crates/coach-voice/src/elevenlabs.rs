//! ElevenLabs HTTP client implementing both remote speech providers.
//!
//! - TTS: `POST {base}/v1/text-to-speech/{voice_id}` with a JSON body,
//!   returns mp3 bytes.
//! - STT: `POST {base}/v1/speech-to-text` with a multipart WAV upload,
//!   returns JSON `{ "text": ... }`.
//! - Credits: `GET {base}/v1/user/subscription`, returns the character
//!   quota of the account.
//!
//! No retries: a failed request is reported once and the caller moves on.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::config::ElevenLabsConfig;
use crate::error::{ProviderError, VoiceError};
use crate::provider::{SpeechSynthesizer, SpeechTranscriber, TranscriptionOptions, VoiceSelection};

const API_KEY_HEADER: &str = "xi-api-key";

/// Remaining characters below which the account is considered low on credit.
pub const LOW_CREDIT_THRESHOLD: u64 = 1_000;

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    character_count: u64,
    character_limit: u64,
    #[serde(default)]
    next_character_count_reset_unix: Option<i64>,
}

/// Character quota of the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditUsage {
    pub used: u64,
    pub limit: u64,
    /// Unix time of the next quota reset, when the plan has one.
    pub resets_at: Option<i64>,
}

impl CreditUsage {
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    #[must_use]
    pub const fn is_low(&self) -> bool {
        self.remaining() < LOW_CREDIT_THRESHOLD
    }
}

/// ElevenLabs API client.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    tag_audio_events: bool,
}

impl ElevenLabsClient {
    /// Build a client. Fails when no API key is configured.
    pub fn new(config: &ElevenLabsConfig) -> Result<Self, VoiceError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| VoiceError::Config("ElevenLabs API key is not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("coach-voice/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            tag_audio_events: config.tag_audio_events,
        })
    }

    /// Fetch the account's character quota.
    pub async fn credits(&self) -> Result<CreditUsage, ProviderError> {
        let url = format!("{}/v1/user/subscription", self.base_url);
        let response = self.http.get(&url).header(API_KEY_HEADER, &self.api_key).send().await?;

        let parsed: SubscriptionResponse = Self::check(response).await?.json().await?;
        let usage = CreditUsage {
            used: parsed.character_count,
            limit: parsed.character_limit,
            resets_at: parsed.next_character_count_reset_unix,
        };
        tracing::debug!(used = usage.used, limit = usage.limit, "Fetched credit usage");
        Ok(usage)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status.as_u16(), &body))
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice.voice_id);
        tracing::debug!(voice = %voice.voice_id, model = %voice.model_id, "Requesting synthesis");

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&SynthesisRequest {
                text,
                model_id: &voice.model_id,
            })
            .send()
            .await?;

        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechTranscriber for ElevenLabsClient {
    async fn transcribe(&self, wav: Vec<u8>, options: &TranscriptionOptions) -> Result<String, ProviderError> {
        let url = format!("{}/v1/speech-to-text", self.base_url);

        let file = Part::bytes(wav)
            .file_name("input.wav")
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let mut form = Form::new()
            .text("model_id", options.model_id.clone())
            .text("tag_audio_events", self.tag_audio_events.to_string())
            .text("diarize", "false")
            .part("file", file);
        if let Some(language) = &options.language_hint {
            form = form.text("language_code", language.clone());
        }

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let parsed: TranscriptionResponse = Self::check(response).await?.json().await?;
        Ok(parsed.text)
    }
}
