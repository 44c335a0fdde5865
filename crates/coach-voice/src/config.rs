//! Configuration for the voice subsystem.
//!
//! Every knob has a default matching the shipped companion; the builder
//! methods and [`CoachConfig::from_env`] override them.
//!
//! # Example
//!
//! ```
//! use coach_voice::CoachConfig;
//! use std::time::Duration;
//!
//! let config = CoachConfig::new()
//!     .with_assets_dir("assets/audio")
//!     .with_listen_cooldown(Duration::from_millis(1500));
//! ```

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::VoiceError;

/// Environment variable holding the ElevenLabs API key.
pub const ENV_API_KEY: &str = "ELEVENLABS_API_KEY";
/// Environment variable overriding the synthesis voice.
pub const ENV_VOICE_ID: &str = "COACH_VOICE_ID";
/// Environment variable overriding the synthesis model.
pub const ENV_TTS_MODEL: &str = "COACH_TTS_MODEL";
/// Environment variable overriding the transcription model.
pub const ENV_STT_MODEL: &str = "COACH_STT_MODEL";
/// Environment variable overriding the transcription language hint.
pub const ENV_LANGUAGE: &str = "COACH_LANGUAGE";
/// Environment variable overriding the reflex sound directory.
pub const ENV_ASSETS_DIR: &str = "COACH_ASSETS_DIR";

/// Convert a user-supplied number of seconds into a positive [`Duration`].
///
/// Zero, negative, NaN and infinite values are caller bugs and are rejected.
pub fn duration_from_secs(secs: f32) -> Result<Duration, VoiceError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(VoiceError::InvalidDuration(format!("{secs} seconds")));
    }
    Duration::try_from_secs_f32(secs).map_err(|e| VoiceError::InvalidDuration(e.to_string()))
}

// ── ElevenLabs ─────────────────────────────────────────────────────

/// Remote speech provider settings.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub(crate) api_key: Option<String>,
    pub(crate) base_url: String,
    pub(crate) voice_id: String,
    pub(crate) tts_model: String,
    pub(crate) stt_model: String,
    pub(crate) language: String,
    pub(crate) tag_audio_events: bool,
    pub(crate) timeout: Duration,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.elevenlabs.io".to_string(),
            voice_id: "pNInz6obpgDQGcFmaJgB".to_string(),
            tts_model: "eleven_multilingual_v2".to_string(),
            stt_model: "scribe_v1".to_string(),
            language: "eng".to_string(),
            tag_audio_events: true,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ElevenLabsConfig {
    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL. Defaults to `https://api.elevenlabs.io`.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the synthesis voice.
    #[must_use]
    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    /// Set the synthesis model.
    #[must_use]
    pub fn with_tts_model(mut self, model: impl Into<String>) -> Self {
        self.tts_model = model.into();
        self
    }

    /// Set the transcription model.
    #[must_use]
    pub fn with_stt_model(mut self, model: impl Into<String>) -> Self {
        self.stt_model = model.into();
        self
    }

    /// Set the transcription language hint (ISO 639-3, e.g. `eng`).
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Whether transcripts should carry `(laughs)`-style event tags.
    #[must_use]
    pub const fn with_tag_audio_events(mut self, tag: bool) -> Self {
        self.tag_audio_events = tag;
        self
    }

    /// Set the HTTP request timeout. Defaults to 30 seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a non-blank API key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }

    /// Synthesis voice id.
    #[must_use]
    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    /// Synthesis model id.
    #[must_use]
    pub fn tts_model(&self) -> &str {
        &self.tts_model
    }

    /// Transcription model id.
    #[must_use]
    pub fn stt_model(&self) -> &str {
        &self.stt_model
    }

    /// Transcription language hint.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }
}

// ── Arbitration ────────────────────────────────────────────────────

/// Reaction-delay window for reflex lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReflexConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl ReflexConfig {
    /// The delay window in whole milliseconds. A reversed window collapses
    /// to its lower bound.
    #[must_use]
    pub fn delay_window_ms(&self) -> RangeInclusive<u64> {
        let min = u64::try_from(self.min_delay.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        min..=max.max(min)
    }
}

/// Microphone session policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListeningConfig {
    /// Minimum quiet time after the agent stops speaking.
    pub cooldown: Duration,
    /// Session length used when the caller does not specify one.
    pub default_duration: Duration,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(1),
            default_duration: Duration::from_millis(3_500),
        }
    }
}

/// Synthesized-speech result policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechConfig {
    /// Results arriving later than this after the request are dropped.
    pub max_result_age: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            max_result_age: Duration::from_secs(10),
        }
    }
}

/// When the companion starts talking and how long it listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    pub enable_after_losses: u32,
    pub enable_after_ticks: u64,
    pub listen_duration: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enable_after_losses: 2,
            enable_after_ticks: 100,
            listen_duration: Duration::from_millis(3_500),
        }
    }
}

// ── Root ───────────────────────────────────────────────────────────

/// Complete voice subsystem configuration.
#[derive(Debug, Clone)]
pub struct CoachConfig {
    pub elevenlabs: ElevenLabsConfig,
    pub reflex: ReflexConfig,
    pub listening: ListeningConfig,
    pub speech: SpeechConfig,
    pub triggers: TriggerConfig,
    pub assets_dir: PathBuf,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            elevenlabs: ElevenLabsConfig::default(),
            reflex: ReflexConfig::default(),
            listening: ListeningConfig::default(),
            speech: SpeechConfig::default(),
            triggers: TriggerConfig::default(),
            assets_dir: PathBuf::from("assets/audio"),
        }
    }
}

impl CoachConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Blank values are ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(key) = get(ENV_API_KEY) {
            config.elevenlabs.api_key = Some(key);
        }
        if let Some(voice) = get(ENV_VOICE_ID) {
            config.elevenlabs.voice_id = voice;
        }
        if let Some(model) = get(ENV_TTS_MODEL) {
            config.elevenlabs.tts_model = model;
        }
        if let Some(model) = get(ENV_STT_MODEL) {
            config.elevenlabs.stt_model = model;
        }
        if let Some(language) = get(ENV_LANGUAGE) {
            config.elevenlabs.language = language;
        }
        if let Some(dir) = get(ENV_ASSETS_DIR) {
            config.assets_dir = PathBuf::from(dir);
        }
        config
    }

    /// Replace the provider settings.
    #[must_use]
    pub fn with_elevenlabs(mut self, elevenlabs: ElevenLabsConfig) -> Self {
        self.elevenlabs = elevenlabs;
        self
    }

    /// Set the reflex sound directory.
    #[must_use]
    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    /// Set the reflex reaction-delay window.
    #[must_use]
    pub const fn with_reflex_delay(mut self, min: Duration, max: Duration) -> Self {
        self.reflex = ReflexConfig {
            min_delay: min,
            max_delay: max,
        };
        self
    }

    /// Set the post-speech listening cooldown. Defaults to 1 second.
    #[must_use]
    pub const fn with_listen_cooldown(mut self, cooldown: Duration) -> Self {
        self.listening.cooldown = cooldown;
        self
    }

    /// Set the stale-result cutoff for synthesized speech.
    #[must_use]
    pub const fn with_max_result_age(mut self, age: Duration) -> Self {
        self.speech.max_result_age = age;
        self
    }

    /// Replace the trigger policy.
    #[must_use]
    pub const fn with_triggers(mut self, triggers: TriggerConfig) -> Self {
        self.triggers = triggers;
        self
    }
}
