//! External collaborator boundaries: speech synthesis, transcription, and
//! microphone capture.
//!
//! The arbitration core only talks to these traits. Real implementations
//! live in [`elevenlabs`](crate::elevenlabs) and [`capture`](crate::capture);
//! scripted ones in `testing` (feature `test-utils`).

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, VoiceError};

/// Captured mono PCM audio.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioClip {
    /// Mono samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playing time of the clip.
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Encode as a 16-bit mono WAV file.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_wav(&self) -> Result<Vec<u8>, VoiceError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let encode = |e: hound::Error| VoiceError::Encode(e.to_string());

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encode)?;
        for &sample in &self.samples {
            let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer.write_sample(pcm).map_err(encode)?;
        }
        writer.finalize().map_err(encode)?;
        Ok(cursor.into_inner())
    }
}

/// Which voice and model to synthesize with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSelection {
    pub voice_id: String,
    pub model_id: String,
}

/// Transcription parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOptions {
    pub model_id: String,
    /// ISO 639-3 language hint, e.g. `eng`.
    pub language_hint: Option<String>,
}

/// Text-to-speech provider.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`; returns encoded audio (mp3 or wav).
    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> Result<Vec<u8>, ProviderError>;
}

/// Speech-to-text provider.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// Transcribe a WAV payload.
    async fn transcribe(&self, wav: Vec<u8>, options: &TranscriptionOptions) -> Result<String, ProviderError>;
}

/// Microphone capture.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Record for `duration`, or until `stop` is cancelled from another task.
    /// Returns whatever was captured up to that point.
    async fn record(&self, duration: Duration, stop: CancellationToken) -> Result<AudioClip, VoiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_sample_rate() {
        let clip = AudioClip::new(vec![0.0; 8_000], 16_000);
        assert_eq!(clip.duration(), Duration::from_millis(500));
        assert_eq!(AudioClip::new(vec![0.0; 10], 0).duration(), Duration::ZERO);
    }

    #[test]
    fn wav_encoding_is_mono_16_bit() {
        let clip = AudioClip::new(vec![0.0, 0.5, -0.5, 2.0], 16_000);
        let wav = clip.to_wav().unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[3], i16::MAX, "out-of-range input is clamped");
    }
}
