//! Microphone capture via `cpal`.
//!
//! Each recording opens the default input device, accumulates samples
//! until the duration elapses or the session's stop token fires, then
//! down-mixes and resamples to 16 kHz mono for upload. Input arriving while
//! the echo gate reports the agent audible is discarded in the callback.
//!
//! `cpal::Stream` is `!Send`, so the whole recording runs on a blocking
//! thread and the stream never crosses an `.await`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};
use rubato::{FftFixedIn, Resampler as _};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::VoiceError;
use crate::gate::EchoGate;
use crate::provider::{AudioClip, Microphone};

/// Upload sample rate.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// An available audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// List the host's audio input devices.
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, VoiceError> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let devices = host
        .input_devices()
        .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| AudioDeviceInfo {
            is_default: name == default_name,
            name,
        })
        .collect())
}

/// The default input device, gated by the agent's own playback.
#[derive(Debug, Clone)]
pub struct CpalMicrophone {
    echo_gate: EchoGate,
}

impl CpalMicrophone {
    #[must_use]
    pub const fn new(echo_gate: EchoGate) -> Self {
        Self { echo_gate }
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn record(&self, duration: Duration, stop: CancellationToken) -> Result<AudioClip, VoiceError> {
        let echo_gate = self.echo_gate.clone();
        let runtime = Handle::current();
        tokio::task::spawn_blocking(move || record_blocking(&runtime, &echo_gate, duration, &stop))
            .await
            .map_err(|e| VoiceError::InputStreamError(format!("capture task failed: {e}")))?
    }
}

fn record_blocking(
    runtime: &Handle,
    echo_gate: &EchoGate,
    duration: Duration,
    stop: &CancellationToken,
) -> Result<AudioClip, VoiceError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or(VoiceError::NoInputDevice)?;
    let config = device
        .default_input_config()
        .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;

    let device_rate = config.sample_rate().0;
    let device_channels = config.channels();
    tracing::debug!(
        device = %device.name().unwrap_or_default(),
        sample_rate = device_rate,
        channels = device_channels,
        "Opening microphone"
    );

    let buffer = Arc::new(Mutex::new(Vec::new()));
    let stream = build_input_stream(&device, &config, Arc::clone(&buffer), echo_gate.clone())?;
    stream
        .play()
        .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;

    runtime.block_on(async {
        tokio::select! {
            () = stop.cancelled() => tracing::debug!("Capture stopped early"),
            () = tokio::time::sleep(duration) => {}
        }
    });
    drop(stream);

    let raw = {
        let mut buf = buffer
            .lock()
            .map_err(|e| VoiceError::InputStreamError(e.to_string()))?;
        std::mem::take(&mut *buf)
    };

    let mono = downmix(raw, device_channels);
    let samples = if device_rate == CAPTURE_SAMPLE_RATE {
        mono
    } else {
        resample(&mono, device_rate, CAPTURE_SAMPLE_RATE)?
    };
    Ok(AudioClip::new(samples, CAPTURE_SAMPLE_RATE))
}

fn build_input_stream(
    device: &Device,
    config: &SupportedStreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    echo_gate: EchoGate,
) -> Result<Stream, VoiceError> {
    let stream_config: StreamConfig = config.clone().into();
    let err_fn = |err: cpal::StreamError| tracing::error!(%err, "Audio input stream error");

    // Shared sink for every sample format: drop input while the agent is audible.
    let push = move |samples: &mut dyn Iterator<Item = f32>| {
        if echo_gate.is_speaking() {
            return;
        }
        if let Ok(mut buf) = buffer.lock() {
            buf.extend(samples);
        }
    };

    let stream = match config.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| push(&mut data.iter().copied()),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push(&mut data.iter().map(|&s| f32::from(s) / 32_768.0));
            },
            err_fn,
            None,
        ),
        SampleFormat::I32 => device.build_input_stream(
            &stream_config,
            move |data: &[i32], _: &cpal::InputCallbackInfo| {
                #[allow(clippy::cast_precision_loss)]
                push(&mut data.iter().map(|&s| s as f32 / 2_147_483_648.0));
            },
            err_fn,
            None,
        ),
        other => {
            return Err(VoiceError::InputStreamError(format!(
                "Unsupported sample format: {other:?}"
            )));
        }
    };

    stream.map_err(|e| VoiceError::InputStreamError(e.to_string()))
}

/// Average interleaved frames down to one channel.
fn downmix(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    let width = usize::from(channels);
    samples
        .chunks_exact(width)
        .map(|frame| frame.iter().sum::<f32>() / f32::from(channels))
        .collect()
}

/// FFT resampling in fixed 1024-frame chunks; the tail is zero-padded and
/// trimmed back to its proportional length.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, VoiceError> {
    const CHUNK: usize = 1024;

    if samples.is_empty() {
        return Ok(Vec::new());
    }
    let err = |e: &dyn std::fmt::Display| VoiceError::ResampleError(e.to_string());

    let mut resampler = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK, 2, 1)
        .map_err(|e| err(&e))?;

    let mut output = Vec::with_capacity(samples.len() * to_rate as usize / from_rate as usize + CHUNK);
    let mut chunks = samples.chunks_exact(CHUNK);
    for chunk in chunks.by_ref() {
        let result = resampler.process(&[chunk], None).map_err(|e| err(&e))?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut padded = vec![0.0f32; CHUNK];
        padded[..tail.len()].copy_from_slice(tail);
        let result = resampler.process(&[&padded], None).map_err(|e| err(&e))?;
        if let Some(channel) = result.first() {
            let wanted = (tail.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize;
            output.extend_from_slice(&channel[..wanted.min(channel.len())]);
        }
    }

    Ok(output)
}
