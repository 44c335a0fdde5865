//! Speaker output: the rodio-backed [`AudioChannelProvider`].
//!
//! `rodio::OutputStream` is `!Send` on some platforms (macOS CoreAudio,
//! etc.), so the stream and every `Sink` live on one dedicated OS thread.
//! [`SpeakerChannels`] is the `Send` proxy the registry holds; each call is
//! an [`OutputCommand`] plus, where needed, a reply channel.
//!
//! Each reserved channel maps to its own sink. Playing replaces the sink
//! wholesale, so a channel never holds more than one sound.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::mpsc;
use std::thread;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use crate::channel::{AudioChannelProvider, ChannelId};
use crate::error::VoiceError;
use crate::sounds::SoundHandle;

// ── Commands ───────────────────────────────────────────────────────

enum OutputCommand {
    Reserve {
        channel: ChannelId,
    },
    Play {
        channel: ChannelId,
        sound: SoundHandle,
        reply: mpsc::Sender<Result<(), VoiceError>>,
    },
    Stop {
        channel: ChannelId,
    },
    IsBusy {
        channel: ChannelId,
        reply: mpsc::Sender<bool>,
    },
    Shutdown,
}

// ── Handle ─────────────────────────────────────────────────────────

/// Handle to the speaker output thread.
pub struct SpeakerChannels {
    cmd_tx: mpsc::Sender<OutputCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SpeakerChannels {
    /// Open the default output device on a dedicated thread.
    pub fn open() -> Result<Self, VoiceError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<OutputCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), VoiceError>>();

        let thread = thread::Builder::new()
            .name("coach-audio-out".into())
            .spawn(move || run(&cmd_rx, &init_tx))
            .map_err(|e| VoiceError::OutputStreamError(format!("failed to spawn audio thread: {e}")))?;

        init_rx.recv().map_err(|_| VoiceError::AudioThreadDied)??;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }
}

impl AudioChannelProvider for SpeakerChannels {
    fn reserve(&mut self, channel: ChannelId) -> Result<(), VoiceError> {
        self.cmd_tx
            .send(OutputCommand::Reserve { channel })
            .map_err(|_| VoiceError::AudioThreadDied)
    }

    fn play(&mut self, channel: ChannelId, sound: &SoundHandle) -> Result<(), VoiceError> {
        let (reply, rx) = mpsc::channel();
        self.cmd_tx
            .send(OutputCommand::Play {
                channel,
                sound: sound.clone(),
                reply,
            })
            .map_err(|_| VoiceError::AudioThreadDied)?;
        rx.recv().map_err(|_| VoiceError::AudioThreadDied)?
    }

    fn stop(&mut self, channel: ChannelId) {
        let _ = self.cmd_tx.send(OutputCommand::Stop { channel });
    }

    fn is_busy(&self, channel: ChannelId) -> bool {
        let (reply, rx) = mpsc::channel();
        if self
            .cmd_tx
            .send(OutputCommand::IsBusy { channel, reply })
            .is_err()
        {
            return false;
        }
        rx.recv().unwrap_or(false)
    }
}

impl Drop for SpeakerChannels {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(OutputCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

// ── Output thread ──────────────────────────────────────────────────

/// Per-channel sinks. A key is present once the channel is reserved.
struct Mixer {
    handle: OutputStreamHandle,
    sinks: HashMap<ChannelId, Option<Sink>>,
}

impl Mixer {
    fn play(&mut self, channel: ChannelId, sound: &SoundHandle) -> Result<(), VoiceError> {
        let slot = self
            .sinks
            .get_mut(&channel)
            .ok_or(VoiceError::ChannelNotReserved(channel))?;

        if let Some(old) = slot.take() {
            old.stop();
        }

        let source = Decoder::new(Cursor::new(sound.shared_bytes())).map_err(|e| VoiceError::Decode {
            label: sound.label().to_string(),
            reason: e.to_string(),
        })?;
        let sink = Sink::try_new(&self.handle).map_err(|e| VoiceError::OutputStreamError(e.to_string()))?;
        sink.append(source);
        *slot = Some(sink);
        Ok(())
    }

    fn stop(&mut self, channel: ChannelId) {
        if let Some(sink) = self.sinks.get_mut(&channel).and_then(Option::take) {
            sink.stop();
            tracing::debug!(?channel, "Playback stopped");
        }
    }

    fn is_busy(&self, channel: ChannelId) -> bool {
        self.sinks
            .get(&channel)
            .and_then(Option::as_ref)
            .is_some_and(|sink| !sink.empty())
    }
}

fn run(cmd_rx: &mpsc::Receiver<OutputCommand>, init_tx: &mpsc::Sender<Result<(), VoiceError>>) {
    // The stream must outlive every sink created from its handle.
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = init_tx.send(Err(VoiceError::OutputStreamError(e.to_string())));
            return;
        }
    };
    if init_tx.send(Ok(())).is_err() {
        return;
    }
    tracing::info!("Audio output initialized on default device");

    let mut mixer = Mixer {
        handle,
        sinks: HashMap::new(),
    };

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            OutputCommand::Reserve { channel } => {
                mixer.sinks.entry(channel).or_insert(None);
            }
            OutputCommand::Play { channel, sound, reply } => {
                let _ = reply.send(mixer.play(channel, &sound));
            }
            OutputCommand::Stop { channel } => mixer.stop(channel),
            OutputCommand::IsBusy { channel, reply } => {
                let _ = reply.send(mixer.is_busy(channel));
            }
            OutputCommand::Shutdown => break,
        }
    }

    tracing::debug!("Audio output thread shutting down");
}
