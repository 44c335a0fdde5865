//! CLI bootstrap - the composition root.
//!
//! The only place the real devices and the remote provider are wired into
//! the voice subsystem:
//! - speaker output (rodio, via `SpeakerChannels`)
//! - microphone capture (cpal, gated by the orchestrator's echo flag)
//! - ElevenLabs synthesis and transcription
//! - the reflex sound bank on disk

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use coach_voice::capture::CpalMicrophone;
use coach_voice::config::TriggerConfig;
use coach_voice::elevenlabs::ElevenLabsClient;
use coach_voice::playback::SpeakerChannels;
use coach_voice::{CoachConfig, EchoGate, ElevenLabsConfig, Orchestrator, OrchestratorParts, SoundBank};
use tokio::runtime::Handle;

/// Bootstrap settings gathered from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub assets_dir: Option<PathBuf>,
    pub seed: Option<u64>,
    pub eager: bool,
}

impl CliConfig {
    /// Environment-derived voice settings with the command-line overrides applied.
    #[must_use]
    pub fn coach_config(&self) -> CoachConfig {
        self.apply(CoachConfig::from_env())
    }

    fn apply(&self, mut config: CoachConfig) -> CoachConfig {
        if let Some(dir) = &self.assets_dir {
            config = config.with_assets_dir(dir.clone());
        }
        if self.eager {
            let triggers = TriggerConfig {
                enable_after_losses: 1,
                enable_after_ticks: 0,
                ..config.triggers
            };
            config = config.with_triggers(triggers);
        }
        config
    }
}

/// Everything a `run` session needs.
pub struct CoachContext {
    pub config: CoachConfig,
    pub orchestrator: Orchestrator,
}

/// Build the ElevenLabs client, failing early when no key is configured.
pub fn elevenlabs_client(config: &ElevenLabsConfig) -> Result<ElevenLabsClient> {
    ensure!(
        config.has_api_key(),
        "ElevenLabs is not configured (set ELEVENLABS_API_KEY)"
    );
    ElevenLabsClient::new(config).context("Failed to build the ElevenLabs client")
}

/// Open the devices and build the orchestrator.
pub fn bootstrap(cli: &CliConfig) -> Result<CoachContext> {
    let config = cli.coach_config();

    let client = Arc::new(elevenlabs_client(&config.elevenlabs)?);
    let speaker = SpeakerChannels::open().context("Failed to open the speaker")?;
    let sounds = SoundBank::load_dir(&config.assets_dir);

    let (gate, echo) = EchoGate::new();
    let microphone = Arc::new(CpalMicrophone::new(gate));

    let parts = OrchestratorParts {
        channels: Box::new(speaker),
        sounds,
        synthesizer: client.clone(),
        transcriber: client,
        microphone,
        reflex_seed: cli.seed,
    };
    let orchestrator = Orchestrator::build(&config, parts, echo, &Handle::current())
        .context("Failed to build the voice orchestrator")?;

    tracing::info!(
        voice = config.elevenlabs.voice_id(),
        assets = %config.assets_dir.display(),
        "Voice subsystem ready"
    );

    Ok(CoachContext { config, orchestrator })
}
