//! Reflex sound bank: pre-recorded voice lines keyed by [`ReflexCategory`].
//!
//! The bank is resolved once at startup from a directory of mp3 files and is
//! immutable afterwards. Missing files are logged and skipped; a category
//! with no files simply has an empty pool.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::VoiceError;
use crate::reflex::ReflexCategory;

/// Extension shared by every file in the bank.
const SOUND_EXT: &str = "mp3";

// ── Sound handle ───────────────────────────────────────────────────

/// An encoded sound (mp3/wav bytes) ready to hand to a playback channel.
///
/// Cloning is cheap: the payload is reference-counted.
#[derive(Clone)]
pub struct SoundHandle {
    label: Arc<str>,
    bytes: Arc<[u8]>,
}

impl SoundHandle {
    /// Wrap an encoded payload under a human-readable label.
    pub fn from_bytes(label: impl Into<Arc<str>>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            label: label.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a sound file from disk. The label is the file name.
    pub fn load(path: &Path) -> Result<Self, VoiceError> {
        if !path.is_file() {
            return Err(VoiceError::ResourceMissing(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let label = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::from_bytes(label, bytes))
    }

    /// Human-readable label (file name or request description).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Shared payload, for decoders that need an owned `'static` reader.
    #[must_use]
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

impl fmt::Debug for SoundHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundHandle")
            .field("label", &self.label)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

// ── File layout ────────────────────────────────────────────────────

impl ReflexCategory {
    /// File names (without directory) that make up this category's pool.
    pub fn file_names(self) -> Vec<String> {
        let numbered = |prefix: &str, count: u32| {
            (1..=count)
                .map(|i| format!("{prefix}{i}.{SOUND_EXT}"))
                .collect::<Vec<_>>()
        };
        match self {
            Self::PipeLoss => numbered("pipe_loss_", 22),
            Self::GroundLoss => numbered("ground_loss_", 21),
            Self::HighScore => numbered("score_", 8),
            Self::Win => numbered("win_", 5),
            Self::Intro => vec![format!("intro_msg.{SOUND_EXT}")],
            Self::Outro => vec![format!("outro_msg.{SOUND_EXT}")],
        }
    }
}

// ── Sound bank ─────────────────────────────────────────────────────

/// Typed, immutable registry of reflex sound pools.
#[derive(Debug, Clone, Default)]
pub struct SoundBank {
    pools: HashMap<ReflexCategory, Vec<SoundHandle>>,
}

impl SoundBank {
    /// Load every category's pool from `dir`.
    ///
    /// Never fails: absent files are reported as [`VoiceError::ResourceMissing`]
    /// at `warn` level and skipped.
    pub fn load_dir(dir: &Path) -> Self {
        tracing::info!(dir = %dir.display(), "Loading reflex sound bank");

        let mut pools = HashMap::new();
        for category in ReflexCategory::ALL {
            let mut pool = Vec::new();
            for name in category.file_names() {
                match SoundHandle::load(&dir.join(&name)) {
                    Ok(sound) => pool.push(sound),
                    Err(e) => tracing::warn!(error = %e, "Skipping reflex sound"),
                }
            }
            if pool.is_empty() {
                tracing::warn!(?category, "No sounds loaded for category");
            }
            pools.insert(category, pool);
        }

        let bank = Self { pools };
        tracing::info!(total = bank.len(), "Reflex sound bank ready");
        bank
    }

    /// Build a bank from in-memory pools.
    pub fn from_pools(pools: impl IntoIterator<Item = (ReflexCategory, Vec<SoundHandle>)>) -> Self {
        Self {
            pools: pools.into_iter().collect(),
        }
    }

    /// The pool for `category` (empty when nothing was loaded).
    #[must_use]
    pub fn pool(&self, category: ReflexCategory) -> &[SoundHandle] {
        self.pools
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Pick one sound uniformly at random from the category's pool.
    pub fn pick<R: Rng + ?Sized>(&self, category: ReflexCategory, rng: &mut R) -> Option<&SoundHandle> {
        self.pool(category).choose(rng)
    }

    /// Pool sizes in category order.
    #[must_use]
    pub fn summary(&self) -> Vec<(ReflexCategory, usize)> {
        ReflexCategory::ALL
            .into_iter()
            .map(|c| (c, self.pool(c).len()))
            .collect()
    }

    /// Total number of loaded sounds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    /// Whether no sound at all was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
