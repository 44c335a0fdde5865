//! Reflex scheduler: instant, pre-recorded reactions to game events.
//!
//! ```text
//!   Idle ──accept──▶ Scheduled ──fire time, channel idle──▶ Playing ──channel drains──▶ Idle
//!                      │  ▲
//!                      │  └── outranking event replaces the pending one
//!                      └── channel busy at fire time ──▶ Idle (dropped, never queued)
//! ```
//!
//! At most one reflex is pending at a time. A queue would make reactions
//! stale by the time they play; instead a lower-priority pending line is
//! replaced by a higher-priority one and everything else is dropped.

use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::busy::BusySignal;
use crate::channel::{ChannelId, ChannelRegistry};
use crate::config::ReflexConfig;
use crate::sounds::{SoundBank, SoundHandle};

// ── Categories and tiers ───────────────────────────────────────────

/// Preemption tier. Ordering is significant: `Critical > Normal > System`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityTier {
    /// Intro/outro lines.
    System,
    /// Achievements.
    Normal,
    /// Causes of death.
    Critical,
}

impl PriorityTier {
    /// Whether an incoming event of this tier replaces a pending one of tier `pending`.
    ///
    /// Higher tiers replace lower ones, and a newer death replaces an older
    /// pending death: the freshest loss is what the player just saw.
    #[must_use]
    pub fn preempts(self, pending: Self) -> bool {
        self > pending || (self == Self::Critical && pending == Self::Critical)
    }
}

/// Kind of game event that has a reflex voice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflexCategory {
    PipeLoss,
    GroundLoss,
    HighScore,
    Win,
    Intro,
    Outro,
}

impl ReflexCategory {
    /// Every category.
    pub const ALL: [Self; 6] = [
        Self::PipeLoss,
        Self::GroundLoss,
        Self::HighScore,
        Self::Win,
        Self::Intro,
        Self::Outro,
    ];

    /// Priority tier of this category.
    #[must_use]
    pub const fn tier(self) -> PriorityTier {
        match self {
            Self::PipeLoss | Self::GroundLoss => PriorityTier::Critical,
            Self::HighScore | Self::Win => PriorityTier::Normal,
            Self::Intro | Self::Outro => PriorityTier::System,
        }
    }

    /// Parse the snake-case name used on the console and in config files.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pipe_loss" | "pipe" => Some(Self::PipeLoss),
            "ground_loss" | "ground" => Some(Self::GroundLoss),
            "high_score" | "score" => Some(Self::HighScore),
            "win" => Some(Self::Win),
            "intro" => Some(Self::Intro),
            "outro" => Some(Self::Outro),
            _ => None,
        }
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// A game trigger resolved to a concrete sound. Transient, never persisted.
#[derive(Debug, Clone)]
pub struct ReflexEvent {
    pub category: ReflexCategory,
    pub tier: PriorityTier,
    pub sound: SoundHandle,
}

impl ReflexEvent {
    /// Build an event; the tier follows from the category.
    #[must_use]
    pub const fn new(category: ReflexCategory, sound: SoundHandle) -> Self {
        Self {
            category,
            tier: category.tier(),
            sound,
        }
    }
}

/// The single accepted-but-not-yet-playing reflex.
#[derive(Debug, Clone)]
pub struct PendingReflex {
    pub event: ReflexEvent,
    pub fire_at: Instant,
}

/// Externally visible scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflexState {
    Idle,
    Scheduled,
    Playing,
}

/// Why an event did not get scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Generated speech is playing, being fetched, or the language model is busy.
    AgentBusy,
    /// The reflex channel is already playing a line.
    ChannelBusy,
    /// Another reflex of equal or higher priority is already pending.
    AlreadyPending,
    /// The category's sound pool is empty.
    NoSound,
}

/// Result of offering an event to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflexDecision {
    /// Accepted into an empty slot.
    Scheduled { delay: Duration },
    /// Accepted by replacing a lower-priority pending reflex.
    Preempted {
        replaced: ReflexCategory,
        delay: Duration,
    },
    /// Dropped silently.
    Dropped(DropReason),
}

impl ReflexDecision {
    /// Whether the event now occupies the pending slot.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        !matches!(self, Self::Dropped(_))
    }
}

// ── Scheduler ──────────────────────────────────────────────────────

#[derive(Debug)]
enum Slot {
    Idle,
    Scheduled(PendingReflex),
    Playing(ReflexCategory),
}

/// Maps game events to reflex sounds and decides when they may sound.
pub struct ReflexScheduler {
    bank: SoundBank,
    delay_ms: RangeInclusive<u64>,
    rng: StdRng,
    slot: Slot,
}

impl ReflexScheduler {
    /// Create a scheduler with an entropy-seeded RNG.
    #[must_use]
    pub fn new(bank: SoundBank, config: &ReflexConfig) -> Self {
        Self::with_rng(bank, config, StdRng::from_entropy())
    }

    /// Create a scheduler with a fixed seed (deterministic delays and picks).
    #[must_use]
    pub fn with_seed(bank: SoundBank, config: &ReflexConfig, seed: u64) -> Self {
        Self::with_rng(bank, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(bank: SoundBank, config: &ReflexConfig, rng: StdRng) -> Self {
        Self {
            bank,
            delay_ms: config.delay_window_ms(),
            rng,
            slot: Slot::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ReflexState {
        match self.slot {
            Slot::Idle => ReflexState::Idle,
            Slot::Scheduled(_) => ReflexState::Scheduled,
            Slot::Playing(_) => ReflexState::Playing,
        }
    }

    /// The pending reflex, if one is scheduled.
    #[must_use]
    pub const fn pending(&self) -> Option<&PendingReflex> {
        match &self.slot {
            Slot::Scheduled(pending) => Some(pending),
            _ => None,
        }
    }

    /// Whether a reflex is scheduled but has not fired yet.
    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        matches!(self.slot, Slot::Scheduled(_))
    }

    /// The sound bank this scheduler draws from.
    #[must_use]
    pub const fn bank(&self) -> &SoundBank {
        &self.bank
    }

    /// Resolve `category` to a random sound from its pool and offer it.
    pub fn accept_category(
        &mut self,
        category: ReflexCategory,
        busy: &BusySignal,
        now: Instant,
    ) -> ReflexDecision {
        let Some(sound) = self.bank.pick(category, &mut self.rng).cloned() else {
            tracing::warn!(?category, "No reflex sound available");
            return ReflexDecision::Dropped(DropReason::NoSound);
        };
        self.accept_event(ReflexEvent::new(category, sound), busy, now)
    }

    /// Offer an event to the scheduler.
    ///
    /// Rules, in order:
    /// 1. generated speech (or a busy language model) rejects everything;
    /// 2. a pending reflex is replaced only by an event that preempts it;
    /// 3. a busy reflex channel drops the event;
    /// 4. otherwise the event is scheduled after a random reaction delay.
    pub fn accept_event(
        &mut self,
        event: ReflexEvent,
        busy: &BusySignal,
        now: Instant,
    ) -> ReflexDecision {
        let category = event.category;

        if busy.blocks_reflex() {
            tracing::debug!(?category, "Reflex rejected: agent speech in progress");
            return ReflexDecision::Dropped(DropReason::AgentBusy);
        }

        if let Slot::Scheduled(pending) = &self.slot {
            let pending_category = pending.event.category;
            if !event.tier.preempts(pending.event.tier) {
                tracing::debug!(?category, pending = ?pending_category, "Reflex dropped: one already pending");
                return ReflexDecision::Dropped(DropReason::AlreadyPending);
            }
            let delay = self.schedule(event, now);
            tracing::info!(?category, replaced = ?pending_category, delay_ms = delay.as_millis(), "Reflex preempted pending line");
            return ReflexDecision::Preempted {
                replaced: pending_category,
                delay,
            };
        }

        if busy.reflex_channel_busy {
            tracing::debug!(?category, "Reflex dropped: channel busy");
            return ReflexDecision::Dropped(DropReason::ChannelBusy);
        }

        let delay = self.schedule(event, now);
        tracing::info!(?category, delay_ms = delay.as_millis(), "Reflex scheduled");
        ReflexDecision::Scheduled { delay }
    }

    /// Advance the state machine. Returns the category that started playing.
    ///
    /// `agent_speaking` is whether the agent-speech channel is audible; a
    /// reflex never starts on top of it.
    pub fn tick(
        &mut self,
        now: Instant,
        channels: &mut ChannelRegistry,
        agent_speaking: bool,
    ) -> Option<ReflexCategory> {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Idle => None,
            Slot::Playing(category) => {
                if channels.is_busy(ChannelId::Reflex) {
                    self.slot = Slot::Playing(category);
                } else {
                    tracing::debug!(?category, "Reflex finished");
                }
                None
            }
            Slot::Scheduled(pending) if now < pending.fire_at => {
                self.slot = Slot::Scheduled(pending);
                None
            }
            Slot::Scheduled(pending) => {
                let category = pending.event.category;
                if channels.is_busy(ChannelId::Reflex) || agent_speaking {
                    tracing::debug!(?category, "Reflex dropped at fire time: channel occupied");
                    return None;
                }
                if channels.play(ChannelId::Reflex, Some(&pending.event.sound)) {
                    self.slot = Slot::Playing(category);
                    Some(category)
                } else {
                    None
                }
            }
        }
    }

    fn schedule(&mut self, event: ReflexEvent, now: Instant) -> Duration {
        let delay = Duration::from_millis(self.rng.gen_range(self.delay_ms.clone()));
        self.slot = Slot::Scheduled(PendingReflex {
            event,
            fire_at: now + delay,
        });
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sound(label: &str) -> SoundHandle {
        SoundHandle::from_bytes(label, vec![0u8; 8])
    }

    fn scheduler() -> ReflexScheduler {
        let bank = SoundBank::from_pools(
            ReflexCategory::ALL.map(|c| (c, vec![sound(&format!("{c:?}"))])),
        );
        ReflexScheduler::with_seed(bank, &ReflexConfig::default(), 11)
    }

    fn idle() -> BusySignal {
        BusySignal::default()
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(PriorityTier::Critical > PriorityTier::Normal);
        assert!(PriorityTier::Normal > PriorityTier::System);
    }

    #[test]
    fn preemption_rule() {
        use PriorityTier::{Critical, Normal, System};
        assert!(Critical.preempts(Normal));
        assert!(Critical.preempts(System));
        assert!(Critical.preempts(Critical));
        assert!(Normal.preempts(System));
        assert!(!Normal.preempts(Normal));
        assert!(!Normal.preempts(Critical));
        assert!(!System.preempts(System));
    }

    #[test]
    fn categories_map_to_tiers() {
        assert_eq!(ReflexCategory::PipeLoss.tier(), PriorityTier::Critical);
        assert_eq!(ReflexCategory::GroundLoss.tier(), PriorityTier::Critical);
        assert_eq!(ReflexCategory::HighScore.tier(), PriorityTier::Normal);
        assert_eq!(ReflexCategory::Win.tier(), PriorityTier::Normal);
        assert_eq!(ReflexCategory::Intro.tier(), PriorityTier::System);
        assert_eq!(ReflexCategory::Outro.tier(), PriorityTier::System);
    }

    #[test]
    fn category_names_parse() {
        assert_eq!(ReflexCategory::from_name("pipe-loss"), Some(ReflexCategory::PipeLoss));
        assert_eq!(ReflexCategory::from_name("SCORE"), Some(ReflexCategory::HighScore));
        assert_eq!(ReflexCategory::from_name("nope"), None);
    }

    #[test]
    fn delay_is_within_reaction_window() {
        let now = Instant::now();
        for seed in 0..50 {
            let mut s = ReflexScheduler::with_seed(
                SoundBank::from_pools([(ReflexCategory::Win, vec![sound("w")])]),
                &ReflexConfig::default(),
                seed,
            );
            let ReflexDecision::Scheduled { delay } =
                s.accept_category(ReflexCategory::Win, &idle(), now)
            else {
                panic!("expected scheduled");
            };
            assert!(delay >= Duration::from_millis(200), "{delay:?}");
            assert!(delay <= Duration::from_millis(500), "{delay:?}");
            assert_eq!(s.pending().unwrap().fire_at, now + delay);
        }
    }

    #[test]
    fn agent_busy_rejects_even_critical() {
        let mut s = scheduler();
        let busy = BusySignal {
            generating: true,
            ..BusySignal::default()
        };
        let decision = s.accept_category(ReflexCategory::PipeLoss, &busy, Instant::now());
        assert_eq!(decision, ReflexDecision::Dropped(DropReason::AgentBusy));
        assert_eq!(s.state(), ReflexState::Idle);
    }

    #[test]
    fn language_model_busy_rejects() {
        let mut s = scheduler();
        let busy = BusySignal {
            language_model_busy: true,
            ..BusySignal::default()
        };
        let decision = s.accept_category(ReflexCategory::Win, &busy, Instant::now());
        assert_eq!(decision, ReflexDecision::Dropped(DropReason::AgentBusy));
    }

    #[test]
    fn busy_channel_drops_new_event() {
        let mut s = scheduler();
        let busy = BusySignal {
            reflex_channel_busy: true,
            ..BusySignal::default()
        };
        let decision = s.accept_category(ReflexCategory::GroundLoss, &busy, Instant::now());
        assert_eq!(decision, ReflexDecision::Dropped(DropReason::ChannelBusy));
    }

    #[test]
    fn critical_replaces_pending_normal() {
        let mut s = scheduler();
        let now = Instant::now();
        assert!(s.accept_category(ReflexCategory::HighScore, &idle(), now).is_accepted());

        let decision = s.accept_category(ReflexCategory::PipeLoss, &idle(), now);
        assert!(matches!(
            decision,
            ReflexDecision::Preempted {
                replaced: ReflexCategory::HighScore,
                ..
            }
        ));
        assert_eq!(s.pending().unwrap().event.category, ReflexCategory::PipeLoss);
    }

    #[test]
    fn normal_does_not_replace_pending_critical() {
        let mut s = scheduler();
        let now = Instant::now();
        s.accept_category(ReflexCategory::GroundLoss, &idle(), now);
        let decision = s.accept_category(ReflexCategory::Win, &idle(), now);
        assert_eq!(decision, ReflexDecision::Dropped(DropReason::AlreadyPending));
        assert_eq!(s.pending().unwrap().event.category, ReflexCategory::GroundLoss);
    }

    #[test]
    fn equal_normal_tier_is_dropped() {
        let mut s = scheduler();
        let now = Instant::now();
        s.accept_category(ReflexCategory::HighScore, &idle(), now);
        let decision = s.accept_category(ReflexCategory::Win, &idle(), now);
        assert_eq!(decision, ReflexDecision::Dropped(DropReason::AlreadyPending));
    }

    #[test]
    fn empty_pool_is_dropped() {
        let mut s = ReflexScheduler::with_seed(SoundBank::default(), &ReflexConfig::default(), 1);
        let decision = s.accept_category(ReflexCategory::Outro, &idle(), Instant::now());
        assert_eq!(decision, ReflexDecision::Dropped(DropReason::NoSound));
    }
}
