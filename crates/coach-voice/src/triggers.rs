//! Game-state triggers: which reflex to raise and when to listen.
//!
//! The game hands the watcher one [`GameSnapshot`] per frame plus whatever
//! discrete [`GameEvent`]s happened during that frame. The watcher answers
//! with [`CoachAction`]s for the orchestrator to attempt; the arbitration
//! rules downstream decide whether they actually happen.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::busy::BusySignal;
use crate::config::TriggerConfig;
use crate::reflex::ReflexCategory;

/// What the bird hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Pipe,
    Ground,
}

impl DeathCause {
    #[must_use]
    pub const fn reflex(self) -> ReflexCategory {
        match self {
            Self::Pipe => ReflexCategory::PipeLoss,
            Self::Ground => ReflexCategory::GroundLoss,
        }
    }
}

/// Per-frame view of the game, read but never written here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub score: u32,
    pub high_score: u32,
    pub loss_count: u32,
    pub is_alive: bool,
    pub is_game_active: bool,
    pub ticks_played: u64,
}

impl GameSnapshot {
    /// Frame a player utterance for the conversation logic.
    ///
    /// `[Event: death, Score: 7] User said: "so close"`
    #[must_use]
    pub fn utterance_context(&self, text: &str) -> String {
        let event = if self.loss_count > 0 { "death" } else { "playing" };
        format!("[Event: {event}, Score: {}] User said: \"{text}\"", self.score)
    }
}

/// Something that happened during the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    Died { cause: DeathCause },
    Won,
    SessionEnded,
}

/// What the companion should try to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoachAction {
    Reflex(ReflexCategory),
    Listen(Duration),
}

/// Tracks agent enablement and per-death listening.
#[derive(Debug, Clone)]
pub struct GameWatcher {
    config: TriggerConfig,
    agent_enabled: bool,
    listened_for_loss: Option<u32>,
}

impl GameWatcher {
    #[must_use]
    pub const fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            agent_enabled: false,
            listened_for_loss: None,
        }
    }

    /// Whether the companion has introduced itself and is reacting.
    #[must_use]
    pub const fn agent_enabled(&self) -> bool {
        self.agent_enabled
    }

    /// Decide this frame's actions. Reflexes are ordered so that a loss is
    /// raised after the high-score line it should preempt.
    pub fn observe(&mut self, snapshot: &GameSnapshot, events: &[GameEvent], busy: &BusySignal) -> Vec<CoachAction> {
        let mut actions = Vec::new();

        if self.agent_enabled {
            for event in events {
                match *event {
                    GameEvent::Died { cause } => {
                        if snapshot.score > 0 && snapshot.score >= snapshot.high_score {
                            actions.push(CoachAction::Reflex(ReflexCategory::HighScore));
                        }
                        actions.push(CoachAction::Reflex(cause.reflex()));
                    }
                    GameEvent::Won => actions.push(CoachAction::Reflex(ReflexCategory::Win)),
                    GameEvent::SessionEnded => actions.push(CoachAction::Reflex(ReflexCategory::Outro)),
                }
            }
        }

        if !self.agent_enabled
            && !snapshot.is_alive
            && snapshot.loss_count >= self.config.enable_after_losses
            && snapshot.ticks_played >= self.config.enable_after_ticks
        {
            self.agent_enabled = true;
            tracing::info!(losses = snapshot.loss_count, ticks = snapshot.ticks_played, "Companion enabled");
            actions.push(CoachAction::Reflex(ReflexCategory::Intro));
        }

        let on_game_over = !snapshot.is_game_active && !snapshot.is_alive && snapshot.loss_count > 0;
        if self.agent_enabled
            && on_game_over
            && self.listened_for_loss != Some(snapshot.loss_count)
            && !busy.is_occupied()
        {
            actions.push(CoachAction::Listen(self.config.listen_duration));
        }

        actions
    }

    /// Record that a session was opened for the game-over screen of loss
    /// number `loss_count`, so it is not opened again.
    pub fn mark_listened(&mut self, loss_count: u32) {
        self.listened_for_loss = Some(loss_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TriggerConfig {
        TriggerConfig::default()
    }

    fn dead(loss_count: u32, score: u32, high_score: u32) -> GameSnapshot {
        GameSnapshot {
            score,
            high_score,
            loss_count,
            is_alive: false,
            is_game_active: false,
            ticks_played: 500,
        }
    }

    fn enabled_watcher() -> GameWatcher {
        let mut watcher = GameWatcher::new(config());
        watcher.observe(&dead(2, 0, 3), &[], &BusySignal::default());
        assert!(watcher.agent_enabled());
        watcher.mark_listened(2);
        watcher
    }

    #[test]
    fn utterance_context_frames_event_and_score() {
        let snapshot = GameSnapshot {
            score: 7,
            loss_count: 1,
            ..GameSnapshot::default()
        };
        assert_eq!(
            snapshot.utterance_context("so close"),
            r#"[Event: death, Score: 7] User said: "so close""#
        );
        assert!(GameSnapshot::default().utterance_context("hi").starts_with("[Event: playing, Score: 0]"));
    }

    #[test]
    fn silent_until_enabled() {
        let mut watcher = GameWatcher::new(config());
        let actions = watcher.observe(
            &dead(1, 4, 4),
            &[GameEvent::Died { cause: DeathCause::Pipe }],
            &BusySignal::default(),
        );
        assert!(actions.is_empty());
        assert!(!watcher.agent_enabled());
    }

    #[test]
    fn enables_once_with_intro() {
        let mut watcher = GameWatcher::new(config());
        let actions = watcher.observe(&dead(2, 0, 1), &[], &BusySignal::default());
        assert_eq!(actions[0], CoachAction::Reflex(ReflexCategory::Intro));

        let again = watcher.observe(&dead(2, 0, 1), &[], &BusySignal::default());
        assert!(!again.contains(&CoachAction::Reflex(ReflexCategory::Intro)));
    }

    #[test]
    fn enablement_waits_for_ticks() {
        let mut watcher = GameWatcher::new(config());
        let early = GameSnapshot {
            ticks_played: 99,
            ..dead(5, 0, 0)
        };
        assert!(watcher.observe(&early, &[], &BusySignal::default()).is_empty());
    }

    #[test]
    fn high_score_death_raises_score_then_loss() {
        let mut watcher = enabled_watcher();
        let actions = watcher.observe(
            &dead(3, 9, 9),
            &[GameEvent::Died { cause: DeathCause::Ground }],
            &BusySignal { reflex_scheduled: true, ..BusySignal::default() },
        );
        assert_eq!(
            actions,
            vec![
                CoachAction::Reflex(ReflexCategory::HighScore),
                CoachAction::Reflex(ReflexCategory::GroundLoss),
            ]
        );
    }

    #[test]
    fn ordinary_death_raises_loss_only() {
        let mut watcher = enabled_watcher();
        let actions = watcher.observe(
            &dead(3, 2, 9),
            &[GameEvent::Died { cause: DeathCause::Pipe }],
            &BusySignal { reflex_scheduled: true, ..BusySignal::default() },
        );
        assert_eq!(actions, vec![CoachAction::Reflex(ReflexCategory::PipeLoss)]);
    }

    #[test]
    fn listens_once_per_death_when_idle() {
        let mut watcher = enabled_watcher();
        let idle = BusySignal::default();

        let busy = BusySignal { reflex_channel_busy: true, ..idle };
        assert!(watcher.observe(&dead(3, 0, 9), &[], &busy).is_empty());

        let actions = watcher.observe(&dead(3, 0, 9), &[], &idle);
        assert_eq!(actions, vec![CoachAction::Listen(Duration::from_millis(3_500))]);

        watcher.mark_listened(3);
        assert!(watcher.observe(&dead(3, 0, 9), &[], &idle).is_empty());
        assert_eq!(watcher.observe(&dead(4, 0, 9), &[], &idle).len(), 1);
    }

    #[test]
    fn never_listens_mid_round() {
        let mut watcher = enabled_watcher();
        let playing = GameSnapshot {
            is_alive: true,
            is_game_active: true,
            ..dead(3, 1, 9)
        };
        assert!(watcher.observe(&playing, &[], &BusySignal::default()).is_empty());
    }

    #[test]
    fn win_and_session_end_map_to_reflexes() {
        let mut watcher = enabled_watcher();
        let busy = BusySignal { listening: true, ..BusySignal::default() };
        let actions = watcher.observe(&dead(2, 0, 3), &[GameEvent::Won, GameEvent::SessionEnded], &busy);
        assert_eq!(
            actions,
            vec![
                CoachAction::Reflex(ReflexCategory::Win),
                CoachAction::Reflex(ReflexCategory::Outro),
            ]
        );
    }
}
