//! Run command handler.
//!
//! Simulates a game session: a 60 Hz frame loop drives the simulated game
//! and the orchestrator, while stdin lines change the game or poke the voice
//! subsystem directly. Player transcripts are printed in the framing the
//! conversation logic would receive them in.

use std::time::{Duration, Instant};

use anyhow::Result;
use coach_voice::config::TriggerConfig;
use coach_voice::{
    CoachAction, GameWatcher, Orchestrator, SessionOutcome, SpeechDecision, SpeechOutcome, TickReport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{MissedTickBehavior, interval};

use crate::bootstrap::CoachContext;
use crate::console::{ConsoleCommand, HELP, SimulatedGame};

const FRAME: Duration = Duration::from_micros(16_667);

/// Whether the session keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// A simulated game wired to the voice orchestrator.
pub struct Session {
    orchestrator: Orchestrator,
    watcher: GameWatcher,
    game: SimulatedGame,
    ending: bool,
}

impl Session {
    #[must_use]
    pub fn new(orchestrator: Orchestrator, triggers: TriggerConfig) -> Self {
        Self {
            orchestrator,
            watcher: GameWatcher::new(triggers),
            game: SimulatedGame::new(),
            ending: false,
        }
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    #[must_use]
    pub const fn game(&self) -> &SimulatedGame {
        &self.game
    }

    #[must_use]
    pub const fn watcher(&self) -> &GameWatcher {
        &self.watcher
    }

    /// Handle one console line.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Flow {
        match ConsoleCommand::parse(line) {
            Ok(Some(command)) => self.apply(command, now),
            Ok(None) => Flow::Continue,
            Err(e) => {
                println!("{e}");
                Flow::Continue
            }
        }
    }

    /// Advance the game and the voice subsystem by one frame.
    pub fn frame(&mut self, now: Instant) -> Flow {
        let events = self.game.frame();
        let snapshot = *self.game.snapshot();

        for action in self
            .orchestrator
            .follow_game(&mut self.watcher, &snapshot, &events, now)
        {
            match action {
                CoachAction::Reflex(category) => println!("[coach] reacting: {category:?}"),
                CoachAction::Listen(duration) => {
                    println!("[coach] listening for {:.1}s", duration.as_secs_f32());
                }
            }
        }

        let report = self.orchestrator.tick(now);
        self.print_report(report);

        if self.ending && !self.orchestrator.is_occupied() {
            Flow::Quit
        } else {
            Flow::Continue
        }
    }

    /// Silence the speaker and microphone.
    pub fn shutdown(&mut self) {
        self.orchestrator.shutdown();
    }

    fn apply(&mut self, command: ConsoleCommand, now: Instant) -> Flow {
        match command {
            ConsoleCommand::Score(score) => self.game.set_score(score),
            ConsoleCommand::Die(cause) => {
                if !self.game.die(cause) {
                    println!("already down; 'restart' first");
                }
            }
            ConsoleCommand::Restart => {
                if self.orchestrator.is_occupied() {
                    println!("companion is busy; try again in a moment");
                } else {
                    self.game.restart();
                }
            }
            ConsoleCommand::Win => self.game.win(),
            ConsoleCommand::End => {
                self.game.end_session();
                self.ending = true;
            }
            ConsoleCommand::Reflex(category) => {
                let decision = self.orchestrator.raise(category, now);
                println!("{category:?}: {decision:?}");
            }
            ConsoleCommand::Say(text) => match self.orchestrator.request_speech(&text, now) {
                SpeechDecision::Started => println!("[coach] synthesizing..."),
                SpeechDecision::Rejected(reason) => println!("not speaking: {reason:?}"),
            },
            ConsoleCommand::Listen(duration) => {
                let started = match duration {
                    Some(duration) => self.orchestrator.start_listening(duration, now),
                    None => self.orchestrator.start_listening_default(now),
                };
                match started {
                    Ok(()) => println!("[coach] listening..."),
                    Err(reason) => println!("not listening: {reason:?}"),
                }
            }
            ConsoleCommand::Interrupt => {
                if !self.orchestrator.interrupt_listening() {
                    println!("not listening");
                }
            }
            ConsoleCommand::LanguageModel(busy) => self.orchestrator.set_language_model_busy(busy),
            ConsoleCommand::Status => self.print_status(now),
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn print_report(&mut self, report: TickReport) {
        if let Some(category) = report.reflex_played {
            println!("[coach] ♪ {category:?}");
        }

        match report.speech {
            Some(SpeechOutcome::Spoken { text }) => println!("[coach] says: {text}"),
            Some(SpeechOutcome::Failed { error, .. }) => println!("[coach] speech failed: {error}"),
            Some(SpeechOutcome::Unplayable { .. }) => println!("[coach] speech audio could not be played"),
            Some(SpeechOutcome::Stale { age, .. }) => {
                println!("[coach] speech arrived {:.1}s late; dropped", age.as_secs_f32());
            }
            None => {}
        }

        match report.listening {
            Some(SessionOutcome::Transcribed(_)) => {
                if let Some(text) = self.orchestrator.take_transcript() {
                    println!("{}", self.game.snapshot().utterance_context(&text));
                }
            }
            Some(SessionOutcome::Silent) => println!("[coach] heard nothing"),
            Some(SessionOutcome::Interrupted) => println!("[coach] stopped listening"),
            Some(SessionOutcome::Failed(reason)) => println!("[coach] listening failed: {reason}"),
            None => {}
        }
    }

    fn print_status(&mut self, now: Instant) {
        let signal = self.orchestrator.busy_signal(now);
        let snapshot = self.game.snapshot();
        println!(
            "game: score {} (best {}), losses {}, {}",
            snapshot.score,
            snapshot.high_score,
            snapshot.loss_count,
            if snapshot.is_alive { "playing" } else { "game over" }
        );
        println!(
            "coach: enabled {}, reflex {:?}, speech {:?}, listening {}",
            self.watcher.agent_enabled(),
            self.orchestrator.reflex_state(),
            self.orchestrator.speech_state(),
            self.orchestrator.is_listening()
        );
        println!("busy: {signal:?}");
    }
}

/// Execute the run command.
pub async fn execute(ctx: CoachContext) -> Result<()> {
    let CoachContext { config, orchestrator } = ctx;
    let mut session = Session::new(orchestrator, config.triggers);

    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = interval(FRAME);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let flow = tokio::select! {
            _ = ticker.tick() => session.frame(Instant::now()),
            line = lines.next_line() => match line? {
                Some(line) => session.handle_line(&line, Instant::now()),
                None => {
                    tracing::info!("stdin closed; ending session");
                    Flow::Quit
                }
            },
        };
        if flow == Flow::Quit {
            break;
        }
    }

    session.shutdown();
    Ok(())
}
