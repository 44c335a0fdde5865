//! Console commands and the simulated game they drive.
//!
//! Each stdin line is one command. The simulated game stands in for the
//! real game loop: it owns the per-frame [`GameSnapshot`] and queues the
//! discrete [`GameEvent`]s the next frame reports.

use std::time::Duration;

use coach_voice::{DeathCause, GameEvent, GameSnapshot, ReflexCategory, duration_from_secs};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  score <n>            set the current score
  die pipe|ground      lose the round
  restart              start a new round (refused while the companion is busy)
  win                  report a win
  end                  end the session and quit
  reflex <category>    raise a reflex directly (pipe, ground, score, win, intro, outro)
  say <text>           synthesize and speak a reply
  listen [seconds]     open the microphone
  interrupt            cut the listening session short
  lm on|off            mark the language model busy or idle
  status               show busy state
  help                 show this list
  quit                 exit immediately";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Score(u32),
    Die(DeathCause),
    Restart,
    Win,
    End,
    Reflex(ReflexCategory),
    Say(String),
    Listen(Option<Duration>),
    Interrupt,
    LanguageModel(bool),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{command}' expects {expected}")]
    Usage {
        command: &'static str,
        expected: &'static str,
    },
}

impl ConsoleCommand {
    /// Parse one line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, ConsoleError> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match word.to_ascii_lowercase().as_str() {
            "" => return Ok(None),
            "score" => Self::Score(rest.parse().map_err(|_| usage("score", "a whole number"))?),
            "die" => Self::Die(match rest {
                "pipe" => DeathCause::Pipe,
                "ground" => DeathCause::Ground,
                _ => return Err(usage("die", "'pipe' or 'ground'")),
            }),
            "restart" => Self::Restart,
            "win" => Self::Win,
            "end" => Self::End,
            "reflex" => Self::Reflex(ReflexCategory::from_name(rest).ok_or_else(|| usage("reflex", "a category"))?),
            "say" if rest.is_empty() => return Err(usage("say", "some text")),
            "say" => Self::Say(rest.to_string()),
            "listen" if rest.is_empty() => Self::Listen(None),
            "listen" => {
                let secs: f32 = rest.parse().map_err(|_| usage("listen", "a duration in seconds"))?;
                let duration = duration_from_secs(secs).map_err(|_| usage("listen", "a positive duration"))?;
                Self::Listen(Some(duration))
            }
            "interrupt" => Self::Interrupt,
            "lm" => Self::LanguageModel(match rest {
                "on" => true,
                "off" => false,
                _ => return Err(usage("lm", "'on' or 'off'")),
            }),
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

const fn usage(command: &'static str, expected: &'static str) -> ConsoleError {
    ConsoleError::Usage { command, expected }
}

/// A stand-in for the game: score, lives and the events of the next frame.
#[derive(Debug, Clone)]
pub struct SimulatedGame {
    snapshot: GameSnapshot,
    events: Vec<GameEvent>,
}

impl Default for SimulatedGame {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGame {
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: GameSnapshot {
                is_alive: true,
                is_game_active: true,
                ..GameSnapshot::default()
            },
            events: Vec::new(),
        }
    }

    #[must_use]
    pub const fn snapshot(&self) -> &GameSnapshot {
        &self.snapshot
    }

    pub fn set_score(&mut self, score: u32) {
        self.snapshot.score = score;
    }

    /// End the round. Ignored when the bird is already down.
    pub fn die(&mut self, cause: DeathCause) -> bool {
        if !self.snapshot.is_alive {
            return false;
        }
        self.snapshot.is_alive = false;
        self.snapshot.is_game_active = false;
        self.snapshot.loss_count += 1;
        self.events.push(GameEvent::Died { cause });
        true
    }

    /// Start a new round, banking the score into the high score.
    pub fn restart(&mut self) {
        self.snapshot.high_score = self.snapshot.high_score.max(self.snapshot.score);
        self.snapshot.score = 0;
        self.snapshot.is_alive = true;
        self.snapshot.is_game_active = true;
    }

    pub fn win(&mut self) {
        self.events.push(GameEvent::Won);
    }

    pub fn end_session(&mut self) {
        self.events.push(GameEvent::SessionEnded);
    }

    /// Advance one frame, returning the events it reports.
    pub fn frame(&mut self) -> Vec<GameEvent> {
        if self.snapshot.is_alive {
            self.snapshot.ticks_played += 1;
        }
        std::mem::take(&mut self.events)
    }
}
