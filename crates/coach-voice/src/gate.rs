//! Echo gate: keeps the agent's own playback out of the microphone buffer.
//!
//! The flag has exactly one writer: the [`EchoGateWriter`] held by the
//! orchestrator, which mirrors the aggregate speaking signal once per tick.
//! Any number of [`EchoGate`] readers (the capture callback) may observe it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read side of the echo gate, cloned into capture callbacks.
#[derive(Debug, Clone)]
pub struct EchoGate {
    is_system_speaking: Arc<AtomicBool>,
}

/// The single write side of the echo gate. Not `Clone`.
#[derive(Debug)]
pub struct EchoGateWriter {
    is_system_speaking: Arc<AtomicBool>,
}

impl EchoGate {
    /// Create a gate (initially open) and its sole writer.
    #[must_use]
    pub fn new() -> (Self, EchoGateWriter) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Self {
                is_system_speaking: Arc::clone(&flag),
            },
            EchoGateWriter {
                is_system_speaking: flag,
            },
        )
    }

    /// Whether playback is currently audible and capture should discard input.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.is_system_speaking.load(Ordering::SeqCst)
    }
}

impl EchoGateWriter {
    /// Publish the current speaking state. Logs only on edges.
    pub fn set_speaking(&self, speaking: bool) {
        let previous = self.is_system_speaking.swap(speaking, Ordering::SeqCst);
        if previous != speaking {
            if speaking {
                tracing::debug!("Echo gate: agent audible, mic gated");
            } else {
                tracing::debug!("Echo gate: agent silent, mic open");
            }
        }
    }

    /// A reader bound to this writer's flag.
    #[must_use]
    pub fn reader(&self) -> EchoGate {
        EchoGate {
            is_system_speaking: Arc::clone(&self.is_system_speaking),
        }
    }
}
