//! Command handlers.
//!
//! Handlers are thin: they take what bootstrap composed, call into
//! `coach-voice`, and format the result for the terminal.

pub mod assets;
pub mod credits;
pub mod devices;
pub mod run;
