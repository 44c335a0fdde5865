//! Credits command handler.
//!
//! Asks ElevenLabs how much of the account's character quota is left, so a
//! session is not started on an account that is about to run dry.

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use coach_voice::ElevenLabsConfig;
use coach_voice::elevenlabs::CreditUsage;

use crate::bootstrap::elevenlabs_client;

const SECS_PER_DAY: i64 = 86_400;

/// Execute the credits command.
pub async fn execute(config: &ElevenLabsConfig) -> Result<()> {
    let client = elevenlabs_client(config)?;
    let usage = client.credits().await.context("Failed to check credits")?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
    print!("{}", render(&usage, now));
    Ok(())
}

fn render(usage: &CreditUsage, now_unix: i64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ElevenLabs credits");
    let _ = writeln!(out, "  Used:      {:>10}", usage.used);
    let _ = writeln!(out, "  Limit:     {:>10}", usage.limit);
    let _ = writeln!(out, "  Remaining: {:>10}", usage.remaining());
    if let Some(reset) = usage.resets_at {
        let days = (reset - now_unix).max(0) / SECS_PER_DAY;
        let _ = writeln!(out, "  Resets in: {days:>10} days");
    }
    if usage.is_low() {
        let _ = writeln!(out, "Warning: running low on credits; speech may start failing.");
    } else {
        let _ = writeln!(out, "Plenty of credits left.");
    }
    out
}
