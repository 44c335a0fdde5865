//! Assets command handler.
//!
//! Loads the reflex sound bank the way `run` would and reports how many
//! lines each category ended up with. Missing files are logged by the
//! loader and simply reduce the count.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use coach_voice::SoundBank;

/// Execute the assets command.
pub fn execute(dir: &Path) -> Result<()> {
    let bank = SoundBank::load_dir(dir);
    print!("{}", render(dir, &bank));
    Ok(())
}

fn render(dir: &Path, bank: &SoundBank) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Reflex sounds in {}", dir.display());
    for (category, loaded) in bank.summary() {
        let expected = category.file_names().len();
        let tier = format!("{:?}", category.tier());
        let _ = writeln!(out, "  {:<12} {:<9} {loaded:>2}/{expected}", format!("{category:?}"), tier);
    }
    if bank.is_empty() {
        let _ = writeln!(out, "No sounds found; reflexes will be dropped.");
    }
    out
}
