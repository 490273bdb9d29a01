//! `autograder summary` — roster statistics without running anything.

use anyhow::{Context, Result};
use autograder::roster::{JsonRoster, RosterStore, grade_distribution};
use autograder::ui;
use std::path::Path;

pub fn cmd_summary(roster: &Path) -> Result<()> {
    let store = JsonRoster::open(roster)
        .with_context(|| format!("Failed to open roster {}", roster.display()))?;
    ui::print_summary(&store.summary_stats());

    let grades: Vec<u32> = store
        .records()
        .iter()
        .filter(|r| r.processed_at.is_some())
        .map(|r| r.grade)
        .collect();
    match grade_distribution(&grades) {
        Some(dist) => ui::print_distribution(&dist),
        None => println!("No students have been graded yet"),
    }
    Ok(())
}
