//! `autograder run` — grade a roster end to end.

use anyhow::{Context, Result};
use autograder::config::Config;
use autograder::pipeline::{ChannelSink, RunOptions, RunSession, RunState};
use autograder::requirements::RequirementSpec;
use autograder::roster::{JsonRoster, grade_distribution};
use autograder::ui::{self, GradingUI};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct RunArgs {
    pub roster: PathBuf,
    pub requirements: Option<PathBuf>,
    pub test_mode: Option<usize>,
    pub batch_width: Option<usize>,
    pub no_functional: bool,
    pub keep_workspaces: bool,
}

pub async fn cmd_run(mut config: Config, args: RunArgs) -> Result<()> {
    if args.no_functional {
        config.functional_tests = false;
    }
    if args.keep_workspaces {
        config.cleanup_after_processing = false;
    }
    let verbose = config.verbose;

    let store = JsonRoster::open(&args.roster)
        .with_context(|| format!("Failed to open roster {}", args.roster.display()))?;
    let requirements = match &args.requirements {
        Some(path) => RequirementSpec::load(path)?,
        None => RequirementSpec::default(),
    };
    if requirements.is_empty() {
        println!(
            "{}",
            style("No requirements loaded; grading on build outcome only").dim()
        );
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let ui_task = tokio::spawn(ui::drive_events(rx, GradingUI::new(verbose)));

    let mut session = RunSession::new(
        config,
        Box::new(store),
        requirements,
        Arc::new(ChannelSink::new(tx)),
    );

    // First Ctrl-C requests a graceful stop at the next student boundary.
    let stop = session.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStop requested; finishing the current student...");
            stop.stop();
        }
    });

    let outcome = session.run(RunOptions {
        test_mode_limit: args.test_mode,
        batch_width: args.batch_width,
    })
    .await;
    let stopped = session.state() == RunState::Stopped;
    drop(session);
    let _ = ui_task.await;

    let summary = outcome?;
    if stopped {
        // The completion event never fired, so the UI printed no totals.
        ui::print_summary(&summary);
    }

    // Reopen for distribution: the session owned the store.
    let store = JsonRoster::open(&args.roster)?;
    let grades: Vec<u32> = store
        .records()
        .iter()
        .filter(|r| r.processed_at.is_some())
        .map(|r| r.grade)
        .collect();
    if let Some(dist) = grade_distribution(&grades) {
        ui::print_distribution(&dist);
    }

    if stopped {
        println!(
            "{}",
            style("Run was stopped early; rerun to process the remaining students").yellow()
        );
    }
    Ok(())
}
