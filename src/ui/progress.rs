//! Terminal UI for a grading run, rendered via `indicatif` progress bars.
//!
//! Two bars are stacked vertically:
//! - Students bar — how many students have been graded out of the run total
//! - Status spinner — the student and stage currently executing
//!
//! The UI is a pure consumer of [`ProgressEvent`]s; it never touches the
//! pipeline.

use crate::pipeline::ProgressEvent;
use crate::roster::{BuildStatus, GradeDistribution, RosterSummary};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub struct GradingUI {
    multi: MultiProgress,
    students_bar: ProgressBar,
    status_bar: ProgressBar,
    verbose: bool,
}

impl GradingUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let students_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");
        let students_bar = multi.add(ProgressBar::new(0));
        students_bar.set_style(students_style);
        students_bar.set_prefix("Students");

        let status_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");
        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(status_style);
        status_bar.set_prefix("  Status");
        status_bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            students_bar,
            status_bar,
            verbose,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn handle(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { total, batch_count } => {
                self.students_bar.set_length(total as u64);
                self.print_line(format!(
                    "Processing {} students in {} {}",
                    style(total).bold(),
                    batch_count,
                    if batch_count == 1 { "batch" } else { "batches" }
                ));
            }
            ProgressEvent::BatchStarted {
                batch_index,
                batch_count,
                size,
            } => {
                self.students_bar
                    .set_message(format!("batch {}/{}", batch_index + 1, batch_count));
                if self.verbose {
                    self.print_line(format!(
                        "Batch {}/{} started ({} students)",
                        batch_index + 1,
                        batch_count,
                        size
                    ));
                }
            }
            ProgressEvent::StudentStarted { name, .. } => {
                self.status_bar.set_message(name);
            }
            ProgressEvent::StudentStep { name, step, .. } => {
                self.status_bar.set_message(format!("{name} — {step}"));
            }
            ProgressEvent::StudentCompleted {
                name,
                status,
                grade,
                ..
            } => {
                self.students_bar.inc(1);
                let status_label = match status {
                    BuildStatus::Success => style(status.to_string()).green(),
                    BuildStatus::Warning => style(status.to_string()).yellow(),
                    _ => style(status.to_string()).red(),
                };
                self.print_line(format!("  {name}: {status_label} ({grade}/100)"));
            }
            ProgressEvent::BatchCleanup {
                released, failed, ..
            } => {
                if self.verbose || failed > 0 {
                    self.print_line(format!(
                        "  cleaned {released} workspaces{}",
                        if failed > 0 {
                            format!(", {failed} could not be removed")
                        } else {
                            String::new()
                        }
                    ));
                }
            }
            ProgressEvent::RunStopped { processed, total } => {
                self.print_line(format!(
                    "{} after {processed}/{total} students; completed grades are saved",
                    style("Run stopped").yellow().bold()
                ));
            }
            ProgressEvent::RunCompleted { summary } => {
                self.print_line(format!("{}", style("Run complete").green().bold()));
                self.print_line(summary_lines(&summary).join("\n"));
            }
        }
    }

    pub fn finish(&self) {
        self.students_bar.finish_and_clear();
        self.status_bar.finish_and_clear();
    }
}

/// Drain events until the pipeline drops its sender.
pub async fn drive_events(mut rx: UnboundedReceiver<ProgressEvent>, ui: GradingUI) {
    while let Some(event) = rx.recv().await {
        ui.handle(event);
    }
    ui.finish();
}

fn summary_lines(summary: &RosterSummary) -> Vec<String> {
    vec![
        format!(
            "  {} total, {} successful, {} failed builds, {} errors",
            summary.total, summary.success, summary.failed, summary.errors
        ),
        format!(
            "  grades: average {:.1}, min {}, max {}",
            summary.average_grade, summary.min_grade, summary.max_grade
        ),
    ]
}

pub fn print_summary(summary: &RosterSummary) {
    println!("{}", style("Roster summary").bold());
    for line in summary_lines(summary) {
        println!("{line}");
    }
}

pub fn print_distribution(dist: &GradeDistribution) {
    println!("{}", style("Grade distribution").bold());
    println!(
        "  {} graded, average {:.1}, median {:.1}",
        dist.count, dist.average, dist.median
    );
    for (bracket, count) in &dist.brackets {
        println!("  {bracket}: {count}");
    }
}
