//! Batch orchestration: drives every student through clone, verify, install,
//! build, functional test, evaluation, and grading, with failure isolation
//! per student and cooperative cancellation at student boundaries.

pub mod batch;
pub mod events;

pub use batch::BatchPlan;
pub use events::{ChannelSink, NullSink, ProcessingStep, ProgressEvent, ProgressSink};

use crate::config::Config;
use crate::errors::PipelineError;
use crate::evaluator;
use crate::functional::FunctionalTestRunner;
use crate::grader::Grader;
use crate::requirements::RequirementSpec;
use crate::roster::{BuildStatus, RosterStore, RosterSummary, StudentOutcome, StudentRecord};
use crate::toolchain::{Toolchain, output};
use crate::workspace::{WorkspaceManager, sanitize_dir_name};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Cooperative cancellation flag, checked before each student. Cloneable so
/// UI handlers can hold one while the run owns the session.
#[derive(Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

/// Per-run knobs layered on top of [`Config`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Process only the first N students. For dry runs against a big roster.
    pub test_mode_limit: Option<usize>,
    /// Fixed batch width; `None` selects the dynamic plan.
    pub batch_width: Option<usize>,
}

/// One grading run over a roster. A session is single-use: construct, run,
/// inspect. A stop request is permanent for the session.
pub struct RunSession {
    config: Config,
    workspaces: WorkspaceManager,
    toolchain: Toolchain,
    grader: Grader,
    requirements: RequirementSpec,
    store: Box<dyn RosterStore>,
    sink: Arc<dyn ProgressSink>,
    stop: StopToken,
    state: RunState,
}

impl RunSession {
    pub fn new(
        config: Config,
        store: Box<dyn RosterStore>,
        requirements: RequirementSpec,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let workspaces = WorkspaceManager::new(config.repos_dir.clone(), config.clone_timeout);
        let toolchain = Toolchain::new(config.install_timeout, config.build_timeout);
        let grader = Grader::new(config.grading);
        Self {
            config,
            workspaces,
            toolchain,
            grader,
            requirements,
            store,
            sink,
            stop: StopToken::new(),
            state: RunState::Idle,
        }
    }

    /// Swap the toolchain, e.g. to point every stage at a wrapper script.
    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn request_stop(&self) {
        info!("stop requested");
        self.stop.stop();
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn summary(&self) -> RosterSummary {
        self.store.summary_stats()
    }

    /// Remove every workspace under the repos root.
    pub fn cleanup_all(&self) -> (usize, usize) {
        self.workspaces.release_all()
    }

    pub async fn run(&mut self, options: RunOptions) -> Result<RosterSummary, PipelineError> {
        if self.state == RunState::Running {
            return Err(PipelineError::AlreadyRunning);
        }
        let records = self
            .store
            .load_roster()
            .map_err(|e| PipelineError::Roster(e.to_string()))?;
        if records.is_empty() {
            return Err(PipelineError::EmptyRoster);
        }
        self.config.ensure_directories()?;

        let total = options
            .test_mode_limit
            .map(|n| n.min(records.len()))
            .unwrap_or(records.len());
        let plan = match options.batch_width {
            Some(width) => BatchPlan::fixed(total, width),
            None => BatchPlan::dynamic(total),
        };

        let functional = if self.config.functional_tests {
            Some(FunctionalTestRunner::new(&self.config).await?)
        } else {
            None
        };

        self.state = RunState::Running;
        info!(
            total,
            batch_count = plan.batch_count,
            batch_size = plan.batch_size,
            functional = functional.is_some(),
            "run started"
        );
        self.sink.emit(ProgressEvent::RunStarted {
            total,
            batch_count: plan.batch_count,
        });

        let ranges = plan.ranges(total);
        let mut processed = 0usize;
        for (batch_index, range) in ranges.iter().enumerate() {
            self.sink.emit(ProgressEvent::BatchStarted {
                batch_index,
                batch_count: ranges.len(),
                size: range.len(),
            });

            for index in range.clone() {
                if self.stop.is_stopped() {
                    warn!(processed, total, "run stopped before next student");
                    self.sink.emit(ProgressEvent::RunStopped { processed, total });
                    self.state = RunState::Stopped;
                    return Ok(self.store.summary_stats());
                }

                let record = &records[index];
                self.sink.emit(ProgressEvent::StudentStarted {
                    index,
                    name: record.name.clone(),
                });

                // Outermost per-student boundary: a panic anywhere in the
                // student's pipeline becomes one Error record, not an abort.
                let outcome = match AssertUnwindSafe(
                    self.process_student(index, record, functional.as_ref()),
                )
                .catch_unwind()
                .await
                {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let detail = panic_detail(panic.as_ref());
                        error!(student = %record.name, detail = %detail, "student processing panicked");
                        StudentOutcome::error(
                            format!("Processing failed unexpectedly: {detail}"),
                            detail,
                        )
                    }
                };
                if let Err(e) = self.store.record_result(index, &outcome) {
                    self.state = RunState::Failed;
                    return Err(PipelineError::Roster(e.to_string()));
                }
                processed += 1;
                self.sink.emit(ProgressEvent::StudentCompleted {
                    index,
                    name: record.name.clone(),
                    status: outcome.status,
                    grade: outcome.grade,
                });
            }

            // Reclaim disk between batches; the final batch is left for the
            // caller so results can still be inspected.
            if batch_index + 1 < ranges.len() {
                let (released, failed) = self.workspaces.release_all();
                self.sink.emit(ProgressEvent::BatchCleanup {
                    batch_index,
                    released,
                    failed,
                });
            }
        }

        self.state = RunState::Completed;
        let summary = self.store.summary_stats();
        info!(
            processed,
            success = summary.success,
            failed = summary.failed,
            errors = summary.errors,
            "run completed"
        );
        self.sink.emit(ProgressEvent::RunCompleted {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Run one student end to end. Infallible by design: every failure mode
    /// maps to an outcome so one student can never abort the run.
    async fn process_student(
        &self,
        index: usize,
        record: &StudentRecord,
        functional: Option<&FunctionalTestRunner>,
    ) -> StudentOutcome {
        let step = |step: ProcessingStep| {
            self.sink.emit(ProgressEvent::StudentStep {
                index,
                name: record.name.clone(),
                step,
            });
        };

        step(ProcessingStep::Cloning);
        let key = format!("{}-{}", sanitize_dir_name(&record.name), index);
        let path = match self
            .workspaces
            .acquire(&record.repository_url, &key)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                error!(student = %record.name, error = %e, "clone failed");
                return StudentOutcome::error(
                    format!("Repository clone failed: {e}"),
                    e.to_string(),
                );
            }
        };

        step(ProcessingStep::Verifying);
        let project = match self.workspaces.inspect(&path) {
            Ok(project) => project,
            Err(e) => {
                error!(student = %record.name, error = %e, "verification failed");
                self.maybe_release(&path);
                return StudentOutcome::error(
                    format!("Project verification failed: {e}"),
                    e.to_string(),
                );
            }
        };
        let pm = project.package_manager;

        step(ProcessingStep::Installing);
        match self.toolchain.install(&path, pm).await {
            Ok(out) if out.ok => {}
            Ok(out) => {
                error!(student = %record.name, exit_code = ?out.exit_code, "install failed");
                self.maybe_release(&path);
                return StudentOutcome {
                    status: BuildStatus::Failed,
                    grade: self.config.grading.build_failure,
                    feedback: "Dependency installation failed. Check that package.json lists valid dependencies.".to_string(),
                    build_errors: output::failure_excerpt(&out),
                };
            }
            Err(e) => {
                error!(student = %record.name, error = %e, "install did not run");
                self.maybe_release(&path);
                return StudentOutcome {
                    status: BuildStatus::Failed,
                    grade: self.config.grading.build_failure,
                    feedback: format!("Dependency installation failed: {e}"),
                    build_errors: e.to_string(),
                };
            }
        }

        step(ProcessingStep::Building);
        let build_output = match self.toolchain.build(&path, pm).await {
            Ok(out) => out,
            Err(e) => {
                error!(student = %record.name, error = %e, "build did not run");
                self.maybe_release(&path);
                return StudentOutcome {
                    status: BuildStatus::Failed,
                    grade: self.config.grading.build_failure,
                    feedback: format!("Build failed: {e}"),
                    build_errors: e.to_string(),
                };
            }
        };
        let report = output::analyze(&path, &build_output);

        // A failed build still goes through evaluation so partial credit for
        // structure and code quality survives.
        let functional_result = match (functional, report.succeeded) {
            (Some(runner), true) => {
                step(ProcessingStep::Testing);
                let items: Vec<String> = self
                    .requirements
                    .all_items()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                Some(runner.run(&self.toolchain, &path, pm, &items).await)
            }
            _ => None,
        };

        step(ProcessingStep::Evaluating);
        let (grade, feedback) = if self.requirements.is_empty() {
            self.grader.basic_grade(report.succeeded, report.has_warnings)
        } else {
            let evaluation = evaluator::evaluate(
                &path,
                &project,
                report.succeeded,
                functional_result.as_ref(),
                &self.requirements,
            );
            step(ProcessingStep::Grading);
            self.grader
                .requirements_grade(&record.name, &evaluation, &report)
        };

        let status = if report.succeeded {
            if report.has_warnings {
                BuildStatus::Warning
            } else {
                BuildStatus::Success
            }
        } else {
            BuildStatus::Failed
        };

        self.maybe_release(&path);
        StudentOutcome {
            status,
            grade,
            feedback,
            build_errors: report.error_excerpt,
        }
    }

    fn maybe_release(&self, path: &Path) {
        if self.config.cleanup_after_processing && !self.workspaces.release(path) {
            warn!(path = %path.display(), "failed to release workspace");
        }
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::summarize;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct MemRoster(Arc<Mutex<Vec<StudentRecord>>>);

    impl RosterStore for MemRoster {
        fn load_roster(&mut self) -> anyhow::Result<Vec<StudentRecord>> {
            Ok(self.0.lock().unwrap().clone())
        }

        fn record_result(&mut self, index: usize, outcome: &StudentOutcome) -> anyhow::Result<()> {
            let mut records = self.0.lock().unwrap();
            let record = &mut records[index];
            record.build_status = outcome.status;
            record.grade = outcome.grade;
            record.feedback = outcome.feedback.clone();
            record.build_errors = outcome.build_errors.clone();
            record.processed_at = Some(chrono::Utc::now());
            Ok(())
        }

        fn summary_stats(&self) -> RosterSummary {
            summarize(&self.0.lock().unwrap())
        }
    }

    fn test_config(dir: &std::path::Path) -> Config {
        std::fs::write(
            dir.join("grader.toml"),
            "functional_tests = false\nclone_timeout_secs = 20\n",
        )
        .unwrap();
        Config::new(dir.to_path_buf(), false).unwrap()
    }

    fn session_with(
        dir: &std::path::Path,
        records: Vec<StudentRecord>,
        sink: Arc<dyn ProgressSink>,
    ) -> (RunSession, Arc<Mutex<Vec<StudentRecord>>>) {
        let shared = Arc::new(Mutex::new(records));
        let session = RunSession::new(
            test_config(dir),
            Box::new(MemRoster(shared.clone())),
            RequirementSpec::default(),
            sink,
        );
        (session, shared)
    }

    #[tokio::test]
    async fn test_clone_failures_are_isolated_per_student() {
        let dir = tempdir().unwrap();
        let records = vec![
            StudentRecord::new("Ada", "/nonexistent/repo-a"),
            StudentRecord::new("Bob", "/nonexistent/repo-b"),
        ];
        let (mut session, shared) = session_with(dir.path(), records, Arc::new(NullSink));

        let summary = session.run(RunOptions::default()).await.unwrap();
        assert_eq!(session.state(), RunState::Completed);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.success, 0);

        let records = shared.lock().unwrap();
        for record in records.iter() {
            assert_eq!(record.build_status, BuildStatus::Error);
            assert_eq!(record.grade, 0);
            assert!(record.feedback.contains("clone failed"));
            assert!(record.processed_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_empty_roster_is_an_error() {
        let dir = tempdir().unwrap();
        let (mut session, _) = session_with(dir.path(), Vec::new(), Arc::new(NullSink));
        let err = session.run(RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyRoster));
        assert_eq!(session.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_stop_before_start_processes_nobody() {
        let dir = tempdir().unwrap();
        let records = vec![StudentRecord::new("Ada", "/nonexistent/repo")];
        let (mut session, shared) = session_with(dir.path(), records, Arc::new(NullSink));

        session.request_stop();
        let summary = session.run(RunOptions::default()).await.unwrap();
        assert_eq!(session.state(), RunState::Stopped);
        assert_eq!(summary.errors, 0);
        assert!(shared.lock().unwrap()[0].processed_at.is_none());
    }

    struct StopAfterFirst {
        token: StopToken,
    }

    impl ProgressSink for StopAfterFirst {
        fn emit(&self, event: ProgressEvent) {
            if matches!(event, ProgressEvent::StudentCompleted { .. }) {
                self.token.stop();
            }
        }
    }

    #[tokio::test]
    async fn test_stop_between_students_preserves_completed_work() {
        let dir = tempdir().unwrap();
        let records = vec![
            StudentRecord::new("Ada", "/nonexistent/repo-a"),
            StudentRecord::new("Bob", "/nonexistent/repo-b"),
            StudentRecord::new("Cyd", "/nonexistent/repo-c"),
        ];
        let shared = Arc::new(Mutex::new(records));
        let mut session = RunSession::new(
            test_config(dir.path()),
            Box::new(MemRoster(shared.clone())),
            RequirementSpec::default(),
            Arc::new(NullSink),
        );
        // The sink fires inside the run, so the stop lands exactly at the
        // next student boundary.
        let sink = Arc::new(StopAfterFirst {
            token: session.stop_token(),
        });
        session.sink = sink;

        let summary = session.run(RunOptions::default()).await.unwrap();
        assert_eq!(session.state(), RunState::Stopped);
        assert_eq!(summary.errors, 1);

        let records = shared.lock().unwrap();
        assert!(records[0].processed_at.is_some());
        assert!(records[1].processed_at.is_none());
        assert!(records[2].processed_at.is_none());
    }

    struct PanicOnStep {
        victim: &'static str,
    }

    impl ProgressSink for PanicOnStep {
        fn emit(&self, event: ProgressEvent) {
            if let ProgressEvent::StudentStep { name, .. } = &event {
                if name == self.victim {
                    panic!("stage blew up for {name}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_stage_records_one_error_and_run_continues() {
        let dir = tempdir().unwrap();
        let records = vec![
            StudentRecord::new("Ada", "/nonexistent/repo-a"),
            StudentRecord::new("Bob", "/nonexistent/repo-b"),
            StudentRecord::new("Cyd", "/nonexistent/repo-c"),
        ];
        let (mut session, shared) =
            session_with(dir.path(), records, Arc::new(PanicOnStep { victim: "Bob" }));

        let summary = session.run(RunOptions::default()).await.unwrap();
        assert_eq!(session.state(), RunState::Completed);
        assert_eq!(summary.errors, 3);

        let records = shared.lock().unwrap();
        assert!(records[1].feedback.contains("Processing failed unexpectedly"));
        assert!(records[1].build_errors.contains("blew up"));
        // Students after the panic still go through the full pipeline.
        assert!(records[2].processed_at.is_some());
        assert!(records[2].feedback.contains("clone failed"));
    }

    #[tokio::test]
    async fn test_test_mode_limits_scope() {
        let dir = tempdir().unwrap();
        let records = vec![
            StudentRecord::new("Ada", "/nonexistent/repo-a"),
            StudentRecord::new("Bob", "/nonexistent/repo-b"),
        ];
        let (mut session, shared) = session_with(dir.path(), records, Arc::new(NullSink));

        session
            .run(RunOptions {
                test_mode_limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        let records = shared.lock().unwrap();
        assert!(records[0].processed_at.is_some());
        assert!(records[1].processed_at.is_none());
    }
}
