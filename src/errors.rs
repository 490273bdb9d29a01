//! Typed error hierarchy for the grading pipeline.
//!
//! Four top-level enums cover the subsystems:
//! - `CloneError` — transport failures while acquiring a workspace
//! - `ProjectError` — workspace shape problems (manifest, framework dependency)
//! - `ToolchainError` — install/build subprocess failures
//! - `PipelineError` — run-level orchestration failures

use thiserror::Error;

/// Transport failures while cloning a student repository.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("Repository not found (may be private or deleted)")]
    NotFound,

    #[error("Permission denied (repository may be private)")]
    PermissionDenied,

    #[error("Clone operation timed out")]
    TimedOut,

    #[error("Git transport error: {0}")]
    Transport(String),
}

/// Workspace shape problems discovered during inspection.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("No package.json found - not a Node.js project")]
    MissingManifest,

    #[error("React dependency not found in package.json")]
    MissingReactDependency,

    #[error("Invalid package.json: {0}")]
    InvalidManifest(String),
}

/// Failures from the external install/build toolchain.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("Workspace directory does not exist: {path}")]
    MissingWorkspace { path: std::path::PathBuf },

    #[error("Failed to spawn {stage} command: {source}")]
    SpawnFailed {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} timed out after {secs} seconds")]
    TimedOut { stage: &'static str, secs: u64 },

    #[error("{tool} is not installed or not in PATH")]
    ToolMissing { tool: String },
}

/// Run-level orchestration failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Processing is already in progress")]
    AlreadyRunning,

    #[error("No student data loaded")]
    EmptyRoster,

    #[error("Roster error: {0}")]
    Roster(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_error_variants_are_distinct() {
        assert!(matches!(CloneError::NotFound, CloneError::NotFound));
        assert!(!matches!(CloneError::TimedOut, CloneError::NotFound));
        assert!(
            CloneError::Transport("reset".into())
                .to_string()
                .contains("reset")
        );
    }

    #[test]
    fn project_error_messages_distinguish_manifest_from_dependency() {
        let missing = ProjectError::MissingManifest.to_string();
        let no_react = ProjectError::MissingReactDependency.to_string();
        assert!(missing.contains("package.json"));
        assert!(no_react.contains("React"));
        assert_ne!(missing, no_react);
    }

    #[test]
    fn toolchain_timeout_carries_stage_and_seconds() {
        let err = ToolchainError::TimedOut {
            stage: "install",
            secs: 600,
        };
        assert!(err.to_string().contains("install"));
        assert!(err.to_string().contains("600"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&CloneError::NotFound);
        assert_std_error(&ProjectError::MissingManifest);
        assert_std_error(&ToolchainError::ToolMissing { tool: "node".into() });
        assert_std_error(&PipelineError::EmptyRoster);
    }
}
