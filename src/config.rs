use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Grade constants for the basic three-point grading mode.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GradingScale {
    pub build_success: u32,
    pub build_with_warnings: u32,
    pub build_failure: u32,
}

impl Default for GradingScale {
    fn default() -> Self {
        Self {
            build_success: 100,
            build_with_warnings: 50,
            build_failure: 0,
        }
    }
}

/// Optional `grader.toml` overlay. Every field has a default so an absent or
/// partial file is fine; a malformed file is an error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct GraderToml {
    clone_timeout_secs: Option<u64>,
    install_timeout_secs: Option<u64>,
    build_timeout_secs: Option<u64>,
    server_ready_secs: Option<u64>,
    base_port: Option<u16>,
    webdriver_url: Option<String>,
    functional_tests: Option<bool>,
    http_probes: Option<bool>,
    cleanup_after_processing: Option<bool>,
    grading: Option<GradingScale>,
}

/// Runtime configuration for the grading pipeline.
///
/// Resolved from the project directory plus an optional `grader.toml`
/// overlay; CLI flags are applied on top by the command handlers.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    /// Root under which per-student workspaces are checked out.
    pub repos_dir: PathBuf,
    pub log_dir: PathBuf,
    pub clone_timeout: Duration,
    pub install_timeout: Duration,
    pub build_timeout: Duration,
    /// How long to wait for a student dev server to answer HTTP 200.
    pub server_ready: Duration,
    /// First candidate port for the dev server; scanning proceeds upward.
    pub base_port: u16,
    /// WebDriver endpoint probed for full browser automation.
    pub webdriver_url: String,
    /// Run the end-to-end functional stage at all.
    pub functional_tests: bool,
    /// Allow the HTTP fallback probe strategy (extra GETs against the app).
    pub http_probes: bool,
    /// Release each workspace as soon as its student is graded.
    pub cleanup_after_processing: bool,
    pub grading: GradingScale,
    pub verbose: bool,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        let overlay = Self::load_overlay(&project_dir)?;

        let temp_dir = project_dir.join("temp");
        Ok(Self {
            repos_dir: temp_dir.join("repos"),
            log_dir: project_dir.join("logs"),
            project_dir,
            clone_timeout: Duration::from_secs(overlay.clone_timeout_secs.unwrap_or(300)),
            install_timeout: Duration::from_secs(overlay.install_timeout_secs.unwrap_or(600)),
            build_timeout: Duration::from_secs(overlay.build_timeout_secs.unwrap_or(300)),
            server_ready: Duration::from_secs(overlay.server_ready_secs.unwrap_or(30)),
            base_port: overlay.base_port.unwrap_or(3000),
            webdriver_url: overlay
                .webdriver_url
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
            functional_tests: overlay.functional_tests.unwrap_or(true),
            http_probes: overlay.http_probes.unwrap_or(true),
            cleanup_after_processing: overlay.cleanup_after_processing.unwrap_or(true),
            grading: overlay.grading.unwrap_or_default(),
            verbose,
        })
    }

    fn load_overlay(project_dir: &PathBuf) -> Result<GraderToml> {
        let path = project_dir.join("grader.toml");
        if !path.exists() {
            return Ok(GraderToml::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.repos_dir).context("Failed to create repos directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}
