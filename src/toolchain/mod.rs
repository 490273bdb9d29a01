//! Node toolchain execution: dependency install, production build, and the
//! dev-server command, each run as a bounded subprocess with captured output.

pub mod output;

use crate::errors::ToolchainError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Which package manager drives install/build/start for a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
}

impl PackageManager {
    /// Pick the manager from lockfiles present in the workspace. No lockfile
    /// means npm.
    pub fn detect(workspace: &Path) -> Self {
        if workspace.join("yarn.lock").is_file() {
            Self::Yarn
        } else if workspace.join("pnpm-lock.yaml").is_file() {
            Self::Pnpm
        } else {
            Self::Npm
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
        }
    }

    fn install_args(&self) -> &'static [&'static str] {
        match self {
            // legacy-peer-deps: student projects routinely pin conflicting
            // peer ranges and would otherwise fail before building at all.
            Self::Npm => &["install", "--no-audit", "--no-fund", "--legacy-peer-deps"],
            Self::Yarn => &["install", "--non-interactive"],
            Self::Pnpm => &["install"],
        }
    }

    fn build_args(&self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["run", "build"],
            Self::Yarn => &["build"],
            Self::Pnpm => &["run", "build"],
        }
    }

    fn start_args(&self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["start"],
            Self::Yarn => &["start"],
            Self::Pnpm => &["start"],
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.program())
    }
}

/// Captured result of one finished toolchain stage.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub ok: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    /// Stdout and stderr joined, for pattern scans that don't care which
    /// stream a line landed on.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Node/npm versions reported by the environment check.
#[derive(Debug, Clone)]
pub struct ToolchainVersions {
    pub node: String,
    pub npm: String,
}

/// Runs install and build stages inside student workspaces.
///
/// Every invocation sets the working directory on the child process; the
/// grader's own working directory never changes.
pub struct Toolchain {
    install_timeout: Duration,
    build_timeout: Duration,
    command_override: Option<PathBuf>,
}

impl Toolchain {
    pub fn new(install_timeout: Duration, build_timeout: Duration) -> Self {
        Self {
            install_timeout,
            build_timeout,
            command_override: None,
        }
    }

    /// Substitute the package-manager binary. Test hook.
    pub fn with_command_override(mut self, program: impl Into<PathBuf>) -> Self {
        self.command_override = Some(program.into());
        self
    }

    fn program_for(&self, pm: PackageManager) -> PathBuf {
        self.command_override
            .clone()
            .unwrap_or_else(|| PathBuf::from(pm.program()))
    }

    /// Install dependencies. A non-zero exit is an `Ok` with `ok == false`;
    /// `Err` is reserved for spawn failures and timeouts.
    pub async fn install(
        &self,
        workspace: &Path,
        pm: PackageManager,
    ) -> Result<CommandOutput, ToolchainError> {
        self.run_stage("install", workspace, pm, pm.install_args(), self.install_timeout)
            .await
    }

    /// Run the production build script.
    pub async fn build(
        &self,
        workspace: &Path,
        pm: PackageManager,
    ) -> Result<CommandOutput, ToolchainError> {
        self.run_stage("build", workspace, pm, pm.build_args(), self.build_timeout)
            .await
    }

    /// A ready-to-spawn dev-server command for the functional stage. The
    /// caller owns the child's lifetime.
    pub fn start_command(&self, workspace: &Path, pm: PackageManager, port: u16) -> Command {
        let mut cmd = Command::new(self.program_for(pm));
        cmd.args(pm.start_args())
            .current_dir(workspace)
            .env("PORT", port.to_string())
            .env("BROWSER", "none")
            .env("CI", "true")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_stage(
        &self,
        stage: &'static str,
        workspace: &Path,
        pm: PackageManager,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ToolchainError> {
        if !workspace.is_dir() {
            return Err(ToolchainError::MissingWorkspace {
                path: workspace.to_path_buf(),
            });
        }

        let program = self.program_for(pm);
        debug!(stage, program = %program.display(), ?args, "running toolchain stage");
        let started = Instant::now();

        let child = Command::new(&program)
            .args(args)
            .current_dir(workspace)
            // Warnings must not turn the build into a hard failure; the
            // analyzer downgrades them separately.
            .env("CI", "false")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolchainError::SpawnFailed { stage, source })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolchainError::TimedOut {
                stage,
                secs: timeout.as_secs(),
            })?
            .map_err(|source| ToolchainError::SpawnFailed { stage, source })?;

        let result = CommandOutput {
            ok: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        };
        info!(
            stage,
            ok = result.ok,
            exit_code = ?result.exit_code,
            elapsed_ms = result.duration.as_millis() as u64,
            "toolchain stage finished"
        );
        Ok(result)
    }

    /// Check that node and npm are installed and answer `--version` promptly.
    pub async fn verify_environment(&self) -> Result<ToolchainVersions, ToolchainError> {
        let node = version_of("node").await?;
        let npm = version_of("npm").await?;
        info!(%node, %npm, "toolchain environment verified");
        Ok(ToolchainVersions { node, npm })
    }
}

async fn version_of(tool: &str) -> Result<String, ToolchainError> {
    let child = Command::new(tool)
        .arg("--version")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|_| ToolchainError::ToolMissing {
            tool: tool.to_string(),
        })?;

    let output = tokio::time::timeout(VERSION_CHECK_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| ToolchainError::TimedOut {
            stage: "version check",
            secs: VERSION_CHECK_TIMEOUT.as_secs(),
        })?
        .map_err(|_| ToolchainError::ToolMissing {
            tool: tool.to_string(),
        })?;

    if !output.status.success() {
        return Err(ToolchainError::ToolMissing {
            tool: tool.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
