//! Post-build analysis: artifact directory discovery, warning detection, and
//! coarse categorization of failure output into actionable feedback.

use super::CommandOutput;
use std::path::{Path, PathBuf};
use tracing::debug;

const ARTIFACT_DIRS: &[&str] = &["build", "dist", "out"];
const EXCERPT_LIMIT: usize = 2000;

/// Below this many files the output is probably a partial build.
const LOW_FILE_COUNT: usize = 3;
/// Above this total size the output is probably bundling something it
/// should not (node_modules, media assets).
const LARGE_OUTPUT_BYTES: u64 = 200 * 1024 * 1024;

/// Coarse bucket for a build failure, matched by fingerprints in the
/// combined output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildIssueCategory {
    Dependency,
    TypeScript,
    Lint,
    Syntax,
    Unknown,
}

impl BuildIssueCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dependency => "Missing or unresolved dependencies",
            Self::TypeScript => "TypeScript compilation errors",
            Self::Lint => "Code quality warnings detected",
            Self::Syntax => "JavaScript/JSX syntax errors",
            Self::Unknown => "Build failed with unknown error",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Dependency => "Run npm install to ensure all dependencies are installed",
            Self::TypeScript => "Check TypeScript configuration and fix type errors",
            Self::Lint => "Review and fix ESLint warnings for better code quality",
            Self::Syntax => "Review code syntax and fix compilation errors",
            Self::Unknown => "Check the full error output for more details",
        }
    }
}

/// Everything downstream stages need to know about a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub succeeded: bool,
    pub has_warnings: bool,
    pub artifact_dir: Option<PathBuf>,
    pub artifact_files: usize,
    pub artifact_bytes: u64,
    pub has_entry_html: bool,
    pub has_scripts: bool,
    pub has_stylesheets: bool,
    /// Output-shape concerns: missing entry page, missing scripts, too few
    /// files, oversized output.
    pub output_warnings: Vec<String>,
    pub categories: Vec<BuildIssueCategory>,
    pub suggestions: Vec<String>,
    /// Bounded excerpt of the failure output, suitable for roster storage.
    pub error_excerpt: String,
}

impl BuildReport {
    pub fn has_artifacts(&self) -> bool {
        self.artifact_dir.is_some() && self.artifact_files > 0
    }
}

/// Analyze one build result against its workspace.
pub fn analyze(workspace: &Path, output: &CommandOutput) -> BuildReport {
    let combined = output.combined();
    let lowered = combined.to_lowercase();

    let artifacts = find_artifacts(workspace);
    let mut output_warnings = Vec::new();
    if output.ok {
        match &artifacts.dir {
            None => output_warnings.push(
                "No build output directory found (expected build/, dist/, or out/)".to_string(),
            ),
            Some(_) => {
                if !artifacts.has_entry_html {
                    output_warnings.push("Build output has no index.html".to_string());
                }
                if !artifacts.has_scripts {
                    output_warnings.push("Build output contains no script files".to_string());
                }
                if artifacts.files < LOW_FILE_COUNT {
                    output_warnings.push(format!(
                        "Build output contains only {} file(s)",
                        artifacts.files
                    ));
                }
                if artifacts.bytes > LARGE_OUTPUT_BYTES {
                    output_warnings.push(format!(
                        "Build output is unusually large ({} MB)",
                        artifacts.bytes / (1024 * 1024)
                    ));
                }
            }
        }
    }

    let categories = if output.ok {
        Vec::new()
    } else {
        categorize(&lowered)
    };
    let suggestions = categories
        .iter()
        .map(|c| c.suggestion().to_string())
        .collect();

    let report = BuildReport {
        succeeded: output.ok,
        // Grading keys off compiler warnings only; output-shape concerns
        // surface in feedback without moving the grade band.
        has_warnings: output.ok && lowered.contains("warning"),
        artifact_dir: artifacts.dir,
        artifact_files: artifacts.files,
        artifact_bytes: artifacts.bytes,
        has_entry_html: artifacts.has_entry_html,
        has_scripts: artifacts.has_scripts,
        has_stylesheets: artifacts.has_stylesheets,
        output_warnings,
        categories,
        suggestions,
        error_excerpt: if output.ok {
            String::new()
        } else {
            excerpt(&combined)
        },
    };
    debug!(
        succeeded = report.succeeded,
        has_warnings = report.has_warnings,
        artifacts = report.artifact_files,
        "build output analyzed"
    );
    report
}

#[derive(Default)]
struct ArtifactScan {
    dir: Option<PathBuf>,
    files: usize,
    bytes: u64,
    has_entry_html: bool,
    has_scripts: bool,
    has_stylesheets: bool,
}

fn find_artifacts(workspace: &Path) -> ArtifactScan {
    for name in ARTIFACT_DIRS {
        let dir = workspace.join(name);
        if !dir.is_dir() {
            continue;
        }
        let mut scan = ArtifactScan {
            dir: Some(dir.clone()),
            ..Default::default()
        };
        for entry in walkdir::WalkDir::new(&dir).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            scan.files += 1;
            scan.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            match entry.path().extension().and_then(|e| e.to_str()) {
                Some("html") => {
                    scan.has_entry_html |= entry.file_name() == "index.html";
                }
                Some("js") | Some("mjs") => scan.has_scripts = true,
                Some("css") => scan.has_stylesheets = true,
                _ => {}
            }
        }
        return scan;
    }
    ArtifactScan::default()
}

fn categorize(lowered: &str) -> Vec<BuildIssueCategory> {
    let mut categories = Vec::new();
    if ["module not found", "cannot resolve", "package not found"]
        .iter()
        .any(|t| lowered.contains(t))
    {
        categories.push(BuildIssueCategory::Dependency);
    }
    if ["typescript", "ts(", ".ts("].iter().any(|t| lowered.contains(t)) {
        categories.push(BuildIssueCategory::TypeScript);
    }
    if lowered.contains("eslint") || lowered.contains("warning") {
        categories.push(BuildIssueCategory::Lint);
    }
    if ["syntax error", "syntaxerror", "unexpected token", "parse error"]
        .iter()
        .any(|t| lowered.contains(t))
    {
        categories.push(BuildIssueCategory::Syntax);
    }
    if categories.is_empty() {
        categories.push(BuildIssueCategory::Unknown);
    }
    categories
}

/// Bounded excerpt of a failed stage's combined output.
pub fn failure_excerpt(output: &CommandOutput) -> String {
    excerpt(&output.combined())
}

fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_LIMIT {
        return text.to_string();
    }
    let mut cut = EXCERPT_LIMIT;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n... (truncated)", &text[..cut])
}
