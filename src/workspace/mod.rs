//! Workspace acquisition and teardown.
//!
//! Each student gets exactly one workspace: a shallow checkout of their
//! repository under the repos root, named by a sanitized form of their
//! identity key. Release is best-effort but escalating — version-control
//! checkouts routinely leave read-only object files behind, and a workspace
//! that cannot be deleted must never take the pipeline down with it.

use crate::errors::{CloneError, ProjectError};
use crate::toolchain::PackageManager;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const PLACEHOLDER_NAME: &str = "unnamed_student";
const MAX_DIR_NAME_LEN: usize = 30;
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '|', '?', '*', '\\'];

/// Sanitize a student identity into a filesystem-safe directory name.
///
/// Idempotent: sanitizing an already-sanitized name is a no-op. The result is
/// lowercase, at most 30 characters, free of reserved characters, and never
/// starts or ends with an underscore.
pub fn sanitize_dir_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = false;
    for ch in name.chars() {
        let mapped = if ch.is_whitespace() || RESERVED_CHARS.contains(&ch) {
            '_'
        } else {
            ch
        };
        if mapped == '_' {
            if last_underscore {
                continue;
            }
            last_underscore = true;
        } else {
            last_underscore = false;
        }
        out.push(mapped);
    }
    let mut out: String = out.to_lowercase();
    out = out.trim_matches('_').to_string();
    if out.len() > MAX_DIR_NAME_LEN {
        // Cut on a char boundary; byte 30 may fall inside a multibyte char.
        let mut cut = MAX_DIR_NAME_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out = out.trim_matches('_').to_string();
    }
    if out.is_empty() {
        return PLACEHOLDER_NAME.to_string();
    }
    out
}

/// Structural facts about a checked-out workspace. Computed fresh per run,
/// never persisted.
#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub has_manifest: bool,
    pub has_react_dependency: bool,
    pub react_version: Option<String>,
    pub package_manager: PackageManager,
    pub has_src_folder: bool,
    pub has_public_folder: bool,
    pub has_build_script: bool,
    pub has_readme: bool,
    pub has_entry_file: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    dependencies: HashMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: HashMap<String, String>,
    #[serde(default)]
    scripts: HashMap<String, String>,
}

const ENTRY_FILES: &[&str] = &[
    "src/App.js",
    "src/App.jsx",
    "src/App.tsx",
    "src/index.js",
    "src/index.jsx",
    "src/index.tsx",
    "src/main.jsx",
    "src/main.tsx",
];

/// Owns the repos root and every workspace beneath it.
pub struct WorkspaceManager {
    repos_dir: PathBuf,
    clone_timeout: Duration,
}

impl WorkspaceManager {
    pub fn new(repos_dir: impl Into<PathBuf>, clone_timeout: Duration) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            clone_timeout,
        }
    }

    pub fn repos_dir(&self) -> &Path {
        &self.repos_dir
    }

    /// Clone `repo_url` into a freshly-cleared workspace named after `key`.
    ///
    /// The key is used verbatim (callers sanitize and namespace it); any
    /// leftover directory from a previous attempt is force-removed first.
    pub async fn acquire(&self, repo_url: &str, key: &str) -> Result<PathBuf, CloneError> {
        let target = self.repos_dir.join(key);
        if target.exists() {
            debug!(path = %target.display(), "removing stale workspace");
            force_remove_dir(&target);
        }
        if let Err(e) = std::fs::create_dir_all(&self.repos_dir) {
            return Err(CloneError::Transport(format!(
                "Failed to create repos root: {e}"
            )));
        }

        let url = repo_url.to_string();
        let dest = target.clone();
        let clone_task = tokio::task::spawn_blocking(move || clone_shallow(&url, &dest));

        match tokio::time::timeout(self.clone_timeout, clone_task).await {
            Err(_) => Err(CloneError::TimedOut),
            Ok(Err(join_err)) => Err(CloneError::Transport(join_err.to_string())),
            Ok(Ok(Err(e))) => Err(classify_git_error(&e)),
            Ok(Ok(Ok(()))) => Ok(target),
        }
    }

    /// Inspect a workspace and report whether it is a valid React project.
    pub fn inspect(&self, path: &Path) -> Result<ProjectInfo, ProjectError> {
        let manifest_path = path.join("package.json");
        if !manifest_path.exists() {
            return Err(ProjectError::MissingManifest);
        }

        let content = std::fs::read_to_string(&manifest_path)
            .map_err(|e| ProjectError::InvalidManifest(e.to_string()))?;
        let manifest: PackageManifest = serde_json::from_str(&content)
            .map_err(|e| ProjectError::InvalidManifest(e.to_string()))?;

        let react_version = manifest
            .dependencies
            .get("react")
            .or_else(|| manifest.dev_dependencies.get("react"))
            .cloned();
        if react_version.is_none() {
            return Err(ProjectError::MissingReactDependency);
        }

        let package_manager = PackageManager::detect(path);
        if !manifest.scripts.contains_key("build") {
            warn!(path = %path.display(), "no build script in package.json");
        }

        Ok(ProjectInfo {
            has_manifest: true,
            has_react_dependency: true,
            react_version,
            package_manager,
            has_src_folder: path.join("src").is_dir(),
            has_public_folder: path.join("public").is_dir(),
            has_build_script: manifest.scripts.contains_key("build"),
            has_readme: path.join("README.md").is_file(),
            has_entry_file: ENTRY_FILES.iter().any(|f| path.join(f).is_file()),
        })
    }

    /// Force-remove one workspace. Returns whether removal succeeded; never
    /// propagates an error past the caller.
    pub fn release(&self, path: &Path) -> bool {
        if !path.exists() {
            return true;
        }
        force_remove_dir(path)
    }

    /// Remove every workspace under the repos root.
    pub fn release_all(&self) -> (usize, usize) {
        let Ok(entries) = std::fs::read_dir(&self.repos_dir) else {
            return (0, 0);
        };
        let mut cleaned = 0;
        let mut failed = 0;
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                if force_remove_dir(&entry.path()) {
                    cleaned += 1;
                } else {
                    warn!(path = %entry.path().display(), "failed to remove workspace");
                    failed += 1;
                }
            }
        }
        debug!(cleaned, failed, "workspace cleanup complete");
        (cleaned, failed)
    }
}

fn clone_shallow(url: &str, dest: &Path) -> Result<(), git2::Error> {
    let mut fetch = git2::FetchOptions::new();
    fetch.depth(1);
    let result = git2::build::RepoBuilder::new()
        .fetch_options(fetch)
        .clone(url, dest);
    match result {
        Ok(_) => Ok(()),
        // The local transport does not support shallow fetches; retry full.
        Err(e) if e.message().contains("shallow") || e.message().contains("depth") => {
            if dest.exists() {
                force_remove_dir(dest);
            }
            git2::Repository::clone(url, dest).map(|_| ())
        }
        Err(e) => Err(e),
    }
}

fn classify_git_error(err: &git2::Error) -> CloneError {
    let msg = err.message().to_lowercase();
    if msg.contains("not found") || err.code() == git2::ErrorCode::NotFound {
        CloneError::NotFound
    } else if msg.contains("authentication")
        || msg.contains("permission denied")
        || msg.contains("401")
        || msg.contains("403")
        || err.class() == git2::ErrorClass::Http && msg.contains("unauthorized")
    {
        CloneError::PermissionDenied
    } else if msg.contains("timed out") || msg.contains("timeout") {
        CloneError::TimedOut
    } else {
        CloneError::Transport(err.message().to_string())
    }
}

/// Escalating removal: plain delete, chmod-writable delete, platform-native
/// forced delete, then bounded retries with backoff.
fn force_remove_dir(path: &Path) -> bool {
    if std::fs::remove_dir_all(path).is_ok() {
        return true;
    }

    make_writable_recursive(path);
    if std::fs::remove_dir_all(path).is_ok() {
        return true;
    }

    if native_force_remove(path) && !path.exists() {
        return true;
    }

    for attempt in 0..3 {
        make_writable_recursive(path);
        if std::fs::remove_dir_all(path).is_ok() || !path.exists() {
            return true;
        }
        debug!(attempt, path = %path.display(), "directory removal retry");
        std::thread::sleep(Duration::from_millis(250 * (attempt + 1)));
    }
    !path.exists()
}

fn make_writable_recursive(path: &Path) {
    for entry in walkdir::WalkDir::new(path).into_iter().flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let mut perms = metadata.permissions();
        if perms.readonly() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = if metadata.is_dir() { 0o755 } else { 0o644 };
                perms.set_mode(mode);
            }
            #[cfg(not(unix))]
            perms.set_readonly(false);
            let _ = std::fs::set_permissions(entry.path(), perms);
        } else if metadata.is_dir() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if perms.mode() & 0o200 == 0 {
                    perms.set_mode(0o755);
                    let _ = std::fs::set_permissions(entry.path(), perms);
                }
            }
        }
    }
}

#[cfg(unix)]
fn native_force_remove(path: &Path) -> bool {
    std::process::Command::new("rm")
        .arg("-rf")
        .arg(path)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(windows)]
fn native_force_remove(path: &Path) -> bool {
    std::process::Command::new("cmd")
        .args(["/C", "rmdir", "/s", "/q"])
        .arg(path)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
fn native_force_remove(_path: &Path) -> bool {
    false
}
