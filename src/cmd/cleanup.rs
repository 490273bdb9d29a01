//! `autograder cleanup` — remove every checked-out student workspace.

use anyhow::{Result, bail};
use autograder::config::Config;
use autograder::workspace::WorkspaceManager;
use console::style;

pub fn cmd_cleanup(config: &Config) -> Result<()> {
    let manager = WorkspaceManager::new(config.repos_dir.clone(), config.clone_timeout);
    let (released, failed) = manager.release_all();
    println!(
        "Removed {} workspace{} from {}",
        style(released).bold(),
        if released == 1 { "" } else { "s" },
        config.repos_dir.display()
    );
    if failed > 0 {
        bail!("{failed} workspaces could not be removed; check file permissions");
    }
    Ok(())
}
