use anyhow::{Context, Result};
use autograder::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "autograder")]
#[command(version, about = "Automated grading for React assignment submissions")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory holding grader.toml, temp workspaces, and logs
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Grade every student in a roster
    Run {
        /// Roster JSON file (array of student records)
        roster: PathBuf,

        /// Requirements spec JSON; omit for build-only grading
        #[arg(long)]
        requirements: Option<PathBuf>,

        /// Process only the first N students
        #[arg(long)]
        test_mode: Option<usize>,

        /// Fixed batch width instead of the dynamic plan
        #[arg(long)]
        batch_width: Option<usize>,

        /// Skip the functional stage (no dev servers are started)
        #[arg(long)]
        no_functional: bool,

        /// Keep per-student workspaces on disk after grading
        #[arg(long)]
        keep_workspaces: bool,
    },
    /// Verify the grading environment (node, npm, WebDriver)
    Check,
    /// Remove all checked-out student workspaces
    Cleanup,
    /// Print summary statistics for a graded roster
    Summary {
        /// Roster JSON file
        roster: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = Config::new(project_dir, cli.verbose)?;
    let _log_guard = init_logging(&config)?;

    match cli.command {
        Commands::Run {
            roster,
            requirements,
            test_mode,
            batch_width,
            no_functional,
            keep_workspaces,
        } => {
            cmd::cmd_run(
                config,
                cmd::RunArgs {
                    roster,
                    requirements,
                    test_mode,
                    batch_width,
                    no_functional,
                    keep_workspaces,
                },
            )
            .await?;
        }
        Commands::Check => cmd::cmd_check(&config).await?,
        Commands::Cleanup => cmd::cmd_cleanup(&config)?,
        Commands::Summary { roster } => cmd::cmd_summary(&roster)?,
    }
    Ok(())
}

/// Logs go to a daily-rolling file under the project's log directory; the
/// terminal is reserved for the progress UI unless `--verbose` is set.
fn init_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "autograder.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if config.verbose {
        "autograder=debug"
    } else {
        "autograder=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true);

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);
    if config.verbose {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    } else {
        registry.init();
    }
    Ok(guard)
}
