//! End-to-end functional stage: boot the student's dev server, confirm a
//! React app is actually being served, then hand the live URL to the probe
//! strategy for interaction checks and requirement evidence.

pub mod probes;
pub mod server;
pub mod webdriver;

pub use probes::{ProbeReport, ProbeStrategy, detect_strategy};
pub use server::DevServer;

use crate::config::Config;
use crate::toolchain::{PackageManager, Toolchain};
use anyhow::{Context, Result};
use server::react_indicator_count;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Points for the dev server answering with a recognizable React page.
pub const APP_LOAD_POINTS: u32 = 20;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of the functional stage for one student. `score` is 0..=100.
#[derive(Debug, Clone, Default)]
pub struct FunctionalTestResult {
    pub server_started: bool,
    pub app_loads: bool,
    pub components_render: bool,
    pub buttons_work: bool,
    pub navigation_works: bool,
    pub forms_work: bool,
    pub requirements_met: Vec<String>,
    pub requirements_failed: Vec<String>,
    pub score: u32,
    pub notes: Vec<String>,
}

/// Runs the functional stage. The probe strategy is resolved once at
/// construction and reused for every student in the run.
pub struct FunctionalTestRunner {
    client: reqwest::Client,
    strategy: Box<dyn ProbeStrategy>,
    base_port: u16,
    server_ready: Duration,
}

impl FunctionalTestRunner {
    pub async fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        let strategy =
            detect_strategy(client.clone(), &config.webdriver_url, config.http_probes).await;
        info!(strategy = strategy.name(), "functional test strategy selected");
        Ok(Self {
            client,
            strategy,
            base_port: config.base_port,
            server_ready: config.server_ready,
        })
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Never fails: every problem becomes a zero-or-partial score with a
    /// note, and the dev server is always torn down before returning.
    pub async fn run(
        &self,
        toolchain: &Toolchain,
        workspace: &Path,
        pm: PackageManager,
        requirements: &[String],
    ) -> FunctionalTestResult {
        let mut result = FunctionalTestResult {
            requirements_failed: requirements.to_vec(),
            ..Default::default()
        };

        let server = match DevServer::start(
            toolchain,
            workspace,
            pm,
            self.base_port,
            self.server_ready,
            &self.client,
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                warn!(error = %e, "dev server failed to start");
                result.notes.push(format!("Development server failed to start: {e}"));
                return result;
            }
        };
        result.server_started = true;

        match self.fetch_root(server.url()).await {
            Some(html) if react_indicator_count(&html) >= 2 => {
                result.app_loads = true;
                result.score += APP_LOAD_POINTS;
                result.notes.push("App loads and serves a React page".to_string());

                let report = self.strategy.run(server.url(), requirements).await;
                merge_report(&mut result, report);
            }
            Some(_) => {
                result
                    .notes
                    .push("Server responded but the page does not look like a React app".to_string());
            }
            None => {
                result.notes.push("App did not respond to HTTP".to_string());
            }
        }

        server.stop().await;
        result.score = result.score.min(100);
        result
    }

    async fn fetch_root(&self, url: &str) -> Option<String> {
        let resp = self.client.get(url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.text().await.ok()
    }
}

fn merge_report(result: &mut FunctionalTestResult, report: ProbeReport) {
    result.components_render = report.components_render;
    result.buttons_work = report.buttons_work;
    result.navigation_works = report.navigation_works;
    result.forms_work = report.forms_work;
    result.requirements_met = report.requirements_met;
    result.requirements_failed = report.requirements_failed;
    result.score += report.score;
    result.notes.extend(report.notes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_report_adds_probe_score_to_load_points() {
        let mut result = FunctionalTestResult {
            server_started: true,
            app_loads: true,
            score: APP_LOAD_POINTS,
            ..Default::default()
        };
        let report = ProbeReport {
            components_render: true,
            buttons_work: true,
            score: 35,
            requirements_met: vec!["show list".to_string()],
            ..Default::default()
        };
        merge_report(&mut result, report);
        assert_eq!(result.score, APP_LOAD_POINTS + 35);
        assert!(result.components_render);
        assert_eq!(result.requirements_met.len(), 1);
    }

    #[tokio::test]
    async fn test_run_with_unspawnable_server_scores_zero() {
        let config_dir = tempfile::tempdir().unwrap();
        let config = Config::new(config_dir.path().to_path_buf(), false).unwrap();
        let runner = FunctionalTestRunner::new(&config).await.unwrap();

        let toolchain = Toolchain::new(Duration::from_secs(5), Duration::from_secs(5))
            .with_command_override("/no/such/binary");
        let workspace = tempfile::tempdir().unwrap();
        let requirements = vec!["show a recipe list".to_string()];

        let result = runner
            .run(
                &toolchain,
                workspace.path(),
                PackageManager::Npm,
                &requirements,
            )
            .await;
        assert!(!result.server_started);
        assert!(!result.app_loads);
        assert_eq!(result.score, 0);
        assert_eq!(result.requirements_failed, requirements);
        assert!(!result.notes.is_empty());
    }
}
