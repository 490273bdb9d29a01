//! Probe strategies for a served student app.
//!
//! A strategy is chosen once per run, not per student: full browser
//! automation when a WebDriver endpoint answers, an HTTP probe that follows
//! links when it doesn't, and single-document parsing when extra requests
//! are disallowed. All strategies report on the same axes with the same
//! point bands, so grades stay comparable across environments; a strategy
//! that cannot interact simply earns the presence-only tier.

use super::webdriver::WebDriverClient;
use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{debug, warn};

pub const RENDER_POINTS: u32 = 15;
pub const BUTTON_POINTS: u32 = 20;
pub const BUTTON_PRESENCE_POINTS: u32 = 10;
pub const NAV_POINTS: u32 = 20;
pub const NAV_PRESENCE_POINTS: u32 = 5;
pub const FORM_POINTS: u32 = 15;
pub const FORM_PRESENCE_POINTS: u32 = 10;
pub const EVIDENCE_BUDGET: u32 = 30;

/// Minimum body text length before the app counts as rendering content.
pub const RENDER_CONTENT_THRESHOLD: usize = 50;

const LINK_FOLLOW_LIMIT: usize = 3;

/// What one probe pass observed, plus the probe-stage score (0..=100).
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub components_render: bool,
    pub buttons_work: bool,
    pub navigation_works: bool,
    pub forms_work: bool,
    pub requirements_met: Vec<String>,
    pub requirements_failed: Vec<String>,
    pub score: u32,
    pub notes: Vec<String>,
}

#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, base_url: &str, requirements: &[String]) -> ProbeReport;
}

/// Pick the richest strategy the environment supports. Called once per run.
pub async fn detect_strategy(
    http: reqwest::Client,
    webdriver_url: &str,
    allow_http_probes: bool,
) -> Box<dyn ProbeStrategy> {
    let driver = WebDriverClient::new(http.clone(), webdriver_url);
    if driver.status_ok().await {
        debug!(%webdriver_url, "webdriver available, using browser probe");
        return Box::new(WebDriverProbe::new(driver));
    }
    if allow_http_probes {
        debug!("webdriver unavailable, using http probe");
        Box::new(HttpProbe::new(http))
    } else {
        debug!("http probes disallowed, using static probe");
        Box::new(StaticProbe::new(http))
    }
}

/// Structure counts pulled out of one HTML document.
#[derive(Debug, Clone, Default)]
pub(crate) struct DomFacts {
    pub buttons: usize,
    pub links: usize,
    pub forms: usize,
    pub body_text: String,
    pub link_hrefs: Vec<String>,
}

pub(crate) fn analyze_dom(html: &str) -> DomFacts {
    let doc = Html::parse_document(html);
    let button_sel =
        Selector::parse("button, input[type=\"button\"], input[type=\"submit\"]").unwrap();
    let link_sel = Selector::parse("a[href]").unwrap();
    let form_sel =
        Selector::parse("form, input[type=\"text\"], input[type=\"email\"], textarea").unwrap();

    let link_hrefs: Vec<String> = doc
        .select(&link_sel)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect();

    DomFacts {
        buttons: doc.select(&button_sel).count(),
        links: link_hrefs.len(),
        forms: doc.select(&form_sel).count(),
        body_text: doc.root_element().text().collect::<Vec<_>>().join(" "),
        link_hrefs,
    }
}

/// Keyword-evidence match: a requirement counts as met when at least half of
/// its significant words (and at least one) appear in the page text.
pub(crate) fn requirement_evidence(
    body_text: &str,
    requirements: &[String],
) -> (Vec<String>, Vec<String>) {
    let lowered = body_text.to_lowercase();
    let mut met = Vec::new();
    let mut failed = Vec::new();
    for requirement in requirements {
        let req_lower = requirement.to_lowercase();
        let keywords: Vec<&str> = req_lower
            .split_whitespace()
            .filter(|w| w.len() > 2)
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .collect();
        let matches = keywords.iter().filter(|k| lowered.contains(**k)).count();
        let needed = (keywords.len() / 2).max(1);
        if !keywords.is_empty() && matches >= needed {
            met.push(requirement.clone());
        } else {
            failed.push(requirement.clone());
        }
    }
    (met, failed)
}

pub(crate) fn evidence_points(met: usize, total: usize) -> u32 {
    if total == 0 || met == 0 {
        return 0;
    }
    let per_item = (EVIDENCE_BUDGET / total as u32).max(1);
    (per_item * met as u32).min(EVIDENCE_BUDGET)
}

fn presence_report(facts: &DomFacts, requirements: &[String]) -> ProbeReport {
    let mut report = ProbeReport::default();
    if facts.body_text.trim().len() > RENDER_CONTENT_THRESHOLD {
        report.components_render = true;
        report.score += RENDER_POINTS;
        report.notes.push("App renders with content".to_string());
    }
    if facts.buttons > 0 {
        report.buttons_work = true;
        report.score += BUTTON_PRESENCE_POINTS;
        report
            .notes
            .push(format!("Found {} buttons in markup", facts.buttons));
    }
    if facts.links > 0 {
        report.navigation_works = true;
        report.score += NAV_PRESENCE_POINTS;
        report
            .notes
            .push(format!("Found {} navigation links", facts.links));
    }
    if facts.forms > 0 {
        report.forms_work = true;
        report.score += FORM_PRESENCE_POINTS;
        report
            .notes
            .push(format!("Found {} form elements", facts.forms));
    }
    let (met, failed) = requirement_evidence(&facts.body_text, requirements);
    report.score += evidence_points(met.len(), requirements.len());
    report.requirements_met = met;
    report.requirements_failed = failed;
    report.score = report.score.min(100);
    report
}

/// Fetches the root document and follows a few same-origin links to confirm
/// navigation actually serves distinct content.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn navigation_confirmed(&self, base_url: &str, facts: &DomFacts, root_html: &str) -> bool {
        let Ok(base) = Url::parse(base_url) else {
            return false;
        };
        for href in facts
            .link_hrefs
            .iter()
            .filter(|h| !h.starts_with('#'))
            .take(LINK_FOLLOW_LIMIT)
        {
            let Ok(target) = base.join(href) else {
                continue;
            };
            if target.host_str() != base.host_str() {
                continue;
            }
            if let Ok(resp) = self.client.get(target).send().await {
                if resp.status().is_success() {
                    if let Ok(body) = resp.text().await {
                        if body != root_html {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

#[async_trait]
impl ProbeStrategy for HttpProbe {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn run(&self, base_url: &str, requirements: &[String]) -> ProbeReport {
        let html = match fetch_text(&self.client, base_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(%base_url, error = %e, "http probe could not fetch app");
                let mut report = ProbeReport::default();
                report.notes.push(format!("Failed to fetch app: {e}"));
                return report;
            }
        };
        let facts = analyze_dom(&html);
        let mut report = presence_report(&facts, requirements);
        if facts.links > 0 && self.navigation_confirmed(base_url, &facts, &html).await {
            report.score = (report.score - NAV_PRESENCE_POINTS + NAV_POINTS).min(100);
            report
                .notes
                .push("Navigation serves distinct pages".to_string());
        }
        report
    }
}

/// Judges the app from its root document alone. Used when extra requests
/// against student code are not wanted.
pub struct StaticProbe {
    client: reqwest::Client,
}

impl StaticProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProbeStrategy for StaticProbe {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn run(&self, base_url: &str, requirements: &[String]) -> ProbeReport {
        match fetch_text(&self.client, base_url).await {
            Ok(html) => presence_report(&analyze_dom(&html), requirements),
            Err(e) => {
                warn!(%base_url, error = %e, "static probe could not fetch app");
                let mut report = ProbeReport::default();
                report.notes.push(format!("Failed to fetch app: {e}"));
                report
            }
        }
    }
}

/// Drives a real browser through WebDriver: clicks a button, follows a link,
/// types into a field, and reads the rendered text for evidence matching.
pub struct WebDriverProbe {
    driver: WebDriverClient,
}

impl WebDriverProbe {
    pub fn new(driver: WebDriverClient) -> Self {
        Self { driver }
    }

    async fn probe(&self, base_url: &str, requirements: &[String]) -> anyhow::Result<ProbeReport> {
        let session = self.driver.new_session().await?;
        let mut report = ProbeReport::default();

        session.navigate(base_url).await?;
        // The dev server answered before navigation; give hydration a moment.
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let body_text = session.body_text().await.unwrap_or_default();
        if body_text.trim().len() > RENDER_CONTENT_THRESHOLD {
            report.components_render = true;
            report.score += RENDER_POINTS;
            report.notes.push("Components render with content".to_string());
        }

        let buttons = session
            .find_elements("button, input[type=\"button\"], input[type=\"submit\"]")
            .await
            .unwrap_or_default();
        if let Some(first) = buttons.first() {
            if session.click(first).await.is_ok() {
                report.buttons_work = true;
                report.score += BUTTON_POINTS;
                report
                    .notes
                    .push(format!("Clicked one of {} buttons", buttons.len()));
            } else {
                report.score += BUTTON_PRESENCE_POINTS;
                report
                    .notes
                    .push(format!("Found {} buttons but clicking failed", buttons.len()));
            }
        }

        let links = session
            .find_elements("a, [role=\"button\"]")
            .await
            .unwrap_or_default();
        if let Some(first) = links.first() {
            let url_before = session.current_url().await.unwrap_or_default();
            if session.click(first).await.is_ok() {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                let url_after = session.current_url().await.unwrap_or_default();
                let text_after = session.body_text().await.unwrap_or_default();
                if url_after != url_before || text_after != body_text {
                    report.navigation_works = true;
                    report.score += NAV_POINTS;
                    report
                        .notes
                        .push(format!("Navigation works across {} links", links.len()));
                } else {
                    report.score += NAV_PRESENCE_POINTS;
                    report
                        .notes
                        .push(format!("Found {} links but no route change", links.len()));
                }
            }
        }

        let inputs = session
            .find_elements("input[type=\"text\"], input[type=\"email\"], textarea")
            .await
            .unwrap_or_default();
        if let Some(first) = inputs.first() {
            if session.send_keys(first, "test").await.is_ok() {
                report.forms_work = true;
                report.score += FORM_POINTS;
                report
                    .notes
                    .push(format!("Filled one of {} form fields", inputs.len()));
            }
        }

        let (met, failed) = requirement_evidence(&body_text, requirements);
        report.score += evidence_points(met.len(), requirements.len());
        report.requirements_met = met;
        report.requirements_failed = failed;
        report.score = report.score.min(100);

        session.close().await;
        Ok(report)
    }
}

#[async_trait]
impl ProbeStrategy for WebDriverProbe {
    fn name(&self) -> &'static str {
        "webdriver"
    }

    async fn run(&self, base_url: &str, requirements: &[String]) -> ProbeReport {
        match self.probe(base_url, requirements).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "browser probe failed");
                let mut report = ProbeReport::default();
                report.notes.push(format!("Browser probe failed: {e}"));
                report
            }
        }
    }
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> anyhow::Result<String> {
    Ok(client.get(url).send().await?.error_for_status()?.text().await?)
}
