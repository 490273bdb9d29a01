//! Student roster records and the store abstraction the pipeline writes
//! results back through.

mod json_store;

pub use json_store::JsonRoster;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal and in-flight states for one student's build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Pending,
    Processing,
    Success,
    Warning,
    Failed,
    Error,
}

impl Default for BuildStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Success => "Success",
            Self::Warning => "Warning",
            Self::Failed => "Failed",
            Self::Error => "Error",
        };
        f.write_str(label)
    }
}

/// One roster row. Identity fields are read-only to the pipeline; only the
/// result fields are mutated, exactly once per processing attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub repository_url: String,

    #[serde(default)]
    pub build_status: BuildStatus,
    #[serde(default)]
    pub grade: u32,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub build_errors: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl StudentRecord {
    pub fn new(name: impl Into<String>, repository_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            student_id: None,
            email: None,
            repository_url: repository_url.into(),
            build_status: BuildStatus::Pending,
            grade: 0,
            feedback: String::new(),
            build_errors: String::new(),
            processed_at: None,
        }
    }
}

/// Result fields recorded for one student after processing.
#[derive(Debug, Clone)]
pub struct StudentOutcome {
    pub status: BuildStatus,
    pub grade: u32,
    pub feedback: String,
    pub build_errors: String,
}

impl StudentOutcome {
    pub fn error(feedback: impl Into<String>, build_errors: impl Into<String>) -> Self {
        Self {
            status: BuildStatus::Error,
            grade: 0,
            feedback: feedback.into(),
            build_errors: build_errors.into(),
        }
    }
}

/// Aggregate statistics over processed records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub errors: usize,
    pub average_grade: f64,
    pub min_grade: u32,
    pub max_grade: u32,
}

/// Grade distribution for reporting consumers (letter brackets inclusive of
/// the lower bound).
#[derive(Debug, Clone, Serialize)]
pub struct GradeDistribution {
    pub count: usize,
    pub average: f64,
    pub median: f64,
    pub min: u32,
    pub max: u32,
    pub brackets: Vec<(String, usize)>,
}

pub fn grade_distribution(grades: &[u32]) -> Option<GradeDistribution> {
    if grades.is_empty() {
        return None;
    }
    let mut sorted = grades.to_vec();
    sorted.sort_unstable();
    let count = sorted.len();
    let average = sorted.iter().map(|&g| g as f64).sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] as f64 + sorted[count / 2] as f64) / 2.0
    } else {
        sorted[count / 2] as f64
    };
    let bracket = |lo: u32, hi: u32| sorted.iter().filter(|&&g| g >= lo && g <= hi).count();
    Some(GradeDistribution {
        count,
        average,
        median,
        min: sorted[0],
        max: sorted[count - 1],
        brackets: vec![
            ("A (90-100)".to_string(), bracket(90, 100)),
            ("B (80-89)".to_string(), bracket(80, 89)),
            ("C (70-79)".to_string(), bracket(70, 79)),
            ("D (60-69)".to_string(), bracket(60, 69)),
            ("F (0-59)".to_string(), bracket(0, 59)),
        ],
    })
}

/// Storage abstraction for the roster. The pipeline is the only writer, one
/// record at a time.
pub trait RosterStore: Send {
    fn load_roster(&mut self) -> anyhow::Result<Vec<StudentRecord>>;
    fn record_result(&mut self, index: usize, outcome: &StudentOutcome) -> anyhow::Result<()>;
    fn summary_stats(&self) -> RosterSummary;
}

pub(crate) fn summarize(records: &[StudentRecord]) -> RosterSummary {
    let processed: Vec<&StudentRecord> = records
        .iter()
        .filter(|r| r.processed_at.is_some())
        .collect();
    let grades: Vec<u32> = processed.iter().map(|r| r.grade).collect();
    RosterSummary {
        total: records.len(),
        success: processed
            .iter()
            .filter(|r| matches!(r.build_status, BuildStatus::Success | BuildStatus::Warning))
            .count(),
        failed: processed
            .iter()
            .filter(|r| r.build_status == BuildStatus::Failed)
            .count(),
        errors: processed
            .iter()
            .filter(|r| r.build_status == BuildStatus::Error)
            .count(),
        average_grade: if grades.is_empty() {
            0.0
        } else {
            grades.iter().map(|&g| g as f64).sum::<f64>() / grades.len() as f64
        },
        min_grade: grades.iter().copied().min().unwrap_or(0),
        max_grade: grades.iter().copied().max().unwrap_or(0),
    }
}
