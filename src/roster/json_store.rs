use super::{RosterStore, RosterSummary, StudentOutcome, StudentRecord, summarize};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// JSON-file-backed roster: an array of student records. Results are written
/// back in place after every student so a stopped run keeps everything graded
/// so far.
pub struct JsonRoster {
    path: PathBuf,
    records: Vec<StudentRecord>,
}

impl JsonRoster {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read roster file {}", path.display()))?;
        let records: Vec<StudentRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse roster file {}", path.display()))?;
        Ok(Self { path, records })
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records)
            .context("Failed to serialize roster")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write roster file {}", self.path.display()))
    }
}

impl RosterStore for JsonRoster {
    fn load_roster(&mut self) -> Result<Vec<StudentRecord>> {
        Ok(self.records.clone())
    }

    fn record_result(&mut self, index: usize, outcome: &StudentOutcome) -> Result<()> {
        let Some(record) = self.records.get_mut(index) else {
            bail!("Roster index {} out of range", index);
        };
        record.build_status = outcome.status;
        record.grade = outcome.grade;
        record.feedback = outcome.feedback.clone();
        record.build_errors = outcome.build_errors.clone();
        record.processed_at = Some(Utc::now());
        self.save()
    }

    fn summary_stats(&self) -> RosterSummary {
        summarize(&self.records)
    }
}
