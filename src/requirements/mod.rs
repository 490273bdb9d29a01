//! Weighted requirement sections extracted from an assignment document.
//!
//! The document parsing itself belongs to an external collaborator; this
//! module defines the structured form the pipeline consumes and a JSON loader
//! for it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A named, point-weighted group of requirement strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementSection {
    pub name: String,
    /// Point weight for this section. Zero means "unspecified"; see
    /// [`RequirementSpec::normalize`].
    #[serde(default)]
    pub points: u32,
    pub items: Vec<String>,
}

/// The full requirement set for one run. Read-only to the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub sections: Vec<RequirementSection>,
}

impl RequirementSpec {
    /// Load a requirement spec from a JSON document of sections.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read requirements file {}", path.display()))?;
        let mut spec: RequirementSpec = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse requirements file {}", path.display()))?;
        spec.normalize();
        Ok(spec)
    }

    /// Scale section weights so they sum to 100. Sections with no declared
    /// weight share the total evenly; rounding remainder goes to the first
    /// section so the invariant holds exactly.
    pub fn normalize(&mut self) {
        if self.sections.is_empty() {
            return;
        }
        let declared: u32 = self.sections.iter().map(|s| s.points).sum();
        let n = self.sections.len() as u32;
        if declared == 0 {
            let share = 100 / n;
            for section in &mut self.sections {
                section.points = share;
            }
            self.sections[0].points += 100 - share * n;
            return;
        }
        let mut running = 0u32;
        for section in &mut self.sections {
            section.points = section.points * 100 / declared;
            running += section.points;
        }
        self.sections[0].points += 100 - running;
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.items.is_empty())
    }

    pub fn total_items(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    /// Flat view of every requirement string across sections, in order.
    pub fn all_items(&self) -> Vec<&str> {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter().map(String::as_str))
            .collect()
    }
}
