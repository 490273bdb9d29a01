//! Requirements evaluation: turns a workspace, its build outcome, and the
//! functional-stage report into a banded 0..=100 score.
//!
//! Five bands: file structure (20), code quality (20), build and basic
//! functionality (20), end-to-end functionality (25), requirements matching
//! (15). With no requirement spec loaded, a coarser default scoring applies.

mod checks;

pub use checks::{SectionCategory, SourceSample};

use crate::functional::FunctionalTestResult;
use crate::requirements::RequirementSpec;
use crate::workspace::ProjectInfo;
use std::path::Path;
use tracing::debug;

pub const STRUCTURE_MAX: u32 = 20;
pub const QUALITY_MAX: u32 = 20;
pub const BUILD_MAX: u32 = 20;
pub const E2E_MAX: u32 = 25;
pub const REQUIREMENTS_MAX: u32 = 15;

/// Per-band scores plus the aggregate. `total` is always the band sum,
/// clamped to 100.
#[derive(Debug, Clone, Default)]
pub struct EvaluationResult {
    pub structure_score: u32,
    pub quality_score: u32,
    pub build_score: u32,
    pub e2e_score: u32,
    pub requirements_score: u32,
    pub total: u32,
    pub requirements_met: Vec<String>,
    pub requirements_failed: Vec<String>,
    pub notes: Vec<String>,
}

impl EvaluationResult {
    fn finish(mut self) -> Self {
        self.total = (self.structure_score
            + self.quality_score
            + self.build_score
            + self.e2e_score
            + self.requirements_score)
            .min(100);
        self.notes.push(format!(
            "File Structure: {}/{STRUCTURE_MAX}, Code Quality: {}/{QUALITY_MAX}, Build: {}/{BUILD_MAX}, End-to-End: {}/{E2E_MAX}, Requirements: {}/{REQUIREMENTS_MAX}",
            self.structure_score,
            self.quality_score,
            self.build_score,
            self.e2e_score,
            self.requirements_score
        ));
        self
    }
}

/// Score one workspace. Pure inspection; nothing in the workspace is
/// executed or modified.
pub fn evaluate(
    workspace: &Path,
    project: &ProjectInfo,
    build_succeeded: bool,
    functional: Option<&FunctionalTestResult>,
    spec: &RequirementSpec,
) -> EvaluationResult {
    let result = if spec.is_empty() {
        basic_evaluation(project, build_succeeded, functional)
    } else {
        full_evaluation(workspace, build_succeeded, functional, spec)
    };
    debug!(total = result.total, "evaluation complete");
    result
}

fn full_evaluation(
    workspace: &Path,
    build_succeeded: bool,
    functional: Option<&FunctionalTestResult>,
    spec: &RequirementSpec,
) -> EvaluationResult {
    let mut result = EvaluationResult::default();
    let all_requirements: Vec<String> =
        spec.all_items().iter().map(|s| s.to_string()).collect();
    let files = checks::source_files(workspace);

    result.structure_score = structure_score(workspace);
    result.quality_score = quality_score(&files);
    result.build_score = build_score(build_succeeded, &files, &all_requirements);
    result.e2e_score = e2e_score(functional);

    // Requirements band: each section picks a heuristic family by name, the
    // met ratio is weighted by section points (normalized to 100), then the
    // sum is scaled down to the band maximum.
    let evidence = checks::WorkspaceEvidence::collect(workspace);
    let functional_met: Vec<&String> = functional
        .map(|f| f.requirements_met.iter().collect())
        .unwrap_or_default();
    let mut earned = 0u32;
    for section in &spec.sections {
        if section.items.is_empty() {
            continue;
        }
        let category = SectionCategory::for_name(&section.name);
        let met = section
            .items
            .iter()
            .filter(|item| {
                let hit = checks::requirement_met(category, item, &evidence)
                    || functional_met.iter().any(|m| m == item);
                if hit {
                    result.requirements_met.push((*item).clone());
                } else {
                    result.requirements_failed.push((*item).clone());
                }
                hit
            })
            .count() as u32;
        earned += section.points * met / section.items.len() as u32;
        debug!(
            section = %section.name,
            ?category,
            met,
            of = section.items.len(),
            "section evaluated"
        );
    }
    result.requirements_score = (earned * REQUIREMENTS_MAX / 100).min(REQUIREMENTS_MAX);

    result.finish()
}

/// Fallback scoring when no requirement spec was provided: coarse bands
/// keyed off build success and manifest presence.
fn basic_evaluation(
    project: &ProjectInfo,
    build_succeeded: bool,
    functional: Option<&FunctionalTestResult>,
) -> EvaluationResult {
    let result = EvaluationResult {
        structure_score: if project.has_manifest { 20 } else { 10 },
        quality_score: if build_succeeded { 15 } else { 5 },
        build_score: if build_succeeded { 20 } else { 5 },
        requirements_score: if build_succeeded { 15 } else { 5 },
        e2e_score: e2e_score(functional),
        ..Default::default()
    };
    result.finish()
}

fn structure_score(workspace: &Path) -> u32 {
    let mut score = 0;
    for marker in ["package.json", "src", "public", "README.md"] {
        if workspace.join(marker).exists() {
            score += 5;
        }
    }
    let entry_files = [
        "src/App.js",
        "src/App.jsx",
        "src/App.tsx",
        "src/index.js",
        "src/index.jsx",
        "src/index.tsx",
    ];
    if entry_files.iter().any(|f| workspace.join(f).is_file()) {
        score += 5;
    }
    score.min(STRUCTURE_MAX)
}

fn quality_score(files: &[std::path::PathBuf]) -> u32 {
    if files.is_empty() {
        return 5;
    }
    let sample = checks::sample_source_quality(files);
    let mut score = 0;
    if sample.has_react_imports {
        score += 5;
    }
    if sample.has_exports {
        score += 5;
    }
    if sample.has_components {
        // Component definition with conventional PascalCase naming.
        score += 15;
    }
    let mut score = score.min(QUALITY_MAX);
    if checks::has_debug_statements(files) {
        score = score.saturating_sub(5);
    }
    score
}

fn build_score(
    build_succeeded: bool,
    files: &[std::path::PathBuf],
    requirements: &[String],
) -> u32 {
    let mut score = if build_succeeded { 20 } else { 5 };
    if checks::mentions_routing(requirements) && checks::has_router_file(files) {
        score += 5;
    }
    if checks::mentions_state(requirements) {
        score += 5;
    }
    score.min(BUILD_MAX)
}

fn e2e_score(functional: Option<&FunctionalTestResult>) -> u32 {
    functional
        .map(|f| (f.score * E2E_MAX / 100).min(E2E_MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::RequirementSection;
    use crate::toolchain::PackageManager;
    use std::fs;
    use tempfile::tempdir;

    fn project_info(has_manifest: bool) -> ProjectInfo {
        ProjectInfo {
            has_manifest,
            has_react_dependency: has_manifest,
            react_version: has_manifest.then(|| "^18.0.0".to_string()),
            package_manager: PackageManager::Npm,
            has_src_folder: false,
            has_public_folder: false,
            has_build_script: false,
            has_readme: false,
            has_entry_file: false,
        }
    }

    fn scaffold_full_project(dir: &Path) {
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::create_dir_all(dir.join("public")).unwrap();
        fs::write(dir.join("package.json"), "{}").unwrap();
        fs::write(dir.join("README.md"), "# Recipes").unwrap();
        fs::write(
            dir.join("src/App.jsx"),
            "import React from 'react';\nimport { useState } from 'react';\nfunction App() { const [recipes] = useState([]); return <div>recipe list</div>; }\nexport default App;\n",
        )
        .unwrap();
        fs::write(dir.join("src/AppRouter.jsx"), "export default null;\n").unwrap();
    }

    fn spec_with(items: &[(&str, u32, &[&str])]) -> RequirementSpec {
        let mut spec = RequirementSpec {
            sections: items
                .iter()
                .map(|(name, points, reqs)| RequirementSection {
                    name: name.to_string(),
                    points: *points,
                    items: reqs.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        };
        spec.normalize();
        spec
    }

    #[test]
    fn test_full_evaluation_on_complete_project() {
        let dir = tempdir().unwrap();
        scaffold_full_project(dir.path());
        let spec = spec_with(&[(
            "Technical",
            100,
            &["Display recipe list", "Use React Router for navigation state"],
        )]);

        let result = evaluate(dir.path(), &project_info(true), true, None, &spec);
        assert_eq!(result.structure_score, STRUCTURE_MAX);
        assert_eq!(result.quality_score, QUALITY_MAX);
        assert_eq!(result.build_score, BUILD_MAX); // 20 base, routing/state capped
        assert_eq!(result.e2e_score, 0);
        assert!(result.requirements_score > 0);
        assert_eq!(
            result.total,
            result.structure_score
                + result.quality_score
                + result.build_score
                + result.requirements_score
        );
    }

    #[test]
    fn test_empty_workspace_scores_low_but_nonzero() {
        let dir = tempdir().unwrap();
        let spec = spec_with(&[("Technical", 100, &["Display recipe list"])]);
        let result = evaluate(dir.path(), &project_info(false), false, None, &spec);
        assert_eq!(result.structure_score, 0);
        assert_eq!(result.quality_score, 5);
        assert_eq!(result.build_score, 5);
        assert_eq!(result.requirements_score, 0);
        assert_eq!(result.total, 10);
        assert_eq!(result.requirements_failed.len(), 1);
    }

    #[test]
    fn test_basic_evaluation_without_spec() {
        let dir = tempdir().unwrap();
        let ok = evaluate(
            dir.path(),
            &project_info(true),
            true,
            None,
            &RequirementSpec::default(),
        );
        assert_eq!(ok.total, 20 + 15 + 20 + 15);

        let bad = evaluate(
            dir.path(),
            &project_info(false),
            false,
            None,
            &RequirementSpec::default(),
        );
        assert_eq!(bad.total, 10 + 5 + 5 + 5);
    }

    #[test]
    fn test_debug_statements_reduce_quality_score() {
        let dir = tempdir().unwrap();
        scaffold_full_project(dir.path());
        fs::write(dir.path().join("src/debug.js"), "console.log('x');").unwrap();
        let spec = spec_with(&[("Technical", 100, &["Display recipe list"])]);
        let result = evaluate(dir.path(), &project_info(true), true, None, &spec);
        assert_eq!(result.quality_score, QUALITY_MAX - 5);
    }

    #[test]
    fn test_design_section_uses_stylesheet_evidence() {
        let dir = tempdir().unwrap();
        scaffold_full_project(dir.path());
        fs::write(dir.path().join("src/theme.css"), ".layout { display: grid; }").unwrap();
        let spec = spec_with(&[("UI Design", 100, &["Grid layout for the page"])]);
        let result = evaluate(dir.path(), &project_info(true), true, None, &spec);
        assert_eq!(result.requirements_score, REQUIREMENTS_MAX);
        assert!(result.requirements_failed.is_empty());
    }

    #[test]
    fn test_e2e_score_scales_functional_result() {
        let functional = FunctionalTestResult {
            score: 100,
            ..Default::default()
        };
        assert_eq!(e2e_score(Some(&functional)), E2E_MAX);

        let half = FunctionalTestResult {
            score: 50,
            ..Default::default()
        };
        assert_eq!(e2e_score(Some(&half)), 12);
        assert_eq!(e2e_score(None), 0);
    }

    #[test]
    fn test_functional_evidence_counts_toward_requirements() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/App.jsx"), "export default null;").unwrap();

        let spec = spec_with(&[("Features", 100, &["Display weather forecast panel"])]);
        let functional = FunctionalTestResult {
            requirements_met: vec!["Display weather forecast panel".to_string()],
            ..Default::default()
        };
        let result = evaluate(dir.path(), &project_info(true), true, Some(&functional), &spec);
        assert_eq!(result.requirements_met.len(), 1);
        assert_eq!(result.requirements_score, REQUIREMENTS_MAX);
    }
}
