//! Grade synthesis: collapses evaluation and build results into the final
//! 0..=100 grade plus narrative feedback for the roster.

use crate::config::GradingScale;
use crate::evaluator::{
    BUILD_MAX, E2E_MAX, EvaluationResult, QUALITY_MAX, REQUIREMENTS_MAX, STRUCTURE_MAX,
};
use crate::toolchain::output::BuildReport;
use tracing::info;

const ERROR_SNIPPET_LEN: usize = 200;

pub struct Grader {
    scale: GradingScale,
}

impl Grader {
    pub fn new(scale: GradingScale) -> Self {
        Self { scale }
    }

    /// Three-point grading from build outcome alone. Used when no
    /// requirement spec is loaded and evaluation depth isn't wanted.
    pub fn basic_grade(&self, build_succeeded: bool, has_warnings: bool) -> (u32, String) {
        let (grade, feedback) = if build_succeeded {
            if has_warnings {
                (
                    self.scale.build_with_warnings,
                    "Project builds successfully but with warnings. Consider addressing the warnings for better code quality.",
                )
            } else {
                (
                    self.scale.build_success,
                    "Excellent! Project builds successfully without errors or warnings.",
                )
            }
        } else {
            (
                self.scale.build_failure,
                "Project failed to build. Please fix the compilation errors and ensure all dependencies are properly configured.",
            )
        };
        info!(grade, build_succeeded, has_warnings, "basic grade assigned");
        (grade, feedback.to_string())
    }

    /// Full grading from the banded evaluation, with a per-band breakdown
    /// and build diagnostics in the feedback text.
    pub fn requirements_grade(
        &self,
        student_name: &str,
        evaluation: &EvaluationResult,
        build: &BuildReport,
    ) -> (u32, String) {
        let grade = evaluation.total.min(100);

        let mut lines = vec![
            format!("Evaluation report for {student_name}"),
            format!("Final grade: {grade}/100"),
            String::new(),
            "Component scores:".to_string(),
            format!("  - File structure: {}/{STRUCTURE_MAX}", evaluation.structure_score),
            format!("  - Code quality: {}/{QUALITY_MAX}", evaluation.quality_score),
            format!("  - Build and basic functionality: {}/{BUILD_MAX}", evaluation.build_score),
            format!("  - End-to-end functionality: {}/{E2E_MAX}", evaluation.e2e_score),
            format!("  - Requirements matching: {}/{REQUIREMENTS_MAX}", evaluation.requirements_score),
            String::new(),
        ];

        if build.succeeded {
            lines.push("Build status: successful".to_string());
            for warning in &build.output_warnings {
                lines.push(format!("  - {warning}"));
            }
        } else {
            lines.push("Build status: failed".to_string());
            if !build.error_excerpt.is_empty() {
                lines.push(format!("Build errors: {}", snippet(&build.error_excerpt)));
            }
            for suggestion in &build.suggestions {
                lines.push(format!("  - {suggestion}"));
            }
        }

        if !evaluation.requirements_met.is_empty() {
            lines.push(format!(
                "Requirements met: {}",
                evaluation.requirements_met.len()
            ));
        }
        if !evaluation.requirements_failed.is_empty() {
            lines.push(format!(
                "Requirements not met: {}",
                evaluation.requirements_failed.len()
            ));
        }

        lines.push(String::new());
        lines.push(interpretation(grade).to_string());

        info!(grade, student = student_name, "requirements grade assigned");
        (grade, lines.join("\n"))
    }
}

fn interpretation(grade: u32) -> &'static str {
    if grade >= 90 {
        "Excellent work! The project meets the requirements with a high quality implementation."
    } else if grade >= 75 {
        "Good work! The project meets most requirements with some areas for improvement."
    } else if grade >= 60 {
        "Satisfactory work. The project meets basic requirements but needs significant improvements."
    } else {
        "The project needs substantial work to meet the assignment requirements."
    }
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= ERROR_SNIPPET_LEN {
        return trimmed.to_string();
    }
    let mut cut = ERROR_SNIPPET_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &trimmed[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grader() -> Grader {
        Grader::new(GradingScale::default())
    }

    fn build_report(succeeded: bool, excerpt: &str) -> BuildReport {
        BuildReport {
            succeeded,
            has_warnings: false,
            artifact_dir: None,
            artifact_files: 0,
            artifact_bytes: 0,
            has_entry_html: false,
            has_scripts: false,
            has_stylesheets: false,
            output_warnings: Vec::new(),
            categories: Vec::new(),
            suggestions: if succeeded {
                Vec::new()
            } else {
                vec!["Run npm install to ensure all dependencies are installed".to_string()]
            },
            error_excerpt: excerpt.to_string(),
        }
    }

    #[test]
    fn test_basic_grade_three_outcomes() {
        let g = grader();
        assert_eq!(g.basic_grade(true, false).0, 100);
        assert_eq!(g.basic_grade(true, true).0, 50);
        assert_eq!(g.basic_grade(false, false).0, 0);
        assert!(g.basic_grade(false, true).1.contains("failed to build"));
    }

    #[test]
    fn test_requirements_grade_uses_evaluation_total() {
        let evaluation = EvaluationResult {
            structure_score: 20,
            quality_score: 20,
            build_score: 20,
            e2e_score: 25,
            requirements_score: 15,
            total: 100,
            ..Default::default()
        };
        let (grade, feedback) =
            grader().requirements_grade("Ada", &evaluation, &build_report(true, ""));
        assert_eq!(grade, 100);
        assert!(feedback.contains("Ada"));
        assert!(feedback.contains("Final grade: 100/100"));
        assert!(feedback.contains("Build status: successful"));
        assert!(feedback.contains("Excellent work"));
    }

    #[test]
    fn test_successful_build_feedback_lists_output_warnings() {
        let mut report = build_report(true, "");
        report
            .output_warnings
            .push("Build output has no index.html".to_string());
        let (_, feedback) =
            grader().requirements_grade("Cam", &EvaluationResult::default(), &report);
        assert!(feedback.contains("Build status: successful"));
        assert!(feedback.contains("no index.html"));
    }

    #[test]
    fn test_interpretation_thresholds() {
        assert!(interpretation(90).contains("Excellent"));
        assert!(interpretation(89).contains("Good work"));
        assert!(interpretation(75).contains("Good work"));
        assert!(interpretation(60).contains("Satisfactory"));
        assert!(interpretation(59).contains("substantial work"));
    }

    #[test]
    fn test_failed_build_feedback_carries_errors_and_suggestions() {
        let evaluation = EvaluationResult {
            total: 30,
            requirements_failed: vec!["Display list".to_string()],
            ..Default::default()
        };
        let long_error = format!("Module not found {}", "x".repeat(400));
        let (grade, feedback) =
            grader().requirements_grade("Bob", &evaluation, &build_report(false, &long_error));
        assert_eq!(grade, 30);
        assert!(feedback.contains("Build status: failed"));
        assert!(feedback.contains("Module not found"));
        assert!(feedback.contains("..."));
        assert!(feedback.contains("npm install"));
        assert!(feedback.contains("Requirements not met: 1"));
    }
}
