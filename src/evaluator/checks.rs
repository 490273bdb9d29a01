//! Source-tree predicates the evaluator scores against. All read-only, all
//! tolerant of unreadable files.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static REACT_IMPORT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import.*React|from ['"]react['"]"#).unwrap());

static EXPORT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s+default|export\s+\{").unwrap());

static COMPONENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"function\s+[A-Z]\w*|const\s+[A-Z]\w*\s*=.*=>").unwrap());

const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];
const SAMPLE_LIMIT: usize = 5;

/// Source files under `src/`, in walk order.
pub fn source_files(workspace: &Path) -> Vec<PathBuf> {
    let src = workspace.join("src");
    if !src.is_dir() {
        return Vec::new();
    }
    walkdir::WalkDir::new(&src)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect()
}

/// Quality indicators from a bounded sample of source files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceSample {
    pub files_seen: usize,
    pub has_react_imports: bool,
    pub has_exports: bool,
    pub has_components: bool,
}

pub fn sample_source_quality(files: &[PathBuf]) -> SourceSample {
    let mut sample = SourceSample {
        files_seen: files.len(),
        ..Default::default()
    };
    for path in files.iter().take(SAMPLE_LIMIT) {
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        sample.has_react_imports |= REACT_IMPORT_REGEX.is_match(&content);
        sample.has_exports |= EXPORT_REGEX.is_match(&content);
        sample.has_components |= COMPONENT_REGEX.is_match(&content);
    }
    sample
}

/// Lowercased concatenation of every source file, for keyword evidence.
pub fn concatenated_source(files: &[PathBuf]) -> String {
    let mut out = String::new();
    for path in files {
        if let Ok(content) = std::fs::read_to_string(path) {
            out.push_str(&content.to_lowercase());
            out.push(' ');
        }
    }
    out
}

/// Any source file whose name suggests a routing setup.
pub fn has_router_file(files: &[PathBuf]) -> bool {
    files.iter().any(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_lowercase().contains("rout"))
            .unwrap_or(false)
    })
}

/// Whether a requirement set mentions routing or navigation at all.
pub fn mentions_routing(requirements: &[String]) -> bool {
    requirements
        .iter()
        .any(|r| r.to_lowercase().contains("rout") || r.to_lowercase().contains("navigation"))
}

pub fn mentions_state(requirements: &[String]) -> bool {
    requirements
        .iter()
        .any(|r| r.to_lowercase().contains("state") || r.contains("useState"))
}

/// Heuristic family applied to a requirement section, picked by keywords in
/// the section name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionCategory {
    /// Feature behavior: source keywords, dependency names, file names.
    Functional,
    /// Visual requirements: stylesheet content, viewport meta, source.
    Design,
    /// Code quality: source patterns and file naming.
    Quality,
    /// Everything else: all heuristics apply.
    General,
}

impl SectionCategory {
    pub fn for_name(name: &str) -> Self {
        let lowered = name.to_lowercase();
        if ["functional", "technical", "feature"]
            .iter()
            .any(|k| lowered.contains(k))
        {
            Self::Functional
        } else if ["ui", "design", "style", "visual"]
            .iter()
            .any(|k| lowered.contains(k))
        {
            Self::Design
        } else if lowered.contains("quality") || lowered.contains("code") {
            Self::Quality
        } else {
            Self::General
        }
    }
}

/// Facts gathered from the workspace once per evaluation, shared by every
/// requirement check.
pub struct WorkspaceEvidence {
    /// Lowercased concatenation of every source file.
    pub source: String,
    /// Lowercased concatenation of every stylesheet.
    pub styles: String,
    /// Lowercased dependency names from package.json (deps + devDeps).
    pub dependency_names: Vec<String>,
    /// Lowercased file names under src/ and public/.
    pub file_names: Vec<String>,
    pub has_viewport_meta: bool,
}

impl WorkspaceEvidence {
    pub fn collect(workspace: &Path) -> Self {
        let files = source_files(workspace);
        let mut styles = String::new();
        let mut file_names = Vec::new();
        for root in ["src", "public"] {
            let dir = workspace.join(root);
            if !dir.is_dir() {
                continue;
            }
            for entry in walkdir::WalkDir::new(&dir).into_iter().flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    file_names.push(name.to_lowercase());
                }
                let is_style = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "css" || e == "scss");
                if is_style {
                    if let Ok(content) = std::fs::read_to_string(entry.path()) {
                        styles.push_str(&content.to_lowercase());
                        styles.push(' ');
                    }
                }
            }
        }

        let dependency_names = manifest_dependency_names(workspace);
        let has_viewport_meta = std::fs::read_to_string(workspace.join("public/index.html"))
            .map(|html| html.to_lowercase().contains("name=\"viewport\""))
            .unwrap_or(false);

        Self {
            source: concatenated_source(&files),
            styles,
            dependency_names,
            file_names,
            has_viewport_meta,
        }
    }
}

fn manifest_dependency_names(workspace: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(workspace.join("package.json")) else {
        return Vec::new();
    };
    let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&content) else {
        return Vec::new();
    };
    let mut names = Vec::new();
    for table in ["dependencies", "devDependencies"] {
        if let Some(deps) = manifest[table].as_object() {
            names.extend(deps.keys().map(|k| k.to_lowercase()));
        }
    }
    names
}

/// Whether one requirement counts as met under a section's heuristic family.
pub fn requirement_met(
    category: SectionCategory,
    requirement: &str,
    evidence: &WorkspaceEvidence,
) -> bool {
    let in_source = requirement_matches_source(requirement, &evidence.source);
    match category {
        SectionCategory::Functional => {
            in_source
                || dependency_evidence(requirement, &evidence.dependency_names)
                || file_name_evidence(requirement, &evidence.file_names)
        }
        SectionCategory::Design => {
            in_source
                || keyword_evidence(requirement, &evidence.styles)
                || (requirement.to_lowercase().contains("responsive")
                    && evidence.has_viewport_meta)
        }
        SectionCategory::Quality => {
            in_source || file_name_evidence(requirement, &evidence.file_names)
        }
        SectionCategory::General => {
            in_source
                || dependency_evidence(requirement, &evidence.dependency_names)
                || file_name_evidence(requirement, &evidence.file_names)
                || keyword_evidence(requirement, &evidence.styles)
        }
    }
}

/// A dependency whose name shares a significant word with the requirement,
/// e.g. "react-router-dom" for "Use React Router".
fn dependency_evidence(requirement: &str, dependency_names: &[String]) -> bool {
    significant_words(requirement).any(|word| {
        word.len() > 3 && dependency_names.iter().any(|dep| dep.contains(word.as_str()))
    })
}

/// A file whose name carries one of the requirement's significant words.
fn file_name_evidence(requirement: &str, file_names: &[String]) -> bool {
    significant_words(requirement).any(|word| {
        word.len() > 3 && file_names.iter().any(|name| name.contains(word.as_str()))
    })
}

/// Loose keyword match against arbitrary collected text (stylesheets).
fn keyword_evidence(requirement: &str, text: &str) -> bool {
    !text.is_empty() && significant_words(requirement).any(|word| text.contains(word.as_str()))
}

fn significant_words(requirement: &str) -> impl Iterator<Item = String> + '_ {
    requirement
        .split_whitespace()
        .filter(|w| w.len() > 2)
        .map(|w| {
            w.to_lowercase()
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_string()
        })
        .filter(|w| !w.is_empty())
}

/// Debug leftovers the quality band penalizes.
pub fn has_debug_statements(files: &[PathBuf]) -> bool {
    files.iter().any(|path| {
        std::fs::read_to_string(path)
            .map(|content| content.contains("console.log") || content.contains("debugger"))
            .unwrap_or(false)
    })
}

/// Keyword evidence for one requirement inside concatenated source text: at
/// least half of its significant words, and at least one, must appear.
pub fn requirement_matches_source(requirement: &str, source: &str) -> bool {
    let req_lower = requirement.to_lowercase();
    let keywords: Vec<&str> = req_lower
        .split_whitespace()
        .filter(|w| w.len() > 2)
        .collect();
    if keywords.is_empty() {
        return false;
    }
    let matches = keywords.iter().filter(|k| source.contains(**k)).count();
    matches >= (keywords.len() / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_src(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_source_files_filters_extensions() {
        let dir = tempdir().unwrap();
        write_src(dir.path(), "src/App.jsx", "");
        write_src(dir.path(), "src/util.ts", "");
        write_src(dir.path(), "src/styles.css", "");
        write_src(dir.path(), "src/components/List.js", "");
        let files = source_files(dir.path());
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.extension().unwrap() != "css"));
    }

    #[test]
    fn test_sample_source_quality_detects_react_patterns() {
        let dir = tempdir().unwrap();
        write_src(
            dir.path(),
            "src/App.jsx",
            "import React from 'react';\nfunction App() { return <div/>; }\nexport default App;\n",
        );
        let files = source_files(dir.path());
        let sample = sample_source_quality(&files);
        assert!(sample.has_react_imports);
        assert!(sample.has_exports);
        assert!(sample.has_components);
    }

    #[test]
    fn test_sample_source_quality_arrow_component() {
        let dir = tempdir().unwrap();
        write_src(
            dir.path(),
            "src/Card.jsx",
            "const Card = (props) => <div>{props.title}</div>;\nexport { Card };\n",
        );
        let sample = sample_source_quality(&source_files(dir.path()));
        assert!(sample.has_components);
        assert!(sample.has_exports);
        assert!(!sample.has_react_imports);
    }

    #[test]
    fn test_has_router_file() {
        let dir = tempdir().unwrap();
        write_src(dir.path(), "src/AppRouter.jsx", "");
        assert!(has_router_file(&source_files(dir.path())));

        let plain = tempdir().unwrap();
        write_src(plain.path(), "src/App.jsx", "");
        assert!(!has_router_file(&source_files(plain.path())));
    }

    #[test]
    fn test_requirement_matches_source() {
        let source = "const recipelist = () => recipes.map(r => <recipe key={r.id} />);";
        assert!(requirement_matches_source(
            "Display a list of recipes",
            source
        ));
        assert!(!requirement_matches_source(
            "Implement user authentication",
            source
        ));
        assert!(!requirement_matches_source("a an of", source));
    }

    #[test]
    fn test_section_category_from_name() {
        assert_eq!(
            SectionCategory::for_name("Technical Requirements"),
            SectionCategory::Functional
        );
        assert_eq!(
            SectionCategory::for_name("UI Design"),
            SectionCategory::Design
        );
        assert_eq!(
            SectionCategory::for_name("Code Quality"),
            SectionCategory::Quality
        );
        assert_eq!(
            SectionCategory::for_name("Deliverables"),
            SectionCategory::General
        );
    }

    #[test]
    fn test_dependency_name_counts_as_functional_evidence() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies":{"react":"^18.0.0","react-router-dom":"^6.0.0"}}"#,
        )
        .unwrap();
        write_src(dir.path(), "src/App.jsx", "export default null;");

        let evidence = WorkspaceEvidence::collect(dir.path());
        assert!(requirement_met(
            SectionCategory::Functional,
            "Use React Router for page navigation",
            &evidence
        ));
        assert!(!requirement_met(
            SectionCategory::Functional,
            "Persist data with localforage",
            &evidence
        ));
    }

    #[test]
    fn test_viewport_meta_counts_as_design_evidence() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("public")).unwrap();
        fs::write(
            dir.path().join("public/index.html"),
            r#"<meta name="viewport" content="width=device-width" />"#,
        )
        .unwrap();

        let evidence = WorkspaceEvidence::collect(dir.path());
        assert!(evidence.has_viewport_meta);
        assert!(requirement_met(
            SectionCategory::Design,
            "Responsive layout on mobile",
            &evidence
        ));
    }

    #[test]
    fn test_stylesheet_content_counts_as_design_evidence() {
        let dir = tempdir().unwrap();
        write_src(dir.path(), "src/theme.css", ".recipe-card { display: grid; }");
        let evidence = WorkspaceEvidence::collect(dir.path());
        assert!(requirement_met(
            SectionCategory::Design,
            "Grid layout for recipe cards",
            &evidence
        ));
    }

    #[test]
    fn test_has_debug_statements() {
        let dir = tempdir().unwrap();
        write_src(dir.path(), "src/App.jsx", "console.log('here');");
        assert!(has_debug_statements(&source_files(dir.path())));

        let clean = tempdir().unwrap();
        write_src(clean.path(), "src/App.jsx", "export default null;");
        assert!(!has_debug_statements(&source_files(clean.path())));
    }

    #[test]
    fn test_mentions_routing_and_state() {
        let reqs = vec![
            "Use React Router for navigation".to_string(),
            "Manage cart state with useState".to_string(),
        ];
        assert!(mentions_routing(&reqs));
        assert!(mentions_state(&reqs));
        assert!(!mentions_routing(&["show a list".to_string()]));
    }
}
