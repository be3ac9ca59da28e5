use std::path::Path;

use anyhow::{Context, Result};

use crate::globs::PathGlobs;

pub const SUPPRESS_JSON: &str = ".ai/extractor-suppress.json";
pub const SUPPRESS_JSONC: &str = ".ai/extractor-suppress.jsonc";

/// Glob patterns exempting paths from "unused" classification.
#[derive(Debug, Clone, Default)]
pub struct Suppressions {
    globs: PathGlobs,
}

impl Suppressions {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            globs: PathGlobs::new(patterns),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// The suppression file `load` reads, preferring `.json` over `.jsonc`.
    pub fn source(root: &Path) -> Option<&'static str> {
        [SUPPRESS_JSON, SUPPRESS_JSONC]
            .into_iter()
            .find(|rel| root.join(rel).is_file())
    }

    /// Load the suppression list from [`Suppressions::source`].
    ///
    /// A missing file is not an error.
    pub fn load(root: &Path) -> Result<Self> {
        let Some(rel) = Self::source(root) else {
            return Ok(Self::empty());
        };
        let content = std::fs::read_to_string(root.join(rel))
            .with_context(|| format!("failed to read {rel}"))?;
        let patterns = parse_patterns(&content, rel.ends_with(".jsonc"))
            .with_context(|| format!("failed to parse {rel}"))?;
        Ok(Self::new(&patterns))
    }

    pub fn is_suppressed(&self, path: &str) -> bool {
        self.globs.is_match(path)
    }

    pub fn patterns(&self) -> &[String] {
        self.globs.patterns()
    }
}

/// Parse a plain JSON array of glob strings; `.jsonc` input may carry `//` comment lines.
fn parse_patterns(content: &str, strip_comments: bool) -> Result<Vec<String>> {
    let body = if strip_comments {
        content
            .lines()
            .filter(|line| !line.trim_start().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        content.to_string()
    };
    let patterns: Vec<String> = serde_json::from_str(&body)?;
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let s = Suppressions::load(dir.path()).unwrap();
        assert!(s.patterns().is_empty());
        assert!(!s.is_suppressed("tools/a.js"));
    }

    #[test]
    fn test_load_json_array() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".ai")).unwrap();
        std::fs::write(
            dir.path().join(SUPPRESS_JSON),
            r#"["tools/legacy/**", "scripts/*.js"]"#,
        )
        .unwrap();
        let s = Suppressions::load(dir.path()).unwrap();
        assert!(s.is_suppressed("tools/legacy/old.js"));
        assert!(s.is_suppressed("scripts/run.js"));
        assert!(!s.is_suppressed("tools/a.js"));
    }

    #[test]
    fn test_jsonc_comment_lines_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".ai")).unwrap();
        std::fs::write(
            dir.path().join(SUPPRESS_JSONC),
            "// keep generated code\n[\n  // codegen output\n  \"gen/**\"\n]\n",
        )
        .unwrap();
        let s = Suppressions::load(dir.path()).unwrap();
        assert!(s.is_suppressed("gen/api.js"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".ai")).unwrap();
        std::fs::write(dir.path().join(SUPPRESS_JSON), r#"{"not": "an array"}"#).unwrap();
        assert!(Suppressions::load(dir.path()).is_err());
    }

    #[test]
    fn test_source_names_the_file_read() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Suppressions::source(dir.path()), None);

        std::fs::create_dir_all(dir.path().join(".ai")).unwrap();
        std::fs::write(dir.path().join(SUPPRESS_JSONC), "[").unwrap();
        assert_eq!(Suppressions::source(dir.path()), Some(SUPPRESS_JSONC));
        let err = Suppressions::load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains(SUPPRESS_JSONC));

        std::fs::write(dir.path().join(SUPPRESS_JSON), "[]").unwrap();
        assert_eq!(Suppressions::source(dir.path()), Some(SUPPRESS_JSON));
    }
}
