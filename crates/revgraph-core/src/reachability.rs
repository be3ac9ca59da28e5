use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::globs::PathGlobs;

pub const REPORT_FILE: &str = ".ai/dep-report.json";

/// The part of the dependency report this engine reads.
#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    unreachable: Option<Vec<String>>,
}

/// Paths an external reachability analyzer found unreachable from entry points.
#[derive(Debug, Clone, Default)]
pub struct ReachabilityReport {
    unreachable: PathGlobs,
}

impl ReachabilityReport {
    pub fn new(unreachable: &[String]) -> Self {
        Self {
            unreachable: PathGlobs::new(unreachable),
        }
    }

    /// Load `.ai/dep-report.json`. A missing report means nothing is unreachable.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(REPORT_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(&path).context("failed to read reachability report")?;
        let raw: RawReport =
            serde_json::from_str(&content).context("failed to parse reachability report")?;
        Ok(Self::new(&raw.unreachable.unwrap_or_default()))
    }

    pub fn is_unreachable(&self, path: &str) -> bool {
        self.unreachable.is_match(path)
    }

    pub fn is_empty(&self) -> bool {
        self.unreachable.is_empty()
    }
}
