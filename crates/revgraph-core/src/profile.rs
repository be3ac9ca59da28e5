use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::EXTRACTOR_VERSION;

pub const PROFILE_FILE: &str = ".ai/reports/extractor-profile.json";

/// Timing and cache statistics of one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub started_at: DateTime<Utc>,
    pub extractor_version: String,
    /// Files known to the cache after the run.
    pub files_scanned: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub entities: usize,
    pub relations: usize,
    pub diagnostics: usize,
    pub incremental: bool,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Counts gathered while the run is in progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCounts {
    pub files_scanned: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub entities: usize,
    pub relations: usize,
    pub diagnostics: usize,
}

/// Wall-clock profiler wrapped around a run.
pub struct Profiler {
    started_at: DateTime<Utc>,
    clock: Instant,
    incremental: bool,
}

impl Profiler {
    pub fn start(incremental: bool) -> Self {
        Self {
            started_at: Utc::now(),
            clock: Instant::now(),
            incremental,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finish(self, counts: RunCounts) -> ProfileReport {
        ProfileReport {
            started_at: self.started_at,
            extractor_version: EXTRACTOR_VERSION.to_string(),
            files_scanned: counts.files_scanned,
            cache_hits: counts.cache_hits,
            cache_misses: counts.cache_misses,
            entities: counts.entities,
            relations: counts.relations,
            diagnostics: counts.diagnostics,
            incremental: self.incremental,
            finished_at: Utc::now(),
            elapsed_ms: self.clock.elapsed().as_millis() as u64,
        }
    }
}

impl ProfileReport {
    /// Write the report to `.ai/reports/extractor-profile.json`.
    pub fn save(&self, project_root: &Path) -> Result<()> {
        let path = project_root.join(PROFILE_FILE);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).context("failed to create reports directory")?;
        }
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize profile report")?;
        std::fs::write(&path, content).context("failed to write profile report")?;
        Ok(())
    }
}
