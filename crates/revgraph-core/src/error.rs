use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::types::ExtractorKind;

/// Failures that degrade a run without aborting it.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{kind} pass skipped {path}: {message}")]
    Pass {
        kind: ExtractorKind,
        path: String,
        message: String,
    },
    #[error("ignoring configuration {path}: {message}")]
    Config { path: String, message: String },
    #[error("ignoring suppression list {path}: {message}")]
    Suppression { path: String, message: String },
    #[error("ignoring reachability report {path}: {message}")]
    Reachability { path: String, message: String },
    #[error("discarding extractor cache {path}: {message}")]
    Cache { path: String, message: String },
    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },
}

/// Stage of the run a diagnostic was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Config,
    Read,
    Extract,
    Suppression,
    Reachability,
    Cache,
    Merge,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Config => "config",
            Stage::Read => "read",
            Stage::Extract => "extract",
            Stage::Suppression => "suppression",
            Stage::Reachability => "reachability",
            Stage::Cache => "cache",
            Stage::Merge => "merge",
            Stage::Persist => "persist",
        };
        write!(f, "{s}")
    }
}

/// A swallowed failure, kept visible alongside the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub path: String,
    pub message: String,
}

impl From<ExtractError> for Diagnostic {
    fn from(err: ExtractError) -> Self {
        let message = err.to_string();
        let (stage, path) = match err {
            ExtractError::Config { path, .. } => (Stage::Config, path),
            ExtractError::Read { path, .. } => (Stage::Read, path),
            ExtractError::Pass { path, .. } => (Stage::Extract, path),
            ExtractError::Suppression { path, .. } => (Stage::Suppression, path),
            ExtractError::Reachability { path, .. } => (Stage::Reachability, path),
            ExtractError::Cache { path, .. } => (Stage::Cache, path),
            ExtractError::Write { path, .. } => (Stage::Persist, path),
        };
        Self {
            stage,
            path,
            message,
        }
    }
}

/// Accumulates diagnostics for one run, logging each as it arrives.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, err: ExtractError) {
        warn!("{err}");
        self.items.push(err.into());
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        warn!(stage = ?diagnostic.stage, path = %diagnostic.path, "{}", diagnostic.message);
        self.items.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
