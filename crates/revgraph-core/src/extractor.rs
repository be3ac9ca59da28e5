use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::types::{Evidence, ExtractorKind, FileRole, PassOutput};

/// The content of one input file as seen by a pass.
pub struct SourceFile<'a> {
    pub rel_path: &'a str,
    pub roles: &'a BTreeSet<FileRole>,
    pub content: &'a str,
    /// Timestamp stamped on every piece of evidence from this observation.
    pub observed_at: DateTime<Utc>,
}

impl SourceFile<'_> {
    /// 1-based line number of a byte offset into the content.
    pub fn line_at(&self, offset: usize) -> usize {
        line_at(self.content, offset)
    }

    /// Evidence for a match at `offset`, or for the whole file when `None`.
    pub fn evidence(&self, kind: ExtractorKind, offset: Option<usize>) -> Evidence {
        Evidence {
            file: self.rel_path.to_string(),
            line: offset.map(|o| self.line_at(o)),
            extractor_kind: kind,
            timestamp: self.observed_at,
        }
    }
}

/// 1-based line number of a byte offset.
pub fn line_at(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// Trait that each extractor pass must implement.
///
/// `extract` is a pure function of the file: anything that depends on other
/// files is emitted as a pending reference and settled after all files are seen.
pub trait ExtractorPass: Send + Sync {
    /// Which construct kind this pass recognizes.
    fn kind(&self) -> ExtractorKind;

    /// Whether this pass reads files playing `role`.
    fn accepts(&self, role: FileRole) -> bool;

    /// Extract entities, relations and pending references from one file.
    ///
    /// An `Err` drops this pass's contribution for the file and is reported
    /// as a diagnostic; it never aborts the run.
    fn extract(&self, file: &SourceFile<'_>) -> Result<PassOutput>;
}
