use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use crate::reachability::ReachabilityReport;
use crate::suppress::Suppressions;
use crate::types::{Entity, Lifecycle};

/// In-source annotation markers found in a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Annotations {
    pub deprecated: bool,
    /// `@dynamic` or `@keep`
    pub keep: bool,
}

/// Matches annotation markers inside comments.
pub struct AnnotationScanner {
    deprecated: Regex,
    keep: Regex,
}

// A marker counts when it follows a comment opener on the same line. `//` and
// `/*` open a comment only at line start or after whitespace or `;`, so URLs
// inside string literals never do.
const DEPRECATED_SRC: &str = r"(?m)(?:(?:^|[\s;])(?://|/\*)|^\s*\*|^\s*#).*@deprecated\b";
const KEEP_SRC: &str = r"(?m)(?:(?:^|[\s;])(?://|/\*)|^\s*\*|^\s*#).*@(?:dynamic|keep)\b";

impl AnnotationScanner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            deprecated: Regex::new(DEPRECATED_SRC).context("failed to compile @deprecated pattern")?,
            keep: Regex::new(KEEP_SRC).context("failed to compile @dynamic/@keep pattern")?,
        })
    }

    pub fn scan(&self, content: &str) -> Annotations {
        Annotations {
            deprecated: self.deprecated.is_match(content),
            keep: self.keep.is_match(content),
        }
    }
}

/// Decide an entity's lifecycle.
///
/// Precedence: `@deprecated` > suppression > `@dynamic`/`@keep` > reachability.
/// Annotations come from the entity's first source path only.
pub fn classify(
    entity: &Entity,
    suppressions: &Suppressions,
    reachability: &ReachabilityReport,
    annotations: Annotations,
) -> Lifecycle {
    if annotations.deprecated {
        return Lifecycle::Deprecated;
    }
    if entity
        .source_paths
        .iter()
        .any(|p| suppressions.is_suppressed(p))
    {
        return Lifecycle::Active;
    }
    if annotations.keep {
        return Lifecycle::Active;
    }
    let all_unreachable = !entity.source_paths.is_empty()
        && entity
            .source_paths
            .iter()
            .all(|p| reachability.is_unreachable(p));
    if all_unreachable {
        Lifecycle::Unused
    } else {
        Lifecycle::Active
    }
}

/// Runs [`classify`] over a merged entity set, reading each first source file once.
pub struct LifecycleClassifier<'a> {
    root: &'a Path,
    suppressions: &'a Suppressions,
    reachability: &'a ReachabilityReport,
    scanner: &'a AnnotationScanner,
    memo: HashMap<String, Annotations>,
}

impl<'a> LifecycleClassifier<'a> {
    pub fn new(
        root: &'a Path,
        suppressions: &'a Suppressions,
        reachability: &'a ReachabilityReport,
        scanner: &'a AnnotationScanner,
    ) -> Self {
        Self {
            root,
            suppressions,
            reachability,
            scanner,
            memo: HashMap::new(),
        }
    }

    fn annotations_for(&mut self, rel_path: &str) -> Annotations {
        if let Some(found) = self.memo.get(rel_path) {
            return *found;
        }
        // Unreadable files carry no annotations.
        let found = std::fs::read_to_string(self.root.join(rel_path))
            .map(|content| self.scanner.scan(&content))
            .unwrap_or_default();
        self.memo.insert(rel_path.to_string(), found);
        found
    }

    pub fn classify_all(&mut self, entities: &mut [Entity]) {
        for entity in entities.iter_mut() {
            let annotations = match entity.source_paths.first() {
                Some(first) => {
                    let first = first.clone();
                    self.annotations_for(&first)
                }
                None => Annotations::default(),
            };
            entity.lifecycle = classify(entity, self.suppressions, self.reachability, annotations);
        }
    }
}
