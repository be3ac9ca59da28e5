use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::resolve::ImportResolver;
use crate::types::Entity;

/// What a test file references, extracted once per content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFileIndex {
    /// Quoted relative specifiers, unresolved.
    pub imports: Vec<String>,
    /// Lowercase word-like tokens.
    pub tokens: BTreeSet<String>,
}

/// Builds a [`TestFileIndex`] from test file content.
pub struct TestIndexer {
    relative_import: Regex,
    token: Regex,
}

impl TestIndexer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            relative_import: Regex::new(r#"['"`](\.{1,2}/[^'"`\s]+)['"`]"#)
                .context("failed to compile relative import pattern")?,
            token: Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*")
                .context("failed to compile token pattern")?,
        })
    }

    pub fn index(&self, content: &str) -> TestFileIndex {
        let mut imports = Vec::new();
        for cap in self.relative_import.captures_iter(content) {
            let spec = cap[1].to_string();
            if !imports.contains(&spec) {
                imports.push(spec);
            }
        }
        let tokens = self
            .token
            .find_iter(content)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        TestFileIndex { imports, tokens }
    }
}

/// Reverse index from source paths and names to the test files touching them.
#[derive(Debug, Default)]
pub struct TestLinker {
    by_path: BTreeMap<String, BTreeSet<String>>,
    by_token: BTreeMap<String, BTreeSet<String>>,
    cap: usize,
}

impl TestLinker {
    pub fn build<'a, I>(indices: I, resolver: &ImportResolver, cap: usize) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a TestFileIndex)>,
    {
        let mut linker = Self {
            cap,
            ..Self::default()
        };
        for (test_path, index) in indices {
            for spec in &index.imports {
                if let Some(target) = resolver.resolve(test_path, spec) {
                    linker
                        .by_path
                        .entry(target)
                        .or_default()
                        .insert(test_path.to_string());
                }
            }
            for token in &index.tokens {
                linker
                    .by_token
                    .entry(token.clone())
                    .or_default()
                    .insert(test_path.to_string());
            }
        }
        linker
    }

    /// Test files linked to an entity, capped.
    pub fn tests_for(&self, entity: &Entity) -> BTreeSet<String> {
        let mut found: BTreeSet<String> = BTreeSet::new();
        for path in &entity.source_paths {
            if let Some(tests) = self.by_path.get(path) {
                found.extend(tests.iter().cloned());
            }
        }
        if let Some(tests) = self.by_token.get(&entity.name.to_lowercase()) {
            found.extend(tests.iter().cloned());
        }
        found.into_iter().take(self.cap).collect()
    }

    pub fn link(&self, entities: &mut [Entity]) {
        for entity in entities.iter_mut() {
            let mut tests = std::mem::take(&mut entity.tests);
            tests.extend(self.tests_for(entity));
            entity.tests = tests.into_iter().take(self.cap).collect();
        }
    }
}
