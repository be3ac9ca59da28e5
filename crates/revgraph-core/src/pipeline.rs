use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{compute_hash, CacheStore, CachedFile, CACHE_FILE};
use crate::collector::{InputFile, SourceCollector};
use crate::config::Config;
use crate::error::{Diagnostic, Diagnostics, ExtractError};
use crate::extractor::{ExtractorPass, SourceFile};
use crate::lifecycle::{AnnotationScanner, LifecycleClassifier};
use crate::merge::merge;
use crate::profile::{Profiler, ProfileReport, RunCounts, PROFILE_FILE};
use crate::reachability::{ReachabilityReport, REPORT_FILE};
use crate::resolve::{resolve_references, ImportResolver};
use crate::suppress::{Suppressions, SUPPRESS_JSON};
use crate::testlink::{TestIndexer, TestLinker};
use crate::types::{normalize_path, Entity, FileRole, Relation};

/// Options for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Restrict fresh extraction to these relative paths; every other path
    /// reuses its cached sub-result without being read.
    pub only_paths: Option<BTreeSet<String>>,
    /// Write the cache and profile artifacts at the end of the run.
    pub persist: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            only_paths: None,
            persist: true,
        }
    }
}

impl ExtractOptions {
    pub fn incremental<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            only_paths: Some(
                paths
                    .into_iter()
                    .map(|p| normalize_path(p.as_ref()))
                    .collect(),
            ),
            persist: true,
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.only_paths.is_some()
    }
}

/// The graph produced by one run, with its diagnostics and profile.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub diagnostics: Vec<Diagnostic>,
    pub profile: ProfileReport,
}

/// Per-file result of the parallel phase.
struct FileOutcome {
    rel_path: String,
    record: Option<CachedFile>,
    cache_hit: bool,
    errors: Vec<ExtractError>,
}

/// Reusable extraction pipeline: collect, extract per file, resolve, merge,
/// classify, link tests, persist.
pub struct ExtractionPipeline {
    passes: Vec<Box<dyn ExtractorPass>>,
    config: Config,
    scanner: AnnotationScanner,
    indexer: TestIndexer,
    startup: Vec<Diagnostic>,
}

impl ExtractionPipeline {
    pub fn new(passes: Vec<Box<dyn ExtractorPass>>, config: Config) -> Result<Self> {
        Ok(Self {
            passes,
            config,
            scanner: AnnotationScanner::new()?,
            indexer: TestIndexer::new()?,
            startup: Vec::new(),
        })
    }

    /// Record a failure from before the pipeline was built, such as a
    /// malformed config file, so every run reports it.
    pub fn with_diagnostic(mut self, err: ExtractError) -> Self {
        self.startup.push(err.into());
        self
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run an extraction over `root`. Never fails; problems surface as diagnostics.
    pub fn extract(&self, root: &Path, options: &ExtractOptions) -> Extraction {
        let profiler = Profiler::start(options.is_incremental());
        let observed_at = profiler.started_at();
        let mut diagnostics = Diagnostics::new();

        for diagnostic in &self.startup {
            diagnostics.push(diagnostic.clone());
        }

        let suppressions = Suppressions::load(root).unwrap_or_else(|e| {
            diagnostics.report(ExtractError::Suppression {
                path: Suppressions::source(root).unwrap_or(SUPPRESS_JSON).to_string(),
                message: format!("{e:#}"),
            });
            Suppressions::empty()
        });
        let reachability = ReachabilityReport::load(root).unwrap_or_else(|e| {
            diagnostics.report(ExtractError::Reachability {
                path: REPORT_FILE.to_string(),
                message: format!("{e:#}"),
            });
            ReachabilityReport::default()
        });
        let mut cache = CacheStore::load(root).unwrap_or_else(|e| {
            diagnostics.report(ExtractError::Cache {
                path: CACHE_FILE.to_string(),
                message: format!("{e:#}"),
            });
            CacheStore::new()
        });

        let inputs = SourceCollector::new(root, &self.config).collect();
        debug!(files = inputs.len(), "collected inputs");

        let only = options.only_paths.as_ref();
        let outcomes: Vec<FileOutcome> = inputs
            .par_iter()
            .map(|input| self.process_file(input, &cache, only, observed_at))
            .collect();

        let mut counts = RunCounts::default();
        let mut records: Vec<(String, CachedFile)> = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let clean = outcome.errors.is_empty();
            for err in outcome.errors {
                diagnostics.report(err);
            }
            let Some(record) = outcome.record else {
                continue;
            };
            if outcome.cache_hit {
                counts.cache_hits += 1;
            } else {
                counts.cache_misses += 1;
                // Failed extractions stay out of the cache so they are retried and reported again.
                if clean {
                    cache.insert(outcome.rel_path.clone(), record.clone());
                }
            }
            records.push((outcome.rel_path, record));
        }

        let mut entities = Vec::new();
        let mut relations = Vec::new();
        let mut pending = Vec::new();
        for pass in &self.passes {
            for (_, record) in &records {
                if let Some(output) = record.passes.get(&pass.kind()) {
                    entities.extend(output.entities.iter().cloned());
                    relations.extend(output.relations.iter().cloned());
                    pending.extend(output.pending.iter().cloned());
                }
            }
        }

        let resolver = ImportResolver::new(
            inputs.iter().map(|i| i.rel_path.clone()),
            &self.config.collect.extensions,
        );
        relations.extend(resolve_references(
            &mut entities,
            pending,
            &resolver,
            &suppressions,
        ));

        let mut graph = merge(entities, relations, &mut diagnostics);

        LifecycleClassifier::new(root, &suppressions, &reachability, &self.scanner)
            .classify_all(&mut graph.entities);

        let linker = TestLinker::build(
            records
                .iter()
                .filter_map(|(path, r)| r.test_index.as_ref().map(|i| (path.as_str(), i))),
            &resolver,
            self.config.link.max_tests_per_entity,
        );
        linker.link(&mut graph.entities);

        if options.is_incremental() {
            cache.prune_missing(root);
        } else {
            let current: Vec<String> = inputs.iter().map(|i| i.rel_path.clone()).collect();
            cache.prune(&current);
        }

        if options.persist {
            if let Err(e) = cache.save(root) {
                diagnostics.report(ExtractError::Write {
                    path: CACHE_FILE.to_string(),
                    message: format!("{e:#}"),
                });
            }
        }

        counts.files_scanned = cache.len();
        counts.entities = graph.entities.len();
        counts.relations = graph.relations.len();
        counts.diagnostics = diagnostics.len();
        let profile = profiler.finish(counts);

        if options.persist {
            if let Err(e) = profile.save(root) {
                diagnostics.report(ExtractError::Write {
                    path: PROFILE_FILE.to_string(),
                    message: format!("{e:#}"),
                });
            }
        }

        info!(
            entities = profile.entities,
            relations = profile.relations,
            cache_hits = profile.cache_hits,
            cache_misses = profile.cache_misses,
            elapsed_ms = profile.elapsed_ms,
            "extraction finished"
        );

        Extraction {
            entities: graph.entities,
            relations: graph.relations,
            diagnostics: diagnostics.into_vec(),
            profile,
        }
    }

    fn process_file(
        &self,
        input: &InputFile,
        cache: &CacheStore,
        only: Option<&BTreeSet<String>>,
        observed_at: DateTime<Utc>,
    ) -> FileOutcome {
        let rel_path = input.rel_path.clone();

        if only.is_some_and(|only| !only.contains(&rel_path)) {
            // A role change falls through to a fresh read.
            if let Some(cached) = cache.peek(&rel_path, &input.roles) {
                return FileOutcome {
                    rel_path,
                    record: Some(cached.clone()),
                    cache_hit: true,
                    errors: Vec::new(),
                };
            }
        }

        let content = match std::fs::read_to_string(&input.abs_path) {
            Ok(c) => c,
            Err(source) => {
                return FileOutcome {
                    errors: vec![ExtractError::Read {
                        path: rel_path.clone(),
                        source,
                    }],
                    rel_path,
                    record: None,
                    cache_hit: false,
                };
            }
        };

        let hash = compute_hash(&content);
        if let Some(cached) = cache.get(&rel_path, &hash, &input.roles) {
            return FileOutcome {
                rel_path,
                record: Some(cached.clone()),
                cache_hit: true,
                errors: Vec::new(),
            };
        }

        let file = SourceFile {
            rel_path: &rel_path,
            roles: &input.roles,
            content: &content,
            observed_at,
        };
        let mut record = CachedFile {
            hash,
            roles: input.roles.clone(),
            ..CachedFile::default()
        };
        let mut errors = Vec::new();
        for pass in &self.passes {
            if !input.roles.iter().any(|role| pass.accepts(*role)) {
                continue;
            }
            match pass.extract(&file) {
                Ok(output) if output.is_empty() => {}
                Ok(output) => record.passes.entry(pass.kind()).or_default().extend(output),
                Err(e) => errors.push(ExtractError::Pass {
                    kind: pass.kind(),
                    path: rel_path.clone(),
                    message: format!("{e:#}"),
                }),
            }
        }
        if input.has_role(FileRole::Test) {
            record.test_index = Some(self.indexer.index(&content));
        }

        FileOutcome {
            rel_path,
            record: Some(record),
            cache_hit: false,
            errors,
        }
    }
}
