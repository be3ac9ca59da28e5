use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::globs::PathGlobs;
use crate::types::FileRole;

/// A file the pipeline will feed through the cache and the passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub roles: BTreeSet<FileRole>,
}

impl InputFile {
    pub fn has_role(&self, role: FileRole) -> bool {
        self.roles.contains(&role)
    }
}

/// Forward-slash path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_skipped_dir(entry: &DirEntry, exclude_dirs: &[String]) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || exclude_dirs.iter().any(|d| d == name.as_ref())
}

/// Walks the configured roots and role-specific inputs of a project.
pub struct SourceCollector<'a> {
    root: &'a Path,
    config: &'a Config,
    tests: PathGlobs,
}

impl<'a> SourceCollector<'a> {
    pub fn new(root: &'a Path, config: &'a Config) -> Self {
        Self {
            root,
            config,
            tests: PathGlobs::new(&config.collect.test_patterns),
        }
    }

    /// Collect every input, sorted by relative path.
    pub fn collect(&self) -> Vec<InputFile> {
        let mut files: BTreeMap<String, InputFile> = BTreeMap::new();

        for path in self.source_files() {
            let rel = relative_path(self.root, &path);
            let role = if self.tests.is_match(&rel) {
                FileRole::Test
            } else {
                FileRole::Source
            };
            add(&mut files, rel, path, role);
        }

        if let Some(entry) = self.entry_file() {
            add(&mut files, relative_path(self.root, &entry), entry, FileRole::Entry);
        }
        for path in self.workflow_files() {
            add(&mut files, relative_path(self.root, &path), path, FileRole::Workflow);
        }
        for path in self.env_files() {
            add(&mut files, relative_path(self.root, &path), path, FileRole::Env);
        }
        for path in self.config_files() {
            add(&mut files, relative_path(self.root, &path), path, FileRole::Config);
        }

        files.into_values().collect()
    }

    /// Source files under the configured roots. Missing roots are skipped.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let collect = &self.config.collect;
        let mut out = Vec::new();
        for sub in &collect.roots {
            let dir = self.root.join(sub);
            if !dir.is_dir() {
                debug!(root = %sub, "scan root missing, skipping");
                continue;
            }
            let walker = WalkDir::new(&dir)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !is_skipped_dir(e, &collect.exclude_dirs))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.path()
                        .extension()
                        .is_some_and(|ext| collect.extensions.iter().any(|x| ext == x.as_str()))
                });
            out.extend(walker.map(|e| e.into_path()));
        }
        out
    }

    fn entry_file(&self) -> Option<PathBuf> {
        self.config
            .inputs
            .cli_entries
            .iter()
            .map(|rel| self.root.join(rel))
            .find(|p| p.is_file())
    }

    fn workflow_files(&self) -> Vec<PathBuf> {
        let dir = self.root.join(&self.config.inputs.workflows_dir);
        if !dir.is_dir() {
            return Vec::new();
        }
        WalkDir::new(&dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == "yml" || ext == "yaml")
            })
            .map(|e| e.into_path())
            .collect()
    }

    fn env_files(&self) -> Vec<PathBuf> {
        self.config
            .inputs
            .env_files
            .iter()
            .map(|rel| self.root.join(rel))
            .filter(|p| p.is_file())
            .collect()
    }

    fn config_files(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for pattern in &self.config.inputs.config_files {
            let full_pattern = self.root.join(pattern).to_string_lossy().to_string();
            let Ok(paths) = glob::glob(&full_pattern) else {
                debug!(%pattern, "invalid config file pattern");
                continue;
            };
            out.extend(paths.filter_map(|p| p.ok()).filter(|p| p.is_file()));
        }
        out.sort();
        out
    }
}

fn add(files: &mut BTreeMap<String, InputFile>, rel_path: String, abs_path: PathBuf, role: FileRole) {
    files
        .entry(rel_path.clone())
        .or_insert_with(|| InputFile {
            rel_path,
            abs_path,
            roles: BTreeSet::new(),
        })
        .roles
        .insert(role);
}
