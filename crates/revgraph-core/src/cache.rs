use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::testlink::TestFileIndex;
use crate::types::{ExtractorKind, FileRole, PassOutput};

/// Schema version of cached sub-results. Bumping it invalidates every cache.
pub const EXTRACTOR_VERSION: &str = "4";

pub const CACHE_FILE: &str = ".ai/reverse/extractor-cache.json";

/// Cache entry for a single file's extraction results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFile {
    pub hash: String,
    /// Roles the file had when extracted; they decide which passes ran.
    #[serde(default)]
    pub roles: BTreeSet<FileRole>,
    /// Per-kind sub-results of every pass that accepted the file.
    #[serde(default)]
    pub passes: BTreeMap<ExtractorKind, PassOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_index: Option<TestFileIndex>,
}

/// Extraction cache stored in `.ai/reverse/extractor-cache.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStore {
    pub version: String,
    pub files: BTreeMap<String, CachedFile>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            version: EXTRACTOR_VERSION.to_string(),
            files: BTreeMap::new(),
        }
    }

    /// Load the cache relative to the project root.
    ///
    /// A missing file or a cache written by another extractor version
    /// yields an empty store.
    pub fn load(project_root: &Path) -> Result<Self> {
        let cache_path = project_root.join(CACHE_FILE);
        if !cache_path.exists() {
            return Ok(Self::new());
        }
        let content =
            std::fs::read_to_string(&cache_path).context("failed to read extractor cache")?;
        let cache: Self =
            serde_json::from_str(&content).context("failed to parse extractor cache")?;
        if cache.version != EXTRACTOR_VERSION {
            debug!(
                found = %cache.version,
                expected = EXTRACTOR_VERSION,
                "extractor version changed, starting with an empty cache"
            );
            return Ok(Self::new());
        }
        Ok(cache)
    }

    /// Save the cache relative to the project root.
    pub fn save(&self, project_root: &Path) -> Result<()> {
        let cache_path = project_root.join(CACHE_FILE);
        if let Some(dir) = cache_path.parent() {
            std::fs::create_dir_all(dir).context("failed to create cache directory")?;
        }
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize extractor cache")?;
        std::fs::write(&cache_path, content).context("failed to write extractor cache")?;
        Ok(())
    }

    /// Get a cached result if path, content hash and roles all match.
    pub fn get(
        &self,
        rel_path: &str,
        hash: &str,
        roles: &BTreeSet<FileRole>,
    ) -> Option<&CachedFile> {
        self.peek(rel_path, roles).filter(|cached| cached.hash == hash)
    }

    /// Get a cached result without verifying the hash.
    ///
    /// Only incremental runs use this, for paths outside the explicit set.
    /// A record extracted under different roles is never returned.
    pub fn peek(&self, rel_path: &str, roles: &BTreeSet<FileRole>) -> Option<&CachedFile> {
        self.files
            .get(rel_path)
            .filter(|cached| &cached.roles == roles)
    }

    /// Insert or overwrite a file's cache entry.
    pub fn insert(&mut self, rel_path: String, record: CachedFile) {
        self.files.insert(rel_path, record);
    }

    /// Remove entries for paths not in `keep`.
    pub fn prune(&mut self, keep: &[String]) {
        let keep: HashSet<&str> = keep.iter().map(|s| s.as_str()).collect();
        self.files.retain(|path, _| keep.contains(path.as_str()));
    }

    /// Remove entries whose file no longer exists under `project_root`.
    pub fn prune_missing(&mut self, project_root: &Path) {
        self.files
            .retain(|path, _| project_root.join(path).is_file());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Compute SHA-256 hash of file content.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> BTreeSet<FileRole> {
        BTreeSet::from([FileRole::Source])
    }

    fn record(hash: &str) -> CachedFile {
        CachedFile {
            hash: hash.to_string(),
            roles: source(),
            ..CachedFile::default()
        }
    }

    #[test]
    fn test_compute_hash_deterministic() {
        assert_eq!(compute_hash("hello world"), compute_hash("hello world"));
        assert_ne!(compute_hash("hello"), compute_hash("world"));
    }

    #[test]
    fn test_get_requires_hash_match() {
        let mut cache = CacheStore::new();
        cache.insert("a.js".to_string(), record(&compute_hash("original")));

        assert!(cache.get("a.js", &compute_hash("original"), &source()).is_some());
        assert!(cache.get("a.js", &compute_hash("modified"), &source()).is_none());
        assert!(cache.get("missing.js", &compute_hash("original"), &source()).is_none());
    }

    #[test]
    fn test_get_requires_roles_match() {
        let mut cache = CacheStore::new();
        let hash = compute_hash("program.command('deploy')");
        cache.insert("src/cli.ts".to_string(), record(&hash));

        let entry = BTreeSet::from([FileRole::Source, FileRole::Entry]);
        assert!(cache.get("src/cli.ts", &hash, &entry).is_none());
        assert!(cache.peek("src/cli.ts", &entry).is_none());
        assert!(cache.get("src/cli.ts", &hash, &source()).is_some());
    }

    #[test]
    fn test_peek_ignores_hash() {
        let mut cache = CacheStore::new();
        cache.insert("a.js".to_string(), record("stale"));
        assert!(cache.peek("a.js", &source()).is_some());
    }

    #[test]
    fn test_insert_overwrites_changed_file() {
        let mut cache = CacheStore::new();
        cache.insert("a.js".to_string(), record("h1"));
        cache.insert("a.js".to_string(), record("h2"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek("a.js", &source()).unwrap().hash, "h2");
    }

    #[test]
    fn test_prune() {
        let mut cache = CacheStore::new();
        cache.insert("a.js".to_string(), record("h1"));
        cache.insert("b.js".to_string(), record("h2"));

        cache.prune(&["a.js".to_string()]);
        assert!(cache.files.contains_key("a.js"));
        assert!(!cache.files.contains_key("b.js"));
    }

    #[test]
    fn test_prune_missing_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "").unwrap();
        let mut cache = CacheStore::new();
        cache.insert("a.js".to_string(), record("h1"));
        cache.insert("gone.js".to_string(), record("h2"));

        cache.prune_missing(dir.path());
        assert!(cache.files.contains_key("a.js"));
        assert!(!cache.files.contains_key("gone.js"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = CacheStore::new();
        cache.insert("a.js".to_string(), record(&compute_hash("content")));

        cache.save(dir.path()).unwrap();
        let loaded = CacheStore::load(dir.path()).unwrap();
        assert_eq!(loaded, cache);
    }

    #[test]
    fn test_version_bump_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = CacheStore::new();
        cache.version = "0".to_string();
        cache.insert("a.js".to_string(), record("h1"));
        cache.save(dir.path()).unwrap();

        let loaded = CacheStore::load(dir.path()).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.version, EXTRACTOR_VERSION);
    }

    #[test]
    fn test_malformed_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".ai/reverse")).unwrap();
        std::fs::write(dir.path().join(CACHE_FILE), "{ nope").unwrap();
        assert!(CacheStore::load(dir.path()).is_err());
    }
}
