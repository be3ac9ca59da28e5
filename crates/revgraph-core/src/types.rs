use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Normalize a path-like string to forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Unique identifier for an entity.
///
/// Always a forward-slash relative path, optionally followed by `#symbol`
/// or a typed suffix such as `#route:GET:/users`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    /// Id of a file-level entity.
    pub fn file(path: &str) -> Self {
        Self(normalize_path(path))
    }

    /// Id of a symbol declared in `path`: "path#name"
    pub fn symbol(path: &str, name: &str) -> Self {
        Self(format!("{}#{name}", normalize_path(path)))
    }

    /// Id with a typed suffix: "path#tag:value"
    pub fn tagged(path: &str, tag: &str, value: &str) -> Self {
        Self(format!("{}#{tag}:{value}", normalize_path(path)))
    }

    /// Path-independent id of an API endpoint: "api:/path#METHOD"
    pub fn api(route_path: &str, method: &str) -> Self {
        Self(format!("api:{route_path}#{}", method.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of entity in the extracted graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Module,
    Cli,
    CiJob,
    Env,
    Config,
    Route,
    Api,
    Model,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityType::Module => "module",
            EntityType::Cli => "cli",
            EntityType::CiJob => "ci_job",
            EntityType::Env => "env",
            EntityType::Config => "config",
            EntityType::Route => "route",
            EntityType::Api => "api",
            EntityType::Model => "model",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle status, recomputed on every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Active,
    Unused,
    Deprecated,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Active => write!(f, "active"),
            Lifecycle::Unused => write!(f, "unused"),
            Lifecycle::Deprecated => write!(f, "deprecated"),
        }
    }
}

/// The pass that observed a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Cli,
    CiJob,
    Env,
    Module,
    Route,
    Api,
    Model,
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractorKind::Cli => "cli",
            ExtractorKind::CiJob => "ci_job",
            ExtractorKind::Env => "env",
            ExtractorKind::Module => "module",
            ExtractorKind::Route => "route",
            ExtractorKind::Api => "api",
            ExtractorKind::Model => "model",
        };
        write!(f, "{s}")
    }
}

/// Where and how an entity or relation was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub extractor_kind: ExtractorKind,
    pub timestamp: DateTime<Utc>,
}

/// A named unit of interest in the codebase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub kind: EntityType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source_paths: Vec<String>,
    #[serde(default)]
    pub symbols: BTreeSet<String>,
    #[serde(default)]
    pub tests: BTreeSet<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub story_links: BTreeSet<String>,
}

impl Entity {
    /// Create an entity backed by a single piece of evidence.
    pub fn new(id: EntityId, kind: EntityType, name: impl Into<String>, evidence: Evidence) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            description: String::new(),
            source_paths: vec![normalize_path(&evidence.file)],
            symbols: BTreeSet::new(),
            tests: BTreeSet::new(),
            labels: BTreeSet::new(),
            lifecycle: Lifecycle::Active,
            confidence: 1.0,
            last_seen: evidence.timestamp,
            evidence: vec![evidence],
            story_links: BTreeSet::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbols.insert(symbol.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    /// Append evidence, keeping `last_seen` in step.
    pub fn add_evidence(&mut self, evidence: Evidence) {
        if evidence.timestamp > self.last_seen {
            self.last_seen = evidence.timestamp;
        }
        if !self.evidence.contains(&evidence) {
            self.evidence.push(evidence);
        }
    }

    /// Fold another observation of the same id into this one.
    ///
    /// Set-valued fields are unioned; scalar fields take the later value.
    pub fn absorb(&mut self, other: Entity) {
        self.kind = other.kind;
        self.name = other.name;
        if !other.description.is_empty() {
            self.description = other.description;
        }
        self.confidence = other.confidence;
        for path in other.source_paths {
            if !self.source_paths.contains(&path) {
                self.source_paths.push(path);
            }
        }
        self.symbols.extend(other.symbols);
        self.tests.extend(other.tests);
        self.labels.extend(other.labels);
        self.story_links.extend(other.story_links);
        for evidence in other.evidence {
            self.add_evidence(evidence);
        }
        if other.last_seen > self.last_seen {
            self.last_seen = other.last_seen;
        }
    }
}

/// Kind of relation between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    DependsOn,
    Exposes,
    RoutesTo,
    Uses,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::DependsOn => "depends_on",
            RelationType::Exposes => "exposes",
            RelationType::RoutesTo => "routes_to",
            RelationType::Uses => "uses",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, typed edge between two entity ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    #[serde(rename = "type")]
    pub kind: RelationType,
    pub from_id: EntityId,
    pub to_id: EntityId,
    pub evidence_path: String,
}

impl Relation {
    pub fn new(kind: RelationType, from_id: EntityId, to_id: EntityId, evidence_path: impl Into<String>) -> Self {
        Self {
            kind,
            from_id,
            to_id,
            evidence_path: evidence_path.into(),
        }
    }

    /// Ordering key: (fromId, type, toId), with the evidence path as tie-breaker.
    pub fn sort_key(&self) -> (&str, &str, &str, &str) {
        (
            self.from_id.as_str(),
            self.kind.as_str(),
            self.to_id.as_str(),
            self.evidence_path.as_str(),
        )
    }
}

/// Role a collected file plays in extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    Source,
    Test,
    Entry,
    Workflow,
    Env,
    Config,
}

/// A reference whose target can only be settled once every file has been seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PendingTarget {
    /// Raw import specifier, resolved relative to the importing file.
    Import { specifier: String },
    /// Environment key, resolved to every env entity declaring it.
    EnvKey { key: String },
}

/// An unresolved edge emitted by a per-file pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRef {
    pub from_id: EntityId,
    pub relation: RelationType,
    pub target: PendingTarget,
    pub evidence: Evidence,
}

/// Partial result of one pass over one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassOutput {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<PendingRef>,
}

impl PassOutput {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty() && self.pending.is_empty()
    }

    pub fn extend(&mut self, other: PassOutput) {
        self.entities.extend(other.entities);
        self.relations.extend(other.relations);
        self.pending.extend(other.pending);
    }
}
