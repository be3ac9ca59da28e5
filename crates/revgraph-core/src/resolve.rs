use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::suppress::Suppressions;
use crate::types::{Entity, EntityId, EntityType, PendingRef, PendingTarget, Relation, RelationType};

/// Resolves relative import specifiers against the set of collected files.
pub struct ImportResolver {
    known: HashSet<String>,
    extensions: Vec<String>,
}

impl ImportResolver {
    pub fn new<I>(known: I, extensions: &[String]) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut extensions: Vec<String> = extensions.to_vec();
        if !extensions.iter().any(|e| e == "json") {
            extensions.push("json".to_string());
        }
        Self {
            known: known.into_iter().collect(),
            extensions,
        }
    }

    /// Resolve `specifier` as imported from `from_file`.
    ///
    /// Only `./` and `../` specifiers resolve. Tries the exact path, then each
    /// extension, then `index.<ext>` inside the directory.
    pub fn resolve(&self, from_file: &str, specifier: &str) -> Option<String> {
        if !(specifier.starts_with("./") || specifier.starts_with("../")) {
            return None;
        }
        let specifier = specifier.split(['?', '#']).next().unwrap_or(specifier);
        let base = from_file.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let joined = join_normalized(base, specifier)?;

        self.candidates(&joined)
            .into_iter()
            .find(|candidate| self.known.contains(candidate))
    }

    fn candidates(&self, joined: &str) -> Vec<String> {
        let mut out = vec![joined.to_string()];
        for ext in &self.extensions {
            out.push(format!("{joined}.{ext}"));
        }
        // ESM TypeScript imports name the emitted `.js` file.
        if let Some(stem) = joined.strip_suffix(".js") {
            out.push(format!("{stem}.ts"));
            out.push(format!("{stem}.tsx"));
        }
        for ext in &self.extensions {
            if joined.is_empty() {
                out.push(format!("index.{ext}"));
            } else {
                out.push(format!("{joined}/index.{ext}"));
            }
        }
        out
    }
}

/// Join a relative specifier onto a directory, collapsing `.` and `..`.
/// Returns `None` if the path escapes the project root.
fn join_normalized(base: &str, rel: &str) -> Option<String> {
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for seg in rel.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

/// Settle pending references into relations.
///
/// Env read sites are also appended to the declaring env entity's evidence.
/// References that do not resolve, or whose target is suppressed, are dropped.
pub fn resolve_references(
    entities: &mut [Entity],
    pending: Vec<PendingRef>,
    imports: &ImportResolver,
    suppressions: &Suppressions,
) -> Vec<Relation> {
    let mut env_index: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, entity) in entities.iter().enumerate() {
        if entity.kind != EntityType::Env {
            continue;
        }
        for key in &entity.symbols {
            env_index.entry(key.clone()).or_default().push(idx);
        }
    }

    let mut relations = Vec::new();
    for reference in pending {
        match &reference.target {
            PendingTarget::Import { specifier } => {
                let from_file = reference.evidence.file.as_str();
                let Some(target) = imports.resolve(from_file, specifier) else {
                    debug!(%from_file, %specifier, "unresolved import dropped");
                    continue;
                };
                if target == from_file || suppressions.is_suppressed(&target) {
                    continue;
                }
                relations.push(Relation::new(
                    reference.relation,
                    reference.from_id.clone(),
                    EntityId::file(&target),
                    format!("{from_file} -> {target}"),
                ));
            }
            PendingTarget::EnvKey { key } => {
                let Some(declaring) = env_index.get(key) else {
                    continue;
                };
                for &idx in declaring {
                    let env = &mut entities[idx];
                    let env_path = env.source_paths.first().cloned().unwrap_or_default();
                    relations.push(Relation::new(
                        RelationType::Uses,
                        reference.from_id.clone(),
                        env.id.clone(),
                        format!("{} -> {env_path}", reference.evidence.file),
                    ));
                    env.add_evidence(reference.evidence.clone());
                }
            }
        }
    }
    relations
}
