use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use regex::Regex;

use revgraph_core::extractor::{ExtractorPass, SourceFile};
use revgraph_core::types::*;

const ENV_LINE_SRC: &str = r"(?m)^[ \t]*(?:export[ \t]+)?([A-Za-z_][A-Za-z0-9_]*)[ \t]*=";

const READ_SITE_SRCS: &[&str] = &[
    r"\bprocess\.env\.([A-Za-z_][A-Za-z0-9_]*)",
    r#"\bprocess\.env\[\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]\s*\]"#,
    r"\bimport\.meta\.env\.([A-Za-z_][A-Za-z0-9_]*)",
    r#"\bDeno\.env\.get\(\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]"#,
];

const DESTRUCTURE_SRC: &str = r"\{([^{}]*)\}\s*=\s*process\.env\b";

/// Declares env and config entities from their files, and records every
/// environment read in source as a pending `uses` edge.
pub struct EnvPass {
    env_line: Regex,
    read_sites: Vec<Regex>,
    destructure: Regex,
}

fn file_name(rel_path: &str) -> &str {
    rel_path.rsplit('/').next().unwrap_or(rel_path)
}

impl EnvPass {
    pub fn new() -> Result<Self> {
        Ok(Self {
            env_line: Regex::new(ENV_LINE_SRC).context("failed to compile env line pattern")?,
            read_sites: READ_SITE_SRCS
                .iter()
                .map(|src| Regex::new(src).context("failed to compile env read pattern"))
                .collect::<Result<_>>()?,
            destructure: Regex::new(DESTRUCTURE_SRC)
                .context("failed to compile env destructuring pattern")?,
        })
    }

    fn env_file(&self, file: &SourceFile<'_>) -> Entity {
        let mut entity = Entity::new(
            EntityId::file(file.rel_path),
            EntityType::Env,
            file_name(file.rel_path),
            file.evidence(self.kind(), None),
        )
        .with_label("env-file");
        for cap in self.env_line.captures_iter(file.content) {
            if let Some(key) = cap.get(1) {
                entity.symbols.insert(key.as_str().to_string());
            }
        }
        entity
    }

    fn config_file(&self, file: &SourceFile<'_>) -> Result<Entity> {
        let keys = config_keys(file.rel_path, file.content)?;
        let format = file.rel_path.rsplit('.').next().unwrap_or_default();
        let mut entity = Entity::new(
            EntityId::file(file.rel_path),
            EntityType::Config,
            file_name(file.rel_path),
            file.evidence(self.kind(), None),
        )
        .with_label(format!("format:{format}"));
        entity.symbols = keys;
        Ok(entity)
    }

    /// Env keys read in source with the offset of each read.
    fn read_sites(&self, content: &str) -> Vec<(String, usize)> {
        let mut sites = Vec::new();
        for regex in &self.read_sites {
            for cap in regex.captures_iter(content) {
                if let Some(key) = cap.get(1) {
                    sites.push((key.as_str().to_string(), key.start()));
                }
            }
        }
        for cap in self.destructure.captures_iter(content) {
            let Some(body) = cap.get(1) else { continue };
            for item in body.as_str().split(',') {
                let key = item.split(':').next().unwrap_or_default().trim();
                let key = key.split('=').next().unwrap_or_default().trim();
                if !key.is_empty()
                    && key
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    sites.push((key.to_string(), body.start()));
                }
            }
        }
        sites.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        sites.dedup();
        sites
    }
}

/// Top-level keys of a JSON or YAML config file.
fn config_keys(rel_path: &str, content: &str) -> Result<BTreeSet<String>> {
    if rel_path.ends_with(".json") {
        let value: serde_json::Value = serde_json::from_str(content)
            .with_context(|| format!("invalid JSON in {rel_path}"))?;
        return match value {
            serde_json::Value::Object(map) => Ok(map.keys().cloned().collect()),
            _ => Ok(BTreeSet::new()),
        };
    }
    if rel_path.ends_with(".yaml") || rel_path.ends_with(".yml") {
        let value: serde_yaml::Value = serde_yaml::from_str(content)
            .with_context(|| format!("invalid YAML in {rel_path}"))?;
        return match value {
            serde_yaml::Value::Mapping(map) => Ok(map
                .keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()),
            _ => Ok(BTreeSet::new()),
        };
    }
    bail!("unsupported config format: {rel_path}")
}

impl ExtractorPass for EnvPass {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Env
    }

    fn accepts(&self, role: FileRole) -> bool {
        matches!(
            role,
            FileRole::Env | FileRole::Config | FileRole::Source | FileRole::Entry
        )
    }

    fn extract(&self, file: &SourceFile<'_>) -> Result<PassOutput> {
        let mut output = PassOutput::default();

        if file.roles.contains(&FileRole::Env) {
            output.entities.push(self.env_file(file));
        }
        if file.roles.contains(&FileRole::Config) {
            output.entities.push(self.config_file(file)?);
        }
        if file.roles.contains(&FileRole::Source) || file.roles.contains(&FileRole::Entry) {
            let from_id = EntityId::file(file.rel_path);
            for (key, offset) in self.read_sites(file.content) {
                output.pending.push(PendingRef {
                    from_id: from_id.clone(),
                    relation: RelationType::Uses,
                    target: PendingTarget::EnvKey { key },
                    evidence: file.evidence(self.kind(), Some(offset)),
                });
            }
        }

        Ok(output)
    }
}
