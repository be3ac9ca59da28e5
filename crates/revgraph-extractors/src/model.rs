use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;

use revgraph_core::extractor::{ExtractorPass, SourceFile};
use revgraph_core::types::*;

/// Model declaration idioms, each tagged with the library it belongs to.
const MODEL_SRCS: &[(&str, &str)] = &[
    (
        "sequelize",
        r#"\bsequelize\.define\(\s*['"]([A-Za-z_$][\w$]*)['"]"#,
    ),
    (
        "sequelize",
        r"\bclass\s+([A-Za-z_$][\w$]*)\s+extends\s+(?:Sequelize\.)?Model\b",
    ),
    (
        "mongoose",
        r#"\bmongoose\.model\(\s*['"]([A-Za-z_$][\w$]*)['"]"#,
    ),
    (
        "mongoose",
        r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*new\s+(?:mongoose\.)?Schema\s*\(",
    ),
    (
        "zod",
        r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*z\.object\s*\(",
    ),
    (
        "joi",
        r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*Joi\.object\s*\(",
    ),
    (
        "yup",
        r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*yup\.object\s*\(",
    ),
];

/// Recognizes ORM models and validation schemas declared in a file.
pub struct ModelPass {
    patterns: Vec<(&'static str, Regex)>,
}

impl ModelPass {
    pub fn new() -> Result<Self> {
        let patterns = MODEL_SRCS
            .iter()
            .map(|(library, src)| {
                Regex::new(src)
                    .with_context(|| format!("failed to compile {library} model pattern"))
                    .map(|regex| (*library, regex))
            })
            .collect::<Result<_>>()?;
        Ok(Self { patterns })
    }
}

impl ExtractorPass for ModelPass {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Model
    }

    fn accepts(&self, role: FileRole) -> bool {
        matches!(role, FileRole::Source | FileRole::Entry)
    }

    fn extract(&self, file: &SourceFile<'_>) -> Result<PassOutput> {
        // name -> (first offset, libraries)
        let mut found: BTreeMap<&str, (usize, Vec<&str>)> = BTreeMap::new();
        for (library, regex) in &self.patterns {
            for cap in regex.captures_iter(file.content) {
                let Some(name) = cap.get(1) else { continue };
                let entry = found
                    .entry(name.as_str())
                    .or_insert((name.start(), Vec::new()));
                entry.0 = entry.0.min(name.start());
                if !entry.1.contains(library) {
                    entry.1.push(*library);
                }
            }
        }

        let module_id = EntityId::file(file.rel_path);
        let mut output = PassOutput::default();
        for (name, (offset, libraries)) in found {
            let id = EntityId::tagged(file.rel_path, "model", name);
            let mut entity = Entity::new(
                id.clone(),
                EntityType::Model,
                name,
                file.evidence(self.kind(), Some(offset)),
            )
            .with_symbol(name)
            .with_confidence(0.7);
            for library in libraries {
                entity.labels.insert(format!("library:{library}"));
            }
            output.entities.push(entity);
            output.relations.push(Relation::new(
                RelationType::Exposes,
                module_id.clone(),
                id,
                file.rel_path,
            ));
        }
        Ok(output)
    }
}
