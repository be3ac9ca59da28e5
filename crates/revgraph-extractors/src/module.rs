use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;

use revgraph_core::extractor::{ExtractorPass, SourceFile};
use revgraph_core::types::*;

const EXPORT_DECL_SRC: &str = r"(?m)^[ \t]*export\s+(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\*?|class|const|let|var|interface|type|enum)\s+([A-Za-z_$][\w$]*)";
const EXPORT_LIST_SRC: &str = r"(?m)^[ \t]*export\s*(?:type\s*)?\{([^}]*)\}";
const CJS_MEMBER_SRC: &str = r"(?m)^[ \t]*(?:module\.)?exports\.([A-Za-z_$][\w$]*)\s*=";
const CJS_OBJECT_SRC: &str = r"module\.exports\s*=\s*\{([^}]*)\}";

const IMPORT_SRCS: &[&str] = &[
    r#"(?:import|export)\s[^'"`;]*?\bfrom\s*['"]([^'"]+)['"]"#,
    r#"(?m)^[ \t]*import\s*['"]([^'"]+)['"]"#,
    r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#,
    r#"\bimport\(\s*['"]([^'"]+)['"]\s*\)"#,
];

/// Emits a module entity per file, a symbol entity per export, `exposes`
/// edges to those symbols and pending `depends_on` edges for relative imports.
pub struct ModulePass {
    export_decl: Regex,
    export_list: Regex,
    cjs_member: Regex,
    cjs_object: Regex,
    imports: Vec<Regex>,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Exported name of one `export { ... }` item: `a`, `a as b`, `type T`.
fn export_list_name(item: &str) -> Option<&str> {
    let item = item.trim();
    let item = item.strip_prefix("type ").unwrap_or(item).trim();
    let name = match item.split_once(" as ") {
        Some((_, alias)) => alias.trim(),
        None => item,
    };
    (is_identifier(name) && name != "default").then_some(name)
}

/// Key of one `module.exports = { ... }` member: `a`, `a: b`, `a() {}`.
fn object_member_name(item: &str) -> Option<&str> {
    let item = item.trim();
    if item.starts_with("...") {
        return None;
    }
    let item = item.strip_prefix("async ").unwrap_or(item);
    let end = item
        .find(|c: char| c == ':' || c == '(' || c.is_whitespace())
        .unwrap_or(item.len());
    let name = &item[..end];
    is_identifier(name).then_some(name)
}

/// File stem used as the module entity's display name.
fn module_name(rel_path: &str) -> &str {
    let file = rel_path.rsplit('/').next().unwrap_or(rel_path);
    file.split('.').next().filter(|s| !s.is_empty()).unwrap_or(file)
}

impl ModulePass {
    pub fn new() -> Result<Self> {
        Ok(Self {
            export_decl: Regex::new(EXPORT_DECL_SRC).context("failed to compile export pattern")?,
            export_list: Regex::new(EXPORT_LIST_SRC)
                .context("failed to compile export list pattern")?,
            cjs_member: Regex::new(CJS_MEMBER_SRC)
                .context("failed to compile exports member pattern")?,
            cjs_object: Regex::new(CJS_OBJECT_SRC)
                .context("failed to compile module.exports pattern")?,
            imports: IMPORT_SRCS
                .iter()
                .map(|src| Regex::new(src).context("failed to compile import pattern"))
                .collect::<Result<_>>()?,
        })
    }

    /// Exported names with the byte offset of their first declaration.
    fn exports(&self, content: &str) -> BTreeMap<String, usize> {
        let mut found: BTreeMap<String, usize> = BTreeMap::new();
        let mut add = |name: &str, offset: usize| {
            found.entry(name.to_string()).or_insert(offset);
        };

        for cap in self.export_decl.captures_iter(content) {
            let Some(m) = cap.get(1) else { continue };
            add(m.as_str(), m.start());
        }
        for cap in self.export_list.captures_iter(content) {
            let Some(body) = cap.get(1) else { continue };
            for item in body.as_str().split(',') {
                if let Some(name) = export_list_name(item) {
                    add(name, body.start());
                }
            }
        }
        for cap in self.cjs_member.captures_iter(content) {
            let Some(m) = cap.get(1) else { continue };
            add(m.as_str(), m.start());
        }
        for cap in self.cjs_object.captures_iter(content) {
            let Some(body) = cap.get(1) else { continue };
            for item in body.as_str().split(',') {
                if let Some(name) = object_member_name(item) {
                    add(name, body.start());
                }
            }
        }
        found
    }

    /// Relative import specifiers with the offset of their first occurrence.
    fn imports(&self, content: &str) -> Vec<(String, usize)> {
        let mut found: Vec<(String, usize)> = Vec::new();
        for regex in &self.imports {
            for cap in regex.captures_iter(content) {
                let Some(m) = cap.get(1) else { continue };
                let spec = m.as_str();
                if spec.starts_with('.') && !found.iter().any(|(s, _)| s == spec) {
                    found.push((spec.to_string(), m.start()));
                }
            }
        }
        found.sort_by_key(|(_, offset)| *offset);
        found
    }
}

impl ExtractorPass for ModulePass {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Module
    }

    fn accepts(&self, role: FileRole) -> bool {
        matches!(role, FileRole::Source | FileRole::Entry)
    }

    fn extract(&self, file: &SourceFile<'_>) -> Result<PassOutput> {
        let kind = self.kind();
        let file_id = EntityId::file(file.rel_path);
        let exports = self.exports(file.content);

        let mut module = Entity::new(
            file_id.clone(),
            EntityType::Module,
            module_name(file.rel_path),
            file.evidence(kind, None),
        );
        let mut output = PassOutput::default();

        for (name, offset) in &exports {
            module.symbols.insert(name.clone());
            let symbol_id = EntityId::symbol(file.rel_path, name);
            output.entities.push(
                Entity::new(
                    symbol_id.clone(),
                    EntityType::Module,
                    name.as_str(),
                    file.evidence(kind, Some(*offset)),
                )
                .with_symbol(name.as_str())
                .with_confidence(0.9),
            );
            output.relations.push(Relation::new(
                RelationType::Exposes,
                file_id.clone(),
                symbol_id,
                file.rel_path,
            ));
        }
        output.entities.insert(0, module);

        for (specifier, offset) in self.imports(file.content) {
            output.pending.push(PendingRef {
                from_id: file_id.clone(),
                relation: RelationType::DependsOn,
                target: PendingTarget::Import { specifier },
                evidence: file.evidence(kind, Some(offset)),
            });
        }

        Ok(output)
    }
}
