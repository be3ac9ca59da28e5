use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;

use revgraph_core::extractor::{ExtractorPass, SourceFile};
use revgraph_core::types::*;

const COMMAND_SRC: &str = r#"\.command\(\s*['"`]([^'"`\n]+)['"`]"#;
const FLAG_SRC: &str = r"(?:^|[^\w-])(--[A-Za-z][\w-]*)";
const DESCRIPTION_SRC: &str = r#"\.(?:description|describe)\(\s*['"`]([^'"`\n]+)['"`]"#;

/// Finds subcommand registrations in the CLI entry file.
///
/// A command's block runs from its registration to the next one; flags
/// named inside the block belong to that command.
pub struct CliPass {
    command: Regex,
    flag: Regex,
    description: Regex,
}

struct Command {
    offset: usize,
    flags: Vec<String>,
    description: Option<String>,
}

impl CliPass {
    pub fn new() -> Result<Self> {
        Ok(Self {
            command: Regex::new(COMMAND_SRC).context("failed to compile command pattern")?,
            flag: Regex::new(FLAG_SRC).context("failed to compile flag pattern")?,
            description: Regex::new(DESCRIPTION_SRC)
                .context("failed to compile description pattern")?,
        })
    }

    /// Registrations keyed by command name, blocks of repeated names merged.
    fn commands(&self, content: &str) -> BTreeMap<String, Command> {
        let starts: Vec<(usize, &str)> = self
            .command
            .captures_iter(content)
            .filter_map(|cap| {
                let whole = cap.get(0)?;
                // "serve <port>" registers "serve"
                let name = cap.get(1)?.as_str().split_whitespace().next()?;
                (!name.starts_with('<') && !name.starts_with('[')).then_some((whole.start(), name))
            })
            .collect();

        let mut commands: BTreeMap<String, Command> = BTreeMap::new();
        for (i, (start, name)) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map_or(content.len(), |(next, _)| *next);
            let block = &content[*start..end];

            let entry = commands.entry(name.to_string()).or_insert_with(|| Command {
                offset: *start,
                flags: Vec::new(),
                description: None,
            });
            for cap in self.flag.captures_iter(block) {
                if let Some(flag) = cap.get(1) {
                    let flag = flag.as_str().to_string();
                    if !entry.flags.contains(&flag) {
                        entry.flags.push(flag);
                    }
                }
            }
            if entry.description.is_none() {
                entry.description = self
                    .description
                    .captures(block)
                    .and_then(|cap| cap.get(1))
                    .map(|m| m.as_str().to_string());
            }
        }
        commands
    }
}

impl ExtractorPass for CliPass {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Cli
    }

    fn accepts(&self, role: FileRole) -> bool {
        role == FileRole::Entry
    }

    fn extract(&self, file: &SourceFile<'_>) -> Result<PassOutput> {
        let mut output = PassOutput::default();
        let entry_id = EntityId::file(file.rel_path);

        for (name, command) in self.commands(file.content) {
            let id = EntityId::tagged(file.rel_path, "cli", &name);
            let mut entity = Entity::new(
                id.clone(),
                EntityType::Cli,
                name.as_str(),
                file.evidence(self.kind(), Some(command.offset)),
            )
            .with_symbol(format!("command:{name}"))
            .with_confidence(0.9);
            for flag in command.flags {
                entity.symbols.insert(format!("flag:{flag}"));
            }
            if let Some(description) = command.description {
                entity = entity.with_description(description);
            }
            output.entities.push(entity);
            output.relations.push(Relation::new(
                RelationType::Exposes,
                entry_id.clone(),
                id,
                file.rel_path,
            ));
        }

        Ok(output)
    }
}
