use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde_yaml::Value;

use revgraph_core::extractor::{ExtractorPass, SourceFile};
use revgraph_core::types::*;

/// Turns each job of a CI workflow into an entity labelled with the
/// workflow's triggers. `needs` becomes `depends_on` between jobs.
#[derive(Default)]
pub struct CiJobPass;

impl CiJobPass {
    pub fn new() -> Self {
        Self
    }
}

/// Strings held by a scalar or a sequence of scalars.
fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Sequence(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Trigger names from the workflow's `on` key.
fn triggers(workflow: &Value) -> BTreeSet<String> {
    // YAML 1.1 loaders read a bare `on` as boolean true.
    let on = workflow
        .get("on")
        .or_else(|| workflow.as_mapping().and_then(|m| m.get(Value::Bool(true))));
    match on {
        Some(Value::Mapping(map)) => map
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect(),
        Some(other) => strings(other).into_iter().collect(),
        None => BTreeSet::new(),
    }
}

/// Offset of the line declaring `key:` at any indentation.
fn key_offset(content: &str, key: &str) -> Option<usize> {
    let needle = format!("{key}:");
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with(&needle) {
            return Some(offset + line.len() - trimmed.len());
        }
        offset += line.len();
    }
    None
}

impl ExtractorPass for CiJobPass {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::CiJob
    }

    fn accepts(&self, role: FileRole) -> bool {
        role == FileRole::Workflow
    }

    fn extract(&self, file: &SourceFile<'_>) -> Result<PassOutput> {
        let workflow: Value = serde_yaml::from_str(file.content)
            .with_context(|| format!("invalid workflow YAML in {}", file.rel_path))?;
        let mut output = PassOutput::default();

        let Some(jobs) = workflow.get("jobs").and_then(Value::as_mapping) else {
            return Ok(output);
        };
        let triggers = triggers(&workflow);
        let workflow_name = workflow.get("name").and_then(Value::as_str);
        // Jobs are only declared after the `jobs:` key.
        let jobs_start = key_offset(file.content, "jobs").unwrap_or(0);

        for (key, job) in jobs {
            let Some(key) = key.as_str() else { continue };
            let id = EntityId::tagged(file.rel_path, "job", key);
            let name = job.get("name").and_then(Value::as_str).unwrap_or(key);
            let offset = key_offset(&file.content[jobs_start..], key).map(|o| o + jobs_start);

            let mut entity = Entity::new(
                id.clone(),
                EntityType::CiJob,
                name,
                file.evidence(self.kind(), offset),
            )
            .with_symbol(format!("job:{key}"))
            .with_confidence(0.95);
            if let Some(workflow_name) = workflow_name {
                entity = entity.with_description(workflow_name);
            }
            for trigger in &triggers {
                entity.labels.insert(format!("trigger:{trigger}"));
            }
            if let Some(runs_on) = job.get("runs-on") {
                for runner in strings(runs_on) {
                    entity.labels.insert(format!("runner:{runner}"));
                }
            }
            if let Some(steps) = job.get("steps").and_then(Value::as_sequence) {
                for step in steps {
                    if let Some(action) = step.get("uses").and_then(Value::as_str) {
                        entity.symbols.insert(format!("uses:{action}"));
                    }
                }
            }
            output.entities.push(entity);

            if let Some(needs) = job.get("needs") {
                for needed in strings(needs) {
                    output.relations.push(Relation::new(
                        RelationType::DependsOn,
                        id.clone(),
                        EntityId::tagged(file.rel_path, "job", &needed),
                        file.rel_path,
                    ));
                }
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const WORKFLOW: &str = r#"name: CI
on:
  push:
    branches: [main]
  pull_request:
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: npm ci
  test:
    name: Unit tests
    needs: build
    runs-on: [self-hosted, linux]
    steps:
      - run: npm test
  deploy:
    needs: [build, test]
    runs-on: ubuntu-latest
"#;

    fn run(content: &str) -> Result<PassOutput> {
        let roles = BTreeSet::from([FileRole::Workflow]);
        let file = SourceFile {
            rel_path: ".github/workflows/ci.yml",
            roles: &roles,
            content,
            observed_at: Utc::now(),
        };
        CiJobPass::new().extract(&file)
    }

    #[test]
    fn test_jobs_with_triggers_and_runners() {
        let out = run(WORKFLOW).unwrap();
        let ids: Vec<&str> = out.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                ".github/workflows/ci.yml#job:build",
                ".github/workflows/ci.yml#job:test",
                ".github/workflows/ci.yml#job:deploy"
            ]
        );

        let build = &out.entities[0];
        assert_eq!(build.kind, EntityType::CiJob);
        assert_eq!(build.name, "build");
        assert_eq!(build.description, "CI");
        assert_eq!(build.evidence[0].line, Some(7));
        assert!(build.labels.contains("trigger:push"));
        assert!(build.labels.contains("trigger:pull_request"));
        assert!(build.labels.contains("runner:ubuntu-latest"));
        assert!(build.symbols.contains("uses:actions/checkout@v4"));

        let test = &out.entities[1];
        assert_eq!(test.name, "Unit tests");
        assert!(test.labels.contains("runner:self-hosted"));
    }

    #[test]
    fn test_needs_become_depends_on() {
        let out = run(WORKFLOW).unwrap();
        let edges: Vec<(&str, &str)> = out
            .relations
            .iter()
            .map(|r| (r.from_id.as_str(), r.to_id.as_str()))
            .collect();
        assert_eq!(
            edges,
            vec![
                (".github/workflows/ci.yml#job:test", ".github/workflows/ci.yml#job:build"),
                (".github/workflows/ci.yml#job:deploy", ".github/workflows/ci.yml#job:build"),
                (".github/workflows/ci.yml#job:deploy", ".github/workflows/ci.yml#job:test"),
            ]
        );
        assert!(out.relations.iter().all(|r| r.kind == RelationType::DependsOn));
    }

    #[test]
    fn test_scalar_trigger_and_no_jobs() {
        let out = run("on: push\njobs:\n  lint:\n    runs-on: ubuntu-latest\n").unwrap();
        assert!(out.entities[0].labels.contains("trigger:push"));
        assert!(run("name: empty\non: push\n").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_workflow_is_an_error() {
        assert!(run("jobs: [unclosed\n").is_err());
    }
}
