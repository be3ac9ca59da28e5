use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;

use revgraph_core::extractor::{ExtractorPass, SourceFile};
use revgraph_core::types::*;

// One alternative per quote style since the pattern language has no backreferences.
const ROUTE_SRC: &str = r#"\b(?:app|router)\.(get|post|put|delete|patch)\s*\(\s*(?:'([^'\n]*)'|"([^"\n]*)"|`([^`\n]*)`)"#;

/// One `app.<method>("<path>")` / `router.<method>("<path>")` registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Uppercase HTTP method.
    pub method: String,
    pub path: String,
    pub offset: usize,
}

/// Finds route registrations in source text. Shared by the route and API passes.
pub struct RouteMatcher {
    pattern: Regex,
}

impl RouteMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(ROUTE_SRC).context("failed to compile route pattern")?,
        })
    }

    /// Registrations in source order, first occurrence of each (method, path) only.
    pub fn find(&self, content: &str) -> Vec<RouteMatch> {
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
        let mut found = Vec::new();
        for cap in self.pattern.captures_iter(content) {
            let Some(method) = cap.get(1) else { continue };
            let Some(path) = cap.get(2).or_else(|| cap.get(3)).or_else(|| cap.get(4)) else {
                continue;
            };
            let method = method.as_str().to_uppercase();
            let path = path.as_str().to_string();
            if seen.insert((method.clone(), path.clone())) {
                found.push(RouteMatch {
                    method,
                    path,
                    offset: cap.get(0).map_or(0, |m| m.start()),
                });
            }
        }
        found
    }
}

/// Id of the route entity declared in `rel_path`.
pub fn route_id(rel_path: &str, method: &str, path: &str) -> EntityId {
    EntityId::tagged(rel_path, "route", &format!("{method}:{path}"))
}

/// Emits one route entity per distinct method and path in a file.
pub struct RoutePass {
    matcher: RouteMatcher,
}

impl RoutePass {
    pub fn new() -> Result<Self> {
        Ok(Self {
            matcher: RouteMatcher::new()?,
        })
    }
}

impl ExtractorPass for RoutePass {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Route
    }

    fn accepts(&self, role: FileRole) -> bool {
        matches!(role, FileRole::Source | FileRole::Entry)
    }

    fn extract(&self, file: &SourceFile<'_>) -> Result<PassOutput> {
        let mut output = PassOutput::default();
        for route in self.matcher.find(file.content) {
            let name = format!("{} {}", route.method, route.path);
            output.entities.push(
                Entity::new(
                    route_id(file.rel_path, &route.method, &route.path),
                    EntityType::Route,
                    name.as_str(),
                    file.evidence(self.kind(), Some(route.offset)),
                )
                .with_symbol(name)
                .with_label(format!("method:{}", route.method))
                .with_confidence(0.8),
            );
        }
        Ok(output)
    }
}
