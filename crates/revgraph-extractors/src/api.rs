use anyhow::Result;

use revgraph_core::extractor::{ExtractorPass, SourceFile};
use revgraph_core::types::*;

use crate::route::{route_id, RouteMatcher};

/// Emits a path-independent API entity per route, linked to the route that serves it.
///
/// The same endpoint registered from two files becomes one API entity with
/// two `routes_to` edges once merged.
pub struct ApiPass {
    matcher: RouteMatcher,
}

impl ApiPass {
    pub fn new() -> Result<Self> {
        Ok(Self {
            matcher: RouteMatcher::new()?,
        })
    }
}

impl ExtractorPass for ApiPass {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Api
    }

    fn accepts(&self, role: FileRole) -> bool {
        matches!(role, FileRole::Source | FileRole::Entry)
    }

    fn extract(&self, file: &SourceFile<'_>) -> Result<PassOutput> {
        let mut output = PassOutput::default();
        for route in self.matcher.find(file.content) {
            let api_id = EntityId::api(&route.path, &route.method);
            output.entities.push(
                Entity::new(
                    api_id.clone(),
                    EntityType::Api,
                    format!("{} {}", route.method, route.path),
                    file.evidence(self.kind(), Some(route.offset)),
                )
                .with_symbol(route.path.as_str())
                .with_label(format!("method:{}", route.method))
                .with_confidence(0.7),
            );
            output.relations.push(Relation::new(
                RelationType::RoutesTo,
                api_id,
                route_id(file.rel_path, &route.method, &route.path),
                file.rel_path,
            ));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    #[test]
    fn test_api_entities_route_to_their_route() {
        let roles = BTreeSet::from([FileRole::Source]);
        let file = SourceFile {
            rel_path: "server/users.ts",
            roles: &roles,
            content: "router.get(\"/users/:id\", show);\nrouter.patch('/users/:id', update);\n",
            observed_at: Utc::now(),
        };
        let out = ApiPass::new().unwrap().extract(&file).unwrap();

        let ids: Vec<&str> = out.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["api:/users/:id#GET", "api:/users/:id#PATCH"]);
        assert!(out.entities.iter().all(|e| e.kind == EntityType::Api));

        let edge = &out.relations[0];
        assert_eq!(edge.kind, RelationType::RoutesTo);
        assert_eq!(edge.from_id.as_str(), "api:/users/:id#GET");
        assert_eq!(edge.to_id.as_str(), "server/users.ts#route:GET:/users/:id");
        assert_eq!(edge.evidence_path, "server/users.ts");
    }

    #[test]
    fn test_no_routes_no_output() {
        let roles = BTreeSet::from([FileRole::Source]);
        let file = SourceFile {
            rel_path: "lib/x.js",
            roles: &roles,
            content: "export const x = 1;",
            observed_at: Utc::now(),
        };
        assert!(ApiPass::new().unwrap().extract(&file).unwrap().is_empty());
    }
}
