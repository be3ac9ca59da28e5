use std::collections::{BTreeMap, HashSet};

use crate::error::{Diagnostic, Diagnostics, Stage};
use crate::types::{normalize_path, Entity, EntityId, Relation};

/// Deduplicated, deterministically ordered graph.
#[derive(Debug, Clone, Default)]
pub struct MergedGraph {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

/// Validate an entity crossing from a pass into the merger.
fn validate(mut entity: Entity, diagnostics: &mut Diagnostics) -> Option<Entity> {
    if entity.id.0.contains('\\') {
        entity.id = EntityId(normalize_path(&entity.id.0));
    }
    entity.source_paths = entity
        .source_paths
        .iter()
        .map(|p| normalize_path(p))
        .collect();
    let reason = if entity.id.0.is_empty() {
        Some("entity with empty id")
    } else if entity.evidence.is_empty() {
        Some("entity without evidence")
    } else {
        None
    };
    match reason {
        Some(reason) => {
            diagnostics.push(Diagnostic {
                stage: Stage::Merge,
                path: entity.source_paths.first().cloned().unwrap_or_default(),
                message: format!("dropped {reason}: '{}'", entity.id),
            });
            None
        }
        None => Some(entity),
    }
}

/// Merge pass outputs into one graph.
///
/// Entities with the same id are folded together (set fields unioned, scalar
/// fields latest-wins). Relations are deduplicated, relations touching an id
/// that was never emitted are dropped, and both lists are sorted.
pub fn merge(
    entities: Vec<Entity>,
    relations: Vec<Relation>,
    diagnostics: &mut Diagnostics,
) -> MergedGraph {
    let mut by_id: BTreeMap<EntityId, Entity> = BTreeMap::new();
    for entity in entities {
        let Some(entity) = validate(entity, diagnostics) else {
            continue;
        };
        match by_id.get_mut(&entity.id) {
            Some(existing) => existing.absorb(entity),
            None => {
                by_id.insert(entity.id.clone(), entity);
            }
        }
    }

    let mut seen = HashSet::new();
    let mut relations: Vec<Relation> = relations
        .into_iter()
        .map(|mut r| {
            r.from_id = EntityId(normalize_path(&r.from_id.0));
            r.to_id = EntityId(normalize_path(&r.to_id.0));
            r
        })
        .filter(|r| by_id.contains_key(&r.from_id) && by_id.contains_key(&r.to_id))
        .filter(|r| seen.insert(r.clone()))
        .collect();
    relations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    MergedGraph {
        entities: by_id.into_values().collect(),
        relations,
    }
}
