//! Guesses destination targets for source entities requiring id mapping.
//! Two matching rounds per scope: exact (case-insensitive name AND exact
//! id), then name-only taking the first remaining candidate in catalog
//! order. Sources without any name match become new objects. No two
//! sources in one (type, parent type) scope ever map to the same target.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use crate::catalog::{HandlerCatalog, TargetEntity};
use crate::error::DeployError;
use crate::job::Job;
use crate::model::{Dependency, ObjectType};

use super::{IdMap, IdMapping, MappingKey};

#[derive(Debug, Clone)]
struct SourceEntry {
    source_id: String,
    source_name: String,
    object_type: ObjectType,
    source_parent_id: Option<String>,
    parent_type: Option<ObjectType>,
}

impl SourceEntry {
    fn from_dependency(dep: &Dependency) -> Self {
        Self {
            source_id: dep.key.id.clone(),
            source_name: dep.display_name.clone(),
            object_type: dep.key.object_type.clone(),
            source_parent_id: dep.key.parent_id.clone(),
            parent_type: dep.key.parent_type.clone(),
        }
    }
}

/// Builds the id map for `sources` against the destination catalogs.
/// Parent-scoped entries wait for their parent's mapping; anything still
/// blocked after the second outer pass is a data error. A cancelled job
/// returns the partial map without error.
pub fn guess_targets(
    catalog: &HandlerCatalog,
    sources: &[Dependency],
    source_env: &str,
    job: &Job,
) -> Result<IdMap> {
    let mut id_map = IdMap::new(source_env);

    // group by (type, source parent id): one candidate pool per group
    let mut groups: BTreeMap<(ObjectType, Option<String>), Vec<SourceEntry>> = BTreeMap::new();
    for dep in sources {
        if !dep.supports_id_mapping {
            continue;
        }
        let entry = SourceEntry::from_dependency(dep);
        groups
            .entry((entry.object_type.clone(), entry.source_parent_id.clone()))
            .or_default()
            .push(entry);
    }

    // parentless groups first so scoped groups can see their parents
    let mut pending: Vec<_> = groups.into_values().collect();
    pending.sort_by_key(|group| group[0].source_parent_id.is_some());

    for _pass in 0..2 {
        let mut blocked = Vec::new();
        for group in pending {
            if job.is_cancelled() {
                return Ok(id_map);
            }
            match resolve_group(catalog, &mut id_map, &group)? {
                GroupOutcome::Resolved => {}
                GroupOutcome::Blocked => blocked.push(group),
            }
        }
        pending = blocked;
        if pending.is_empty() {
            break;
        }
    }

    if let Some(group) = pending.first() {
        let entry = &group[0];
        return Err(DeployError::MissingIdMapping {
            object_type: entry
                .parent_type
                .clone()
                .unwrap_or_else(|| entry.object_type.clone()),
            id: entry.source_parent_id.clone().unwrap_or_default(),
            parent_id: None,
        }
        .into());
    }
    Ok(id_map)
}

enum GroupOutcome {
    Resolved,
    Blocked,
}

/// How the parent scope of a group resolved.
enum ParentScope {
    None,
    Mapped(String),
    New,
    Unresolved,
}

fn parent_scope(id_map: &IdMap, entry: &SourceEntry) -> ParentScope {
    let (Some(parent_id), Some(parent_type)) = (&entry.source_parent_id, &entry.parent_type)
    else {
        return ParentScope::None;
    };
    let direct = id_map.get(&MappingKey::new(parent_id.clone(), parent_type.clone()));
    let mapping = direct.or_else(|| {
        id_map
            .iter()
            .find(|m| &m.object_type == parent_type && &m.source_id == parent_id)
    });
    match mapping {
        Some(m) => {
            if let Some(target) = &m.target_id {
                ParentScope::Mapped(target.clone())
            } else if m.is_new_object {
                ParentScope::New
            } else {
                ParentScope::Unresolved
            }
        }
        None => ParentScope::Unresolved,
    }
}

fn resolve_group(
    catalog: &HandlerCatalog,
    id_map: &mut IdMap,
    group: &[SourceEntry],
) -> Result<GroupOutcome> {
    let first = &group[0];
    let (target_parent_id, parent_is_new) = match parent_scope(id_map, first) {
        ParentScope::None => (None, false),
        ParentScope::Mapped(target) => (Some(target), false),
        ParentScope::New => (None, true),
        ParentScope::Unresolved => return Ok(GroupOutcome::Blocked),
    };

    // a brand-new parent has no existing children on the destination
    let mut pool: Vec<TargetEntity> = if parent_is_new {
        Vec::new()
    } else {
        catalog
            .handler(&first.object_type)?
            .target_candidates(target_parent_id.as_deref())?
    };
    let consumed = id_map.consumed_targets(&first.object_type, first.parent_type.as_ref());
    pool.retain(|candidate| !consumed.contains(&candidate.id));

    let mut mappings: Vec<IdMapping> = group
        .iter()
        .map(|entry| {
            let mut mapping = IdMapping::unresolved(
                entry.source_id.clone(),
                entry.source_name.clone(),
                entry.object_type.clone(),
            );
            if let (Some(parent_id), Some(parent_type)) =
                (&entry.source_parent_id, &entry.parent_type)
            {
                mapping = mapping.with_parent(parent_id.clone(), parent_type.clone());
                mapping.target_parent_id = target_parent_id.clone();
            }
            mapping
        })
        .collect();

    // round 1: case-insensitive name AND exact id
    for mapping in &mut mappings {
        let position = pool.iter().position(|candidate| {
            candidate.id == mapping.source_id
                && candidate.name.eq_ignore_ascii_case(&mapping.source_name)
        });
        if let Some(index) = position {
            let candidate = pool.remove(index);
            debug!(source = %mapping.source_id, target = %candidate.id, "exact match");
            mapping.set_target(candidate.id, candidate.name);
        }
    }

    // round 2: first remaining name match in catalog order
    for mapping in &mut mappings {
        if mapping.is_resolved() {
            continue;
        }
        let position = pool
            .iter()
            .position(|candidate| candidate.name.eq_ignore_ascii_case(&mapping.source_name));
        match position {
            Some(index) => {
                let candidate = pool.remove(index);
                debug!(source = %mapping.source_id, target = %candidate.id, "name match");
                mapping.set_target(candidate.id, candidate.name);
            }
            None => {
                debug!(source = %mapping.source_id, "no match, marking new");
                mapping.mark_new();
            }
        }
    }

    for mapping in mappings {
        id_map.insert(mapping);
    }
    Ok(GroupOutcome::Resolved)
}
