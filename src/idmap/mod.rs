pub mod guesser;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ObjectType;

/// Lookup key for one mapping: at most one mapping may exist per
/// (source id, object type[, source parent id]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingKey {
    pub source_id: String,
    pub object_type: ObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_parent_id: Option<String>,
}

impl MappingKey {
    pub fn new(source_id: impl Into<String>, object_type: impl Into<ObjectType>) -> Self {
        Self {
            source_id: source_id.into(),
            object_type: object_type.into(),
            source_parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.source_parent_id = Some(parent_id.into());
        self
    }
}

/// One source→target identifier translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    pub source_id: String,
    pub source_name: String,
    pub object_type: ObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<ObjectType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_parent_id: Option<String>,
    /// No target exists; the destination must create the object fresh.
    #[serde(default)]
    pub is_new_object: bool,
}

impl IdMapping {
    pub fn unresolved(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        object_type: impl Into<ObjectType>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_name: source_name.into(),
            object_type: object_type.into(),
            source_parent_id: None,
            parent_type: None,
            target_id: None,
            target_name: None,
            target_parent_id: None,
            is_new_object: false,
        }
    }

    pub fn with_parent(
        mut self,
        parent_id: impl Into<String>,
        parent_type: impl Into<ObjectType>,
    ) -> Self {
        self.source_parent_id = Some(parent_id.into());
        self.parent_type = Some(parent_type.into());
        self
    }

    pub fn key(&self) -> MappingKey {
        MappingKey {
            source_id: self.source_id.clone(),
            object_type: self.object_type.clone(),
            source_parent_id: self.source_parent_id.clone(),
        }
    }

    pub fn set_target(
        &mut self,
        target_id: impl Into<String>,
        target_name: impl Into<String>,
    ) {
        self.target_id = Some(target_id.into());
        self.target_name = Some(target_name.into());
        self.is_new_object = false;
    }

    pub fn mark_new(&mut self) {
        self.target_id = None;
        self.target_name = None;
        self.is_new_object = true;
    }

    /// Mapped to an existing target, or explicitly new. Only valid mappings
    /// are worth persisting.
    pub fn is_valid(&self) -> bool {
        self.target_id.is_some() || self.is_new_object
    }

    pub fn is_resolved(&self) -> bool {
        self.is_valid()
    }
}

/// All mappings for one named source environment, built per job.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IdMap {
    pub source_env: String,
    mappings: BTreeMap<MappingKey, IdMapping>,
}

impl IdMap {
    pub fn new(source_env: impl Into<String>) -> Self {
        Self {
            source_env: source_env.into(),
            mappings: BTreeMap::new(),
        }
    }

    /// Inserts or replaces; the key is derived from the mapping itself.
    pub fn insert(&mut self, mapping: IdMapping) {
        self.mappings.insert(mapping.key(), mapping);
    }

    pub fn get(&self, key: &MappingKey) -> Option<&IdMapping> {
        self.mappings.get(key)
    }

    pub fn get_mut(&mut self, key: &MappingKey) -> Option<&mut IdMapping> {
        self.mappings.get_mut(key)
    }

    pub fn contains(&self, key: &MappingKey) -> bool {
        self.mappings.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdMapping> {
        self.mappings.values()
    }

    /// Resolved target id for a source id, if any. A mapping marked new has
    /// no target id yet.
    pub fn target_id(&self, key: &MappingKey) -> Option<&str> {
        self.get(key).and_then(|m| m.target_id.as_deref())
    }

    /// Mappings worth persisting: mapped to a target or explicitly new.
    pub fn valid_mappings(&self) -> impl Iterator<Item = &IdMapping> {
        self.mappings.values().filter(|m| m.is_valid())
    }

    /// Target ids already consumed for a (type, parent) scope; the guesser
    /// uses this to keep the mapping injective within one run.
    pub fn consumed_targets(
        &self,
        object_type: &ObjectType,
        parent_type: Option<&ObjectType>,
    ) -> Vec<String> {
        self.mappings
            .values()
            .filter(|m| {
                &m.object_type == object_type && m.parent_type.as_ref() == parent_type
            })
            .filter_map(|m| m.target_id.clone())
            .collect()
    }
}
