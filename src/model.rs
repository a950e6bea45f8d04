use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a configuration object type, e.g. "template" or "slot".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectType(String);

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Relationship of a dependency to the package that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    System,
    Shared,
    Local,
    User,
}

/// Composite identity of a dependency. Two nodes with the same key are the
/// same logical object regardless of which tree instance they sit in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyKey {
    pub id: String,
    pub object_type: ObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<ObjectType>,
}

impl DependencyKey {
    pub fn new(id: impl Into<String>, object_type: impl Into<ObjectType>) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            parent_id: None,
            parent_type: None,
        }
    }

    pub fn with_parent(
        mut self,
        parent_id: impl Into<String>,
        parent_type: impl Into<ObjectType>,
    ) -> Self {
        self.parent_id = Some(parent_id.into());
        self.parent_type = Some(parent_type.into());
        self
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent_id {
            Some(parent) => write!(f, "{}/{}@{}", self.object_type, self.id, parent),
            None => write!(f, "{}/{}", self.object_type, self.id),
        }
    }
}

/// One node of a dependency tree. Children and ancestors start out
/// unexpanded (`None`) and are attached by the resolver or the completion
/// pass; identity is always the composite key, never the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub key: DependencyKey,
    pub kind: DependencyKind,
    pub display_name: String,
    #[serde(default)]
    pub supports_id_types: bool,
    #[serde(default)]
    pub supports_id_mapping: bool,
    #[serde(default)]
    pub supports_parent_id: bool,
    #[serde(default)]
    pub is_deployable_element: bool,
    /// User selected this node for the package.
    #[serde(default)]
    pub included: bool,
    /// Added by tree completion rather than by the user.
    #[serde(default)]
    pub is_auto_dependency: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<Dependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ancestors: Option<Vec<Dependency>>,
    /// Children attached by the user on top of what the handler reports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    user_children: Vec<Dependency>,
}

impl Dependency {
    pub fn new(
        key: DependencyKey,
        kind: DependencyKind,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            key,
            kind,
            display_name: display_name.into(),
            supports_id_types: false,
            supports_id_mapping: false,
            supports_parent_id: false,
            is_deployable_element: false,
            included: false,
            is_auto_dependency: false,
            children: None,
            ancestors: None,
            user_children: Vec::new(),
        }
    }

    pub fn object_type(&self) -> &ObjectType {
        &self.key.object_type
    }

    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }

    pub fn children(&self) -> &[Dependency] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn children_mut(&mut self) -> &mut [Dependency] {
        self.children.as_deref_mut().unwrap_or(&mut [])
    }

    pub fn set_children(&mut self, children: Vec<Dependency>) {
        self.children = Some(children);
    }

    /// Drops children matching `keep == false`, returning the removed nodes.
    pub fn retain_children(&mut self, mut keep: impl FnMut(&Dependency) -> bool) -> Vec<Dependency> {
        let Some(children) = self.children.as_mut() else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(children.len());
        for child in children.drain(..) {
            if keep(&child) {
                kept.push(child);
            } else {
                removed.push(child);
            }
        }
        *children = kept;
        removed
    }

    pub fn ancestors(&self) -> Option<&[Dependency]> {
        self.ancestors.as_deref()
    }

    pub fn set_ancestors(&mut self, ancestors: Vec<Dependency>) {
        self.ancestors = Some(ancestors);
    }

    pub fn user_children(&self) -> &[Dependency] {
        &self.user_children
    }

    pub fn add_user_child(&mut self, child: Dependency) {
        self.user_children.push(child);
    }

    /// Clone with children and ancestors stripped, for cache storage and
    /// cache reads. Mutating the clone never touches the source.
    pub fn decoupled_clone(&self) -> Dependency {
        let mut clone = self.clone();
        clone.children = None;
        clone.ancestors = None;
        clone
    }

    /// True if this node or any descendant is included.
    pub fn contains_included(&self) -> bool {
        self.included || self.children().iter().any(Dependency::contains_included)
    }

    /// Direct membership test against loaded children only.
    pub fn has_loaded_child(&self, key: &DependencyKey) -> bool {
        self.children().iter().any(|child| &child.key == key)
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Dependency {}

/// Validation-time findings, collected and returned to the caller for a
/// decision instead of being thrown.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ValidationResults {
    warnings: BTreeMap<DependencyKey, Vec<String>>,
    errors: BTreeMap<DependencyKey, Vec<String>>,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, key: DependencyKey, message: impl Into<String>) {
        self.warnings.entry(key).or_default().push(message.into());
    }

    pub fn add_error(&mut self, key: DependencyKey, message: impl Into<String>) {
        self.errors.entry(key).or_default().push(message.into());
    }

    pub fn warnings_for(&self, key: &DependencyKey) -> &[String] {
        self.warnings.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn errors_for(&self, key: &DependencyKey) -> &[String] {
        self.errors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_errors(&self) -> bool {
        self.errors.values().any(|list| !list.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(id: &str, ty: &str) -> Dependency {
        Dependency::new(DependencyKey::new(id, ty), DependencyKind::Shared, id)
    }

    #[test]
    fn identity_is_the_composite_key() {
        let mut a = dep("301", "template");
        let b = dep("301", "template");
        a.included = true;
        a.set_children(vec![dep("7", "slot")]);
        assert_eq!(a, b);

        let scoped = Dependency::new(
            DependencyKey::new("301", "template").with_parent("5", "community"),
            DependencyKind::Shared,
            "301",
        );
        assert_ne!(a, scoped);
    }

    #[test]
    fn decoupled_clone_strips_relations() {
        let mut node = dep("1", "template");
        node.set_children(vec![dep("2", "slot")]);
        node.set_ancestors(vec![dep("3", "site")]);
        let clone = node.decoupled_clone();
        assert!(!clone.is_expanded());
        assert!(clone.ancestors().is_none());
        assert_eq!(clone, node);
    }

    #[test]
    fn contains_included_sees_deep_descendants() {
        let mut leaf = dep("3", "field");
        leaf.included = true;
        let mut mid = dep("2", "slot");
        mid.set_children(vec![leaf]);
        let mut root = dep("1", "template");
        root.set_children(vec![mid]);
        assert!(root.contains_included());
        assert!(!dep("9", "template").contains_included());
    }

    #[test]
    fn retain_children_reports_removals() {
        let mut root = dep("1", "template");
        root.set_children(vec![dep("2", "slot"), dep("3", "slot")]);
        let removed = root.retain_children(|child| child.id() == "2");
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), "3");
        assert_eq!(root.children().len(), 1);
    }
}
