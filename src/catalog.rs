use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::Value;

use crate::error::DeployError;
use crate::idmap::{IdMap, IdMapping, MappingKey};
use crate::literals::LiteralIdentifierMapping;
use crate::model::{Dependency, DependencyKey, ObjectType, ValidationResults};

/// An existing entity on the destination system, as enumerated by a type
/// handler. The order handlers return candidates in is the tie-break order
/// the guesser relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEntity {
    pub id: String,
    pub name: String,
}

impl TargetEntity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Per-object-type knowledge the core orchestrates over. Handlers own all
/// platform storage access; the core never performs I/O itself.
pub trait ObjectTypeHandler: Send + Sync {
    fn object_type(&self) -> ObjectType;

    /// Direct child dependencies of a node, in handler-defined order.
    fn child_dependencies(&self, dep: &Dependency) -> Result<Vec<Dependency>>;

    fn get_dependency(&self, id: &str, parent_id: Option<&str>) -> Result<Option<Dependency>>;

    fn dependency_exists(&self, id: &str, parent_id: Option<&str>) -> Result<bool> {
        Ok(self.get_dependency(id, parent_id)?.is_some())
    }

    /// Every instance of this type on the source system, for ancestor
    /// scans. Types that cannot enumerate return an empty list.
    fn dependencies(&self) -> Result<Vec<Dependency>> {
        Ok(Vec::new())
    }

    /// Writes the node's files on the destination.
    fn install_files(
        &self,
        archive: &dyn Archive,
        dep: &Dependency,
        ctx: &mut dyn ImportContext,
    ) -> Result<()>;

    /// Reserves a fresh destination id for a mapping marked new.
    fn reserve_new_id(&self, dep: &Dependency, id_map: &mut IdMap) -> Result<()>;

    /// Existing destination entities of this type, scoped to a resolved
    /// target parent when the type is parent-scoped.
    fn target_candidates(&self, parent_id: Option<&str>) -> Result<Vec<TargetEntity>>;

    /// The installed object's configuration tree, for literal rewriting.
    fn load_object_tree(&self, dep: &Dependency, ctx: &dyn ImportContext) -> Result<Value>;

    /// Persists the rewritten configuration tree.
    fn save_object_tree(
        &self,
        dep: &Dependency,
        tree: Value,
        ctx: &mut dyn ImportContext,
    ) -> Result<()>;

    fn resolve_id_mapping(
        &self,
        id_map: &IdMap,
        id: &str,
        parent_id: Option<&str>,
    ) -> Result<IdMapping> {
        let mut key = MappingKey::new(id, self.object_type());
        if let Some(parent) = parent_id {
            key = key.with_parent(parent);
        }
        match id_map.get(&key) {
            Some(mapping) if mapping.is_valid() => Ok(mapping.clone()),
            _ => Err(DeployError::MissingIdMapping {
                object_type: self.object_type(),
                id: id.to_string(),
                parent_id: parent_id.map(str::to_string),
            }
            .into()),
        }
    }

    /// Whether a child of the given type may not be pruned from this type's
    /// subtree during completion.
    fn is_required_child(&self, _child_type: &ObjectType) -> bool {
        false
    }

    /// Install-me-last policy for the whole type.
    fn should_defer_installation(&self) -> bool {
        false
    }

    /// The type this type is scoped under, if any.
    fn parent_type(&self) -> Option<ObjectType> {
        None
    }

    fn supports_parent_id(&self) -> bool {
        false
    }

    fn supports_id_types(&self) -> bool {
        false
    }

    fn supports_id_mapping(&self) -> bool {
        false
    }

    /// Deployable elements are package entry points; completion uses them to
    /// bound expansion depth per branch.
    fn is_deployable_element(&self) -> bool {
        false
    }
}

/// Package archive collaborator. The core reads recorded literal mappings
/// and file presence; the on-disk format is not its concern.
pub trait Archive {
    fn has_files_for(&self, dep: &Dependency) -> bool;

    fn add_files(&mut self, dep: &Dependency, files: Vec<(String, Value)>) -> Result<()>;

    /// Literal mappings recorded for a node at export time. `None` means
    /// nothing was recorded at all, distinct from an empty list.
    fn stored_literal_mappings(
        &self,
        dep: &Dependency,
    ) -> Result<Option<Vec<LiteralIdentifierMapping>>>;
}

/// Job-scoped import state owned by the caller.
pub trait ImportContext {
    fn current_id_map(&mut self) -> Option<&mut IdMap>;

    /// When `root` is given, asks "installed for this root?"; when `None`,
    /// asks "installed anywhere in this job?".
    fn is_installed(&self, dep: &Dependency, root: Option<&DependencyKey>) -> bool;

    fn mark_installed(&mut self, dep: &Dependency, root: &DependencyKey);

    fn current_validation_results(&mut self) -> Option<&mut ValidationResults>;
}

/// External view of the package tree, consulted by completion.
pub trait TreeContext {
    /// Rejects a candidate child outright before it enters the tree.
    fn suppresses(&self, dep: &Dependency) -> bool;

    /// Notified when completion prunes a child it had previously seen.
    fn retract(&mut self, dep: &Dependency);
}

struct CatalogInner {
    handlers: HashMap<ObjectType, Arc<dyn ObjectTypeHandler>>,
    install_order: Vec<ObjectType>,
}

/// Registry of type handlers plus the declared global install order.
/// Shared read-only across a job; registration happens at setup time.
#[derive(Clone)]
pub struct HandlerCatalog {
    inner: Arc<Mutex<CatalogInner>>,
}

impl Default for HandlerCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CatalogInner {
                handlers: HashMap::new(),
                install_order: Vec::new(),
            })),
        }
    }

    pub fn register<H>(&self, handler: H)
    where
        H: ObjectTypeHandler + 'static,
    {
        let mut inner = self.inner.lock().expect("catalog poisoned");
        inner.handlers.insert(handler.object_type(), Arc::new(handler));
    }

    /// Declares the global type install order, first installed first. Types
    /// absent from the list install after all listed types, in key order.
    pub fn set_install_order(&self, order: Vec<ObjectType>) {
        let mut inner = self.inner.lock().expect("catalog poisoned");
        inner.install_order = order;
    }

    pub fn install_order(&self) -> Vec<ObjectType> {
        let inner = self.inner.lock().expect("catalog poisoned");
        inner.install_order.clone()
    }

    pub fn handler(&self, object_type: &ObjectType) -> Result<Arc<dyn ObjectTypeHandler>> {
        let inner = self.inner.lock().expect("catalog poisoned");
        inner
            .handlers
            .get(object_type)
            .cloned()
            .ok_or_else(|| DeployError::DependencyDefinitionNotFound(object_type.clone()).into())
    }

    pub fn handler_for(&self, dep: &Dependency) -> Result<Arc<dyn ObjectTypeHandler>> {
        self.handler(dep.object_type())
    }

    pub fn contains(&self, object_type: &ObjectType) -> bool {
        let inner = self.inner.lock().expect("catalog poisoned");
        inner.handlers.contains_key(object_type)
    }

    /// Types referenced as some registered handler's parent type.
    pub fn parent_types(&self) -> BTreeSet<ObjectType> {
        let inner = self.inner.lock().expect("catalog poisoned");
        inner
            .handlers
            .values()
            .filter_map(|handler| handler.parent_type())
            .collect()
    }

    /// All registered types that may legally be ancestors, i.e. have
    /// children of their own according to the catalog.
    pub fn registered_types(&self) -> Vec<ObjectType> {
        let inner = self.inner.lock().expect("catalog poisoned");
        let mut types: Vec<_> = inner.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
