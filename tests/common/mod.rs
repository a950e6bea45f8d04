//! In-memory collaborator doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::Value;

use deploy_kernel::{
    Archive, Dependency, DependencyKey, DependencyKind, IdMap, ImportContext,
    LiteralIdentifierMapping, ObjectType, ObjectTypeHandler, TargetEntity, ValidationResults,
};

pub fn dep(id: &str, ty: &str) -> Dependency {
    Dependency::new(DependencyKey::new(id, ty), DependencyKind::Shared, id)
}

pub fn included(id: &str, ty: &str) -> Dependency {
    let mut node = dep(id, ty);
    node.included = true;
    node
}

/// Configurable per-type handler recording install order into a shared log.
pub struct TestHandler {
    object_type: ObjectType,
    children: HashMap<String, Vec<Dependency>>,
    candidates: Vec<TargetEntity>,
    required_children: Vec<ObjectType>,
    parent_type: Option<ObjectType>,
    defer: bool,
    pub install_log: Arc<Mutex<Vec<String>>>,
    pub trees: Arc<Mutex<HashMap<DependencyKey, Value>>>,
    reserve_counter: Arc<Mutex<u64>>,
}

impl TestHandler {
    pub fn new(ty: &str, install_log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            object_type: ObjectType::new(ty),
            children: HashMap::new(),
            candidates: Vec::new(),
            required_children: Vec::new(),
            parent_type: None,
            defer: false,
            install_log,
            trees: Arc::new(Mutex::new(HashMap::new())),
            reserve_counter: Arc::new(Mutex::new(9000)),
        }
    }

    pub fn children(mut self, id: &str, children: Vec<Dependency>) -> Self {
        self.children.insert(id.to_string(), children);
        self
    }

    pub fn candidates(mut self, candidates: Vec<TargetEntity>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn requires(mut self, ty: &str) -> Self {
        self.required_children.push(ObjectType::new(ty));
        self
    }

    pub fn deferred(mut self) -> Self {
        self.defer = true;
        self
    }

    pub fn scoped_under(mut self, ty: &str) -> Self {
        self.parent_type = Some(ObjectType::new(ty));
        self
    }

    pub fn tree(self, key: DependencyKey, tree: Value) -> Self {
        self.trees.lock().unwrap().insert(key, tree);
        self
    }

    pub fn trees_handle(&self) -> Arc<Mutex<HashMap<DependencyKey, Value>>> {
        self.trees.clone()
    }
}

impl ObjectTypeHandler for TestHandler {
    fn object_type(&self) -> ObjectType {
        self.object_type.clone()
    }

    fn child_dependencies(&self, dep: &Dependency) -> Result<Vec<Dependency>> {
        Ok(self.children.get(dep.id()).cloned().unwrap_or_default())
    }

    fn get_dependency(&self, _id: &str, _parent: Option<&str>) -> Result<Option<Dependency>> {
        Ok(None)
    }

    fn install_files(
        &self,
        _archive: &dyn Archive,
        dep: &Dependency,
        _ctx: &mut dyn ImportContext,
    ) -> Result<()> {
        self.install_log.lock().unwrap().push(dep.key.to_string());
        Ok(())
    }

    fn reserve_new_id(&self, dep: &Dependency, id_map: &mut IdMap) -> Result<()> {
        let mut counter = self.reserve_counter.lock().unwrap();
        *counter += 1;
        let reserved = counter.to_string();
        let mut key = deploy_kernel::MappingKey::new(dep.id(), self.object_type.clone());
        if let Some(parent_id) = &dep.key.parent_id {
            key = key.with_parent(parent_id.clone());
        }
        if let Some(mapping) = id_map.get_mut(&key) {
            mapping.target_id = Some(reserved);
            mapping.target_name = Some(mapping.source_name.clone());
        }
        Ok(())
    }

    fn target_candidates(&self, _parent_id: Option<&str>) -> Result<Vec<TargetEntity>> {
        Ok(self.candidates.clone())
    }

    fn load_object_tree(&self, dep: &Dependency, _ctx: &dyn ImportContext) -> Result<Value> {
        Ok(self
            .trees
            .lock()
            .unwrap()
            .get(&dep.key)
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn save_object_tree(
        &self,
        dep: &Dependency,
        tree: Value,
        _ctx: &mut dyn ImportContext,
    ) -> Result<()> {
        self.trees.lock().unwrap().insert(dep.key.clone(), tree);
        Ok(())
    }

    fn is_required_child(&self, child_type: &ObjectType) -> bool {
        self.required_children.contains(child_type)
    }

    fn should_defer_installation(&self) -> bool {
        self.defer
    }

    fn parent_type(&self) -> Option<ObjectType> {
        self.parent_type.clone()
    }

    fn supports_id_mapping(&self) -> bool {
        true
    }
}

/// Archive double: every dependency has files unless listed as missing;
/// literal mappings are recorded explicitly per key.
#[derive(Default)]
pub struct MemoryArchive {
    missing_files: BTreeSet<DependencyKey>,
    literal_mappings: BTreeMap<DependencyKey, Vec<LiteralIdentifierMapping>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_files(mut self, key: DependencyKey) -> Self {
        self.missing_files.insert(key);
        self
    }

    pub fn record_literals(&mut self, key: DependencyKey, mappings: Vec<LiteralIdentifierMapping>) {
        self.literal_mappings.insert(key, mappings);
    }
}

impl Archive for MemoryArchive {
    fn has_files_for(&self, dep: &Dependency) -> bool {
        !self.missing_files.contains(&dep.key)
    }

    fn add_files(&mut self, _dep: &Dependency, _files: Vec<(String, Value)>) -> Result<()> {
        Ok(())
    }

    fn stored_literal_mappings(
        &self,
        dep: &Dependency,
    ) -> Result<Option<Vec<LiteralIdentifierMapping>>> {
        Ok(self.literal_mappings.get(&dep.key).cloned())
    }
}

/// Import context double backed by plain maps.
#[derive(Default)]
pub struct MemoryImportContext {
    pub id_map: Option<IdMap>,
    installed: BTreeMap<DependencyKey, BTreeSet<DependencyKey>>,
    validation: ValidationResults,
}

impl MemoryImportContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_map(id_map: IdMap) -> Self {
        Self {
            id_map: Some(id_map),
            ..Self::default()
        }
    }

    pub fn preinstall(&mut self, dep: &Dependency, root: &DependencyKey) {
        self.installed
            .entry(dep.key.clone())
            .or_default()
            .insert(root.clone());
    }
}

impl ImportContext for MemoryImportContext {
    fn current_id_map(&mut self) -> Option<&mut IdMap> {
        self.id_map.as_mut()
    }

    fn is_installed(&self, dep: &Dependency, root: Option<&DependencyKey>) -> bool {
        match self.installed.get(&dep.key) {
            None => false,
            Some(roots) => match root {
                Some(root_key) => roots.contains(root_key),
                None => !roots.is_empty(),
            },
        }
    }

    fn mark_installed(&mut self, dep: &Dependency, root: &DependencyKey) {
        self.installed
            .entry(dep.key.clone())
            .or_default()
            .insert(root.clone());
    }

    fn current_validation_results(&mut self) -> Option<&mut ValidationResults> {
        Some(&mut self.validation)
    }
}
