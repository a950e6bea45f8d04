//! Dependency graph resolution: children and ancestors of a node, with an
//! optional clone-on-read cache keyed by composite key.

pub mod completion;

use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use crate::catalog::HandlerCatalog;
use crate::model::{Dependency, DependencyKey, DependencyKind};

/// Resolves children and ancestors through the type handlers. The cache
/// stores decoupled clones and hands out decoupled clones, so callers can
/// mutate what they get without corrupting later reads.
pub struct DependencyResolver {
    catalog: HandlerCatalog,
    cache_enabled: bool,
    cache: HashMap<DependencyKey, Vec<Dependency>>,
}

impl DependencyResolver {
    pub fn new(catalog: HandlerCatalog) -> Self {
        Self {
            catalog,
            cache_enabled: false,
            cache: HashMap::new(),
        }
    }

    pub fn with_cache(catalog: HandlerCatalog) -> Self {
        let mut resolver = Self::new(catalog);
        resolver.cache_enabled = true;
        resolver
    }

    pub fn catalog(&self) -> &HandlerCatalog {
        &self.catalog
    }

    /// Disabling the cache drops its contents immediately.
    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache_enabled = enabled;
        if !enabled {
            self.cache.clear();
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Ordered children of a node: handler-reported children followed by
    /// user-defined children not already present.
    pub fn resolve_children(&mut self, dep: &Dependency) -> Result<Vec<Dependency>> {
        if self.cache_enabled {
            if let Some(cached) = self.cache.get(&dep.key) {
                debug!(key = %dep.key, "child cache hit");
                return Ok(cached.iter().map(Dependency::decoupled_clone).collect());
            }
        }

        let handler = self.catalog.handler_for(dep)?;
        let mut children = handler.child_dependencies(dep)?;
        for user_child in dep.user_children() {
            if !children.iter().any(|child| child.key == user_child.key) {
                children.push(user_child.decoupled_clone());
            }
        }

        if self.cache_enabled {
            self.cache.insert(
                dep.key.clone(),
                children.iter().map(Dependency::decoupled_clone).collect(),
            );
        }
        Ok(children)
    }

    /// All dependencies that have `dep` among their children. Candidate
    /// parents come from every registered type; a System-kind candidate is
    /// skipped outright for non-System children.
    pub fn resolve_ancestors(&mut self, dep: &Dependency) -> Result<Vec<Dependency>> {
        let mut ancestors = Vec::new();
        for object_type in self.catalog.registered_types() {
            let handler = self.catalog.handler(&object_type)?;
            for candidate in handler.dependencies()? {
                if candidate.kind == DependencyKind::System && dep.kind != DependencyKind::System
                {
                    continue;
                }
                if candidate.key == dep.key {
                    continue;
                }
                let is_child = if candidate.is_expanded() {
                    candidate.has_loaded_child(&dep.key)
                } else {
                    self.resolve_children(&candidate)?
                        .iter()
                        .any(|child| child.key == dep.key)
                };
                if is_child {
                    ancestors.push(candidate);
                }
            }
        }
        Ok(ancestors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Archive, ImportContext, ObjectTypeHandler, TargetEntity};
    use crate::idmap::IdMap;
    use crate::model::ObjectType;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        object_type: ObjectType,
        children: Vec<Dependency>,
        instances: Vec<Dependency>,
        calls: Arc<AtomicUsize>,
    }

    impl ObjectTypeHandler for CountingHandler {
        fn object_type(&self) -> ObjectType {
            self.object_type.clone()
        }

        fn child_dependencies(&self, _dep: &Dependency) -> Result<Vec<Dependency>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.children.clone())
        }

        fn dependencies(&self) -> Result<Vec<Dependency>> {
            Ok(self.instances.clone())
        }

        fn get_dependency(
            &self,
            id: &str,
            _parent_id: Option<&str>,
        ) -> Result<Option<Dependency>> {
            Ok(self.instances.iter().find(|d| d.id() == id).cloned())
        }

        fn install_files(
            &self,
            _archive: &dyn Archive,
            _dep: &Dependency,
            _ctx: &mut dyn ImportContext,
        ) -> Result<()> {
            Ok(())
        }

        fn reserve_new_id(&self, _dep: &Dependency, _id_map: &mut IdMap) -> Result<()> {
            Ok(())
        }

        fn target_candidates(&self, _parent_id: Option<&str>) -> Result<Vec<TargetEntity>> {
            Ok(Vec::new())
        }

        fn load_object_tree(
            &self,
            _dep: &Dependency,
            _ctx: &dyn ImportContext,
        ) -> Result<Value> {
            Ok(Value::Null)
        }

        fn save_object_tree(
            &self,
            _dep: &Dependency,
            _tree: Value,
            _ctx: &mut dyn ImportContext,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn dep(id: &str, ty: &str) -> Dependency {
        Dependency::new(DependencyKey::new(id, ty), DependencyKind::Shared, id)
    }

    fn handler_with(
        ty: &str,
        children: Vec<Dependency>,
        instances: Vec<Dependency>,
    ) -> (CountingHandler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            CountingHandler {
                object_type: ObjectType::new(ty),
                children,
                instances,
                calls: calls.clone(),
            },
            calls,
        )
    }

    #[test]
    fn cache_serves_decoupled_clones() {
        let catalog = HandlerCatalog::new();
        let (handler, calls) = handler_with("template", vec![dep("2", "slot")], vec![]);
        catalog.register(handler);

        let mut resolver = DependencyResolver::with_cache(catalog);
        let parent = dep("1", "template");

        let mut first = resolver.resolve_children(&parent).unwrap();
        first[0].set_children(vec![dep("99", "field")]);
        first[0].included = true;

        let second = resolver.resolve_children(&parent).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!second[0].is_expanded());
        assert!(!second[0].included);
    }

    #[test]
    fn disabling_the_cache_clears_it() {
        let catalog = HandlerCatalog::new();
        let (handler, calls) = handler_with("template", vec![dep("2", "slot")], vec![]);
        catalog.register(handler);

        let mut resolver = DependencyResolver::with_cache(catalog);
        let parent = dep("1", "template");
        resolver.resolve_children(&parent).unwrap();
        resolver.set_cache_enabled(false);
        resolver.set_cache_enabled(true);
        resolver.resolve_children(&parent).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn user_children_follow_handler_children() {
        let catalog = HandlerCatalog::new();
        let (handler, _) = handler_with("template", vec![dep("2", "slot")], vec![]);
        catalog.register(handler);

        let mut resolver = DependencyResolver::new(catalog);
        let mut parent = dep("1", "template");
        parent.add_user_child(dep("7", "slot"));
        parent.add_user_child(dep("2", "slot")); // already handler-reported

        let children = resolver.resolve_children(&parent).unwrap();
        let ids: Vec<_> = children.iter().map(Dependency::id).collect();
        assert_eq!(ids, vec!["2", "7"]);
    }

    #[test]
    fn ancestors_skip_system_parents_of_shared_children() {
        let catalog = HandlerCatalog::new();
        let child = dep("10", "slot");

        let mut shared_parent = dep("1", "template");
        shared_parent.set_children(vec![child.clone()]);
        let mut system_parent = Dependency::new(
            DependencyKey::new("2", "template"),
            DependencyKind::System,
            "system",
        );
        system_parent.set_children(vec![child.clone()]);

        let (handler, _) = handler_with(
            "template",
            vec![],
            vec![shared_parent, system_parent],
        );
        catalog.register(handler);
        let (slot_handler, _) = handler_with("slot", vec![], vec![]);
        catalog.register(slot_handler);

        let mut resolver = DependencyResolver::new(catalog);
        let ancestors = resolver.resolve_ancestors(&child).unwrap();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].id(), "1");
    }

    #[test]
    fn unexpanded_parents_are_lazily_checked() {
        let catalog = HandlerCatalog::new();
        let child = dep("10", "slot");
        // parent instance arrives unexpanded; its handler reports the child
        let (handler, _) = handler_with("template", vec![child.clone()], vec![dep("1", "template")]);
        catalog.register(handler);
        let (slot_handler, _) = handler_with("slot", vec![], vec![]);
        catalog.register(slot_handler);

        let mut resolver = DependencyResolver::new(catalog);
        let ancestors = resolver.resolve_ancestors(&child).unwrap();
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].id(), "1");
    }
}
