//! Drives installation of completed dependency trees: reservation of target
//! identifiers, per-tree post-order installation, deferred-type second pass,
//! idempotency against the import context, and literal rewriting through the
//! stored context paths.

use std::collections::BTreeMap;

use anyhow::{Context as AnyhowContext, Result};
use tracing::{debug, info, warn};

use crate::catalog::{Archive, HandlerCatalog, ImportContext};
use crate::error::DeployError;
use crate::idmap::MappingKey;
use crate::job::Job;
use crate::literals::{LiteralIdentifierMapping, LiteralRewriter};
use crate::model::{Dependency, DependencyKey, ObjectType};

/// Per-dependency state within one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Pending,
    InProgress,
    Installed,
    SkippedAlreadyInstalled,
    Deferred,
}

/// Final states after a run, keyed by composite key. Nodes a cancelled job
/// never reached stay `Pending`.
#[derive(Debug, Default)]
pub struct InstallReport {
    states: BTreeMap<DependencyKey, InstallState>,
}

impl InstallReport {
    pub fn state(&self, key: &DependencyKey) -> InstallState {
        self.states.get(key).copied().unwrap_or(InstallState::Pending)
    }

    pub fn installed_count(&self) -> usize {
        self.states
            .values()
            .filter(|state| matches!(state, InstallState::Installed))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DependencyKey, InstallState)> {
        self.states.iter().map(|(key, state)| (key, *state))
    }

    fn seed(&mut self, key: &DependencyKey) {
        self.states.entry(key.clone()).or_insert(InstallState::Pending);
    }

    fn set(&mut self, key: &DependencyKey, state: InstallState) {
        self.states.insert(key.clone(), state);
    }
}

pub struct PackageInstaller {
    catalog: HandlerCatalog,
}

impl PackageInstaller {
    pub fn new(catalog: HandlerCatalog) -> Self {
        Self { catalog }
    }

    /// Installs the given completed trees. Roots are grouped by the
    /// catalog's declared type order; within one tree, children install
    /// before their parent; deferred types run in a flat second pass. A
    /// cancelled job returns `Ok` with untouched nodes left `Pending`.
    pub fn install(
        &self,
        roots: &[Dependency],
        archive: &dyn Archive,
        ctx: &mut dyn ImportContext,
        job: &Job,
    ) -> Result<InstallReport> {
        let ordered = self.order_roots(roots);
        let mut report = InstallReport::default();
        for root in &ordered {
            seed_states(root, &mut report);
        }

        // reserve target ids before any file lands, parents before children
        for root in &ordered {
            self.reserve_ids(root, ctx, job)?;
        }

        let mut deferred: Vec<(Dependency, DependencyKey)> = Vec::new();
        for root in &ordered {
            self.install_tree(root, &root.key, archive, ctx, job, &mut report, &mut deferred)?;
        }

        for (node, root_key) in deferred {
            if job.is_cancelled() {
                return Ok(report);
            }
            self.install_checked(&node, &root_key, archive, ctx, &mut report)?;
        }
        Ok(report)
    }

    /// Declared type order first, then any remaining roots in key order.
    fn order_roots(&self, roots: &[Dependency]) -> Vec<Dependency> {
        let order = self.catalog.install_order();
        let mut ordered: Vec<Dependency> = Vec::with_capacity(roots.len());
        for object_type in &order {
            for root in roots {
                if root.object_type() == object_type {
                    ordered.push(root.clone());
                }
            }
        }
        let mut rest: Vec<Dependency> = roots
            .iter()
            .filter(|root| !order.contains(root.object_type()))
            .cloned()
            .collect();
        rest.sort_by(|a, b| a.key.cmp(&b.key));
        ordered.extend(rest);
        ordered
    }

    fn reserve_ids(&self, dep: &Dependency, ctx: &mut dyn ImportContext, job: &Job) -> Result<()> {
        if job.is_cancelled() {
            return Ok(());
        }
        if dep.included && dep.supports_id_mapping {
            let handler = self.catalog.handler_for(dep)?;
            let needs_reservation = ctx.current_id_map().is_some_and(|id_map| {
                let mut key = MappingKey::new(dep.id(), dep.object_type().clone());
                if let Some(parent_id) = &dep.key.parent_id {
                    key = key.with_parent(parent_id.clone());
                }
                id_map
                    .get(&key)
                    .map(|m| m.is_new_object && m.target_id.is_none())
                    .unwrap_or(false)
            });
            if needs_reservation {
                if let Some(id_map) = ctx.current_id_map() {
                    debug!(key = %dep.key, "reserving new target id");
                    handler.reserve_new_id(dep, id_map)?;
                }
            }
        }
        for child in dep.children() {
            self.reserve_ids(child, ctx, job)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn install_tree(
        &self,
        dep: &Dependency,
        root_key: &DependencyKey,
        archive: &dyn Archive,
        ctx: &mut dyn ImportContext,
        job: &Job,
        report: &mut InstallReport,
        deferred: &mut Vec<(Dependency, DependencyKey)>,
    ) -> Result<()> {
        if job.is_cancelled() {
            return Ok(());
        }
        for child in dep.children() {
            self.install_tree(child, root_key, archive, ctx, job, report, deferred)?;
        }
        if job.is_cancelled() {
            return Ok(());
        }

        let handler = self.catalog.handler_for(dep)?;
        if handler.should_defer_installation() {
            report.set(&dep.key, InstallState::Deferred);
            deferred.push((dep.clone(), root_key.clone()));
            return Ok(());
        }
        self.install_checked(dep, root_key, archive, ctx, report)
    }

    /// Idempotency gate around the actual per-node install.
    fn install_checked(
        &self,
        dep: &Dependency,
        root_key: &DependencyKey,
        archive: &dyn Archive,
        ctx: &mut dyn ImportContext,
        report: &mut InstallReport,
    ) -> Result<()> {
        if ctx.is_installed(dep, Some(root_key)) {
            // same root: a second path reached this node; nothing to do
            return Ok(());
        }
        if ctx.is_installed(dep, None) {
            warn!(key = %dep.key, "skipped — already installed");
            report.set(&dep.key, InstallState::SkippedAlreadyInstalled);
            return Ok(());
        }
        if !archive.has_files_for(dep) {
            debug!(key = %dep.key, "no files in archive, nothing to install");
            return Ok(());
        }
        self.install_node(dep, root_key, archive, ctx, report)
            .with_context(|| {
                format!(
                    "installing {} '{}' (id {})",
                    dep.object_type(),
                    dep.display_name,
                    dep.id()
                )
            })
    }

    fn install_node(
        &self,
        dep: &Dependency,
        root_key: &DependencyKey,
        archive: &dyn Archive,
        ctx: &mut dyn ImportContext,
        report: &mut InstallReport,
    ) -> Result<()> {
        let handler = self.catalog.handler_for(dep)?;
        report.set(&dep.key, InstallState::InProgress);

        handler.install_files(archive, dep, ctx)?;

        if dep.supports_id_types {
            let mappings = archive.stored_literal_mappings(dep)?.ok_or_else(|| {
                DeployError::MissingIdTypes {
                    object_type: dep.object_type().clone(),
                    id: dep.id().to_string(),
                }
            })?;
            if !mappings.is_empty() {
                let mut tree = handler.load_object_tree(dep, ctx)?;
                let mut rewriter = LiteralRewriter::new();
                for mapping in &mappings {
                    let target = resolve_literal_target(ctx, mapping)?;
                    rewriter.apply(&mut tree, mapping, &target)?;
                }
                handler.save_object_tree(dep, tree, ctx)?;
            }
        }

        ctx.mark_installed(dep, root_key);
        report.set(&dep.key, InstallState::Installed);
        info!(key = %dep.key, "installed");
        Ok(())
    }
}

fn seed_states(dep: &Dependency, report: &mut InstallReport) {
    report.seed(&dep.key);
    for child in dep.children() {
        seed_states(child, report);
    }
}

/// Destination text for one recorded literal, from the job's id map. The
/// literal's id type names the object type the number refers to; a parent
/// scope on the mapping routes the lookup through the parent-scoped key.
fn resolve_literal_target(
    ctx: &mut dyn ImportContext,
    mapping: &LiteralIdentifierMapping,
) -> Result<String> {
    let id_type: &ObjectType = mapping.id_type.as_ref().ok_or_else(|| {
        DeployError::Unexpected(format!(
            "literal '{}' at {} has no assigned id type",
            mapping.value, mapping.path
        ))
    })?;

    let mut key = MappingKey::new(mapping.value.clone(), id_type.clone());
    if let Some(parent_id) = &mapping.parent_id {
        key = key.with_parent(parent_id.clone());
    }

    let id_map = ctx.current_id_map().ok_or_else(|| {
        DeployError::MissingIdMapping {
            object_type: id_type.clone(),
            id: mapping.value.clone(),
            parent_id: mapping.parent_id.clone(),
        }
    })?;
    match id_map.get(&key).and_then(|m| m.target_id.clone()) {
        Some(target) => Ok(target),
        None => Err(DeployError::MissingIdMapping {
            object_type: id_type.clone(),
            id: mapping.value.clone(),
            parent_id: mapping.parent_id.clone(),
        }
        .into()),
    }
}
