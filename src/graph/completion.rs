//! Tree completion: expands a package tree until every node that must
//! travel has at least one level of children loaded, prunes branches that
//! carry nothing included or required, and flags everything it adds as an
//! auto dependency.

use std::collections::HashSet;

use anyhow::Result;
use tracing::debug;

use crate::catalog::TreeContext;
use crate::job::Job;
use crate::model::{Dependency, DependencyKey, DependencyKind, ObjectType};

use super::DependencyResolver;

/// Completes the tree rooted at `root` in place. Suppressed candidates
/// never enter the tree; pruned children are retracted from `tree_ctx`.
/// A cancelled job unwinds without error, leaving the tree partially
/// completed.
pub fn complete_tree(
    resolver: &mut DependencyResolver,
    root: &mut Dependency,
    tree_ctx: &mut dyn TreeContext,
    job: &Job,
) -> Result<()> {
    let parent_types: HashSet<ObjectType> = resolver.catalog().parent_types().into_iter().collect();
    let mut visited: HashSet<(DependencyKey, bool)> = HashSet::new();
    complete_node(
        resolver,
        &parent_types,
        tree_ctx,
        job,
        root,
        Branch {
            first_deployable_pending: true,
            parent_descended: false,
            in_nested_package: false,
        },
        &mut visited,
    )
}

#[derive(Clone, Copy)]
struct Branch {
    /// True until the first deployable element on this branch is entered.
    first_deployable_pending: bool,
    /// The node was reached by descending from an expanded element.
    parent_descended: bool,
    /// Some ancestor below the branch root is itself a deployable element.
    in_nested_package: bool,
}

fn complete_node(
    resolver: &mut DependencyResolver,
    parent_types: &HashSet<ObjectType>,
    tree_ctx: &mut dyn TreeContext,
    job: &Job,
    node: &mut Dependency,
    branch: Branch,
    visited: &mut HashSet<(DependencyKey, bool)>,
) -> Result<()> {
    if job.is_cancelled() {
        return Ok(());
    }
    if !visited.insert((node.key.clone(), branch.in_nested_package)) {
        return Ok(());
    }

    if !node.is_expanded() && should_expand(node, parent_types, branch) {
        let loaded = resolver.resolve_children(node)?;
        let mut children = Vec::with_capacity(loaded.len());
        for mut child in loaded {
            if tree_ctx.suppresses(&child) {
                debug!(key = %child.key, "child suppressed");
                continue;
            }
            child.is_auto_dependency = true;
            children.push(child);
        }
        node.set_children(children);
    }

    if node.is_expanded() {
        let handler = resolver.catalog().handler_for(node)?;
        let removed = node.retain_children(|child| {
            child.included
                || handler.is_required_child(child.object_type())
                || child.contains_included()
        });
        for child in removed {
            debug!(key = %child.key, "child pruned");
            tree_ctx.retract(&child);
        }
    }

    let child_branch = Branch {
        first_deployable_pending: branch.first_deployable_pending && !node.is_deployable_element,
        parent_descended: true,
        in_nested_package: branch.in_nested_package
            || (node.is_deployable_element && !branch.first_deployable_pending),
    };

    // children_mut on an unexpanded node is empty; nothing to descend into
    let mut index = 0;
    loop {
        let len = node.children().len();
        if index >= len {
            break;
        }
        let child = &mut node.children_mut()[index];
        complete_node(resolver, parent_types, tree_ctx, job, child, child_branch, visited)?;
        index += 1;
    }
    Ok(())
}

fn should_expand(node: &Dependency, parent_types: &HashSet<ObjectType>, branch: Branch) -> bool {
    node.included
        || parent_types.contains(node.object_type())
        || (branch.first_deployable_pending && node.is_deployable_element)
        || (node.kind == DependencyKind::Local && branch.parent_descended)
}
