//! Core engine for migrating configuration objects between independent
//! server installations: dependency closure and ordered installation, plus
//! discovery and rewriting of numeric identifiers embedded in configuration
//! trees. Per-object-type storage knowledge lives in external handlers; the
//! core only orchestrates.

pub mod catalog;
pub mod error;
pub mod graph;
pub mod idmap;
pub mod install;
pub mod job;
pub mod literals;
pub mod model;

pub use catalog::{
    Archive, HandlerCatalog, ImportContext, ObjectTypeHandler, TargetEntity, TreeContext,
};
pub use error::DeployError;
pub use graph::completion::complete_tree;
pub use graph::DependencyResolver;
pub use idmap::guesser::guess_targets;
pub use idmap::{IdMap, IdMapping, MappingKey};
pub use install::{InstallReport, InstallState, PackageInstaller};
pub use job::Job;
pub use literals::{
    apply_literal, discover_literals, ContextFrame, ContextPath, LiteralIdentifierMapping,
    LiteralRewriter,
};
pub use model::{Dependency, DependencyKey, DependencyKind, ObjectType, ValidationResults};
