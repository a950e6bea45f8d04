use crate::model::ObjectType;

/// Fatal deployment errors. Anything else that bubbles out of a collaborator
/// travels as a plain `anyhow` chain and is treated as `Unexpected`.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// A source id needing translation has no mapping and is not marked new.
    #[error("no id mapping for {object_type} id {id}{}", scope_suffix(.parent_id.as_deref()))]
    MissingIdMapping {
        object_type: ObjectType,
        id: String,
        parent_id: Option<String>,
    },

    /// A node claims to support identifier types but the archive recorded none.
    #[error("dependency {object_type} id {id} supports id types but none were recorded")]
    MissingIdTypes { object_type: ObjectType, id: String },

    /// A replayed context path's discriminator does not match the live tree.
    /// Data-integrity bug, never retried.
    #[error("context path mismatch at frame {frame_index}: {detail}")]
    InvalidContextPath { frame_index: usize, detail: String },

    /// No handler is registered for an object type.
    #[error("no dependency definition for object type {0}")]
    DependencyDefinitionNotFound(ObjectType),

    /// Wraps underlying failures from collaborators.
    #[error("unexpected deployment failure: {0}")]
    Unexpected(String),
}

fn scope_suffix(parent_id: Option<&str>) -> String {
    match parent_id {
        Some(parent) => format!(" (parent {parent})"),
        None => String::new(),
    }
}
