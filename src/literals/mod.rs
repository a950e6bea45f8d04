//! Discovery and rewriting of numeric identifier literals embedded in
//! configuration trees. Discovery records a (context path, value) pair for
//! every candidate; the rewrite pass replays those paths against the
//! installed object's tree and substitutes destination identifiers.

pub mod path;
pub mod rewrite;
pub mod scan;
pub mod script;
pub mod url;

pub use path::{ContextFrame, ContextPath, LiteralIdentifierMapping};
pub use rewrite::{apply_literal, LiteralRewriter};
pub use scan::discover_literals;
