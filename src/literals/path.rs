use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ObjectType;

/// One step of an addressable path into a configuration tree: a structural
/// category plus its discriminator (name, index, or a snapshot of the
/// literal's own value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "camelCase")]
pub enum ContextFrame {
    /// A named field entry under a `fields` array.
    Field { name: String },
    /// A rule entry under a `rules` array, addressed by position.
    Rule { index: usize },
    /// A named UI control parameter.
    ControlParam { name: String },
    /// A positional extension/function call parameter.
    ExtensionParam { index: usize },
    /// A named script binding; the leaf below it is a script literal.
    BindingParam { name: String },
    /// A decoded pair of a URL-encoded query string blob.
    UrlParam { name: String },
    /// A query pair inside a URL request's href.
    HrefParam { name: String },
    /// A choice list entry, addressed by position.
    Choice { index: usize },
    /// A simple numeric leaf; the discriminator is the value itself.
    Literal { value: String },
    /// One occurrence of a numeric literal inside a script expression,
    /// zero-indexed among literals of the same value in that expression.
    ScriptLiteral { value: String, occurrence: usize },
}

impl fmt::Display for ContextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextFrame::Field { name } => write!(f, "field:{name}"),
            ContextFrame::Rule { index } => write!(f, "rule:{index}"),
            ContextFrame::ControlParam { name } => write!(f, "controlParam:{name}"),
            ContextFrame::ExtensionParam { index } => write!(f, "extensionParam:{index}"),
            ContextFrame::BindingParam { name } => write!(f, "bindingParam:{name}"),
            ContextFrame::UrlParam { name } => write!(f, "urlParam:{name}"),
            ContextFrame::HrefParam { name } => write!(f, "hrefParam:{name}"),
            ContextFrame::Choice { index } => write!(f, "choice:{index}"),
            ContextFrame::Literal { value } => write!(f, "literal:{value}"),
            ContextFrame::ScriptLiteral { value, occurrence } => {
                write!(f, "scriptLiteral:{value}#{occurrence}")
            }
        }
    }
}

/// The frame chain from the tree root down to one literal. An explicit
/// value type replayed by index; never mutated during replay, so one path
/// can be replayed any number of times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextPath {
    frames: Vec<ContextFrame>,
}

impl ContextPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: Vec<ContextFrame>) -> Self {
        Self { frames }
    }

    pub fn push(&mut self, frame: ContextFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn frames(&self) -> &[ContextFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn leaf(&self) -> Option<&ContextFrame> {
        self.frames.last()
    }

    /// The path of the structure owning the leaf; for script literals this
    /// identifies the expression the occurrence lives in.
    pub fn owner(&self) -> &[ContextFrame] {
        match self.frames.len() {
            0 => &[],
            n => &self.frames[..n - 1],
        }
    }

    /// Child path with one more frame, leaving `self` untouched.
    pub fn extended(&self, frame: ContextFrame) -> ContextPath {
        let mut frames = self.frames.clone();
        frames.push(frame);
        ContextPath { frames }
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for frame in &self.frames {
            if !first {
                f.write_str("/")?;
            }
            write!(f, "{frame}")?;
            first = false;
        }
        Ok(())
    }
}

/// A literal discovered at export time and re-located at install time.
/// `id_type` names the object type the number refers to, assigned by the
/// caller between discovery and installation; `parent_id`/`parent_type`
/// are set when the replacement value must come from a parent-scoped
/// mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteralIdentifierMapping {
    pub path: ContextPath,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_type: Option<ObjectType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<ObjectType>,
}

impl LiteralIdentifierMapping {
    pub fn new(path: ContextPath, value: impl Into<String>) -> Self {
        Self {
            path,
            value: value.into(),
            id_type: None,
            parent_id: None,
            parent_type: None,
        }
    }

    pub fn with_id_type(mut self, id_type: impl Into<ObjectType>) -> Self {
        self.id_type = Some(id_type.into());
        self
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
