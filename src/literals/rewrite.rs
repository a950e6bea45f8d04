//! Replays stored context paths against a live configuration tree and
//! rewrites the addressed literals. Replay validates every frame's
//! discriminator against the live node; any mismatch is a data-integrity
//! bug surfaced as `InvalidContextPath`, never retried.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use serde_json::Value;

use crate::error::DeployError;

use super::path::{ContextFrame, LiteralIdentifierMapping};
use super::scan::numeric_text;
use super::{script, url};

/// Per-job rewrite state. Script expressions may hold several occurrences
/// of the same value; the rewriter remembers what each applied occurrence
/// was rewritten to, so later applications can re-derive the current text
/// of earlier occurrences before scanning for their own.
#[derive(Default)]
pub struct LiteralRewriter {
    applied: HashMap<(Vec<ContextFrame>, String), BTreeMap<usize, String>>,
}

impl LiteralRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-locates the literal addressed by `mapping` in `tree` and
    /// overwrites it with `new_value`.
    pub fn apply(
        &mut self,
        tree: &mut Value,
        mapping: &LiteralIdentifierMapping,
        new_value: &str,
    ) -> Result<()> {
        let frames = mapping.path.frames();
        if frames.len() < 2 {
            return Err(path_err(0, "context path must hold at least two frames"));
        }
        let leaf_index = frames.len() - 1;
        let leaf = &frames[leaf_index];
        let penultimate = &frames[leaf_index - 1];

        let mut current = tree;
        for (index, frame) in frames[..leaf_index - 1].iter().enumerate() {
            current = descend(current, frame, index)?;
        }

        match (penultimate, leaf) {
            (ContextFrame::Field { name }, ContextFrame::Literal { value }) => {
                let item = field_item(current, name, leaf_index - 1)?;
                let slot = item.get_mut("value").ok_or_else(|| {
                    path_err(leaf_index - 1, format!("field '{name}' has no value"))
                })?;
                rewrite_scalar(slot, value, new_value, leaf_index)
            }
            (ContextFrame::ControlParam { name }, ContextFrame::Literal { value }) => {
                let slot = current
                    .get_mut("controlParams")
                    .and_then(|params| params.get_mut(name))
                    .ok_or_else(|| {
                        path_err(leaf_index - 1, format!("control parameter '{name}' not found"))
                    })?;
                rewrite_scalar(slot, value, new_value, leaf_index)
            }
            (ContextFrame::ExtensionParam { index }, ContextFrame::Literal { value }) => {
                let slot = current
                    .get_mut("extension")
                    .and_then(|ext| ext.get_mut("params"))
                    .and_then(|params| params.get_mut(*index))
                    .ok_or_else(|| {
                        path_err(leaf_index - 1, format!("extension parameter {index} not found"))
                    })?;
                rewrite_scalar(slot, value, new_value, leaf_index)
            }
            (ContextFrame::Choice { index }, ContextFrame::Literal { value }) => {
                let slot = current
                    .get_mut("choices")
                    .and_then(|choices| choices.get_mut(*index))
                    .and_then(|entry| entry.get_mut("value"))
                    .ok_or_else(|| {
                        path_err(leaf_index - 1, format!("choice entry {index} not found"))
                    })?;
                rewrite_scalar(slot, value, new_value, leaf_index)
            }
            (ContextFrame::UrlParam { name }, ContextFrame::Literal { value }) => {
                let slot = current
                    .get_mut("urlRequest")
                    .and_then(|req| req.get_mut("queryString"))
                    .ok_or_else(|| path_err(leaf_index - 1, "urlRequest.queryString not found"))?;
                let blob = slot
                    .as_str()
                    .ok_or_else(|| path_err(leaf_index - 1, "queryString is not a string"))?;
                let rewritten =
                    url::replace_query_param(blob, name, value, new_value, leaf_index)?;
                *slot = Value::String(rewritten);
                Ok(())
            }
            (ContextFrame::HrefParam { name }, ContextFrame::Literal { value }) => {
                let slot = current
                    .get_mut("urlRequest")
                    .and_then(|req| req.get_mut("href"))
                    .ok_or_else(|| path_err(leaf_index - 1, "urlRequest.href not found"))?;
                let href = slot
                    .as_str()
                    .ok_or_else(|| path_err(leaf_index - 1, "href is not a string"))?;
                let rewritten = url::replace_href_param(href, name, value, new_value, leaf_index)?;
                *slot = Value::String(rewritten);
                Ok(())
            }
            (
                ContextFrame::BindingParam { name },
                ContextFrame::ScriptLiteral { value, occurrence },
            ) => {
                let slot = binding_expression(current, name, leaf_index - 1)?;
                let expression = slot
                    .as_str()
                    .ok_or_else(|| path_err(leaf_index - 1, "binding expression is not a string"))?;
                let history_key = (mapping.path.owner().to_vec(), value.clone());
                let earlier: Vec<String> = {
                    let history = self.applied.get(&history_key);
                    (0..*occurrence)
                        .map(|i| {
                            history
                                .and_then(|h| h.get(&i).cloned())
                                .unwrap_or_else(|| value.clone())
                        })
                        .collect()
                };
                let rewritten = script::replace_occurrence(
                    expression, value, *occurrence, &earlier, new_value, leaf_index,
                )?;
                *slot = Value::String(rewritten);
                self.applied
                    .entry(history_key)
                    .or_default()
                    .insert(*occurrence, new_value.to_string());
                Ok(())
            }
            (penult, leaf) => Err(path_err(
                leaf_index,
                format!("frames {penult} and {leaf} do not pair"),
            )),
        }
    }
}

/// One-shot convenience for a single mapping outside any job. Script
/// occurrences above zero need a job-scoped [`LiteralRewriter`].
pub fn apply_literal(
    tree: &mut Value,
    mapping: &LiteralIdentifierMapping,
    new_value: &str,
) -> Result<()> {
    LiteralRewriter::new().apply(tree, mapping, new_value)
}

fn path_err(frame_index: usize, detail: impl Into<String>) -> anyhow::Error {
    DeployError::InvalidContextPath {
        frame_index,
        detail: detail.into(),
    }
    .into()
}

fn field_item<'a>(current: &'a mut Value, name: &str, index: usize) -> Result<&'a mut Value> {
    current
        .get_mut("fields")
        .and_then(Value::as_array_mut)
        .and_then(|fields| {
            fields
                .iter_mut()
                .find(|item| item.get("name").and_then(Value::as_str) == Some(name))
        })
        .ok_or_else(|| path_err(index, format!("field '{name}' not found")))
}

fn binding_expression<'a>(
    current: &'a mut Value,
    name: &str,
    index: usize,
) -> Result<&'a mut Value> {
    current
        .get_mut("bindings")
        .and_then(Value::as_array_mut)
        .and_then(|bindings| {
            bindings
                .iter_mut()
                .find(|item| item.get("name").and_then(Value::as_str) == Some(name))
        })
        .and_then(|binding| binding.get_mut("expression"))
        .ok_or_else(|| path_err(index, format!("binding '{name}' not found")))
}

fn descend<'a>(current: &'a mut Value, frame: &ContextFrame, index: usize) -> Result<&'a mut Value> {
    match frame {
        ContextFrame::Field { name } => field_item(current, name, index),
        ContextFrame::Rule { index: rule_index } => current
            .get_mut("rules")
            .and_then(|rules| rules.get_mut(*rule_index))
            .ok_or_else(|| path_err(index, format!("rule {rule_index} not found"))),
        other => Err(path_err(index, format!("{other} is not a container frame"))),
    }
}

/// Overwrites a scalar slot after validating its current text against the
/// frame snapshot. A numeric slot stays numeric when the new value parses.
fn rewrite_scalar(slot: &mut Value, expected: &str, new_value: &str, index: usize) -> Result<()> {
    let current = numeric_text(slot)
        .ok_or_else(|| path_err(index, "leaf is no longer a numeric literal"))?;
    if current != expected {
        return Err(path_err(
            index,
            format!("leaf holds '{current}', expected '{expected}'"),
        ));
    }
    let replacement = match new_value.parse::<u64>() {
        Ok(number) if slot.is_number() => Value::Number(number.into()),
        _ => Value::String(new_value.to_string()),
    };
    *slot = replacement;
    Ok(())
}
