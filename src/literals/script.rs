//! Tokenizer for numeric identifier literals embedded in small script
//! expressions, e.g. `$rx.db.getFoo(301,356,301)`. Each occurrence of a
//! value is independently addressable by its zero-based position among
//! literals of the same value within one expression.

use std::collections::HashMap;

use anyhow::Result;

use crate::error::DeployError;

/// One standalone integer literal found in an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptToken {
    pub value: String,
    /// Zero-based index among tokens of the same value in this expression.
    pub occurrence: usize,
    /// Byte offset of the token start.
    pub start: usize,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// A digit run is a standalone literal when it is not glued to an
/// identifier and not one side of a decimal number.
fn is_standalone(bytes: &[u8], start: usize, end: usize) -> bool {
    if start > 0 {
        let prev = bytes[start - 1];
        if is_ident_byte(prev) {
            return false;
        }
        if prev == b'.' && start >= 2 && bytes[start - 2].is_ascii_digit() {
            return false;
        }
    }
    if end < bytes.len() {
        let next = bytes[end];
        if is_ident_byte(next) {
            return false;
        }
        if next == b'.' && end + 1 < bytes.len() && bytes[end + 1].is_ascii_digit() {
            return false;
        }
    }
    true
}

/// All standalone integer literals in `expression`, in textual order, with
/// per-value occurrence indices.
pub fn numeric_literals(expression: &str) -> Vec<ScriptToken> {
    let bytes = expression.as_bytes();
    let mut tokens = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if is_standalone(bytes, start, i) {
            let value = expression[start..i].to_string();
            let occurrence = counts.entry(value.clone()).or_insert(0);
            tokens.push(ScriptToken {
                value,
                occurrence: *occurrence,
                start,
            });
            *occurrence += 1;
        }
    }
    tokens
}

/// First standalone occurrence of `needle` as a whole numeric token at or
/// after byte `from`. Returns the start offset.
fn find_token(expression: &str, needle: &str, from: usize) -> Option<usize> {
    let bytes = expression.as_bytes();
    let mut cursor = from;
    while let Some(pos) = expression[cursor..].find(needle) {
        let start = cursor + pos;
        let end = start + needle.len();
        if is_standalone(bytes, start, end) {
            return Some(start);
        }
        cursor = start + 1;
    }
    None
}

/// Replaces occurrence `occurrence` of `value` in `expression` with
/// `replacement`.
///
/// `earlier_texts[i]` must be the *current* text of occurrence `i` of the
/// same original value — callers that already rewrote earlier occurrences
/// pass the rewritten texts, so the scan cursor advances past the right
/// tokens even after prior edits shifted positions.
pub fn replace_occurrence(
    expression: &str,
    value: &str,
    occurrence: usize,
    earlier_texts: &[String],
    replacement: &str,
    frame_index: usize,
) -> Result<String> {
    if earlier_texts.len() != occurrence {
        return Err(DeployError::InvalidContextPath {
            frame_index,
            detail: format!(
                "script occurrence {occurrence} of '{value}' needs {occurrence} earlier texts, got {}",
                earlier_texts.len()
            ),
        }
        .into());
    }

    let mut cursor = 0;
    for (i, text) in earlier_texts.iter().enumerate() {
        let start = find_token(expression, text, cursor).ok_or_else(|| {
            DeployError::InvalidContextPath {
                frame_index,
                detail: format!(
                    "occurrence {i} of '{value}' (current text '{text}') not found in expression"
                ),
            }
        })?;
        cursor = start + text.len();
    }

    let start = find_token(expression, value, cursor).ok_or_else(|| {
        DeployError::InvalidContextPath {
            frame_index,
            detail: format!("occurrence {occurrence} of '{value}' not found in expression"),
        }
    })?;

    let mut rewritten = String::with_capacity(expression.len() + replacement.len());
    rewritten.push_str(&expression[..start]);
    rewritten.push_str(replacement);
    rewritten.push_str(&expression[start + value.len()..]);
    Ok(rewritten)
}
