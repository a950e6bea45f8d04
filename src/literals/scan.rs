//! Depth-first discovery of numeric identifier literals in a heterogeneous
//! configuration tree. The scan understands a fixed structural vocabulary
//! (fields, rules, control parameters, extension calls, script bindings,
//! URL requests, choice lists); everything else in the tree is opaque
//! payload. Two scans of the same tree yield the same list in the same
//! order.

use serde_json::Value;

use super::path::{ContextFrame, ContextPath, LiteralIdentifierMapping};
use super::{script, url};

/// Scans a configuration tree and returns every literal candidate with the
/// context path that re-locates it later.
pub fn discover_literals(tree: &Value) -> Vec<LiteralIdentifierMapping> {
    let mut out = Vec::new();
    let mut path = ContextPath::new();
    walk(tree, &mut path, &mut out);
    out
}

/// Textual form of a leaf iff it parses as a non-negative integer.
pub(crate) fn numeric_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                Some(text.clone())
            } else {
                None
            }
        }
        Value::Number(num) => num.as_u64().map(|n| n.to_string()),
        _ => None,
    }
}

fn record_leaf(value: Option<&Value>, path: &ContextPath, out: &mut Vec<LiteralIdentifierMapping>) {
    let Some(text) = value.and_then(numeric_text) else {
        return;
    };
    let leaf_path = path.extended(ContextFrame::Literal { value: text.clone() });
    out.push(LiteralIdentifierMapping::new(leaf_path, text));
}

fn walk(value: &Value, path: &mut ContextPath, out: &mut Vec<LiteralIdentifierMapping>) {
    let Value::Object(obj) = value else {
        return;
    };

    if let Some(fields) = obj.get("fields").and_then(Value::as_array) {
        for item in fields {
            let Some(name) = item.get("name").and_then(Value::as_str) else {
                continue;
            };
            path.push(ContextFrame::Field { name: name.to_string() });
            record_leaf(item.get("value"), path, out);
            walk(item, path, out);
            path.pop();
        }
    }

    if let Some(rules) = obj.get("rules").and_then(Value::as_array) {
        for (index, rule) in rules.iter().enumerate() {
            path.push(ContextFrame::Rule { index });
            walk(rule, path, out);
            path.pop();
        }
    }

    if let Some(params) = obj.get("controlParams").and_then(Value::as_object) {
        for (name, param) in params {
            path.push(ContextFrame::ControlParam { name: name.clone() });
            record_leaf(Some(param), path, out);
            path.pop();
        }
    }

    if let Some(extension) = obj.get("extension").and_then(Value::as_object) {
        if let Some(params) = extension.get("params").and_then(Value::as_array) {
            for (index, param) in params.iter().enumerate() {
                path.push(ContextFrame::ExtensionParam { index });
                record_leaf(Some(param), path, out);
                path.pop();
            }
        }
    }

    if let Some(bindings) = obj.get("bindings").and_then(Value::as_array) {
        for binding in bindings {
            let Some(name) = binding.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Some(expression) = binding.get("expression").and_then(Value::as_str) else {
                continue;
            };
            path.push(ContextFrame::BindingParam { name: name.to_string() });
            for token in script::numeric_literals(expression) {
                let leaf = path.extended(ContextFrame::ScriptLiteral {
                    value: token.value.clone(),
                    occurrence: token.occurrence,
                });
                out.push(LiteralIdentifierMapping::new(leaf, token.value));
            }
            path.pop();
        }
    }

    if let Some(request) = obj.get("urlRequest").and_then(Value::as_object) {
        if let Some(query) = request.get("queryString").and_then(Value::as_str) {
            for param in url::split_query(query) {
                if numeric_text(&Value::String(param.value.clone())).is_some() {
                    let leaf_path = path
                        .extended(ContextFrame::UrlParam { name: param.name.clone() })
                        .extended(ContextFrame::Literal { value: param.value.clone() });
                    out.push(LiteralIdentifierMapping::new(leaf_path, param.value));
                }
            }
        }
        if let Some(href) = request.get("href").and_then(Value::as_str) {
            for param in url::href_query_params(href) {
                if numeric_text(&Value::String(param.value.clone())).is_some() {
                    let leaf_path = path
                        .extended(ContextFrame::HrefParam { name: param.name.clone() })
                        .extended(ContextFrame::Literal { value: param.value.clone() });
                    out.push(LiteralIdentifierMapping::new(leaf_path, param.value));
                }
            }
        }
    }

    if let Some(choices) = obj.get("choices").and_then(Value::as_array) {
        for (index, entry) in choices.iter().enumerate() {
            path.push(ContextFrame::Choice { index });
            record_leaf(entry.get("value"), path, out);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scan_is_deterministic() {
        let tree = json!({
            "fields": [
                { "name": "body", "value": "301", "rules": [
                    { "extension": { "name": "sys_casTemplate", "params": ["356", "text"] } }
                ]},
                { "name": "title", "value": "plain text" }
            ],
            "bindings": [
                { "name": "init", "expression": "$rx.db.getFoo(301,356,301)" }
            ]
        });
        let first = discover_literals(&tree);
        let second = discover_literals(&tree);
        assert_eq!(first, second);

        let values: Vec<_> = first.iter().map(|m| m.value.as_str()).collect();
        assert_eq!(values, vec!["301", "356", "301", "356", "301"]);
    }

    #[test]
    fn url_query_pairs_become_sub_paths() {
        let tree = json!({
            "urlRequest": {
                "href": "http://host/app?sys_contentid=17",
                "queryString": "sys_variantid=356&label=home"
            }
        });
        let found = discover_literals(&tree);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].value, "356");
        assert!(matches!(
            found[0].path.frames()[0],
            ContextFrame::UrlParam { ref name } if name == "sys_variantid"
        ));
        assert_eq!(found[1].value, "17");
        assert!(matches!(
            found[1].path.frames()[0],
            ContextFrame::HrefParam { ref name } if name == "sys_contentid"
        ));
    }

    #[test]
    fn integral_numbers_and_digit_strings_both_qualify() {
        let tree = json!({
            "controlParams": { "maxLength": 512, "target": "301", "ratio": 0.5 }
        });
        let found = discover_literals(&tree);
        let values: Vec<_> = found.iter().map(|m| m.value.as_str()).collect();
        assert_eq!(values, vec!["512", "301"]);
    }

    #[test]
    fn choices_record_entry_values() {
        let tree = json!({
            "choices": [
                { "label": "Home", "value": "301" },
                { "label": "News", "value": "about" }
            ]
        });
        let found = discover_literals(&tree);
        assert_eq!(found.len(), 1);
        assert!(matches!(found[0].path.frames()[0], ContextFrame::Choice { index: 0 }));
    }
}
