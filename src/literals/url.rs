//! URL-encoded parameter blob handling. A query string like
//! `sys_contentid=301&sys_variantid=356` decomposes into independently
//! addressable name/value pairs; rewriting touches only the target pair and
//! leaves every other raw segment byte-identical.

use anyhow::Result;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::error::DeployError;

const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// One decoded pair of a query blob, with the raw segments preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    pub name: String,
    pub value: String,
}

fn decode(raw: &str) -> String {
    let unplussed = raw.replace('+', " ");
    percent_decode_str(&unplussed)
        .decode_utf8()
        .map(|cow| cow.into_owned())
        .unwrap_or(unplussed)
}

/// Splits a query blob into decoded name/value pairs in textual order.
/// Segments without `=` decode to an empty value.
pub fn split_query(blob: &str) -> Vec<QueryParam> {
    blob.split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((name, value)) => QueryParam {
                name: decode(name),
                value: decode(value),
            },
            None => QueryParam {
                name: decode(segment),
                value: String::new(),
            },
        })
        .collect()
}

/// Rewrites the value of the first pair matching `name` AND
/// `expected_value`; all other segments keep their original text. Duplicate
/// names are legal — pairs whose value does not match the snapshot are
/// passed over.
pub fn replace_query_param(
    blob: &str,
    name: &str,
    expected_value: &str,
    new_value: &str,
    frame_index: usize,
) -> Result<String> {
    let mut replaced = false;
    let mut name_seen = false;
    let segments: Vec<String> = blob
        .split('&')
        .map(|segment| {
            if replaced {
                return segment.to_string();
            }
            let (raw_name, raw_value) = match segment.split_once('=') {
                Some((raw_name, raw_value)) => (raw_name, raw_value),
                None => (segment, ""),
            };
            if decode(raw_name) != name {
                return segment.to_string();
            }
            name_seen = true;
            if decode(raw_value) != expected_value {
                return segment.to_string();
            }
            replaced = true;
            format!("{}={}", raw_name, utf8_percent_encode(new_value, QUERY_SET))
        })
        .collect();
    if !replaced {
        let detail = if name_seen {
            format!("no pair named '{name}' holds '{expected_value}'")
        } else {
            format!("query parameter '{name}' not found")
        };
        return Err(DeployError::InvalidContextPath {
            frame_index,
            detail,
        }
        .into());
    }
    Ok(segments.join("&"))
}

/// Decoded query pairs of an absolute URL, empty when the href does not
/// parse or carries no query.
pub fn href_query_params(href: &str) -> Vec<QueryParam> {
    match Url::parse(href) {
        Ok(url) => url
            .query_pairs()
            .map(|(name, value)| QueryParam {
                name: name.into_owned(),
                value: value.into_owned(),
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Rewrites one query pair inside an absolute URL. The URL is parsed only
/// to validate it; the replacement is spliced into the raw query substring,
/// so every untouched byte of the href survives verbatim.
pub fn replace_href_param(
    href: &str,
    name: &str,
    expected_value: &str,
    new_value: &str,
    frame_index: usize,
) -> Result<String> {
    Url::parse(href).map_err(|err| DeployError::InvalidContextPath {
        frame_index,
        detail: format!("href does not parse as a URL: {err}"),
    })?;

    let query_start = match href.find('?') {
        Some(index) => index + 1,
        None => {
            return Err(DeployError::InvalidContextPath {
                frame_index,
                detail: format!("href carries no query, expected parameter '{name}'"),
            }
            .into())
        }
    };
    let query_end = href[query_start..]
        .find('#')
        .map(|offset| query_start + offset)
        .unwrap_or(href.len());

    let rewritten = replace_query_param(
        &href[query_start..query_end],
        name,
        expected_value,
        new_value,
        frame_index,
    )?;
    Ok(format!(
        "{}{}{}",
        &href[..query_start],
        rewritten,
        &href[query_end..]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_decodes_pairs_in_order() {
        let params = split_query("sys_contentid=301&title=a%20b&flag");
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], QueryParam { name: "sys_contentid".into(), value: "301".into() });
        assert_eq!(params[1].value, "a b");
        assert_eq!(params[2].value, "");
    }

    #[test]
    fn replace_touches_only_the_target_pair() {
        let out = replace_query_param(
            "a=1&sys_contentid=301&b=x%20y",
            "sys_contentid",
            "301",
            "9001",
            0,
        )
        .unwrap();
        assert_eq!(out, "a=1&sys_contentid=9001&b=x%20y");
    }

    #[test]
    fn duplicate_names_select_by_value_snapshot() {
        let out =
            replace_query_param("sys_id=301&sys_id=356", "sys_id", "356", "9002", 1).unwrap();
        assert_eq!(out, "sys_id=301&sys_id=9002");
        let out = replace_query_param(&out, "sys_id", "301", "9001", 1).unwrap();
        assert_eq!(out, "sys_id=9001&sys_id=9002");
    }

    #[test]
    fn replace_rejects_missing_param() {
        let err = replace_query_param("a=1", "missing", "301", "9001", 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::InvalidContextPath { frame_index: 2, .. })
        ));
    }

    #[test]
    fn replace_rejects_value_mismatch() {
        let err = replace_query_param("a=1", "a", "2", "9", 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::InvalidContextPath { frame_index: 1, .. })
        ));
    }

    #[test]
    fn href_pairs_round_trip() {
        let href = "http://host/app?sys_revision=5&sys_contentid=301";
        let params = href_query_params(href);
        assert_eq!(params[1].value, "301");
        let out = replace_href_param(href, "sys_contentid", "301", "9001", 0).unwrap();
        assert_eq!(out, "http://host/app?sys_revision=5&sys_contentid=9001");
    }

    #[test]
    fn href_rewrite_keeps_unrelated_segments_verbatim() {
        let href = "http://host/app?label=a%20b&sys_contentid=301#frag";
        let out = replace_href_param(href, "sys_contentid", "301", "9001", 0).unwrap();
        assert_eq!(out, "http://host/app?label=a%20b&sys_contentid=9001#frag");
    }
}
