//! Path resolution helpers shared by the question walker and the case block
//! generator.

use crate::error::{CaseErrorKind, Result, XFormError};

/// Resolve a node reference to an absolute data path.
///
/// - empty path → `context` (which may itself be empty)
/// - `None` → `context` when there is one, otherwise an error: a case must
///   always have a resolvable name
/// - leading `/` → already absolute
/// - otherwise relative: `/<root>/<path>` without context, `<context>/<path>` with one
pub fn resolve_path(path: Option<&str>, context: &str, data_root: &str) -> Result<String> {
    match path {
        None if context.is_empty() => Err(XFormError::case(
            CaseErrorKind::MissingName,
            "Every case must have a name",
        )),
        None => Ok(context.to_string()),
        Some("") => Ok(context.to_string()),
        Some(p) if p.starts_with('/') => Ok(p.to_string()),
        Some(p) if context.is_empty() => Ok(format!("/{}/{}", data_root, p)),
        Some(p) => Ok(format!("{}/{}", context, p)),
    }
}

/// Relative XPath from the node at `from_path` to the node at `to_path`.
///
/// Common leading segments are dropped, then one `..` is emitted per
/// remaining segment of `from_path`.
pub fn relative_path(from_path: &str, to_path: &str) -> String {
    let from: Vec<&str> = from_path.split('/').collect();
    let to: Vec<&str> = to_path.split('/').collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let ups = vec![".."; from.len() - common].join("/");
    let rest = to[common..].join("/");
    format!("{}/{}", ups, rest)
}

/// True when `path` is `context` itself or lies below it. Matching is by
/// whole path segments, so `/data/rep_count` is not inside `/data/rep`.
pub fn is_in_context(path: &str, context: &str) -> bool {
    path == context
        || path
            .strip_prefix(context)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Split `parent/grandparent/prop` into (`parent/grandparent`, `prop`).
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

/// Strip a `jr:itext('id')` wrapper and surrounding quotes.
pub fn strip_itext_ref(reference: &str) -> &str {
    let mut id = reference.trim();
    if let Some(inner) = id
        .strip_prefix("jr:itext(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        id = inner.trim();
    }
    let bytes = id.as_bytes();
    if bytes.len() >= 2
        && bytes[0] == bytes[bytes.len() - 1]
        && (bytes[0] == b'"' || bytes[0] == b'\'')
    {
        id = &id[1..id.len() - 1];
    }
    id
}
