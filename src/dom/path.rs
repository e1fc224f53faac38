//! Namespace prefix table and the small path language used by `find`.
//!
//! A path is a `/`-separated list of steps. Each step is `{prefix}local`,
//! a bare `local` (no namespace), or `*`, optionally followed by a single
//! predicate: `[@attr="value"]`, `[@{prefix}attr='value']` or `[not(@attr)]`.
//! A leading `.//` makes the first step match any descendant.

use super::{NodeId, QName, XmlTree};
use crate::error::{Result, XFormError};
use indexmap::IndexMap;

pub const NS_XHTML: &str = "http://www.w3.org/1999/xhtml";
pub const NS_XFORMS: &str = "http://www.w3.org/2002/xforms";
pub const NS_JAVAROSA: &str = "http://openrosa.org/javarosa";
pub const NS_XSD: &str = "http://www.w3.org/2001/XMLSchema";
pub const NS_EVENTS: &str = "http://www.w3.org/2001/xml-events";
pub const NS_OPENROSA: &str = "http://openrosa.org/jr/xforms";
pub const NS_REGISTRATION: &str = "http://openrosa.org/user/registration";
pub const NS_CASE_V2: &str = "http://commcarehq.org/case/transaction/v2";
pub const NS_COMMCARE: &str = "http://commcarehq.org/xforms";
pub const NS_VELLUM: &str = "http://commcarehq.org/xforms/vellum";
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// Prefix → namespace URI. An empty URI stands for "no namespace".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    map: IndexMap<String, String>,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::xform()
    }
}

impl Namespaces {
    pub fn empty() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    /// The fixed namespace set of CommCare XForms.
    pub fn xform() -> Self {
        let mut ns = Self::empty();
        for (prefix, uri) in [
            ("h", NS_XHTML),
            ("f", NS_XFORMS),
            ("jr", NS_JAVAROSA),
            ("xsd", NS_XSD),
            ("ev", NS_EVENTS),
            ("orx", NS_OPENROSA),
            ("reg", NS_REGISTRATION),
            ("cx2", NS_CASE_V2),
            ("cc", NS_COMMCARE),
            ("vellum", NS_VELLUM),
        ] {
            ns.insert(prefix, uri);
        }
        ns
    }

    pub fn insert(&mut self, prefix: &str, uri: &str) {
        self.map.insert(prefix.to_string(), uri.to_string());
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.map.get(prefix).map(String::as_str)
    }

    /// First registered prefix for `uri`.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.map
            .iter()
            .find(|(_, u)| u.as_str() == uri)
            .map(|(p, _)| p.as_str())
    }

    /// Expand `{prefix}local` or `local` into a [`QName`].
    pub fn qname(&self, name: &str) -> Result<QName> {
        match name.strip_prefix('{') {
            Some(rest) => {
                let (prefix, local) = rest
                    .split_once('}')
                    .ok_or_else(|| XFormError::Form(format!("malformed name '{}'", name)))?;
                let uri = self.uri(prefix).ok_or_else(|| {
                    XFormError::Form(format!("unknown namespace prefix '{}'", prefix))
                })?;
                Ok(QName::new(Some(uri), local))
            }
            None => Ok(QName::local(name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Name(QName),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Equals(QName, String),
    Absent(QName),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    name: NameTest,
    predicate: Option<Predicate>,
}

/// A compiled path query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    descendant: bool,
    steps: Vec<Step>,
}

impl Query {
    pub fn parse(path: &str, ns: &Namespaces) -> Result<Self> {
        let (descendant, rest) = match path.strip_prefix(".//") {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        let steps = split_steps(rest)
            .into_iter()
            .map(|s| parse_step(s, ns))
            .collect::<Result<Vec<_>>>()?;
        if steps.is_empty() {
            return Err(XFormError::Form(format!("empty path '{}'", path)));
        }
        Ok(Self { descendant, steps })
    }

    pub fn first(&self, tree: &XmlTree, from: NodeId) -> Option<NodeId> {
        self.all(tree, from).into_iter().next()
    }

    pub fn all(&self, tree: &XmlTree, from: NodeId) -> Vec<NodeId> {
        let mut current: Vec<NodeId> = vec![from];
        for (i, step) in self.steps.iter().enumerate() {
            let mut next = Vec::new();
            for node in &current {
                let candidates: Vec<NodeId> = if i == 0 && self.descendant {
                    tree.descendants(*node).into_iter().skip(1).collect()
                } else {
                    tree.child_elements(*node).collect()
                };
                next.extend(candidates.into_iter().filter(|c| step.matches(tree, *c)));
            }
            current = next;
        }
        current
    }
}

impl Step {
    fn matches(&self, tree: &XmlTree, node: NodeId) -> bool {
        let name_ok = match &self.name {
            NameTest::Any => tree.is_element(node),
            NameTest::Name(q) => tree.name(node) == Some(q),
        };
        name_ok
            && match &self.predicate {
                None => true,
                Some(Predicate::Equals(attr, value)) => {
                    tree.attribute_q(node, attr) == Some(value.as_str())
                }
                Some(Predicate::Absent(attr)) => tree.attribute_q(node, attr).is_none(),
            }
    }
}

/// Split on `/` outside of `{…}` and `[…]`.
fn split_steps(path: &str) -> Vec<&str> {
    let mut steps = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in path.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '[') | (None, '{') => depth += 1,
            (None, ']') | (None, '}') => depth = depth.saturating_sub(1),
            (None, '/') if depth == 0 => {
                steps.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    steps.push(&path[start..]);
    steps.into_iter().filter(|s| !s.is_empty()).collect()
}

fn parse_step(step: &str, ns: &Namespaces) -> Result<Step> {
    let (name_part, predicate) = match find_predicate_start(step) {
        Some(idx) => {
            let pred = step[idx..]
                .strip_prefix('[')
                .and_then(|p| p.strip_suffix(']'))
                .ok_or_else(|| XFormError::Form(format!("malformed predicate in '{}'", step)))?;
            (&step[..idx], Some(parse_predicate(pred, ns)?))
        }
        None => (step, None),
    };
    let name = if name_part == "*" {
        NameTest::Any
    } else {
        NameTest::Name(ns.qname(name_part)?)
    };
    Ok(Step { name, predicate })
}

fn find_predicate_start(step: &str) -> Option<usize> {
    let mut in_brace = false;
    for (i, ch) in step.char_indices() {
        match ch {
            '{' => in_brace = true,
            '}' => in_brace = false,
            '[' if !in_brace => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(pred: &str, ns: &Namespaces) -> Result<Predicate> {
    let pred = pred.trim();
    if let Some(inner) = pred.strip_prefix("not(@").and_then(|p| p.strip_suffix(')')) {
        return Ok(Predicate::Absent(ns.qname(inner.trim())?));
    }
    let body = pred
        .strip_prefix('@')
        .ok_or_else(|| XFormError::Form(format!("unsupported predicate '[{}]'", pred)))?;
    let (attr, value) = body
        .split_once('=')
        .ok_or_else(|| XFormError::Form(format!("unsupported predicate '[{}]'", pred)))?;
    let value = value.trim();
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .ok_or_else(|| XFormError::Form(format!("unquoted predicate value in '[{}]'", pred)))?;
    Ok(Predicate::Equals(
        ns.qname(attr.trim())?,
        unquoted.to_string(),
    ))
}
