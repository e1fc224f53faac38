//! Serialize an [`XmlTree`] back to XForm XML text.
//!
//! Output uses two-space indentation. Elements holding text (mixed content,
//! `<value>`, `<case_type>`) are written inline so that whitespace inside
//! them is never altered. Prefixes are taken from the namespace declarations
//! in scope; a namespace with no declaration in scope is declared on the
//! element that first needs it, using the prefix from the known table.

use crate::dom::path::NS_XML;
use crate::dom::{Namespaces, NodeId, NodeKind, NsDecl, QName, XmlTree};

pub fn render_document(tree: &XmlTree, known: &Namespaces) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<?xml version='1.0' encoding='UTF-8'?>\n");
    let mut scope: Vec<NsDecl> = Vec::new();
    write_element(&mut out, tree, tree.root(), 0, &mut scope, known, false);
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

/// Escape text content.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape an attribute value. Like [`xml_escape`] but also encodes quotes,
/// newlines as `&#10;` and carriage returns as `&#13;`.
fn xml_escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(ch),
        }
    }
    out
}

fn bound_uri<'a>(scope: &'a [NsDecl], prefix: Option<&str>) -> Option<&'a str> {
    scope
        .iter()
        .rev()
        .find(|d| d.prefix.as_deref() == prefix)
        .map(|d| d.uri.as_str())
}

/// A non-default prefix currently bound to `uri`, if any.
fn prefix_in_scope<'a>(scope: &'a [NsDecl], uri: &str) -> Option<&'a str> {
    scope.iter().rev().find_map(|d| match &d.prefix {
        Some(p) if d.uri == uri && bound_uri(scope, Some(p)) == Some(uri) => Some(p.as_str()),
        _ => None,
    })
}

fn new_prefix(scope: &[NsDecl], known: &Namespaces, uri: &str) -> String {
    if let Some(p) = known.prefix_for(uri) {
        if bound_uri(scope, Some(p)).is_none() {
            return p.to_string();
        }
    }
    (0..)
        .map(|i| format!("ns{}", i))
        .find(|p| bound_uri(scope, Some(p)).is_none())
        .unwrap_or_else(|| "ns".to_string())
}

fn element_tag(name: &QName, scope: &mut Vec<NsDecl>, added: &mut Vec<NsDecl>, known: &Namespaces) -> String {
    match name.ns.as_deref() {
        None => {
            if bound_uri(scope, None).is_some_and(|u| !u.is_empty()) {
                let decl = NsDecl {
                    prefix: None,
                    uri: String::new(),
                };
                scope.push(decl.clone());
                added.push(decl);
            }
            name.local.clone()
        }
        Some(uri) => {
            if bound_uri(scope, None) == Some(uri) {
                return name.local.clone();
            }
            if let Some(p) = prefix_in_scope(scope, uri) {
                return format!("{}:{}", p, name.local);
            }
            let prefix = new_prefix(scope, known, uri);
            let decl = NsDecl {
                prefix: Some(prefix.clone()),
                uri: uri.to_string(),
            };
            scope.push(decl.clone());
            added.push(decl);
            format!("{}:{}", prefix, name.local)
        }
    }
}

fn attribute_name(name: &QName, scope: &mut Vec<NsDecl>, added: &mut Vec<NsDecl>, known: &Namespaces) -> String {
    match name.ns.as_deref() {
        None => name.local.clone(),
        Some(NS_XML) => format!("xml:{}", name.local),
        Some(uri) => {
            if let Some(p) = prefix_in_scope(scope, uri) {
                return format!("{}:{}", p, name.local);
            }
            let prefix = new_prefix(scope, known, uri);
            let decl = NsDecl {
                prefix: Some(prefix.clone()),
                uri: uri.to_string(),
            };
            scope.push(decl.clone());
            added.push(decl);
            format!("{}:{}", prefix, name.local)
        }
    }
}

fn write_decl(out: &mut String, decl: &NsDecl) {
    match &decl.prefix {
        Some(p) => out.push_str(&format!(" xmlns:{}=\"{}\"", p, xml_escape_attr(&decl.uri))),
        None => out.push_str(&format!(" xmlns=\"{}\"", xml_escape_attr(&decl.uri))),
    }
}

fn write_element(
    out: &mut String,
    tree: &XmlTree,
    id: NodeId,
    level: usize,
    scope: &mut Vec<NsDecl>,
    known: &Namespaces,
    inline: bool,
) {
    let Some(el) = tree.element(id) else {
        return;
    };
    let frame = scope.len();
    scope.extend(el.ns_decls.iter().cloned());

    let mut added = Vec::new();
    let tag = element_tag(&el.name, scope, &mut added, known);
    let attrs: Vec<(String, &str)> = el
        .attrs
        .iter()
        .map(|a| (attribute_name(&a.name, scope, &mut added, known), a.value.as_str()))
        .collect();

    if !inline {
        indent(out, level);
    }
    out.push('<');
    out.push_str(&tag);
    for decl in el.ns_decls.iter().chain(added.iter()) {
        write_decl(out, decl);
    }
    for (name, value) in &attrs {
        out.push_str(&format!(" {}=\"{}\"", name, xml_escape_attr(value)));
    }

    let children = tree.children(id);
    if children.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        let has_text = children
            .iter()
            .any(|c| matches!(tree.kind(*c), NodeKind::Text(_)));
        if inline || has_text {
            for c in children {
                match tree.kind(*c) {
                    NodeKind::Text(t) => out.push_str(&xml_escape(t)),
                    NodeKind::Element(_) => {
                        write_element(out, tree, *c, level + 1, scope, known, true)
                    }
                }
            }
        } else {
            out.push('\n');
            for c in children {
                write_element(out, tree, *c, level + 1, scope, known, false);
            }
            indent(out, level);
        }
        out.push_str(&format!("</{}>", tag));
    }
    if !inline {
        out.push('\n');
    }
    scope.truncate(frame);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;
    use crate::dom::path::{NS_CASE_V2, NS_JAVAROSA};

    #[test]
    fn test_default_namespace_roundtrip() {
        let xml = r#"<h:html xmlns:h="http://www.w3.org/1999/xhtml" xmlns="http://www.w3.org/2002/xforms"><h:head><model/></h:head></h:html>"#;
        let tree = parse_document(xml).unwrap();
        let out = render_document(&tree, &Namespaces::xform());
        assert!(out.starts_with("<?xml version='1.0' encoding='UTF-8'?>"));
        assert!(out.contains("<h:head>\n    <model/>\n  </h:head>"));
    }

    #[test]
    fn test_new_element_declares_its_namespace() {
        let mut tree = XmlTree::with_root(QName::local("data"));
        let root = tree.root();
        let case = tree.create_element(QName::new(Some(NS_CASE_V2), "case"));
        tree.declare_namespace(case, None, NS_CASE_V2);
        tree.append_child(root, case);
        tree.set_attribute(root, QName::new(Some(NS_JAVAROSA), "preload"), "uid");
        let out = render_document(&tree, &Namespaces::xform());
        assert!(out.contains(r#"<data xmlns:jr="http://openrosa.org/javarosa" jr:preload="uid">"#));
        assert!(out.contains(r#"<case xmlns="http://commcarehq.org/case/transaction/v2"/>"#));
    }

    #[test]
    fn test_mixed_content_is_inline() {
        let tree = parse_document(r#"<value>Hi <output value="/data/name"/>!</value>"#).unwrap();
        let out = render_document(&tree, &Namespaces::empty());
        assert!(out.contains(r#"<value>Hi <output value="/data/name"/>!</value>"#));
    }
}
