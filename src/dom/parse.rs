//! Parse XML text into an [`XmlTree`].

use super::{NodeId, NsDecl, QName, XmlTree};
use crate::error::{Result, XFormError};
use roxmltree::{Document, Node, ParsingOptions};

/// Parse XML text. Entity references to DTD-declared entities are rejected
/// before the document is handed to the XML parser.
pub fn parse_document(text: &str) -> Result<XmlTree> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    reject_entity_references(text)?;
    let mut opts = ParsingOptions::default();
    opts.allow_dtd = true;
    let doc = Document::parse_with_options(text, opts)
        .map_err(|e| XFormError::Parse(e.to_string()))?;
    let root = doc.root_element();
    let mut tree = XmlTree::with_root(element_name(root));
    let root_id = tree.root();
    copy_element(&mut tree, root_id, root, None);
    Ok(tree)
}

pub fn parse_bytes(bytes: &[u8]) -> Result<XmlTree> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| XFormError::Parse(format!("invalid UTF-8: {}", e)))?;
    parse_document(text)
}

fn element_name(node: Node) -> QName {
    QName::new(node.tag_name().namespace(), node.tag_name().name())
}

fn copy_element(tree: &mut XmlTree, id: NodeId, node: Node, parent: Option<Node>) {
    for ns in node.namespaces() {
        if ns.name() == Some("xml") {
            continue;
        }
        let inherited = parent.is_some_and(|p| {
            p.namespaces()
                .any(|pn| pn.name() == ns.name() && pn.uri() == ns.uri())
        });
        if !inherited {
            let decl = NsDecl {
                prefix: ns.name().map(str::to_string),
                uri: ns.uri().to_string(),
            };
            if let Some(el) = tree.element_mut(id) {
                el.ns_decls.push(decl);
            }
        }
    }
    for attr in node.attributes() {
        tree.set_attribute(id, QName::new(attr.namespace(), attr.name()), attr.value());
    }

    let mixed = node
        .children()
        .any(|c| c.is_text() && c.text().is_some_and(|t| !t.trim().is_empty()));
    for child in node.children() {
        if child.is_element() {
            let child_id = tree.create_element(element_name(child));
            tree.append_child(id, child_id);
            copy_element(tree, child_id, child, Some(node));
        } else if child.is_text() {
            let text = child.text().unwrap_or("");
            if mixed || !text.trim().is_empty() {
                let text_id = tree.create_text(text);
                tree.append_child(id, text_id);
            }
        }
    }
}

/// Fail if the document references any entity declared in its DTD.
/// Unreferenced declarations are accepted.
fn reject_entity_references(text: &str) -> Result<()> {
    let Some(start) = text.find("<!DOCTYPE") else {
        return Ok(());
    };
    let (subset, end) = doctype_bounds(text, start);
    let names = declared_entities(subset);
    let body = &text[end..];
    for name in &names {
        let general = format!("&{};", name);
        let parameter = format!("%{};", name);
        if body.contains(&general) || subset.contains(&general) || subset.contains(&parameter) {
            return Err(XFormError::DangerousContent(format!(
                "reference to entity '{}'",
                name
            )));
        }
    }
    Ok(())
}

/// Internal subset text and the byte offset just past the DOCTYPE.
fn doctype_bounds(text: &str, start: usize) -> (&str, usize) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut subset_start: Option<usize> = None;
    let mut subset_end: Option<usize> = None;
    for (i, ch) in text[start..].char_indices() {
        let pos = start + i;
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '[') => {
                if depth == 0 {
                    subset_start = Some(pos + 1);
                }
                depth += 1;
            }
            (None, ']') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    subset_end = Some(pos);
                }
            }
            (None, '>') if depth == 0 => {
                let subset = match (subset_start, subset_end) {
                    (Some(s), Some(e)) if e >= s => &text[s..e],
                    _ => "",
                };
                return (subset, pos + 1);
            }
            _ => {}
        }
    }
    ("", text.len())
}

fn declared_entities(subset: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = subset;
    while let Some(idx) = rest.find("<!ENTITY") {
        rest = &rest[idx + "<!ENTITY".len()..];
        let mut decl = rest.trim_start();
        if let Some(after) = decl.strip_prefix('%') {
            decl = after.trim_start();
        }
        let name: String = decl
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '>')
            .collect();
        if !name.is_empty() {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_general_and_parameter_entities() {
        let subset = r#"<!ENTITY lol "lol"> <!ENTITY % ext SYSTEM "file:///etc/passwd">"#;
        assert_eq!(declared_entities(subset), vec!["lol", "ext"]);
    }

    #[test]
    fn mixed_content_whitespace_survives() {
        let tree = parse_document(r#"<value>Hi <output ref="/data/name"/> there</value>"#).unwrap();
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 3);
        assert_eq!(tree.itertext(root), vec!["Hi ", " there"]);
    }

    #[test]
    fn indentation_whitespace_is_dropped() {
        let tree = parse_document("<a>\n  <b/>\n  <c/>\n</a>").unwrap();
        assert_eq!(tree.children(tree.root()).len(), 2);
    }
}
