//! Owned, mutable XML element tree.
//!
//! `roxmltree` gives a read-only view, but case synthesis edits the form in
//! place, so the parsed document is copied into an arena of nodes addressed by
//! [`NodeId`]. Detached nodes stay in the arena; only reachability from the
//! root matters for queries and rendering.
//!
//! - [`path`] – namespace prefix table and `find`/`find_all` path queries
//! - [`parse`] – entity guard and conversion from `roxmltree`

pub mod parse;
pub mod path;

pub use parse::parse_document;
pub use path::{Namespaces, Query};

use crate::error::{Result, XFormError};

/// Index of a node inside an [`XmlTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Namespace-qualified name. `ns == None` means no namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub ns: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(ns: Option<&str>, local: &str) -> Self {
        Self {
            ns: ns.filter(|n| !n.is_empty()).map(str::to_string),
            local: local.to_string(),
        }
    }

    pub fn local(local: &str) -> Self {
        Self::new(None, local)
    }

    pub fn matches(&self, ns: Option<&str>, local: &str) -> bool {
        self.local == local && self.ns.as_deref() == ns.filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// An `xmlns` / `xmlns:prefix` declaration written on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    pub prefix: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub name: QName,
    pub attrs: Vec<Attribute>,
    pub ns_decls: Vec<NsDecl>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl XmlTree {
    pub fn with_root(name: QName) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.create_element(name);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            NodeKind::Text(_) => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| self.is_element(*c))
    }

    /// Element ancestors from the parent upwards.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |p| self.parent(*p))
    }

    /// Pre-order element descendants, `id` included.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !self.is_element(n) {
                continue;
            }
            out.push(n);
            for c in self.children(n).iter().rev() {
                stack.push(*c);
            }
        }
        out
    }

    pub fn tag_name(&self, id: NodeId) -> &str {
        self.element(id).map(|e| e.name.local.as_str()).unwrap_or("")
    }

    pub fn tag_ns(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|e| e.name.ns.as_deref())
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.element(id).map(|e| &e.name)
    }

    pub fn attribute_q(&self, id: NodeId, name: &QName) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|a| &a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Attribute without namespace.
    pub fn attr(&self, id: NodeId, local: &str) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|a| a.name.matches(None, local))
            .map(|a| a.value.as_str())
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        self.element(id).map(|e| e.attrs.as_slice()).unwrap_or(&[])
    }

    pub fn set_attribute(&mut self, id: NodeId, name: QName, value: impl Into<String>) {
        let value = value.into();
        if let Some(el) = self.element_mut(id) {
            match el.attrs.iter_mut().find(|a| a.name == name) {
                Some(existing) => existing.value = value,
                None => el.attrs.push(Attribute { name, value }),
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &QName) -> Option<String> {
        let el = self.element_mut(id)?;
        let pos = el.attrs.iter().position(|a| &a.name == name)?;
        Some(el.attrs.remove(pos).value)
    }

    pub fn declare_namespace(&mut self, id: NodeId, prefix: Option<&str>, uri: &str) {
        if let Some(el) = self.element_mut(id) {
            let prefix = prefix.map(str::to_string);
            if !el.ns_decls.iter().any(|d| d.prefix == prefix) {
                el.ns_decls.push(NsDecl {
                    prefix,
                    uri: uri.to_string(),
                });
            }
        }
    }

    /// Leading text of an element (text before its first child element).
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.children(id).first().map(|c| self.kind(*c)) {
            Some(NodeKind::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(first) = self.children(id).first().copied() {
            if let NodeKind::Text(t) = &mut self.nodes[first.0].kind {
                *t = text.to_string();
                return;
            }
        }
        let node = self.push(NodeKind::Text(text.to_string()));
        self.insert_child(id, 0, node);
    }

    /// All descendant text, document order.
    pub fn itertext(&self, id: NodeId) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text<'a>(&'a self, id: NodeId, out: &mut Vec<&'a str>) {
        for c in self.children(id) {
            match self.kind(*c) {
                NodeKind::Text(t) => out.push(t.as_str()),
                NodeKind::Element(_) => self.collect_text(*c, out),
            }
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// New detached element.
    pub fn create_element(&mut self, name: QName) -> NodeId {
        self.push(NodeKind::Element(Element {
            name,
            attrs: Vec::new(),
            ns_decls: Vec::new(),
        }))
    }

    pub fn create_element_with(&mut self, name: QName, attrs: &[(&str, &str)]) -> NodeId {
        let id = self.create_element(name);
        for (k, v) in attrs {
            self.set_attribute(id, QName::local(k), *v);
        }
        id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
    }

    /// Insert `node` right after `sibling` in the sibling's parent.
    pub fn insert_after(&mut self, sibling: NodeId, node: NodeId) -> Result<()> {
        let parent = self
            .parent(sibling)
            .ok_or_else(|| XFormError::Form("cannot insert after a detached node".into()))?;
        self.detach(node);
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == sibling)
            .map(|p| p + 1)
            .unwrap_or(self.nodes[parent.0].children.len());
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(pos, node);
        Ok(())
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// First element matching `path` below `from`.
    pub fn find(&self, from: NodeId, path: &str, ns: &Namespaces) -> Result<Option<NodeId>> {
        let query = Query::parse(path, ns)?;
        Ok(query.first(self, from))
    }

    pub fn find_all(&self, from: NodeId, path: &str, ns: &Namespaces) -> Result<Vec<NodeId>> {
        let query = Query::parse(path, ns)?;
        Ok(query.all(self, from))
    }

    /// Text of the first element matching `path`.
    pub fn find_text(&self, from: NodeId, path: &str, ns: &Namespaces) -> Result<Option<&str>> {
        Ok(self.find(from, path, ns)?.and_then(|n| self.text(n)))
    }
}
