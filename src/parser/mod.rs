//! XForm document wrapper and the question read path.
//!
//! [`XForm`] owns the parsed tree and the derived views that are memoized
//! until [`XForm::invalidate`] is called. Sub-modules split the read path
//! into focused areas:
//!
//! - [`source`] – File I/O abstraction (filesystem vs. ZIP archive)
//! - [`helpers`] – Path resolution
//! - [`types`] – Question type inference
//! - [`itext`] – Translations and itext normalization
//! - [`walker`] – Control tree and data tree walk
//! - [`questions`] – Flattened question list

pub mod helpers;
pub mod itext;
pub mod questions;
pub mod source;
pub mod types;
pub mod walker;

pub use helpers::{relative_path, resolve_path};
pub use itext::{ItextNode, ItextNodeGroup, ItextPart, ItextValue};
pub use source::*;
pub use types::{TypeIndex, TypeRule};
pub use walker::ControlNode;

use crate::dom::path::NS_XFORMS;
use crate::dom::{Namespaces, NodeId, QName, XmlTree, parse::parse_bytes, parse_document};
use crate::error::{Result, XFormError};
use crate::generator::render::render_document;
use indexmap::IndexMap;
use std::cell::OnceCell;
use std::collections::HashSet;
use std::sync::Arc;

/// Prefix of every case property read from the case loaded by the session.
pub const SESSION_CASE_PREFIX: &str =
    "instance('casedb')/casedb/case[@case_id=instance('commcaresession')/session/data/case_id]/";

/// External form validator (e.g. a remote form player). Receives the
/// rendered document and returns a human-readable reason on rejection.
pub trait FormValidator {
    fn validate(&self, xml: &[u8]) -> std::result::Result<(), String>;
}

/// A parsed XForm.
///
/// Translations and upload references are memoized. Any mutation that touches
/// `<itext>` or the control tree must be followed by [`XForm::invalidate`].
#[derive(Debug, Clone)]
pub struct XForm {
    pub(crate) tree: XmlTree,
    pub(crate) ns: Namespaces,
    types: Arc<TypeIndex>,
    itext_groups: OnceCell<IndexMap<String, ItextNodeGroup>>,
    upload_refs: OnceCell<HashSet<String>>,
}

impl XForm {
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with_types(text, TypeIndex::standard())
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_tree(parse_bytes(bytes)?, TypeIndex::standard()))
    }

    /// Parse with a caller-supplied type table.
    pub fn parse_with_types(text: &str, types: Arc<TypeIndex>) -> Result<Self> {
        Ok(Self::from_tree(parse_document(text)?, types))
    }

    fn from_tree(tree: XmlTree, types: Arc<TypeIndex>) -> Self {
        let mut form = Self {
            tree,
            ns: Namespaces::xform(),
            types,
            itext_groups: OnceCell::new(),
            upload_refs: OnceCell::new(),
        };
        form.register_data_namespace();
        form
    }

    /// Register the data root's namespace as prefix `x`. A form without a
    /// data root, or with an un-namespaced one, maps `x` to no namespace.
    fn register_data_namespace(&mut self) {
        let uri = self
            .data_node()
            .ok()
            .and_then(|n| self.tree.tag_ns(n))
            .unwrap_or("")
            .to_string();
        self.ns.insert("x", &uri);
    }

    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.ns
    }

    pub fn types(&self) -> &TypeIndex {
        &self.types
    }

    /// Drop memoized translations and upload references.
    pub fn invalidate(&mut self) {
        self.itext_groups = OnceCell::new();
        self.upload_refs = OnceCell::new();
    }

    /// Swap in a freshly parsed tree (after a textual rewrite).
    pub(crate) fn replace_tree(&mut self, tree: XmlTree) {
        self.tree = tree;
        self.ns = Namespaces::xform();
        self.register_data_namespace();
        self.invalidate();
    }

    pub fn find(&self, from: NodeId, path: &str) -> Result<Option<NodeId>> {
        self.tree.find(from, path, &self.ns)
    }

    pub fn find_all(&self, from: NodeId, path: &str) -> Result<Vec<NodeId>> {
        self.tree.find_all(from, path, &self.ns)
    }

    /// Element name in the data root's namespace.
    pub fn data_qname(&self, local: &str) -> QName {
        QName::new(self.ns.uri("x"), local)
    }

    pub fn xforms_qname(local: &str) -> QName {
        QName::new(Some(NS_XFORMS), local)
    }

    // ── accessors ──────────────────────────────────────────────────────────

    pub fn model_node(&self) -> Result<NodeId> {
        self.find(self.tree.root(), "{h}head/{f}model")?
            .ok_or(XFormError::MissingNode("<model>"))
    }

    /// The main (first) instance of the model.
    pub fn instance_node(&self) -> Result<NodeId> {
        self.find(self.model_node()?, "{f}instance")?
            .ok_or(XFormError::MissingNode("<instance>"))
    }

    pub fn data_node(&self) -> Result<NodeId> {
        self.tree
            .child_elements(self.instance_node()?)
            .next()
            .ok_or(XFormError::MissingNode("data root"))
    }

    pub fn itext_node(&self) -> Result<NodeId> {
        let model = self.model_node()?;
        match self.find(model, "{f}itext")? {
            Some(n) => Ok(n),
            None => self.find(model, "itext")?.ok_or(XFormError::MissingNode("<itext>")),
        }
    }

    pub fn case_node(&self) -> Result<NodeId> {
        let data = self.data_node()?;
        match self.find(data, "{cx2}case")? {
            Some(n) => Ok(n),
            None => self.find(data, "{x}case")?.ok_or(XFormError::MissingNode("<case>")),
        }
    }

    pub fn data_root_tag(&self) -> Result<&str> {
        Ok(self.tree.tag_name(self.data_node()?))
    }

    /// Element of the data tree at an absolute path such as `/data/group/q`.
    /// Steps match by local name.
    pub fn data_node_at(&self, path: &str) -> Result<Option<NodeId>> {
        let data = self.data_node()?;
        let mut segments = path.trim_start_matches('/').split('/');
        if segments.next() != Some(self.tree.tag_name(data)) {
            return Ok(None);
        }
        let mut current = data;
        for segment in segments.filter(|s| !s.is_empty()) {
            match self
                .tree
                .child_elements(current)
                .find(|c| self.tree.tag_name(*c) == segment)
            {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    pub fn resolve_path(&self, path: Option<&str>, context: &str) -> Result<String> {
        resolve_path(path, context, self.data_root_tag()?)
    }

    /// Resolve a path that is known to be present.
    pub fn resolve(&self, path: &str) -> Result<String> {
        self.resolve_path(Some(path), "")
    }

    pub fn get_bind(&self, path: &str) -> Result<Option<NodeId>> {
        let model = self.model_node()?;
        Ok(self
            .tree
            .child_elements(model)
            .find(|b| {
                self.tree.name(*b) == Some(&Self::xforms_qname("bind"))
                    && self.tree.attr(*b, "nodeset") == Some(path)
            }))
    }

    pub fn get_bind_by_id(&self, id: &str) -> Result<NodeId> {
        let model = self.model_node()?;
        self.tree
            .child_elements(model)
            .find(|b| {
                self.tree.name(*b) == Some(&Self::xforms_qname("bind"))
                    && self.tree.attr(*b, "id") == Some(id)
            })
            .ok_or_else(|| XFormError::BindNotFound(id.to_string()))
    }

    pub fn get_setvalue(&self, path: &str) -> Result<Option<NodeId>> {
        let model = self.model_node()?;
        Ok(self
            .tree
            .child_elements(model)
            .find(|s| {
                self.tree.name(*s) == Some(&Self::xforms_qname("setvalue"))
                    && self.tree.attr(*s, "ref") == Some(path)
            }))
    }

    /// `/data/q` → `#form/q`; the session case prefix → `#case/`.
    pub fn hashtag_path(&self, path: &str) -> String {
        if let Ok(root) = self.data_root_tag() {
            let form_prefix = format!("/{}/", root);
            if let Some(rest) = path.strip_prefix(&form_prefix) {
                return format!("#form/{}", rest);
            }
        }
        match path.strip_prefix(SESSION_CASE_PREFIX) {
            Some(rest) => format!("#case/{}", rest),
            None => path.to_string(),
        }
    }

    pub fn set_version(&mut self, version: u32) -> Result<()> {
        let data = self.data_node()?;
        self.tree
            .set_attribute(data, QName::local("version"), version.to_string());
        Ok(())
    }

    /// Absolute paths of every `<upload>` control, memoized.
    pub fn upload_refs(&self) -> Result<&HashSet<String>> {
        if self.upload_refs.get().is_none() {
            let refs = self
                .get_control_nodes()?
                .into_iter()
                .filter(|c| self.tree.tag_name(c.node) == "upload")
                .map(|c| c.path)
                .collect();
            let _ = self.upload_refs.set(refs);
        }
        self.upload_refs
            .get()
            .ok_or(XFormError::MissingNode("upload references"))
    }

    pub fn render(&self) -> Vec<u8> {
        self.render_string().into_bytes()
    }

    pub fn render_string(&self) -> String {
        render_document(&self.tree, &self.ns)
    }

    pub fn validate(&self, validator: &dyn FormValidator) -> Result<()> {
        validator
            .validate(&self.render())
            .map_err(XFormError::Validation)
    }
}
