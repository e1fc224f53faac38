//! One `<case>` block and the binds that fill it.
//!
//! A [`CaseBlock`] owns the `<case>` element it creates; the caller decides
//! where the element goes in the data tree. Every bind is addressed through
//! the block's path prefix (`""` for the root case, `subcase_0/`,
//! `/data/repeat/case_child/`, …).

use super::xpath::CaseXPath;
use crate::dom::path::NS_CASE_V2;
use crate::dom::{NodeId, QName};
use crate::error::{CaseErrorKind, Result, XFormError};
use crate::model::PropertyMap;
use crate::parser::{XForm, relative_path};
use std::collections::BTreeMap;

pub const VALID_RELATIONSHIPS: &[&str] = &["child", "extension", "question"];

/// Who owns a newly created case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerPolicy {
    /// `owner_id` is the `-` sentinel (extension cases owned by their host).
    Unowned,
    /// First group of the submitting user, from the `groups` fixture.
    CaseSharing,
    /// The submitting user.
    User,
}

impl OwnerPolicy {
    pub fn select(autoset_owner_id: bool, case_sharing: bool) -> Self {
        match (autoset_owner_id, case_sharing) {
            (false, _) => OwnerPolicy::Unowned,
            (true, true) => OwnerPolicy::CaseSharing,
            (true, false) => OwnerPolicy::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateBlock<'a> {
    pub relevance: &'a str,
    pub case_name: Option<&'a str>,
    pub case_type: &'a str,
    pub owner: OwnerPolicy,
    /// Generate the id with a bind instead of an `xforms-ready` setvalue
    /// (cases inside a repeat).
    pub delay_case_id: bool,
    /// Bind calculations relative to the bound node.
    pub make_relative: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions<'a> {
    pub make_relative: bool,
    /// Only write a property when it differs from this case's current value.
    pub edit_guard: Option<&'a CaseXPath>,
}

#[derive(Debug, Clone)]
pub struct IndexRef<'a> {
    pub reference_id: &'a str,
    pub case_type: &'a str,
    /// XPath of the indexed case's id.
    pub case_id: &'a str,
    pub relationship: &'a str,
    /// XPath answering the relationship when `relationship == "question"`.
    pub relationship_question: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct CaseBlock {
    elem: NodeId,
    path: String,
    has_create: bool,
    has_close: bool,
    update: Option<NodeId>,
    index: Option<NodeId>,
    attachment: Option<NodeId>,
}

fn case_qname(local: &str) -> QName {
    QName::new(Some(NS_CASE_V2), local)
}

impl CaseBlock {
    /// Create a detached `<case>` element and bind its `date_modified` and
    /// `user_id` attributes to the meta block.
    pub fn new(form: &mut XForm, path: &str) -> Result<Self> {
        let elem = form.tree.create_element(case_qname("case"));
        form.tree.declare_namespace(elem, None, NS_CASE_V2);
        for attr in ["case_id", "date_modified", "user_id"] {
            form.tree.set_attribute(elem, QName::local(attr), "");
        }
        let block = Self {
            elem,
            path: path.to_string(),
            has_create: false,
            has_close: false,
            update: None,
            index: None,
            attachment: None,
        };
        let time_end = form.resolve("meta/timeEnd")?;
        let user_id = form.resolve("meta/userID")?;
        form.add_bind(
            &block.node_path("/@date_modified"),
            &[("type", "xsd:dateTime"), ("calculate", time_end.as_str())],
        )?;
        form.add_bind(&block.node_path("/@user_id"), &[("calculate", user_id.as_str())])?;
        Ok(block)
    }

    pub fn elem(&self) -> NodeId {
        self.elem
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `<path>case<suffix>`, e.g. `subcase_0/case/@case_id`.
    pub fn node_path(&self, suffix: &str) -> String {
        format!("{}case{}", self.path, suffix)
    }

    fn child(&self, form: &mut XForm, local: &str) -> NodeId {
        let node = form.tree.create_element(case_qname(local));
        form.tree.append_child(self.elem, node);
        node
    }

    fn calculation(&self, form: &XForm, nodeset: &str, source: &str, make_relative: bool) -> Result<(String, String)> {
        let nodeset = form.resolve(nodeset)?;
        let source = form.resolve(source)?;
        if make_relative {
            let relative = relative_path(&nodeset, &source);
            Ok((nodeset, relative))
        } else {
            Ok((nodeset, source))
        }
    }

    pub fn bind_case_id(&self, form: &mut XForm, case_id: &str) -> Result<()> {
        form.add_bind(&self.node_path("/@case_id"), &[("calculate", case_id)])
    }

    fn set_generated(&self, form: &mut XForm, reference: &str, value: &str, delay: bool) -> Result<()> {
        if delay {
            form.add_bind(reference, &[("calculate", value)])
        } else {
            form.add_setvalue_on_ready(reference, value)
        }
    }

    pub fn add_create_block(&mut self, form: &mut XForm, create: &CreateBlock<'_>) -> Result<()> {
        let case_name = match create.case_name {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(XFormError::case(
                    CaseErrorKind::MissingName,
                    "Every case must have a name",
                ));
            }
        };
        if create.case_type.is_empty() {
            return Err(XFormError::case(
                CaseErrorKind::NoCaseType,
                "Cannot create a case without a case type",
            ));
        }
        if self.has_create {
            return Err(XFormError::case(
                CaseErrorKind::DuplicateBlock,
                format!("{} already has a <create> block", self.node_path("")),
            ));
        }
        self.has_create = true;

        let create_node = self.child(form, "create");
        let mut owner_node = None;
        for local in ["case_name", "owner_id", "case_type"] {
            let node = form.tree.create_element(case_qname(local));
            form.tree.append_child(create_node, node);
            match local {
                "owner_id" => owner_node = Some(node),
                "case_type" => form.tree.set_text(node, create.case_type),
                _ => {}
            }
        }

        form.add_bind(&self.node_path(""), &[("relevant", create.relevance)])?;
        self.set_generated(form, &self.node_path("/@case_id"), "uuid()", create.delay_case_id)?;

        let (nodeset, name) = self.calculation(
            form,
            &self.node_path("/create/case_name"),
            case_name,
            create.make_relative,
        )?;
        form.add_bind(&nodeset, &[("calculate", name.as_str()), ("required", "true()")])?;

        let owner_path = self.node_path("/create/owner_id");
        match create.owner {
            OwnerPolicy::Unowned => {
                if let Some(node) = owner_node {
                    form.tree.set_text(node, "-");
                }
            }
            OwnerPolicy::CaseSharing => {
                form.add_instance("groups", "jr://fixture/user-groups")?;
                self.set_generated(
                    form,
                    &owner_path,
                    "instance('groups')/groups/group/@id",
                    create.delay_case_id,
                )?;
            }
            OwnerPolicy::User => {
                let user_id = form.resolve("meta/userID")?;
                form.add_bind(&owner_path, &[("calculate", user_id.as_str())])?;
            }
        }
        log::debug!("create block for '{}' at {}", create.case_type, nodeset);
        Ok(())
    }

    /// Add `<update>` (and `<attachment>`) entries. Calls accumulate into the
    /// same blocks; entries of one call are written in sorted key order.
    pub fn add_case_updates(&mut self, form: &mut XForm, updates: &PropertyMap, opts: &UpdateOptions<'_>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let uploads = form.upload_refs()?;
        let mut plain: BTreeMap<String, String> = BTreeMap::new();
        let mut attachments: BTreeMap<String, String> = BTreeMap::new();
        for (key, question) in updates {
            let key = if key == "name" { "case_name" } else { key.as_str() };
            let resolved = form.resolve(question)?;
            if uploads.contains(&resolved) {
                attachments.insert(key.to_string(), question.clone());
            } else {
                plain.insert(key.to_string(), question.clone());
            }
        }

        if !plain.is_empty() {
            if opts.edit_guard.is_some() {
                form.add_casedb()?;
            }
            let update = match self.update {
                Some(u) => u,
                None => {
                    let u = self.child(form, "update");
                    self.update = Some(u);
                    u
                }
            };
            for (key, question) in &plain {
                let present = form
                    .tree
                    .child_elements(update)
                    .any(|c| form.tree.tag_name(c) == key.as_str());
                if !present {
                    let node = form.tree.create_element(case_qname(key));
                    form.tree.append_child(update, node);
                }
                let (nodeset, source) = self.calculation(
                    form,
                    &self.node_path(&format!("/update/{}", key)),
                    question,
                    opts.make_relative,
                )?;
                let mut relevant = format!("count({}) > 0", source);
                if let Some(case) = opts.edit_guard {
                    relevant = format!("{} and {} != {}", relevant, source, case.property(key));
                }
                form.add_bind(&nodeset, &[("calculate", source.as_str()), ("relevant", relevant.as_str())])?;
            }
        }
        if !attachments.is_empty() {
            self.add_attachments(form, &attachments, opts.make_relative)?;
        }
        Ok(())
    }

    fn add_attachments(&mut self, form: &mut XForm, attachments: &BTreeMap<String, String>, make_relative: bool) -> Result<()> {
        let block = match self.attachment {
            Some(a) => a,
            None => {
                let a = self.child(form, "attachment");
                self.attachment = Some(a);
                a
            }
        };
        for (key, question) in attachments {
            let present = form
                .tree
                .child_elements(block)
                .any(|c| form.tree.tag_name(c) == key.as_str());
            if !present {
                let node = form.tree.create_element(case_qname(key));
                form.tree.set_attribute(node, QName::local("src"), "");
                form.tree.set_attribute(node, QName::local("from"), "local");
                form.tree.append_child(block, node);
            }
            let node_path = self.node_path(&format!("/attachment/{}", key));
            let (nodeset, source) = self.calculation(form, &node_path, question, make_relative)?;
            let relevant = format!("count({}) = 1", source);
            form.add_bind(&nodeset, &[("relevant", relevant.as_str())])?;
            // The @src bind is evaluated from the attribute, one step below the element.
            let (src_nodeset, src) =
                self.calculation(form, &format!("{}/@src", node_path), question, make_relative)?;
            form.add_bind(&src_nodeset, &[("calculate", src.as_str())])?;
        }
        Ok(())
    }

    pub fn add_close_block(&mut self, form: &mut XForm, relevance: &str) -> Result<()> {
        if self.has_close {
            return Err(XFormError::case(
                CaseErrorKind::DuplicateBlock,
                format!("{} already has a <close> block", self.node_path("")),
            ));
        }
        self.has_close = true;
        self.child(form, "close");
        form.add_bind(&self.node_path("/close"), &[("relevant", relevance)])
    }

    pub fn add_index_ref(&mut self, form: &mut XForm, index: &IndexRef<'_>) -> Result<()> {
        if !VALID_RELATIONSHIPS.contains(&index.relationship) {
            return Err(XFormError::case(
                CaseErrorKind::InvalidRelationship,
                format!(
                    "Valid values for an index relationship are \"child\", \"extension\" and \"question\", not \"{}\"",
                    index.relationship
                ),
            ));
        }
        let question_xpath = match (index.relationship, index.relationship_question) {
            ("question", Some(q)) if !q.is_empty() => Some(q),
            ("question", _) => {
                return Err(XFormError::case(
                    CaseErrorKind::InvalidRelationship,
                    format!("Index '{}' needs a relationship question", index.reference_id),
                ));
            }
            _ => None,
        };
        let index_node = match self.index {
            Some(i) => i,
            None => {
                let i = self.child(form, "index");
                self.index = Some(i);
                i
            }
        };
        let node = form.tree.create_element(case_qname(index.reference_id));
        form.tree.set_attribute(node, QName::local("case_type"), index.case_type);
        match index.relationship {
            "child" => {}
            "question" => form.tree.set_attribute(node, QName::local("relationship"), ""),
            other => form.tree.set_attribute(node, QName::local("relationship"), other),
        }
        form.tree.append_child(index_node, node);

        let nodeset = self.node_path(&format!("/index/{}", index.reference_id));
        form.add_bind(&nodeset, &[("calculate", index.case_id)])?;
        if let Some(q) = question_xpath {
            form.add_bind(&format!("{}/@relationship", nodeset), &[("calculate", q)])?;
        }
        Ok(())
    }
}
