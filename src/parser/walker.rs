//! Walk the control tree (`<h:body>`) and the data tree (`<instance>`).

use super::XForm;
use super::helpers::is_in_context;
use crate::dom::NodeId;
use crate::dom::path::NS_XFORMS;
use crate::error::{Result, XFormError};
use indexmap::IndexMap;

/// Body elements in the xforms namespace that never describe a control.
const NON_CONTROL_TAGS: &[&str] = &["label", "hint", "help", "setvalue"];

/// One control of the body, annotated with its resolved data path and the
/// repeat/group it sits in. Created fresh by every walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlNode {
    pub node: NodeId,
    pub bind_node: Option<NodeId>,
    pub path: String,
    pub repeat: Option<String>,
    pub group: Option<String>,
    /// `<item>` children of a select.
    pub items: Option<Vec<NodeId>>,
    pub is_leaf: bool,
    /// `type` of the bind, e.g. `xsd:int`.
    pub data_type: Option<String>,
    pub relevant: Option<String>,
    pub required: bool,
    pub constraint: Option<String>,
}

#[derive(Clone, Copy)]
struct Context<'a> {
    path: &'a str,
    repeat: Option<&'a str>,
    group: Option<&'a str>,
}

impl XForm {
    /// Data path referenced by a control: `ref`, else the nodeset of the bind
    /// named by `bind`; groups default to their context, repeats use `nodeset`.
    fn control_path(&self, prompt: NodeId) -> Result<Option<String>> {
        if let Some(r) = self.tree.attr(prompt, "ref") {
            return Ok(Some(r.to_string()));
        }
        if let Some(bind_id) = self.tree.attr(prompt, "bind") {
            let bind = self.get_bind_by_id(bind_id)?;
            return Ok(self.tree.attr(bind, "nodeset").map(str::to_string));
        }
        match self.tree.tag_name(prompt) {
            "group" => Ok(Some(String::new())),
            "repeat" => Ok(self.tree.attr(prompt, "nodeset").map(str::to_string)),
            tag => Err(XFormError::Form(format!(
                "Node <{}> has no 'ref' or 'bind'",
                tag
            ))),
        }
    }

    /// Depth-first, pre-order list of the form's controls.
    pub fn get_control_nodes(&self) -> Result<Vec<ControlNode>> {
        let Some(body) = self.find(self.tree.root(), "{h}body")? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let root = Context {
            path: "",
            repeat: None,
            group: None,
        };
        self.walk_controls(body, root, &mut out)?;
        Ok(out)
    }

    fn walk_controls(&self, parent: NodeId, ctx: Context<'_>, out: &mut Vec<ControlNode>) -> Result<()> {
        let prompts: Vec<NodeId> = self.tree.child_elements(parent).collect();
        for prompt in prompts {
            if self.tree.tag_ns(prompt) != Some(NS_XFORMS) {
                continue;
            }
            let tag = self.tree.tag_name(prompt);
            if NON_CONTROL_TAGS.contains(&tag) {
                continue;
            }
            let raw = self.control_path(prompt)?;
            let path = self.resolve_path(raw.as_deref(), ctx.path)?;
            match tag {
                "group" => {
                    let holds_repeat = self
                        .tree
                        .child_elements(prompt)
                        .any(|c| self.tree.tag_ns(c) == Some(NS_XFORMS) && self.tree.tag_name(c) == "repeat");
                    if holds_repeat {
                        let inner = Context { path: &path, ..ctx };
                        self.walk_controls(prompt, inner, out)?;
                    } else {
                        out.push(self.control_node(prompt, &path, ctx, false)?);
                        // a group without ref only labels its children
                        let group = if path.is_empty() { ctx.group } else { Some(path.as_str()) };
                        let inner = Context {
                            path: &path,
                            group,
                            ..ctx
                        };
                        self.walk_controls(prompt, inner, out)?;
                    }
                }
                "repeat" => {
                    out.push(self.control_node(prompt, &path, ctx, false)?);
                    let inner = Context {
                        path: &path,
                        repeat: Some(&path),
                        group: Some(&path),
                    };
                    self.walk_controls(prompt, inner, out)?;
                }
                _ => out.push(self.control_node(prompt, &path, ctx, true)?),
            }
        }
        Ok(())
    }

    fn control_node(&self, prompt: NodeId, path: &str, ctx: Context<'_>, is_leaf: bool) -> Result<ControlNode> {
        let bind_node = self.get_bind(path)?;
        let bind_attr = |name: &str| bind_node.and_then(|b| self.tree.attr(b, name)).map(str::to_string);
        let items = match self.tree.tag_name(prompt) {
            "select" | "select1" if is_leaf => Some(
                self.tree
                    .child_elements(prompt)
                    .filter(|c| self.tree.name(*c) == Some(&XForm::xforms_qname("item")))
                    .collect(),
            ),
            _ => None,
        };
        let within = |c: Option<&str>| c.filter(|c| is_in_context(path, c)).map(str::to_string);
        Ok(ControlNode {
            node: prompt,
            bind_node,
            path: path.to_string(),
            repeat: within(ctx.repeat),
            group: within(ctx.group),
            items,
            is_leaf,
            data_type: bind_attr("type"),
            relevant: bind_attr("relevant"),
            required: bind_attr("required").as_deref() == Some("true()"),
            constraint: bind_attr("constraint"),
        })
    }

    /// Leaf elements of the data tree keyed by absolute path, document order.
    pub fn get_leaf_data_nodes(&self) -> Result<IndexMap<String, NodeId>> {
        let data = self.data_node()?;
        let mut out = IndexMap::new();
        let root_path = format!("/{}", self.tree.tag_name(data));
        self.walk_data(data, &root_path, &mut out);
        Ok(out)
    }

    fn walk_data(&self, parent: NodeId, path: &str, out: &mut IndexMap<String, NodeId>) {
        for child in self.tree.child_elements(parent) {
            let child_path = format!("{}/{}", path, self.tree.tag_name(child));
            if self.tree.child_elements(child).next().is_none() {
                out.insert(child_path, child);
            } else {
                self.walk_data(child, &child_path, out);
            }
        }
    }
}

/// Most specific context containing `path`, scanning contexts in reverse
/// sorted order.
pub fn enclosing_context(path: &str, sorted_desc: &[String]) -> Option<String> {
    sorted_desc
        .iter()
        .find(|c| is_in_context(path, c))
        .cloned()
}
