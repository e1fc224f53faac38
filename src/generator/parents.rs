//! Updates to related cases (`parent/age`, `parent/grandparent/status`).
//!
//! Related-case properties are grouped by their relation path and written as
//! one case block per relation under a `<parents>` element:
//!
//! ```text
//! <parents>
//!   <parent>
//!     <case …/>
//!     <grandparent><case …/></grandparent>
//!   </parent>
//! </parents>
//! ```
//!
//! The nesting is kept in a flat arena of relation nodes with parent
//! indices.

use super::case_block::{CaseBlock, UpdateOptions};
use super::xpath::CaseIDXPath;
use crate::dom::NodeId;
use crate::error::Result;
use crate::model::PropertyMap;
use crate::parser::XForm;
use crate::parser::helpers::split_path;
use indexmap::IndexMap;

/// Split a property map into the case's own properties and related-case
/// properties keyed by relation path.
pub fn split_updates(updates: &PropertyMap) -> (PropertyMap, IndexMap<String, PropertyMap>) {
    let mut own = PropertyMap::new();
    let mut related: IndexMap<String, PropertyMap> = IndexMap::new();
    for (key, question) in updates {
        match split_path(key) {
            ("", property) => {
                own.insert(property.to_string(), question.clone());
            }
            (relation, property) => {
                related
                    .entry(relation.to_string())
                    .or_default()
                    .insert(property.to_string(), question.clone());
            }
        }
    }
    (own, related)
}

#[derive(Debug, Clone)]
struct RelationNode {
    segment: String,
    parent: Option<usize>,
    element: NodeId,
}

#[derive(Debug)]
struct RelationTree {
    base: NodeId,
    nodes: Vec<RelationNode>,
}

impl RelationTree {
    fn new(base: NodeId) -> Self {
        Self {
            base,
            nodes: Vec::new(),
        }
    }

    /// Element for `relation_path`, creating missing segments.
    fn element_for(&mut self, form: &mut XForm, relation_path: &str) -> NodeId {
        let mut parent: Option<usize> = None;
        for segment in relation_path.split('/') {
            let existing = self
                .nodes
                .iter()
                .position(|n| n.parent == parent && n.segment == segment);
            let idx = match existing {
                Some(i) => i,
                None => {
                    let container = parent.map(|p| self.nodes[p].element).unwrap_or(self.base);
                    let name = form.data_qname(segment);
                    let element = form.tree.create_element(name);
                    form.tree.append_child(container, element);
                    self.nodes.push(RelationNode {
                        segment: segment.to_string(),
                        parent,
                        element,
                    });
                    self.nodes.len() - 1
                }
            };
            parent = Some(idx);
        }
        parent.map(|p| self.nodes[p].element).unwrap_or(self.base)
    }
}

/// Emit case blocks for related-case updates next to the owning case.
///
/// `container` is the element holding the owning `<case>`, `owner_path` its
/// bind path prefix, `owner_id` the XPath of the owning case's id.
pub fn add_related_updates(
    form: &mut XForm,
    container: NodeId,
    owner_path: &str,
    owner_id: &CaseIDXPath,
    related: &IndexMap<String, PropertyMap>,
    edit_guard: bool,
) -> Result<()> {
    if related.is_empty() {
        return Ok(());
    }
    form.add_casedb()?;
    let name = form.data_qname("parents");
    let base = form.tree.create_element(name);
    form.tree.append_child(container, base);
    let mut tree = RelationTree::new(base);

    let mut relations: Vec<&String> = related.keys().collect();
    relations.sort();
    for relation in relations {
        let element = tree.element_for(form, relation);
        let path = format!("{}parents/{}/", owner_path, relation);
        let mut block = CaseBlock::new(form, &path)?;
        form.tree.append_child(element, block.elem());

        let case_id = owner_id.related(relation);
        block.bind_case_id(form, case_id.as_str())?;
        let case = case_id.case();
        let opts = UpdateOptions {
            make_relative: false,
            edit_guard: edit_guard.then_some(&case),
        };
        if let Some(updates) = related.get(relation) {
            block.add_case_updates(form, updates, &opts)?;
        }
        log::debug!("related case updates under {}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_split_by_relation() {
        let updates: PropertyMap = [
            ("age", "/data/age"),
            ("parent/name", "/data/mother"),
            ("parent/grandparent/status", "/data/gp"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let (own, related) = split_updates(&updates);
        assert_eq!(own.keys().collect::<Vec<_>>(), vec!["age"]);
        assert_eq!(
            related.keys().collect::<Vec<_>>(),
            vec!["parent", "parent/grandparent"]
        );
        assert_eq!(related["parent"]["name"], "/data/mother");
    }
}
