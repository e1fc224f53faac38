//! Flattened question list built from the control and data walks.

use super::XForm;
use super::walker::{ControlNode, enclosing_context};
use crate::dom::path::NS_VELLUM;
use crate::dom::{NodeId, QName};
use crate::error::{Result, XFormError};
use crate::model::{DataSource, Question, QuestionOption, QuestionOptions};
use indexmap::IndexSet;
use std::collections::HashSet;

/// Attributes of a `<case>` element reported as hidden questions.
const CASE_ATTRIBUTES: &[&str] = &["case_id", "user_id", "date_modified"];

impl XForm {
    /// Questions of the form: controls in tree order, then data nodes not
    /// bound to any control, then the attributes of case blocks found among
    /// those data nodes.
    pub fn get_questions(&self, langs: &[&str], opts: &QuestionOptions) -> Result<Vec<Question>> {
        let controls = self.get_control_nodes()?;
        let mut questions = Vec::new();
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut repeat_contexts: IndexSet<String> = IndexSet::new();
        let mut group_contexts: IndexSet<String> = IndexSet::new();

        for control in &controls {
            claimed.insert(control.path.as_str());
            let tag = self.tree.tag_name(control.node);
            match tag {
                "repeat" => {
                    repeat_contexts.insert(control.path.clone());
                    group_contexts.insert(control.path.clone());
                }
                "group" if !control.path.is_empty() => {
                    group_contexts.insert(control.path.clone());
                }
                _ => {}
            }
            if !control.is_leaf && !opts.include_groups {
                continue;
            }
            if tag == "trigger" && !opts.include_triggers {
                continue;
            }
            if opts.exclude_select_with_itemsets && self.itemset(control.node).is_some() {
                continue;
            }
            questions.push(self.control_question(control, langs, opts)?);
        }

        let mut repeats: Vec<String> = repeat_contexts.into_iter().collect();
        repeats.sort();
        repeats.reverse();
        let mut groups: Vec<String> = group_contexts.into_iter().collect();
        groups.sort();
        groups.reverse();

        let mut case_blocks: IndexSet<String> = IndexSet::new();
        for (path, _) in self.get_leaf_data_nodes()? {
            if claimed.contains(path.as_str()) {
                continue;
            }
            if let Some((prefix, _)) = path.split_once("/case/") {
                case_blocks.insert(format!("{}/case", prefix));
            }
            let repeat = enclosing_context(&path, &repeats);
            let group = enclosing_context(&path, &groups);
            questions.push(self.hidden_question(&path, repeat, group)?);
        }

        for case_path in case_blocks {
            let Some(case) = self.data_node_at(&case_path)? else {
                continue;
            };
            for attr in CASE_ATTRIBUTES {
                if self.tree.attr(case, attr).is_none() {
                    continue;
                }
                let path = format!("{}/@{}", case_path, attr);
                let repeat = enclosing_context(&path, &repeats);
                let group = enclosing_context(&path, &groups);
                questions.push(self.hidden_question(&path, repeat, group)?);
            }
        }
        Ok(questions)
    }

    fn itemset(&self, prompt: NodeId) -> Option<NodeId> {
        self.tree
            .child_elements(prompt)
            .find(|c| self.tree.name(*c) == Some(&XForm::xforms_qname("itemset")))
    }

    fn comment(&self, bind: Option<NodeId>, control: Option<NodeId>) -> Option<String> {
        let name = QName::new(Some(NS_VELLUM), "comment");
        bind.and_then(|b| self.tree.attribute_q(b, &name))
            .or_else(|| control.and_then(|c| self.tree.attribute_q(c, &name)))
            .map(str::to_string)
    }

    fn setvalue_of(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .get_setvalue(path)?
            .and_then(|s| self.tree.attr(s, "value"))
            .map(str::to_string))
    }

    fn control_question(&self, control: &ControlNode, langs: &[&str], opts: &QuestionOptions) -> Result<Question> {
        let node = control.node;
        let tag = self.tree.tag_name(node);
        let question_type = self
            .types()
            .infer(
                tag,
                control.data_type.as_deref(),
                self.tree.attr(node, "mediatype"),
                self.tree.attr(node, "appearance"),
            )
            .map(str::to_string);

        let options = match &control.items {
            Some(items) => Some(
                items
                    .iter()
                    .map(|item| self.option(*item, langs, opts))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        let translations = if opts.include_translations {
            Some(self.label_translations(node)?)
        } else {
            None
        };
        let data_source = if opts.include_fixtures {
            self.itemset(node).map(|i| self.data_source(i))
        } else {
            None
        };

        Ok(Question {
            label: self.get_label_text(node, langs)?,
            tag: tag.to_string(),
            value: control.path.clone(),
            repeat: control.repeat.clone(),
            group: control.group.clone(),
            question_type,
            relevant: control.relevant.clone(),
            required: control.required,
            constraint: control.constraint.clone(),
            comment: self.comment(control.bind_node, Some(node)),
            hashtag_value: self.hashtag_path(&control.path),
            calculate: None,
            setvalue: self.setvalue_of(&control.path)?,
            options,
            translations,
            data_source,
        })
    }

    fn option(&self, item: NodeId, langs: &[&str], opts: &QuestionOptions) -> Result<QuestionOption> {
        let label = self.get_label_text(item, langs)?;
        let value = self
            .find(item, "{f}value")?
            .map(|v| self.tree.itertext(v).concat().trim().to_string())
            .ok_or_else(|| XFormError::Form(format!("<item> ({:?}) has no <value>", label)))?;
        let translations = if opts.include_translations {
            Some(self.label_translations(item)?)
        } else {
            None
        };
        Ok(QuestionOption {
            label,
            value,
            translations,
        })
    }

    fn data_source(&self, itemset: NodeId) -> DataSource {
        let nodeset = self.tree.attr(itemset, "nodeset").unwrap_or("").to_string();
        let instance_id = nodeset
            .strip_prefix("instance(")
            .and_then(|rest| rest.split_once(')'))
            .map(|(id, _)| id.trim_matches(|c| c == '\'' || c == '"').to_string());
        let instance_ref = instance_id.as_deref().and_then(|id| {
            let model = self.model_node().ok()?;
            self.tree
                .child_elements(model)
                .find(|i| {
                    self.tree.name(*i) == Some(&XForm::xforms_qname("instance"))
                        && self.tree.attr(*i, "id") == Some(id)
                })
                .and_then(|i| self.tree.attr(i, "src"))
                .map(str::to_string)
        });
        let child_ref = |local: &str| {
            self.tree
                .child_elements(itemset)
                .find(|c| self.tree.name(*c) == Some(&XForm::xforms_qname(local)))
                .and_then(|c| self.tree.attr(c, "ref"))
                .map(str::to_string)
        };
        DataSource {
            instance_id,
            instance_ref,
            nodeset,
            label_ref: child_ref("label"),
            value_ref: child_ref("value"),
        }
    }

    fn hidden_question(&self, path: &str, repeat: Option<String>, group: Option<String>) -> Result<Question> {
        let bind = self.get_bind(path)?;
        let bind_attr = |name: &str| bind.and_then(|b| self.tree.attr(b, name)).map(str::to_string);
        Ok(Question {
            label: path.to_string(),
            tag: "hidden".to_string(),
            value: path.to_string(),
            repeat,
            group,
            question_type: Some("DataBindOnly".to_string()),
            relevant: bind_attr("relevant"),
            required: bind_attr("required").as_deref() == Some("true()"),
            constraint: bind_attr("constraint"),
            comment: self.comment(bind, None),
            hashtag_value: self.hashtag_path(path),
            calculate: bind_attr("calculate"),
            setvalue: self.setvalue_of(path)?,
            options: None,
            translations: None,
            data_source: None,
        })
    }
}
