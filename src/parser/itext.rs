//! Itext translations: lookup, language edits and deduplication.

use super::XForm;
use super::helpers::strip_itext_ref;
use crate::dom::{NodeId, NodeKind, QName, XmlTree, parse_document};
use crate::error::{Result, XFormError};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Placeholder rendered for an `<output>` reference with no context value.
pub const OUTPUT_PLACEHOLDER: &str = "____";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItextPart {
    Text(String),
    /// `<output ref=…>` or `<output value=…>`.
    Output(String),
}

/// Mixed-content translation value. Text is stored raw and only escaped when
/// rendered back to markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItextValue {
    pub parts: Vec<ItextPart>,
}

impl ItextValue {
    pub fn from_node(tree: &XmlTree, node: NodeId) -> Self {
        let mut value = Self::default();
        value.collect(tree, node);
        value
    }

    fn collect(&mut self, tree: &XmlTree, node: NodeId) {
        for child in tree.children(node) {
            match tree.kind(*child) {
                NodeKind::Text(t) => self.parts.push(ItextPart::Text(t.clone())),
                NodeKind::Element(_) if tree.tag_name(*child) == "output" => {
                    let reference = tree
                        .attr(*child, "ref")
                        .or_else(|| tree.attr(*child, "value"))
                        .unwrap_or("");
                    self.parts.push(ItextPart::Output(reference.to_string()));
                }
                NodeKind::Element(_) => self.collect(tree, *child),
            }
        }
    }

    /// Plain text, substituting output references from `context` or the
    /// placeholder.
    pub fn render(&self, context: Option<&HashMap<String, String>>) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                ItextPart::Text(t) => t.as_str(),
                ItextPart::Output(r) => context
                    .and_then(|c| c.get(r))
                    .map(String::as_str)
                    .unwrap_or(OUTPUT_PLACEHOLDER),
            })
            .collect()
    }

    /// Markup form with escaped text and `<output value="…"/>` elements.
    pub fn render_markup(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                ItextPart::Text(t) => html_escape::encode_text(t).into_owned(),
                ItextPart::Output(r) => format!(
                    "<output value=\"{}\"/>",
                    html_escape::encode_double_quoted_attribute(r)
                ),
            })
            .collect()
    }
}

/// One `<text id=…>` in one translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItextNode {
    pub lang: String,
    pub id: String,
    pub node: NodeId,
    /// `form` attribute (`None` for the plain value) → value.
    pub values: IndexMap<Option<String>, ItextValue>,
}

impl ItextNode {
    fn rendered_values(&self) -> Vec<(Option<String>, String)> {
        let mut values: Vec<_> = self
            .values
            .iter()
            .map(|(form, v)| (form.clone(), v.render_markup()))
            .collect();
        values.sort();
        values
    }
}

/// All translations of one itext id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItextNodeGroup {
    pub id: String,
    pub nodes: IndexMap<String, ItextNode>,
}

impl ItextNodeGroup {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            nodes: IndexMap::new(),
        }
    }

    pub fn add_node(&mut self, node: ItextNode) -> Result<()> {
        if self.nodes.contains_key(&node.lang) {
            return Err(XFormError::DuplicateItext {
                lang: node.lang,
                id: node.id,
            });
        }
        self.nodes.insert(node.lang.clone(), node);
        Ok(())
    }

    /// Rendered value set across all languages; equal signatures mean the
    /// groups are interchangeable.
    fn signature(&self) -> BTreeSet<(String, Vec<(Option<String>, String)>)> {
        self.nodes
            .values()
            .map(|n| (n.lang.clone(), n.rendered_values()))
            .collect()
    }
}

impl XForm {
    pub fn get_languages(&self) -> Vec<String> {
        let Ok(itext) = self.itext_node() else {
            return Vec::new();
        };
        self.translation_nodes(itext)
            .into_iter()
            .filter_map(|t| self.tree.attr(t, "lang").map(str::to_string))
            .collect()
    }

    fn translation_nodes(&self, itext: NodeId) -> Vec<NodeId> {
        self.tree
            .child_elements(itext)
            .filter(|t| self.tree.tag_name(*t) == "translation")
            .collect()
    }

    /// Itext groups keyed by id, memoized until [`XForm::invalidate`].
    pub fn itext_groups(&self) -> Result<&IndexMap<String, ItextNodeGroup>> {
        if self.itext_groups.get().is_none() {
            let groups = self.build_itext_groups()?;
            let _ = self.itext_groups.set(groups);
        }
        self.itext_groups
            .get()
            .ok_or(XFormError::MissingNode("<itext>"))
    }

    fn build_itext_groups(&self) -> Result<IndexMap<String, ItextNodeGroup>> {
        let itext = self.itext_node()?;
        let mut groups: IndexMap<String, ItextNodeGroup> = IndexMap::new();
        for translation in self.translation_nodes(itext) {
            let lang = self.tree.attr(translation, "lang").unwrap_or("").to_string();
            for text in self.tree.child_elements(translation) {
                if self.tree.tag_name(text) != "text" {
                    continue;
                }
                let Some(id) = self.tree.attr(text, "id") else {
                    continue;
                };
                let mut values = IndexMap::new();
                for value in self.tree.child_elements(text) {
                    if self.tree.tag_name(value) == "value" {
                        let form = self.tree.attr(value, "form").map(str::to_string);
                        values
                            .entry(form)
                            .or_insert_with(|| ItextValue::from_node(&self.tree, value));
                    }
                }
                groups
                    .entry(id.to_string())
                    .or_insert_with(|| ItextNodeGroup::new(id))
                    .add_node(ItextNode {
                        lang: lang.clone(),
                        id: id.to_string(),
                        node: text,
                        values,
                    })?;
            }
        }
        Ok(groups)
    }

    /// Look up the translation of `id` (bare or wrapped in `jr:itext('…')`).
    ///
    /// Without `lang` the first translation is used. `form` selects the value
    /// with that exact `form` attribute, `None` the value without one; there
    /// is no fallback between the two.
    pub fn localize(&self, id: &str, lang: Option<&str>, form: Option<&str>) -> Result<Option<String>> {
        let id = strip_itext_ref(id);
        let lang = match lang {
            Some(l) => l.to_string(),
            None => match self.get_languages().into_iter().next() {
                Some(l) => l,
                None => return Ok(None),
            },
        };
        let groups = self.itext_groups()?;
        let value = groups
            .get(id)
            .and_then(|g| g.nodes.get(&lang))
            .and_then(|n| n.values.get(&form.map(str::to_string)));
        Ok(value.map(|v| v.render(None).trim().to_string()))
    }

    /// Display label of a control or item: its label's itext reference tried
    /// across `langs` then the default translation, or the inline label text.
    pub fn get_label_text(&self, prompt: NodeId, langs: &[&str]) -> Result<String> {
        let Some(label) = self
            .tree
            .child_elements(prompt)
            .find(|c| self.tree.name(*c) == Some(&XForm::xforms_qname("label")))
        else {
            return Ok(String::new());
        };
        if let Some(reference) = self.tree.attr(label, "ref") {
            let candidates = langs.iter().map(|l| Some(*l)).chain(std::iter::once(None));
            for lang in candidates {
                if let Some(text) = self.localize(reference, lang, None)? {
                    return Ok(text);
                }
            }
            log::warn!("no translation found for label {}", reference);
            return Ok(String::new());
        }
        Ok(ItextValue::from_node(&self.tree, label)
            .render(None)
            .trim()
            .to_string())
    }

    /// Translations of a label reference, one per language that has one.
    pub fn label_translations(&self, prompt: NodeId) -> Result<IndexMap<String, String>> {
        let mut out = IndexMap::new();
        let reference = self
            .tree
            .child_elements(prompt)
            .find(|c| self.tree.name(*c) == Some(&XForm::xforms_qname("label")))
            .and_then(|l| self.tree.attr(l, "ref"));
        if let Some(reference) = reference {
            for lang in self.get_languages() {
                if let Some(text) = self.localize(reference, Some(&lang), None)? {
                    out.insert(lang, text);
                }
            }
        }
        Ok(out)
    }

    pub fn rename_language(&mut self, old: &str, new: &str) -> Result<()> {
        self.invalidate();
        let itext = self.itext_node()?;
        let translations = self.translation_nodes(itext);
        let find = |code: &str| {
            translations
                .iter()
                .copied()
                .find(|t| self.tree.attr(*t, "lang") == Some(code))
        };
        let Some(node) = find(old) else {
            return Err(XFormError::Language(format!(
                "There's no language called '{}'",
                old
            )));
        };
        if find(new).is_some() {
            return Err(XFormError::Language(format!(
                "There's already a language called '{}'",
                new
            )));
        }
        self.tree.set_attribute(node, QName::local("lang"), new);
        Ok(())
    }

    /// Remove every translation whose language is not in `whitelist`.
    /// A form without itext is left untouched.
    pub fn exclude_languages(&mut self, whitelist: &[&str]) -> Result<()> {
        let Ok(itext) = self.itext_node() else {
            return Ok(());
        };
        for translation in self.translation_nodes(itext) {
            let keep = self
                .tree
                .attr(translation, "lang")
                .is_some_and(|l| whitelist.contains(&l));
            if !keep {
                self.tree.detach(translation);
            }
        }
        self.invalidate();
        Ok(())
    }

    pub fn set_default_language(&mut self, lang: &str) -> Result<()> {
        let itext = self.itext_node()?;
        let default = QName::local("default");
        for translation in self.translation_nodes(itext) {
            if self.tree.attr(translation, "lang") == Some(lang) {
                self.tree.set_attribute(translation, default.clone(), "");
            } else {
                self.tree.remove_attribute(translation, &default);
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Text of every itext value carrying `form` (e.g. `image`).
    pub fn media_references(&self, form: &str) -> Vec<String> {
        let Ok(itext) = self.itext_node() else {
            return Vec::new();
        };
        let path = format!("{{f}}translation/{{f}}text/{{f}}value[@form=\"{}\"]", form);
        self.find_all(itext, &path)
            .unwrap_or_default()
            .into_iter()
            .map(|n| self.tree.itertext(n).concat().trim().to_string())
            .collect()
    }

    pub fn image_references(&self) -> Vec<String> {
        self.media_references("image")
    }

    pub fn audio_references(&self) -> Vec<String> {
        self.media_references("audio")
    }

    pub fn video_references(&self) -> Vec<String> {
        self.media_references("video")
    }

    /// Collapse itext ids whose translations are identical in every language.
    ///
    /// The lowest id of each duplicate set is kept; the others are removed and
    /// every `jr:itext('<removed>')` in the document text is rewritten to the
    /// kept id. The document is re-parsed afterwards, so node ids obtained
    /// before this call are stale.
    pub fn normalize_itext(&mut self) -> Result<()> {
        let mut by_signature: BTreeMap<_, Vec<String>> = BTreeMap::new();
        for group in self.itext_groups()?.values() {
            by_signature
                .entry(group.signature())
                .or_default()
                .push(group.id.clone());
        }
        let mut renames: Vec<(String, String)> = Vec::new();
        let mut doomed: Vec<NodeId> = Vec::new();
        let groups = self.itext_groups()?;
        for mut ids in by_signature.into_values().filter(|ids| ids.len() > 1) {
            ids.sort();
            let keep = ids[0].clone();
            for duplicate in &ids[1..] {
                if let Some(group) = groups.get(duplicate) {
                    doomed.extend(group.nodes.values().map(|n| n.node));
                }
                renames.push((duplicate.clone(), keep.clone()));
            }
        }
        if renames.is_empty() {
            return Ok(());
        }
        for node in doomed {
            self.tree.detach(node);
        }
        let mut text = self.render_string();
        for (old, new) in &renames {
            log::debug!("itext '{}' merged into '{}'", old, new);
            for quote in ['\'', '"'] {
                text = text.replace(
                    &format!("jr:itext({q}{old}{q})", q = quote, old = old),
                    &format!("jr:itext({q}{new}{q})", q = quote, new = new),
                );
            }
        }
        let tree = parse_document(&text)?;
        self.replace_tree(tree);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_refs_render_with_placeholder_or_context() {
        let tree = parse_document(r#"<value>Hello <output value="/data/name"/> &amp; bye</value>"#)
            .unwrap();
        let value = ItextValue::from_node(&tree, tree.root());
        assert_eq!(value.render(None), "Hello ____ & bye");
        let ctx = HashMap::from([("/data/name".to_string(), "Ana".to_string())]);
        assert_eq!(value.render(Some(&ctx)), "Hello Ana & bye");
        assert_eq!(
            value.render_markup(),
            "Hello <output value=\"/data/name\"/> &amp; bye"
        );
    }

    #[test]
    fn group_rejects_second_node_of_a_language() {
        let mut group = ItextNodeGroup::new("q1-label");
        let tree = XmlTree::with_root(QName::local("text"));
        let node = ItextNode {
            lang: "en".into(),
            id: "q1-label".into(),
            node: tree.root(),
            values: IndexMap::new(),
        };
        group.add_node(node.clone()).unwrap();
        assert_eq!(
            group.add_node(node),
            Err(XFormError::DuplicateItext {
                lang: "en".into(),
                id: "q1-label".into()
            })
        );
    }
}
