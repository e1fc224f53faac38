//! Question type inference.
//!
//! The type table is indexed into a four-level trie keyed by control tag,
//! declared data type, media type and appearance. Each level falls back to
//! its wildcard (`None`) bucket when the specific key is absent.

use crate::error::{Result, XFormError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// One row of the type table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRule {
    pub name: String,
    pub tag: String,
    /// Declared data types this rule applies to; `None` is the wildcard.
    #[serde(default = "wildcard")]
    pub types: Vec<Option<String>>,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub appearance: Option<String>,
}

fn wildcard() -> Vec<Option<String>> {
    vec![None]
}

type ByAppearance = HashMap<Option<String>, Vec<String>>;
type ByMedia = HashMap<Option<String>, ByAppearance>;
type ByType = HashMap<Option<String>, ByMedia>;

/// (name, tag, data types, media type, appearance)
type StaticRule = (
    &'static str,
    &'static str,
    &'static [Option<&'static str>],
    Option<&'static str>,
    Option<&'static str>,
);

const STANDARD_TYPES: &[StaticRule] = &[
    ("AndroidIntent", "input", &[Some("intent")], None, None),
    ("Audio", "upload", &[None], Some("audio/*"), None),
    ("Barcode", "input", &[Some("barcode")], None, None),
    ("DataBindOnly", "hidden", &[None], None, None),
    ("Date", "input", &[Some("xsd:date")], None, None),
    ("DateTime", "input", &[Some("xsd:dateTime")], None, None),
    ("Double", "input", &[Some("xsd:double"), Some("xsd:decimal")], None, None),
    ("FieldList", "group", &[None], None, Some("field-list")),
    ("Geopoint", "input", &[Some("geopoint")], None, None),
    ("Group", "group", &[None], None, None),
    ("Image", "upload", &[None], Some("image/*"), None),
    ("Int", "input", &[Some("xsd:int"), Some("xsd:integer")], None, None),
    ("Label", "trigger", &[None], None, Some("minimal")),
    ("Long", "input", &[Some("xsd:long")], None, None),
    ("MicroImage", "upload", &[None], Some("image/*"), Some("micro-image")),
    ("MSelect", "select", &[None], None, None),
    ("PhoneNumber", "input", &[Some("xsd:string"), None], None, Some("numeric")),
    ("Repeat", "repeat", &[None], None, None),
    ("SaveToCase", "save_to_case", &[None], None, None),
    ("Secret", "secret", &[None], None, None),
    ("Select", "select1", &[None], None, None),
    ("Signature", "upload", &[None], Some("image/*"), Some("signature")),
    ("Text", "input", &[Some("xsd:string"), None], None, None),
    ("Time", "input", &[Some("xsd:time")], None, None),
    ("Trigger", "trigger", &[None], None, None),
    ("Video", "upload", &[None], Some("video/*"), None),
];

static STANDARD_INDEX: LazyLock<Arc<TypeIndex>> =
    LazyLock::new(|| Arc::new(TypeIndex::from_rules(&TypeIndex::standard_rules())));

#[derive(Debug, Clone, Default)]
pub struct TypeIndex {
    tags: HashMap<String, ByType>,
}

impl TypeIndex {
    /// Shared index built from the built-in table.
    pub fn standard() -> Arc<TypeIndex> {
        Arc::clone(&STANDARD_INDEX)
    }

    pub fn standard_rules() -> Vec<TypeRule> {
        STANDARD_TYPES
            .iter()
            .map(|(name, tag, types, media, appearance)| TypeRule {
                name: name.to_string(),
                tag: tag.to_string(),
                types: types.iter().map(|t| t.map(str::to_string)).collect(),
                media: media.map(str::to_string),
                appearance: appearance.map(str::to_string),
            })
            .collect()
    }

    pub fn from_rules(rules: &[TypeRule]) -> Self {
        let mut tags: HashMap<String, ByType> = HashMap::new();
        for rule in rules {
            let by_type = tags.entry(rule.tag.clone()).or_default();
            for data_type in &rule.types {
                by_type
                    .entry(data_type.clone())
                    .or_default()
                    .entry(rule.media.clone())
                    .or_default()
                    .entry(rule.appearance.clone())
                    .or_default()
                    .push(rule.name.clone());
            }
        }
        Self { tags }
    }

    /// Build an index from a JSON array of [`TypeRule`]s.
    pub fn from_json(text: &str) -> Result<Self> {
        let rules: Vec<TypeRule> = serde_json::from_str(text)
            .map_err(|e| XFormError::Form(format!("invalid type table: {}", e)))?;
        Ok(Self::from_rules(&rules))
    }

    /// Resolve the semantic question type. Ambiguous or unknown combinations
    /// yield `None`.
    pub fn infer(
        &self,
        tag: &str,
        data_type: Option<&str>,
        media_type: Option<&str>,
        appearance: Option<&str>,
    ) -> Option<&str> {
        let by_type = self.tags.get(tag)?;
        let by_media = pick(by_type, data_type)?;
        let by_appearance = pick(by_media, media_type)?;
        let names = pick(by_appearance, appearance)?;
        match names.as_slice() {
            [name] => Some(name.as_str()),
            [] => None,
            many => {
                log::warn!(
                    "ambiguous question type for <{}> type={:?} media={:?} appearance={:?}: {:?}",
                    tag,
                    data_type,
                    media_type,
                    appearance,
                    many
                );
                None
            }
        }
    }
}

fn pick<'a, V>(level: &'a HashMap<Option<String>, V>, key: Option<&str>) -> Option<&'a V> {
    key.and_then(|k| level.get(&Some(k.to_string())))
        .or_else(|| level.get(&None))
}
