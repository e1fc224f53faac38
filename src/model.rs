use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Questions (read model)
// ────────────────────────────────────────────────────────────────────────────

/// Flattened question record returned by `get_questions`.
///
/// Order of questions in the returned list is part of the contract: control
/// tree order, then hidden leaf data nodes, then save-to-case attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub label: String,
    pub tag: String,
    /// Absolute data path.
    pub value: String,
    pub repeat: Option<String>,
    pub group: Option<String>,
    #[serde(rename = "type")]
    pub question_type: Option<String>,
    pub relevant: Option<String>,
    pub required: bool,
    pub constraint: Option<String>,
    pub comment: Option<String>,
    #[serde(rename = "hashtagValue")]
    pub hashtag_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setvalue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<QuestionOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translations: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translations: Option<IndexMap<String, String>>,
}

/// Fixture metadata of a select backed by an `<itemset>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub instance_id: Option<String>,
    pub instance_ref: Option<String>,
    pub nodeset: String,
    pub label_ref: Option<String>,
    pub value_ref: Option<String>,
}

/// Flags of `get_questions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionOptions {
    pub include_triggers: bool,
    pub include_groups: bool,
    pub include_translations: bool,
    pub exclude_select_with_itemsets: bool,
    pub include_fixtures: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Case action model (input)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    #[default]
    #[serde(rename = "=")]
    Equals,
    Selected,
    BooleanTrue,
}

/// When a case action fires.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Always,
    If {
        question: String,
        #[serde(default)]
        operator: ConditionOperator,
        #[serde(default)]
        answer: String,
    },
    Never,
}

impl Condition {
    pub fn is_active(&self) -> bool {
        !matches!(self, Condition::Never)
    }
}

/// Property name → question path.
pub type PropertyMap = IndexMap<String, String>;

fn default_true() -> bool {
    true
}

fn default_relationship() -> String {
    "child".to_string()
}

fn never() -> Condition {
    Condition::Never
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenCaseAction {
    #[serde(default)]
    pub condition: Condition,
    pub name_path: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default = "default_true")]
    pub autoset_owner_id: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCaseAction {
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub update: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseCaseAction {
    #[serde(default)]
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadCaseAction {
    #[serde(default)]
    pub condition: Condition,
    /// Question path → case property.
    #[serde(default)]
    pub preload: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubcaseAction {
    #[serde(default)]
    pub condition: Condition,
    pub case_type: String,
    pub case_name: Option<String>,
    #[serde(default)]
    pub case_properties: PropertyMap,
    #[serde(default)]
    pub repeat_context: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default = "default_relationship")]
    pub relationship: String,
    /// XPath answering the relationship when `relationship == "question"`.
    #[serde(default)]
    pub relationship_question: Option<String>,
    #[serde(default = "never")]
    pub close_condition: Condition,
    #[serde(default = "default_true")]
    pub autoset_owner_id: bool,
}

/// Index from an advanced open action to another case of the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseIndex {
    /// Tag of the action whose case is indexed.
    pub tag: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default = "default_relationship")]
    pub relationship: String,
    #[serde(default)]
    pub relationship_question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedLoadUpdateAction {
    pub case_tag: String,
    pub case_type: String,
    pub case_session_var: String,
    /// Case property → question path.
    #[serde(default)]
    pub case_properties: PropertyMap,
    /// Question path → case property.
    #[serde(default)]
    pub preload: PropertyMap,
    #[serde(default = "never")]
    pub close_condition: Condition,
    /// Visit schedule updates are attached to this action's case.
    #[serde(default)]
    pub scheduled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedOpenAction {
    pub case_tag: String,
    pub case_type: String,
    pub name_path: Option<String>,
    #[serde(default)]
    pub open_condition: Condition,
    #[serde(default)]
    pub case_properties: PropertyMap,
    #[serde(default)]
    pub repeat_context: Option<String>,
    #[serde(default)]
    pub case_indices: Vec<CaseIndex>,
    #[serde(default = "never")]
    pub close_condition: Condition,
    #[serde(default = "default_true")]
    pub autoset_owner_id: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaseAction {
    OpenCase(OpenCaseAction),
    UpdateCase(UpdateCaseAction),
    CloseCase(CloseCaseAction),
    PreloadCase(PreloadCaseAction),
    Subcase(SubcaseAction),
    AdvancedLoadUpdate(AdvancedLoadUpdateAction),
    AdvancedOpen(AdvancedOpenAction),
}

impl CaseAction {
    pub fn kind(&self) -> &'static str {
        match self {
            CaseAction::OpenCase(_) => "open_case",
            CaseAction::UpdateCase(_) => "update_case",
            CaseAction::CloseCase(_) => "close_case",
            CaseAction::PreloadCase(_) => "preload_case",
            CaseAction::Subcase(_) => "subcase",
            CaseAction::AdvancedLoadUpdate(_) => "advanced_load_update",
            CaseAction::AdvancedOpen(_) => "advanced_open",
        }
    }

    pub fn is_advanced(&self) -> bool {
        matches!(
            self,
            CaseAction::AdvancedLoadUpdate(_) | CaseAction::AdvancedOpen(_)
        )
    }
}

/// Visit schedule of an advanced module form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub module_id: u32,
    pub phase: u32,
    pub schedule_form_id: String,
    /// Case property holding the phase anchor date.
    pub anchor: String,
}

/// Questions answering a user registration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistration {
    #[serde(default = "default_username")]
    pub username_path: String,
    #[serde(default = "default_password")]
    pub password_path: String,
    /// User data key → question path.
    #[serde(default)]
    pub data_paths: PropertyMap,
}

fn default_username() -> String {
    "username".to_string()
}

fn default_password() -> String {
    "password".to_string()
}

impl Default for UserRegistration {
    fn default() -> Self {
        Self {
            username_path: default_username(),
            password_path: default_password(),
            data_paths: PropertyMap::new(),
        }
    }
}

/// Everything the synthesizer needs to know about one form's case handling.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseActionModel {
    /// Case type of the module the form belongs to.
    pub case_type: String,
    pub requires_case: bool,
    pub case_sharing: bool,
    /// Skip writing properties whose value did not change.
    pub save_only_if_edited: bool,
    /// Case types declared by the application; empty disables the check.
    pub known_case_types: Vec<String>,
    /// case type → index reference ids it declares (e.g. `parent`).
    pub case_relationships: IndexMap<String, Vec<String>>,
    pub schedule: Option<ScheduleConfig>,
    /// The module shows a task list; forms on existing cases close the
    /// delegated task case.
    pub task_list: bool,
    pub registration: Option<UserRegistration>,
    pub actions: Vec<CaseAction>,
}

impl CaseActionModel {
    pub fn open_case(&self) -> Option<&OpenCaseAction> {
        self.actions.iter().find_map(|a| match a {
            CaseAction::OpenCase(o) => Some(o),
            _ => None,
        })
    }

    pub fn update_case(&self) -> Option<&UpdateCaseAction> {
        self.actions.iter().find_map(|a| match a {
            CaseAction::UpdateCase(u) => Some(u),
            _ => None,
        })
    }

    pub fn close_case(&self) -> Option<&CloseCaseAction> {
        self.actions.iter().find_map(|a| match a {
            CaseAction::CloseCase(c) => Some(c),
            _ => None,
        })
    }

    pub fn preload_case(&self) -> Option<&PreloadCaseAction> {
        self.actions.iter().find_map(|a| match a {
            CaseAction::PreloadCase(p) => Some(p),
            _ => None,
        })
    }

    pub fn subcases(&self) -> impl Iterator<Item = &SubcaseAction> {
        self.actions.iter().filter_map(|a| match a {
            CaseAction::Subcase(s) => Some(s),
            _ => None,
        })
    }

    pub fn load_update_actions(&self) -> impl Iterator<Item = &AdvancedLoadUpdateAction> {
        self.actions.iter().filter_map(|a| match a {
            CaseAction::AdvancedLoadUpdate(l) => Some(l),
            _ => None,
        })
    }

    pub fn open_actions(&self) -> impl Iterator<Item = &AdvancedOpenAction> {
        self.actions.iter().filter_map(|a| match a {
            CaseAction::AdvancedOpen(o) => Some(o),
            _ => None,
        })
    }

    pub fn case_type_exists(&self, case_type: &str) -> bool {
        self.known_case_types.is_empty() || self.known_case_types.iter().any(|t| t == case_type)
    }
}

/// One saved or loaded case property, annotated with a resolution error
/// instead of failing the whole form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUsage {
    pub case_type: String,
    pub property: String,
    pub question_path: String,
    /// `"save"` or `"load"`.
    pub direction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
