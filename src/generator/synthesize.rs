//! Case XML synthesis for a whole form.
//!
//! [`XForm::add_case_and_meta`] handles the case actions of basic modules
//! (one root case plus subcases), [`XForm::add_case_and_meta_advanced`] the
//! tagged load/open actions of advanced modules. Both finish by injecting the
//! `<meta>` block.

use super::case_block::{CaseBlock, CreateBlock, IndexRef, OwnerPolicy, UpdateOptions};
use super::parents::{add_related_updates, split_updates};
use super::xpath::{CaseIDXPath, SESSION_CASE_ID, session_var};
use crate::dom::{NodeId, QName};
use crate::error::{CaseErrorKind, Result, XFormError};
use crate::model::{
    AdvancedLoadUpdateAction, AdvancedOpenAction, CaseAction, CaseActionModel, Condition,
    PropertyMap, PropertyUsage,
};
use crate::parser::XForm;
use crate::parser::helpers::split_path;
use indexmap::IndexMap;

const DELEGATION_STUB: &str = "cc_delegation_stub";
const DELEGATION_ID: &str = "delegation_id";

/// Where the case of an advanced action can be referenced from.
#[derive(Debug, Clone)]
enum CaseTarget {
    /// Loaded from the session variable.
    Loaded { case_id: String, case_type: String },
    /// Opened by this form; `path` is the block's path prefix.
    Opened { path: String, case_type: String },
}

impl XForm {
    pub fn add_case_and_meta(&mut self, model: &CaseActionModel) -> Result<()> {
        if let Some(action) = model.actions.iter().find(|a| a.is_advanced()) {
            return Err(XFormError::case(
                CaseErrorKind::UnsupportedAction,
                format!("'{}' is only valid in advanced modules", action.kind()),
            ));
        }
        self.create_casexml(model)?;
        self.add_meta()?;
        self.invalidate();
        Ok(())
    }

    pub fn add_case_and_meta_advanced(&mut self, model: &CaseActionModel) -> Result<()> {
        if let Some(action) = model.actions.iter().find(|a| !a.is_advanced()) {
            return Err(XFormError::case(
                CaseErrorKind::UnsupportedAction,
                format!("'{}' is not valid in advanced modules", action.kind()),
            ));
        }
        self.create_casexml_advanced(model)?;
        self.add_meta()?;
        self.invalidate();
        Ok(())
    }

    /// New wrapper element `name` under `parent`; an existing one means the
    /// case block is already there.
    fn case_container(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        if self
            .tree
            .child_elements(parent)
            .any(|c| self.tree.tag_name(c) == name)
        {
            return Err(XFormError::case(
                CaseErrorKind::DuplicateCaseBlock,
                format!("<{}> already exists in the form", name),
            ));
        }
        let qname = self.data_qname(name);
        let node = self.tree.create_element(qname);
        self.tree.append_child(parent, node);
        Ok(node)
    }

    fn repeat_node(&self, repeat: &str) -> Result<NodeId> {
        self.data_node_at(repeat)?
            .ok_or_else(|| XFormError::Form(format!("repeat {} not found in the data tree", repeat)))
    }

    /// `setvalue`s reading case properties into questions. Properties may
    /// name a related case (`parent/name`).
    fn add_case_preloads(&mut self, preloads: &PropertyMap, case_id: &CaseIDXPath) -> Result<()> {
        if preloads.is_empty() {
            return Ok(());
        }
        self.add_casedb()?;
        for (question, property) in preloads {
            let (relation, property) = split_path(property);
            let value = case_id.related(relation).case().property(property);
            self.add_setvalue_on_ready(question, value.as_str())?;
        }
        Ok(())
    }

    fn create_casexml(&mut self, model: &CaseActionModel) -> Result<()> {
        let open = model.open_case().filter(|a| a.condition.is_active());
        let update = model.update_case().filter(|a| a.condition.is_active());
        let close = model.close_case().filter(|a| a.condition.is_active());
        let preload = model.preload_case().filter(|a| a.condition.is_active());
        let subcases: Vec<_> = model.subcases().filter(|s| s.condition.is_active()).collect();

        if !model.requires_case && open.is_none() && update.is_some_and(|u| !u.update.is_empty()) {
            return Err(XFormError::case(
                CaseErrorKind::RequiresCase,
                "To update a case you must either open a case or require a case to begin with",
            ));
        }
        let any_action =
            open.is_some() || update.is_some() || close.is_some() || preload.is_some() || !subcases.is_empty();
        let has_root = open.is_some() || (model.requires_case && any_action);
        if has_root && self.case_node().is_ok() {
            return Err(XFormError::case(
                CaseErrorKind::DuplicateCaseBlock,
                "You cannot use the Case Management UI if you already have a case block in your form.",
            ));
        }
        let data = self.data_node()?;
        let session_case = CaseIDXPath::session();

        if preload.is_some() {
            self.add_casedb()?;
        }

        let mut root = None;
        if has_root {
            let mut block = CaseBlock::new(self, "")?;
            let mut updates = update.map(|u| u.update.clone()).unwrap_or_default();
            match open {
                Some(open) => {
                    let relevance = self.action_relevance(&open.condition)?;
                    block.add_create_block(
                        self,
                        &CreateBlock {
                            relevance: &relevance,
                            case_name: open.name_path.as_deref(),
                            case_type: &model.case_type,
                            owner: OwnerPolicy::select(open.autoset_owner_id, model.case_sharing),
                            delay_case_id: false,
                            make_relative: false,
                        },
                    )?;
                    if let Some(external_id) = open.external_id.as_deref().filter(|e| !e.is_empty()) {
                        updates.insert("external_id".to_string(), external_id.to_string());
                    }
                }
                None => block.bind_case_id(self, SESSION_CASE_ID)?,
            }

            let (own, related) = split_updates(&updates);
            if !related.is_empty() && open.is_some() {
                return Err(XFormError::case(
                    CaseErrorKind::RelatedCaseOfNewCase,
                    "Only existing cases can update related cases",
                ));
            }
            let edit_guard = model.save_only_if_edited && open.is_none();
            let guard_case = session_case.case();
            block.add_case_updates(
                self,
                &own,
                &UpdateOptions {
                    make_relative: false,
                    edit_guard: edit_guard.then_some(&guard_case),
                },
            )?;
            if let Some(update) = update {
                if matches!(update.condition, Condition::If { .. }) && !own.is_empty() {
                    let relevance = self.action_relevance(&update.condition)?;
                    self.add_bind("case/update", &[("relevant", relevance.as_str())])?;
                }
            }
            add_related_updates(self, data, "", &session_case, &related, edit_guard)?;

            if let Some(close) = close {
                let relevance = self.action_relevance(&close.condition)?;
                block.add_close_block(self, &relevance)?;
            }
            root = Some(block);
        }

        if let Some(preload) = preload {
            self.add_case_preloads(&preload.preload, &session_case)?;
        }

        let mut per_repeat: IndexMap<&str, usize> = IndexMap::new();
        for subcase in &subcases {
            if let Some(r) = subcase.repeat_context.as_deref().filter(|r| !r.is_empty()) {
                *per_repeat.entry(r).or_default() += 1;
            }
        }
        for (i, subcase) in subcases.iter().enumerate() {
            let repeat = subcase.repeat_context.as_deref().filter(|r| !r.is_empty());
            let name = format!("subcase_{}", i);
            let (container, path) = match repeat {
                Some(r) if per_repeat.get(r).copied().unwrap_or(0) == 1 => {
                    let repeat_node = self.repeat_node(r)?;
                    if self.find(repeat_node, "{cx2}case")?.is_some() {
                        return Err(XFormError::case(
                            CaseErrorKind::DuplicateCaseBlock,
                            format!("{} already holds a case block", r),
                        ));
                    }
                    (repeat_node, format!("{}/", r))
                }
                Some(r) => {
                    let repeat_node = self.repeat_node(r)?;
                    let wrapper = self.case_container(repeat_node, &name)?;
                    (wrapper, format!("{}/{}/", r, name))
                }
                None => (self.case_container(data, &name)?, format!("{}/", name)),
            };
            let in_repeat = repeat.is_some();
            let mut block = CaseBlock::new(self, &path)?;
            self.tree.append_child(container, block.elem());

            let relevance = self.action_relevance(&subcase.condition)?;
            block.add_create_block(
                self,
                &CreateBlock {
                    relevance: &relevance,
                    case_name: subcase.case_name.as_deref(),
                    case_type: &subcase.case_type,
                    owner: OwnerPolicy::select(subcase.autoset_owner_id, model.case_sharing),
                    delay_case_id: in_repeat,
                    make_relative: in_repeat,
                },
            )?;
            let (own, related) = split_updates(&subcase.case_properties);
            if !related.is_empty() {
                return Err(XFormError::case(
                    CaseErrorKind::RelatedCaseOfNewCase,
                    "Only existing cases can update related cases",
                ));
            }
            block.add_case_updates(
                self,
                &own,
                &UpdateOptions {
                    make_relative: in_repeat,
                    edit_guard: None,
                },
            )?;
            if subcase.close_condition.is_active() {
                let relevance = self.action_relevance(&subcase.close_condition)?;
                block.add_close_block(self, &relevance)?;
            }
            if root.is_some() && subcase.case_type != model.case_type {
                let parent_id = self.resolve("case/@case_id")?;
                block.add_index_ref(
                    self,
                    &IndexRef {
                        reference_id: subcase.reference_id.as_deref().unwrap_or("parent"),
                        case_type: &model.case_type,
                        case_id: &parent_id,
                        relationship: &subcase.relationship,
                        relationship_question: subcase.relationship_question.as_deref(),
                    },
                )?;
            }
            log::debug!("subcase {} of type '{}' at {}", i, subcase.case_type, path);
        }

        if let Some(block) = root {
            self.tree.append_child(data, block.elem());
            if model.requires_case && model.task_list {
                self.add_delegation_stub(data)?;
            }
        }
        if let Some(registration) = &model.registration {
            self.add_user_registration(registration)?;
        }
        Ok(())
    }

    /// Closing case block for the task delegated to this form, if the
    /// session names one.
    fn add_delegation_stub(&mut self, data: NodeId) -> Result<()> {
        let stub = self.case_container(data, DELEGATION_STUB)?;
        self.tree.set_attribute(stub, QName::local(DELEGATION_ID), "");
        let path = format!("{}/", DELEGATION_STUB);
        let mut block = CaseBlock::new(self, &path)?;
        self.tree.append_child(stub, block.elem());
        block.add_close_block(self, "true()")?;

        let id_ref = format!("{}@{}", path, DELEGATION_ID);
        let id_path = self.resolve(&id_ref)?;
        let session_id = session_var(DELEGATION_ID);
        let value = format!("if(count({d}) = 1, {d}, '')", d = session_id);
        self.add_setvalue_on_ready(&id_ref, &value)?;
        let relevant = format!("{} != ''", id_path);
        self.add_bind(&block.node_path(""), &[("relevant", relevant.as_str())])?;
        block.bind_case_id(self, &id_path)?;
        log::debug!("delegation stub at {}", id_path);
        Ok(())
    }

    fn create_casexml_advanced(&mut self, model: &CaseActionModel) -> Result<()> {
        let data = self.data_node()?;
        let mut targets: IndexMap<String, CaseTarget> = IndexMap::new();

        let loads: Vec<&AdvancedLoadUpdateAction> = model.load_update_actions().collect();
        for load in &loads {
            if load.case_session_var.is_empty() {
                return Err(XFormError::case(
                    CaseErrorKind::MissingSessionVar,
                    format!("Could not determine the session variable of '{}'", load.case_tag),
                ));
            }
            targets.insert(
                load.case_tag.clone(),
                CaseTarget::Loaded {
                    case_id: session_var(&load.case_session_var),
                    case_type: load.case_type.clone(),
                },
            );
        }

        let opens: Vec<&AdvancedOpenAction> = model
            .open_actions()
            .filter(|o| o.open_condition.is_active())
            .collect();
        let mut per_repeat: IndexMap<&str, usize> = IndexMap::new();
        for open in &opens {
            if let Some(r) = open.repeat_context.as_deref().filter(|r| !r.is_empty()) {
                *per_repeat.entry(r).or_default() += 1;
            }
        }
        let open_path = |open: &AdvancedOpenAction| match open.repeat_context.as_deref() {
            Some(r) if !r.is_empty() && per_repeat.get(r).copied().unwrap_or(0) > 1 => {
                format!("{}/case_{}/", r, open.case_tag)
            }
            Some(r) if !r.is_empty() => format!("{}/", r),
            _ => format!("case_{}/", open.case_tag),
        };
        for open in opens.iter().copied() {
            targets.insert(
                open.case_tag.clone(),
                CaseTarget::Opened {
                    path: open_path(open),
                    case_type: open.case_type.clone(),
                },
            );
        }

        for load in &loads {
            self.add_load_update(model, load, data)?;
        }
        for open in opens.iter().copied() {
            let path = open_path(open);
            self.add_advanced_open(model, open, &path, &targets, data)?;
        }
        Ok(())
    }

    fn add_load_update(&mut self, model: &CaseActionModel, load: &AdvancedLoadUpdateAction, data: NodeId) -> Result<()> {
        let case_id = CaseIDXPath::new(session_var(&load.case_session_var));
        self.add_casedb()?;
        self.add_case_preloads(&load.preload, &case_id)?;

        let (own, related) = split_updates(&load.case_properties);
        let schedule = model.schedule.as_ref().filter(|_| load.scheduled);
        let closes = load.close_condition.is_active();
        if own.is_empty() && related.is_empty() && schedule.is_none() && !closes {
            return Ok(());
        }

        let name = format!("case_{}", load.case_tag);
        let container = self.case_container(data, &name)?;
        let path = format!("{}/", name);
        let mut block = CaseBlock::new(self, &path)?;
        self.tree.append_child(container, block.elem());
        block.bind_case_id(self, case_id.as_str())?;

        let case = case_id.case();
        let opts = UpdateOptions {
            make_relative: false,
            edit_guard: model.save_only_if_edited.then_some(&case),
        };
        block.add_case_updates(self, &own, &opts)?;
        if let Some(schedule) = schedule {
            let visit_updates = self.add_schedule(schedule, &case)?;
            block.add_case_updates(
                self,
                &visit_updates,
                &UpdateOptions {
                    make_relative: false,
                    edit_guard: None,
                },
            )?;
        }
        if closes {
            let relevance = self.action_relevance(&load.close_condition)?;
            block.add_close_block(self, &relevance)?;
        }
        add_related_updates(
            self,
            container,
            &path,
            &case_id,
            &related,
            model.save_only_if_edited,
        )?;
        log::debug!("load/update block for '{}' at {}", load.case_tag, path);
        Ok(())
    }

    fn add_advanced_open(
        &mut self,
        model: &CaseActionModel,
        open: &AdvancedOpenAction,
        path: &str,
        targets: &IndexMap<String, CaseTarget>,
        data: NodeId,
    ) -> Result<()> {
        let repeat = open.repeat_context.as_deref().filter(|r| !r.is_empty());
        let container = match repeat {
            Some(r) => {
                let repeat_node = self.repeat_node(r)?;
                if path == format!("{}/", r) {
                    if self.find(repeat_node, "{cx2}case")?.is_some() {
                        return Err(XFormError::case(
                            CaseErrorKind::DuplicateCaseBlock,
                            format!("{} already holds a case block", r),
                        ));
                    }
                    repeat_node
                } else {
                    self.case_container(repeat_node, &format!("case_{}", open.case_tag))?
                }
            }
            None => self.case_container(data, &format!("case_{}", open.case_tag))?,
        };
        let in_repeat = repeat.is_some();
        let mut block = CaseBlock::new(self, path)?;
        self.tree.append_child(container, block.elem());

        let relevance = self.action_relevance(&open.open_condition)?;
        block.add_create_block(
            self,
            &CreateBlock {
                relevance: &relevance,
                case_name: open.name_path.as_deref(),
                case_type: &open.case_type,
                owner: OwnerPolicy::select(open.autoset_owner_id, model.case_sharing),
                delay_case_id: in_repeat,
                make_relative: in_repeat,
            },
        )?;
        let (own, related) = split_updates(&open.case_properties);
        if !related.is_empty() {
            return Err(XFormError::case(
                CaseErrorKind::RelatedCaseOfNewCase,
                format!("'{}' opens a new case and cannot update related cases", open.case_tag),
            ));
        }
        block.add_case_updates(
            self,
            &own,
            &UpdateOptions {
                make_relative: in_repeat,
                edit_guard: None,
            },
        )?;
        if open.close_condition.is_active() {
            let relevance = self.action_relevance(&open.close_condition)?;
            block.add_close_block(self, &relevance)?;
        }

        for index in &open.case_indices {
            let target = targets.get(&index.tag).ok_or_else(|| {
                XFormError::case(
                    CaseErrorKind::InvalidRelationship,
                    format!("'{}' indexes unknown case tag '{}'", open.case_tag, index.tag),
                )
            })?;
            let (case_id, case_type) = match target {
                CaseTarget::Loaded { case_id, case_type } => (case_id.clone(), case_type.as_str()),
                CaseTarget::Opened { path, case_type } => {
                    (self.resolve(&format!("{}case/@case_id", path))?, case_type.as_str())
                }
            };
            block.add_index_ref(
                self,
                &IndexRef {
                    reference_id: index.reference_id.as_deref().unwrap_or("parent"),
                    case_type,
                    case_id: &case_id,
                    relationship: &index.relationship,
                    relationship_question: index.relationship_question.as_deref(),
                },
            )?;
        }
        log::debug!("open block for '{}' at {}", open.case_tag, path);
        Ok(())
    }

    /// Saved and loaded properties of every action, each annotated with the
    /// problem found resolving it. Problems are reported, never raised.
    pub fn case_property_usage(&self, model: &CaseActionModel) -> Vec<PropertyUsage> {
        let mut out = Vec::new();
        let mut record = |case_type: &str, property: &str, question: &str, direction: &str| {
            out.push(PropertyUsage {
                case_type: case_type.to_string(),
                property: property.to_string(),
                question_path: question.to_string(),
                direction: direction.to_string(),
                error: self.property_problem(model, case_type, property, question),
            });
        };
        for action in &model.actions {
            match action {
                CaseAction::OpenCase(open) => {
                    if let Some(name) = &open.name_path {
                        record(&model.case_type, "name", name, "save");
                    }
                    if let Some(external_id) = &open.external_id {
                        record(&model.case_type, "external_id", external_id, "save");
                    }
                }
                CaseAction::UpdateCase(update) => {
                    for (property, question) in &update.update {
                        record(&model.case_type, property, question, "save");
                    }
                }
                CaseAction::CloseCase(_) => {}
                CaseAction::PreloadCase(preload) => {
                    for (question, property) in &preload.preload {
                        record(&model.case_type, property, question, "load");
                    }
                }
                CaseAction::Subcase(subcase) => {
                    if let Some(name) = &subcase.case_name {
                        record(&subcase.case_type, "name", name, "save");
                    }
                    for (property, question) in &subcase.case_properties {
                        record(&subcase.case_type, property, question, "save");
                    }
                }
                CaseAction::AdvancedLoadUpdate(load) => {
                    for (property, question) in &load.case_properties {
                        record(&load.case_type, property, question, "save");
                    }
                    for (question, property) in &load.preload {
                        record(&load.case_type, property, question, "load");
                    }
                }
                CaseAction::AdvancedOpen(open) => {
                    if let Some(name) = &open.name_path {
                        record(&open.case_type, "name", name, "save");
                    }
                    for (property, question) in &open.case_properties {
                        record(&open.case_type, property, question, "save");
                    }
                }
            }
        }
        out
    }

    fn property_problem(&self, model: &CaseActionModel, case_type: &str, property: &str, question: &str) -> Option<String> {
        if !model.case_type_exists(case_type) {
            return Some(format!("case type '{}' does not exist", case_type));
        }
        let (relation, _) = split_path(property);
        if let Some(first) = relation.split('/').next().filter(|r| !r.is_empty()) {
            let declared = model
                .case_relationships
                .get(case_type)
                .is_some_and(|rels| rels.iter().any(|r| r == first));
            if !declared {
                return Some(format!(
                    "case type '{}' has no '{}' relationship",
                    case_type, first
                ));
            }
        }
        match self.resolve(question) {
            Ok(path) => match self.data_node_at(&path) {
                Ok(Some(_)) => None,
                Ok(None) => Some(format!("question {} not found in form", path)),
                Err(e) => Some(e.to_string()),
            },
            Err(e) => Some(e.to_string()),
        }
    }
}
