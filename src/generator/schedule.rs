//! Visit schedule calculations for advanced module forms.

use super::xpath::CaseXPath;
use crate::error::{CaseErrorKind, Result, XFormError};
use crate::model::{PropertyMap, ScheduleConfig};
use crate::parser::XForm;

pub const SCHEDULE_PHASE: &str = "current_schedule_phase";

pub fn fixture_id(schedule: &ScheduleConfig) -> String {
    format!(
        "schedule:m{}:p{}:f{}",
        schedule.module_id, schedule.phase, schedule.schedule_form_id
    )
}

impl XForm {
    /// Add the schedule fixture and the hidden `next_visit_<form>` group,
    /// returning the case updates that record this visit.
    pub fn add_schedule(&mut self, schedule: &ScheduleConfig, case: &CaseXPath) -> Result<PropertyMap> {
        let form_id = &schedule.schedule_form_id;
        let fixture = fixture_id(schedule);
        self.add_instance(&fixture, &format!("jr://fixture/{}", fixture))?;
        self.add_casedb()?;

        let data = self.data_node()?;
        let group_name = format!("next_visit_{}", form_id);
        let exists = self
            .tree
            .child_elements(data)
            .any(|c| self.tree.tag_name(c) == group_name);
        if exists {
            return Err(XFormError::case(
                CaseErrorKind::DuplicateBlock,
                format!("<{}> is already present", group_name),
            ));
        }
        let group_qname = self.data_qname(&group_name);
        let group = self.tree.create_element(group_qname);
        for local in ["phase", "visit_date", "last_visit_number", "next_visit_number", "next_due"] {
            let name = self.data_qname(local);
            let child = self.tree.create_element(name);
            self.tree.append_child(group, child);
        }
        self.tree.append_child(data, group);

        let base = self.resolve(&group_name)?;
        let last = format!("{}/last_visit_number", base);
        let next = format!("{}/next_visit_number", base);
        let visit = format!(
            "instance('{}')/schedule/visit[@id = {}]",
            fixture, next
        );
        let last_number = case.property(&format!("last_visit_number_{}", form_id));
        let anchor = case.property(&schedule.anchor);
        let phase = schedule.phase.to_string();
        let next_number = format!("coalesce({}, 0) + 1", last);
        let next_due = format!("date({} + int({}/@due))", anchor, visit);

        self.add_bind(&format!("{}/phase", base), &[("calculate", phase.as_str())])?;
        self.add_bind(
            &format!("{}/visit_date", base),
            &[("type", "xsd:date"), ("calculate", "today()")],
        )?;
        self.add_bind(&last, &[("calculate", last_number.as_str())])?;
        self.add_bind(&next, &[("calculate", next_number.as_str())])?;
        self.add_bind(&format!("{}/next_due", base), &[("calculate", next_due.as_str())])?;
        log::debug!("visit schedule {} bound under {}", fixture, base);

        let mut updates = PropertyMap::new();
        updates.insert(SCHEDULE_PHASE.to_string(), format!("{}/phase", base));
        updates.insert(format!("last_visit_number_{}", form_id), next);
        updates.insert(
            format!("last_visit_date_{}", form_id),
            format!("{}/visit_date", base),
        );
        Ok(updates)
    }
}
