//! Model edits shared by every synthesis step: binds, setvalues, secondary
//! instances, relevance conditions and the `<meta>` block.

use crate::dom::path::{NS_COMMCARE, NS_JAVAROSA, NS_OPENROSA, NS_REGISTRATION};
use crate::dom::{NodeId, QName};
use crate::error::{Result, XFormError};
use crate::model::{Condition, ConditionOperator, UserRegistration};
use crate::parser::XForm;

pub const CASEDB_INSTANCE: (&str, &str) = ("casedb", "jr://instance/casedb");
pub const SESSION_INSTANCE: (&str, &str) = ("commcaresession", "jr://instance/session");

const SESSION_CONTEXT: &str = "instance('commcaresession')/session/context";
const HQ_TMP: &str = "hq_tmp";

impl XForm {
    /// Add or merge a `<bind>`.
    ///
    /// `relevant="true()"` is dropped. When a bind with the same (resolved)
    /// nodeset exists its attributes are overwritten; otherwise a new bind is
    /// appended to the model, unless nothing but the nodeset is left.
    pub fn add_bind(&mut self, nodeset: &str, attrs: &[(&str, &str)]) -> Result<()> {
        let nodeset = self.resolve(nodeset)?;
        let attrs: Vec<(&str, &str)> = attrs
            .iter()
            .copied()
            .filter(|(k, v)| !(*k == "relevant" && *v == "true()"))
            .collect();
        if attrs.is_empty() {
            return Ok(());
        }
        let bind = match self.get_bind(&nodeset)? {
            Some(existing) => existing,
            None => {
                let model = self.model_node()?;
                let bind = self
                    .tree
                    .create_element_with(XForm::xforms_qname("bind"), &[("nodeset", nodeset.as_str())]);
                self.tree.append_child(model, bind);
                bind
            }
        };
        for (k, v) in attrs {
            self.tree.set_attribute(bind, QName::local(k), v);
        }
        Ok(())
    }

    /// Append a `<setvalue>` to the model. An identical setvalue is not
    /// added twice. `value_type` adds a typed bind for `reference`.
    pub fn add_setvalue(&mut self, reference: &str, value: &str, event: &str, value_type: Option<&str>) -> Result<()> {
        let reference = self.resolve(reference)?;
        let model = self.model_node()?;
        let exists = self.tree.child_elements(model).any(|s| {
            self.tree.name(s) == Some(&XForm::xforms_qname("setvalue"))
                && self.tree.attr(s, "ref") == Some(reference.as_str())
                && self.tree.attr(s, "value") == Some(value)
                && self.tree.attr(s, "event") == Some(event)
        });
        if !exists {
            let setvalue = self.tree.create_element_with(
                XForm::xforms_qname("setvalue"),
                &[("ref", reference.as_str()), ("value", value), ("event", event)],
            );
            self.tree.append_child(model, setvalue);
        }
        if let Some(t) = value_type {
            self.add_bind(&reference, &[("type", t)])?;
        }
        Ok(())
    }

    pub fn add_setvalue_on_ready(&mut self, reference: &str, value: &str) -> Result<()> {
        self.add_setvalue(reference, value, "xforms-ready", None)
    }

    /// Declare a secondary instance right after the main one, once.
    pub fn add_instance(&mut self, id: &str, src: &str) -> Result<()> {
        let model = self.model_node()?;
        let present = self.tree.child_elements(model).any(|i| {
            self.tree.name(i) == Some(&XForm::xforms_qname("instance"))
                && self.tree.attr(i, "id") == Some(id)
        });
        if present {
            return Ok(());
        }
        let main = self.instance_node()?;
        let instance = self
            .tree
            .create_element_with(XForm::xforms_qname("instance"), &[("id", id), ("src", src)]);
        self.tree.insert_after(main, instance)
    }

    pub fn add_casedb(&mut self) -> Result<()> {
        self.add_instance(CASEDB_INSTANCE.0, CASEDB_INSTANCE.1)
    }

    /// XPath guard of a case action.
    pub fn action_relevance(&self, condition: &Condition) -> Result<String> {
        Ok(match condition {
            Condition::Always => "true()".to_string(),
            Condition::Never => "false()".to_string(),
            Condition::If {
                question,
                operator,
                answer,
            } => {
                let path = self.resolve(question)?;
                match operator {
                    ConditionOperator::Equals => format!("{} = '{}'", path, answer),
                    ConditionOperator::Selected => format!("selected({}, '{}')", path, answer),
                    ConditionOperator::BooleanTrue => path,
                }
            }
        })
    }

    fn existing_meta_blocks(&self) -> Result<Vec<NodeId>> {
        let data = self.data_node()?;
        let mut found = Vec::new();
        for path in ["{orx}meta", "{x}meta", "{orx}Meta", "{x}Meta"] {
            found.extend(self.find_all(data, path)?);
        }
        Ok(found)
    }

    /// Replace any `<meta>` block with the standard one and its setvalues.
    /// Running this twice leaves exactly one block.
    pub fn add_meta(&mut self) -> Result<()> {
        for meta in self.existing_meta_blocks()? {
            self.tree.detach(meta);
        }
        self.add_instance(SESSION_INSTANCE.0, SESSION_INSTANCE.1)?;

        let data = self.data_node()?;
        let meta = self.tree.create_element(QName::new(Some(NS_OPENROSA), "meta"));
        self.tree.declare_namespace(meta, None, NS_OPENROSA);
        self.tree.declare_namespace(meta, Some("cc"), NS_COMMCARE);
        for tag in ["deviceID", "timeStart", "timeEnd", "username", "userID", "instanceID"] {
            let child = self.tree.create_element(QName::new(Some(NS_OPENROSA), tag));
            self.tree.append_child(meta, child);
        }
        let app_version = self.tree.create_element(QName::new(Some(NS_COMMCARE), "appVersion"));
        self.tree.append_child(meta, app_version);
        self.tree.append_child(data, meta);

        let ready = "xforms-ready";
        self.add_setvalue("meta/deviceID", &format!("{}/deviceid", SESSION_CONTEXT), ready, None)?;
        self.add_setvalue("meta/timeStart", "now()", ready, Some("xsd:dateTime"))?;
        self.add_setvalue("meta/timeEnd", "now()", "xforms-revalidate", Some("xsd:dateTime"))?;
        self.add_setvalue("meta/username", &format!("{}/username", SESSION_CONTEXT), ready, None)?;
        self.add_setvalue("meta/userID", &format!("{}/userid", SESSION_CONTEXT), ready, None)?;
        self.add_setvalue("meta/instanceID", "uuid()", ready, None)?;
        self.add_setvalue("meta/appVersion", &format!("{}/appversion", SESSION_CONTEXT), ready, None)?;
        log::debug!("meta block injected");
        Ok(())
    }

    fn preloaded_bind(&mut self, path: &str, value_type: &str, preload: &str, params: &str) -> Result<()> {
        let nodeset = self.resolve(path)?;
        self.add_bind(&nodeset, &[("type", value_type)])?;
        let bind = self
            .get_bind(&nodeset)?
            .ok_or_else(|| XFormError::BindNotFound(nodeset.clone()))?;
        self.tree
            .set_attribute(bind, QName::new(Some(NS_JAVAROSA), "preload"), preload);
        self.tree
            .set_attribute(bind, QName::new(Some(NS_JAVAROSA), "preloadParams"), params);
        Ok(())
    }

    /// Add the `<registration>` block of a user registration form, the
    /// `hq_tmp` guid scratch nodes and their binds. A form that already has
    /// a registration block is left alone.
    pub fn add_user_registration(&mut self, registration: &UserRegistration) -> Result<()> {
        let data = self.data_node()?;
        if self.find(data, "{reg}registration")?.is_some() {
            return Ok(());
        }
        let reg = |local: &str| QName::new(Some(NS_REGISTRATION), local);
        let block = self.tree.create_element(reg("registration"));
        self.tree.declare_namespace(block, None, NS_REGISTRATION);
        for local in ["username", "password", "uuid", "date", "registering_phone_id", "user_data"] {
            let child = self.tree.create_element(reg(local));
            self.tree.append_child(block, child);
            if local == "user_data" {
                for key in registration.data_paths.keys() {
                    let entry = self.tree.create_element_with(reg(key), &[("key", key.as_str())]);
                    self.tree.append_child(child, entry);
                }
            }
        }
        self.tree.append_child(data, block);

        let tmp_name = self.data_qname(HQ_TMP);
        let tmp = self.tree.create_element(tmp_name);
        for local in ["loadedguid", "freshguid"] {
            let name = self.data_qname(local);
            let child = self.tree.create_element(name);
            self.tree.append_child(tmp, child);
        }
        self.tree.append_child(data, tmp);

        for (key, path) in [
            ("username", registration.username_path.as_str()),
            ("password", registration.password_path.as_str()),
        ] {
            let source = self.resolve(path)?;
            self.add_bind(&format!("registration/{}", key), &[("calculate", source.as_str())])?;
            self.add_bind(&source, &[("required", "true()")])?;
        }

        let loaded = format!("{}/loadedguid", HQ_TMP);
        let fresh = format!("{}/freshguid", HQ_TMP);
        self.preloaded_bind("registration/date", "xsd:dateTime", "timestamp", "start")?;
        self.preloaded_bind("registration/registering_phone_id", "xsd:string", "property", "DeviceID")?;
        self.preloaded_bind(&loaded, "xsd:string", "user", "uuid")?;
        self.preloaded_bind(&fresh, "xsd:string", "uid", "general")?;

        let loaded = self.resolve(&loaded)?;
        let fresh = self.resolve(&fresh)?;
        let uuid = format!("if({l}='', {f}, {l})", l = loaded, f = fresh);
        self.add_bind(
            "registration/uuid",
            &[("type", "xsd:string"), ("calculate", uuid.as_str())],
        )?;

        for (key, path) in &registration.data_paths {
            let source = self.resolve(path)?;
            self.add_bind(
                &format!("registration/user_data/{}", key),
                &[("calculate", source.as_str())],
            )?;
        }
        log::debug!("user registration block added");
        Ok(())
    }
}
