use xformcase::parser::FormValidator;
use xformcase::{CaseActionModel, QuestionOptions, XForm, XFormError};

const FORM: &str = r#"<h:html xmlns:h="http://www.w3.org/1999/xhtml" xmlns="http://www.w3.org/2002/xforms" xmlns:jr="http://openrosa.org/javarosa">
  <h:head>
    <model>
      <instance><data xmlns="http://openrosa.org/formdesigner/DOC"><name/><note/></data></instance>
      <bind nodeset="/data/note" calculate="concat('Hi ', /data/name)"/>
      <itext>
        <translation lang="en" default="">
          <text id="name-label"><value>Your <output value="/data/name"/> &amp; more</value></text>
        </translation>
      </itext>
    </model>
  </h:head>
  <h:body>
    <input ref="/data/name"><label ref="jr:itext('name-label')"/></input>
  </h:body>
</h:html>"#;

#[test]
fn referenced_entities_are_rejected() {
    let xml = format!(
        "<?xml version=\"1.0\"?>\n<!DOCTYPE h:html [<!ENTITY greeting \"hello\">]>\n{}",
        FORM.replace("<name/>", "<name>&greeting;</name>")
    );
    assert!(matches!(
        XForm::parse(&xml),
        Err(XFormError::DangerousContent(_))
    ));
}

#[test]
fn unreferenced_entity_declarations_are_accepted() {
    let xml = format!(
        "<?xml version=\"1.0\"?>\n<!DOCTYPE h:html [<!ENTITY greeting \"hello\">]>\n{}",
        FORM
    );
    let form = XForm::parse(&xml).unwrap();
    assert_eq!(form.data_root_tag().unwrap(), "data");
}

#[test]
fn malformed_xml_is_a_parse_error() {
    assert!(matches!(
        XForm::parse("<h:html><unclosed></h:html>"),
        Err(XFormError::Parse(_))
    ));
}

#[test]
fn missing_model_is_reported_on_access() {
    let form = XForm::parse(r#"<h:html xmlns:h="http://www.w3.org/1999/xhtml"><h:body/></h:html>"#)
        .unwrap();
    assert_eq!(form.model_node(), Err(XFormError::MissingNode("<model>")));
    assert!(form.get_languages().is_empty());
}

#[test]
fn render_then_parse_keeps_questions() {
    let form = XForm::parse(FORM).unwrap();
    let opts = QuestionOptions::default();
    let before = form.get_questions(&["en"], &opts).unwrap();
    let reparsed = XForm::parse(&form.render_string()).unwrap();
    assert_eq!(reparsed.get_questions(&["en"], &opts).unwrap(), before);
    assert_eq!(before[0].label, "Your ____ & more");
}

#[test]
fn rendered_output_keeps_mixed_content_inline() {
    let xml = XForm::parse(FORM).unwrap().render_string();
    assert!(xml.starts_with("<?xml version='1.0' encoding='UTF-8'?>"));
    assert!(xml.contains(r#"<value>Your <output value="/data/name"/> &amp; more</value>"#));
    assert!(xml.contains(r#"calculate="concat('Hi ', /data/name)""#));
}

#[test]
fn synthesized_form_survives_a_round_trip() {
    let mut form = XForm::parse(FORM).unwrap();
    let model: CaseActionModel = serde_json::from_str(
        r#"{"case_type": "person", "actions": [
            {"type": "open_case", "name_path": "/data/name"},
            {"type": "update_case", "update": {"note": "/data/note"}}
        ]}"#,
    )
    .unwrap();
    form.add_case_and_meta(&model).unwrap();
    let opts = QuestionOptions::default();
    let before = form.get_questions(&[], &opts).unwrap();
    let reparsed = XForm::parse(&form.render_string()).unwrap();
    assert_eq!(reparsed.get_questions(&[], &opts).unwrap(), before);
    assert!(reparsed.case_node().is_ok());
}

#[test]
fn version_is_written_on_the_data_root() {
    let mut form = XForm::parse(FORM).unwrap();
    form.set_version(12).unwrap();
    assert!(form.render_string().contains(r#"<data xmlns="http://openrosa.org/formdesigner/DOC" version="12">"#));
}

struct RejectCases;

impl FormValidator for RejectCases {
    fn validate(&self, xml: &[u8]) -> Result<(), String> {
        let text = String::from_utf8_lossy(xml);
        if text.contains("<case") {
            Err("case blocks are not allowed here".to_string())
        } else {
            Ok(())
        }
    }
}

#[test]
fn external_validator_decides() {
    let mut form = XForm::parse(FORM).unwrap();
    form.validate(&RejectCases).unwrap();
    let model: CaseActionModel = serde_json::from_str(
        r#"{"case_type": "person", "actions": [{"type": "open_case", "name_path": "/data/name"}]}"#,
    )
    .unwrap();
    form.add_case_and_meta(&model).unwrap();
    assert_eq!(
        form.validate(&RejectCases),
        Err(XFormError::Validation("case blocks are not allowed here".into()))
    );
}
