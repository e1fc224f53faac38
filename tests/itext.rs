use xformcase::{XForm, XFormError};

const FORM: &str = r#"<h:html xmlns:h="http://www.w3.org/1999/xhtml" xmlns="http://www.w3.org/2002/xforms" xmlns:jr="http://openrosa.org/javarosa">
  <h:head>
    <model>
      <instance><data xmlns="http://openrosa.org/formdesigner/ITEXT"><a/><b/></data></instance>
      <itext>
        <translation lang="en" default="">
          <text id="a-label"><value>Same</value><value form="image">jr://file/a.png</value></text>
          <text id="b-label"><value>Same</value><value form="image">jr://file/a.png</value></text>
          <text id="c-label"><value>Name: <output value="/data/a"/></value><value form="audio">jr://file/c.mp3</value></text>
        </translation>
        <translation lang="hin">
          <text id="a-label"><value>Ek</value><value form="image">jr://file/a.png</value></text>
          <text id="b-label"><value>Ek</value><value form="image">jr://file/a.png</value></text>
          <text id="c-label"><value>Naam</value></text>
        </translation>
      </itext>
    </model>
  </h:head>
  <h:body>
    <input ref="/data/a"><label ref="jr:itext('a-label')"/></input>
    <input ref="/data/b"><label ref="jr:itext('b-label')"/></input>
  </h:body>
</h:html>"#;

#[test]
fn localize_by_language_and_form() {
    let xform = XForm::parse(FORM).unwrap();
    assert_eq!(xform.get_languages(), vec!["en", "hin"]);
    assert_eq!(
        xform.localize("a-label", Some("hin"), None).unwrap().as_deref(),
        Some("Ek")
    );
    assert_eq!(
        xform.localize("jr:itext('a-label')", None, None).unwrap().as_deref(),
        Some("Same")
    );
    assert_eq!(
        xform.localize("c-label", Some("en"), None).unwrap().as_deref(),
        Some("Name: ____")
    );
    assert_eq!(
        xform.localize("a-label", Some("en"), Some("image")).unwrap().as_deref(),
        Some("jr://file/a.png")
    );
}

#[test]
fn explicit_form_lookups_do_not_fall_back() {
    let xform = XForm::parse(FORM).unwrap();
    assert_eq!(xform.localize("c-label", Some("hin"), Some("audio")).unwrap(), None);
    assert_eq!(xform.localize("missing", Some("en"), None).unwrap(), None);
    assert_eq!(xform.localize("a-label", Some("fr"), None).unwrap(), None);
}

#[test]
fn media_references_by_form() {
    let xform = XForm::parse(FORM).unwrap();
    assert_eq!(xform.image_references().len(), 4);
    assert_eq!(xform.audio_references(), vec!["jr://file/c.mp3"]);
    assert!(xform.video_references().is_empty());
}

#[test]
fn duplicate_ids_collapse_to_lowest() {
    let mut xform = XForm::parse(FORM).unwrap();
    xform.normalize_itext().unwrap();
    let groups = xform.itext_groups().unwrap();
    assert!(groups.contains_key("a-label"));
    assert!(!groups.contains_key("b-label"));
    assert!(groups.contains_key("c-label"));

    let xml = xform.render_string();
    assert!(!xml.contains("b-label"));
    assert_eq!(xml.matches("jr:itext('a-label')").count(), 2);
}

#[test]
fn normalizing_unique_itext_changes_nothing() {
    let mut xform = XForm::parse(FORM).unwrap();
    xform.normalize_itext().unwrap();
    let once = xform.render_string();
    xform.normalize_itext().unwrap();
    assert_eq!(xform.render_string(), once);
}

#[test]
fn rename_language() {
    let mut xform = XForm::parse(FORM).unwrap();
    assert_eq!(
        xform.localize("a-label", Some("hin"), None).unwrap().as_deref(),
        Some("Ek")
    );
    xform.rename_language("hin", "hi").unwrap();
    assert_eq!(xform.get_languages(), vec!["en", "hi"]);
    assert_eq!(
        xform.localize("a-label", Some("hi"), None).unwrap().as_deref(),
        Some("Ek")
    );
    assert_eq!(xform.localize("a-label", Some("hin"), None).unwrap(), None);
}

#[test]
fn rename_to_existing_or_from_unknown_language_fails() {
    let mut xform = XForm::parse(FORM).unwrap();
    assert!(matches!(
        xform.rename_language("hin", "en"),
        Err(XFormError::Language(_))
    ));
    assert!(matches!(
        xform.rename_language("fr", "es"),
        Err(XFormError::Language(_))
    ));
}

#[test]
fn exclude_and_default_language() {
    let mut xform = XForm::parse(FORM).unwrap();
    xform.set_default_language("hin").unwrap();
    let xml = xform.render_string();
    assert!(xml.contains(r#"<translation lang="hin" default="">"#));
    assert!(xml.contains(r#"<translation lang="en">"#));

    xform.exclude_languages(&["hin"]).unwrap();
    assert_eq!(xform.get_languages(), vec!["hin"]);
    assert_eq!(xform.localize("a-label", Some("en"), None).unwrap(), None);
}

#[test]
fn duplicate_text_in_one_translation_is_rejected() {
    let xml = FORM.replace(
        r#"<text id="c-label"><value>Naam</value></text>"#,
        r#"<text id="c-label"><value>Naam</value></text><text id="c-label"><value>Again</value></text>"#,
    );
    let xform = XForm::parse(&xml).unwrap();
    assert!(matches!(
        xform.itext_groups(),
        Err(XFormError::DuplicateItext { .. })
    ));
}
