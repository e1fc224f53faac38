use xformcase::{Question, QuestionOptions, XForm, XFormError};

fn form(data: &str, binds: &str, body: &str) -> String {
    format!(
        r#"<h:html xmlns:h="http://www.w3.org/1999/xhtml" xmlns="http://www.w3.org/2002/xforms" xmlns:jr="http://openrosa.org/javarosa" xmlns:vellum="http://commcarehq.org/xforms/vellum">
  <h:head>
    <h:title>Test</h:title>
    <model>
      <instance>
        <data xmlns="http://openrosa.org/formdesigner/TEST" uiVersion="1" version="1" name="Test">{data}</data>
      </instance>
      <instance id="items" src="jr://fixture/items"/>
      {binds}
      <itext>
        <translation lang="en" default="">
          <text id="question1-label"><value>Question 1</value></text>
          <text id="color-blue"><value>Blue</value></text>
        </translation>
        <translation lang="fr">
          <text id="question1-label"><value>Question un</value></text>
          <text id="color-blue"><value>Bleu</value></text>
        </translation>
      </itext>
    </model>
  </h:head>
  <h:body>{body}</h:body>
</h:html>"#
    )
}

fn values(questions: &[Question]) -> Vec<&str> {
    questions.iter().map(|q| q.value.as_str()).collect()
}

#[test]
fn single_text_question() {
    let xml = form(
        "<question1/>",
        r#"<bind nodeset="/data/question1" type="xsd:string"/>"#,
        r#"<input ref="/data/question1"><label ref="jr:itext('question1-label')"/></input>"#,
    );
    let xform = XForm::parse(&xml).unwrap();
    let questions = xform.get_questions(&["en"], &QuestionOptions::default()).unwrap();
    assert_eq!(questions.len(), 1);
    let q = &questions[0];
    assert_eq!(q.value, "/data/question1");
    assert_eq!(q.repeat, None);
    assert_eq!(q.group, None);
    assert_eq!(q.question_type.as_deref(), Some("Text"));
    assert_eq!(q.label, "Question 1");
    assert_eq!(q.tag, "input");
    assert_eq!(q.hashtag_value, "#form/question1");
}

#[test]
fn labels_follow_language_preference() {
    let xml = form(
        "<question1/>",
        "",
        r#"<input ref="/data/question1"><label ref="jr:itext('question1-label')"/></input>"#,
    );
    let xform = XForm::parse(&xml).unwrap();
    let fr = xform.get_questions(&["fr"], &QuestionOptions::default()).unwrap();
    assert_eq!(fr[0].label, "Question un");
    let fallback = xform.get_questions(&["de"], &QuestionOptions::default()).unwrap();
    assert_eq!(fallback[0].label, "Question 1");

    let opts = QuestionOptions {
        include_translations: true,
        ..Default::default()
    };
    let translated = xform.get_questions(&["en"], &opts).unwrap();
    let translations = translated[0].translations.as_ref().unwrap();
    assert_eq!(translations["en"], "Question 1");
    assert_eq!(translations["fr"], "Question un");
}

#[test]
fn repeat_prefix_does_not_capture_sibling() {
    let xml = form(
        "<rep><child/></rep><rep_count/>",
        r#"<bind nodeset="/data/rep_count" calculate="count(/data/rep)"/>"#,
        r#"<group><label>People</label>
             <repeat nodeset="/data/rep">
               <input ref="/data/rep/child"><label>Child</label></input>
             </repeat>
           </group>"#,
    );
    let xform = XForm::parse(&xml).unwrap();
    let questions = xform.get_questions(&[], &QuestionOptions::default()).unwrap();
    assert_eq!(values(&questions), vec!["/data/rep/child", "/data/rep_count"]);

    let child = &questions[0];
    assert_eq!(child.repeat.as_deref(), Some("/data/rep"));
    assert_eq!(child.group.as_deref(), Some("/data/rep"));

    let count = &questions[1];
    assert_eq!(count.tag, "hidden");
    assert_eq!(count.question_type.as_deref(), Some("DataBindOnly"));
    assert_eq!(count.repeat, None);
    assert_eq!(count.group, None);
    assert_eq!(count.calculate.as_deref(), Some("count(/data/rep)"));
}

#[test]
fn groups_and_triggers_are_opt_in() {
    let xml = form(
        "<grp><q/></grp><note/>",
        r#"<bind nodeset="/data/grp/q" type="xsd:int" required="true()"/>"#,
        r#"<group ref="/data/grp"><label>Group</label>
             <input ref="/data/grp/q"><label>Age</label></input>
           </group>
           <trigger ref="/data/note" appearance="minimal"><label>Note</label></trigger>"#,
    );
    let xform = XForm::parse(&xml).unwrap();

    let plain = xform.get_questions(&[], &QuestionOptions::default()).unwrap();
    assert_eq!(values(&plain), vec!["/data/grp/q"]);
    assert_eq!(plain[0].group.as_deref(), Some("/data/grp"));
    assert_eq!(plain[0].question_type.as_deref(), Some("Int"));
    assert!(plain[0].required);

    let opts = QuestionOptions {
        include_groups: true,
        include_triggers: true,
        ..Default::default()
    };
    let all = xform.get_questions(&[], &opts).unwrap();
    assert_eq!(values(&all), vec!["/data/grp", "/data/grp/q", "/data/note"]);
    assert_eq!(all[0].question_type.as_deref(), Some("Group"));
    assert_eq!(all[2].question_type.as_deref(), Some("Label"));
}

#[test]
fn select_options_use_inline_or_itext_labels() {
    let xml = form(
        "<color/>",
        "",
        r#"<select1 ref="/data/color"><label>Color</label>
             <item><label>Red</label><value>red</value></item>
             <item><label ref="jr:itext('color-blue')"/><value>blue</value></item>
           </select1>"#,
    );
    let xform = XForm::parse(&xml).unwrap();
    let questions = xform.get_questions(&["fr"], &QuestionOptions::default()).unwrap();
    let options = questions[0].options.as_ref().unwrap();
    let pairs: Vec<(&str, &str)> = options
        .iter()
        .map(|o| (o.label.as_str(), o.value.as_str()))
        .collect();
    assert_eq!(pairs, vec![("Red", "red"), ("Bleu", "blue")]);
    assert_eq!(questions[0].question_type.as_deref(), Some("Select"));
}

#[test]
fn item_without_value_is_a_form_error() {
    let xml = form(
        "<color/>",
        "",
        r#"<select1 ref="/data/color"><label>Color</label><item><label>Red</label></item></select1>"#,
    );
    let xform = XForm::parse(&xml).unwrap();
    let err = xform.get_questions(&[], &QuestionOptions::default()).unwrap_err();
    assert!(matches!(err, XFormError::Form(_)));
}

#[test]
fn itemset_selects_report_their_fixture() {
    let xml = form(
        "<item/><other/>",
        "",
        r#"<select1 ref="/data/item"><label>Item</label>
             <itemset nodeset="instance('items')/items/item"><label ref="name"/><value ref="@id"/></itemset>
           </select1>
           <input ref="/data/other"><label>Other</label></input>"#,
    );
    let xform = XForm::parse(&xml).unwrap();

    let opts = QuestionOptions {
        include_fixtures: true,
        ..Default::default()
    };
    let questions = xform.get_questions(&[], &opts).unwrap();
    let source = questions[0].data_source.as_ref().unwrap();
    assert_eq!(source.instance_id.as_deref(), Some("items"));
    assert_eq!(source.instance_ref.as_deref(), Some("jr://fixture/items"));
    assert_eq!(source.nodeset, "instance('items')/items/item");
    assert_eq!(source.label_ref.as_deref(), Some("name"));
    assert_eq!(source.value_ref.as_deref(), Some("@id"));

    let opts = QuestionOptions {
        exclude_select_with_itemsets: true,
        ..Default::default()
    };
    let questions = xform.get_questions(&[], &opts).unwrap();
    assert_eq!(values(&questions), vec!["/data/other"]);
}

#[test]
fn hidden_then_case_attributes_in_order() {
    let xml = form(
        r#"<q/><calc/>
           <case xmlns="http://commcarehq.org/case/transaction/v2" case_id="" date_modified="" user_id="">
             <update><prop/></update>
           </case>"#,
        r#"<bind nodeset="/data/calc" calculate="/data/q" vellum:comment="derived"/>
           <setvalue event="xforms-ready" ref="/data/q" value="'x'"/>"#,
        r#"<input ref="/data/q"><label>Q</label></input>"#,
    );
    let xform = XForm::parse(&xml).unwrap();
    let questions = xform.get_questions(&[], &QuestionOptions::default()).unwrap();
    assert_eq!(
        values(&questions),
        vec![
            "/data/q",
            "/data/calc",
            "/data/case/update/prop",
            "/data/case/@case_id",
            "/data/case/@user_id",
            "/data/case/@date_modified",
        ]
    );
    assert_eq!(questions[0].setvalue.as_deref(), Some("'x'"));
    assert_eq!(questions[1].comment.as_deref(), Some("derived"));
    assert!(questions[3..].iter().all(|q| q.tag == "hidden"));
}

#[test]
fn questions_serialize_with_wire_names() {
    let xml = form(
        "<question1/>",
        "",
        r#"<input ref="/data/question1"><label>Q</label></input>"#,
    );
    let xform = XForm::parse(&xml).unwrap();
    let questions = xform.get_questions(&[], &QuestionOptions::default()).unwrap();
    let json = serde_json::to_value(&questions[0]).unwrap();
    assert_eq!(json["type"], "Text");
    assert_eq!(json["hashtagValue"], "#form/question1");
    assert!(json.get("calculate").is_none());
}

#[test]
fn control_without_reference_is_rejected() {
    let xml = form("<q/>", "", "<input><label>Q</label></input>");
    let xform = XForm::parse(&xml).unwrap();
    assert!(matches!(
        xform.get_questions(&[], &QuestionOptions::default()),
        Err(XFormError::Form(_))
    ));
}
