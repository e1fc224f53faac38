use xformcase::dom::NodeId;
use xformcase::generator::{
    CaseBlock, CaseIDXPath, CaseXPath, CreateBlock, IndexRef, OwnerPolicy, UpdateOptions,
};
use xformcase::model::PropertyMap;
use xformcase::{CaseErrorKind, XForm};

const FORM: &str = r#"<h:html xmlns:h="http://www.w3.org/1999/xhtml" xmlns="http://www.w3.org/2002/xforms">
  <h:head>
    <model>
      <instance><data xmlns="http://openrosa.org/formdesigner/CASE"><name/><age/><dob/><photo/></data></instance>
      <bind nodeset="/data/photo" type="binary"/>
    </model>
  </h:head>
  <h:body>
    <input ref="/data/name"><label>Name</label></input>
    <input ref="/data/age"><label>Age</label></input>
    <input ref="/data/dob"><label>DOB</label></input>
    <upload ref="/data/photo" mediatype="image/*"><label>Photo</label></upload>
  </h:body>
</h:html>"#;

fn props(pairs: &[(&str, &str)]) -> PropertyMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn create<'a>(case_name: Option<&'a str>, case_type: &'a str) -> CreateBlock<'a> {
    CreateBlock {
        relevance: "true()",
        case_name,
        case_type,
        owner: OwnerPolicy::User,
        delay_case_id: false,
        make_relative: false,
    }
}

fn child_names(form: &XForm, node: NodeId) -> Vec<String> {
    form.tree()
        .child_elements(node)
        .map(|c| form.tree().tag_name(c).to_string())
        .collect()
}

fn bind_attr(form: &XForm, nodeset: &str, attr: &str) -> Option<String> {
    let bind = form.get_bind(nodeset).unwrap()?;
    form.tree().attr(bind, attr).map(str::to_string)
}

#[test]
fn create_block_is_a_singleton() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    block
        .add_create_block(&mut form, &create(Some("/data/name"), "patient"))
        .unwrap();
    let err = block
        .add_create_block(&mut form, &create(Some("/data/name"), "patient"))
        .unwrap_err();
    assert_eq!(err.case_kind(), Some(CaseErrorKind::DuplicateBlock));

    assert_eq!(child_names(&form, block.elem()), vec!["create"]);
    let create = form.tree().child_elements(block.elem()).next().unwrap();
    assert_eq!(child_names(&form, create), vec!["case_name", "owner_id", "case_type"]);
    assert_eq!(
        bind_attr(&form, "/data/case/create/case_name", "calculate").as_deref(),
        Some("/data/name")
    );
    assert_eq!(
        bind_attr(&form, "/data/case/create/owner_id", "calculate").as_deref(),
        Some("/data/meta/userID")
    );
    assert!(form.get_setvalue("/data/case/@case_id").unwrap().is_some());
}

#[test]
fn create_requires_name_and_type() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    let err = block.add_create_block(&mut form, &create(None, "patient")).unwrap_err();
    assert_eq!(err.case_kind(), Some(CaseErrorKind::MissingName));
    let err = block
        .add_create_block(&mut form, &create(Some("/data/name"), ""))
        .unwrap_err();
    assert_eq!(err.case_kind(), Some(CaseErrorKind::NoCaseType));
}

#[test]
fn close_block_is_a_singleton() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    block.add_close_block(&mut form, "true()").unwrap();
    let err = block.add_close_block(&mut form, "true()").unwrap_err();
    assert_eq!(err.case_kind(), Some(CaseErrorKind::DuplicateBlock));
}

#[test]
fn updates_accumulate_in_sorted_order() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    let opts = UpdateOptions::default();
    block
        .add_case_updates(&mut form, &props(&[("dob", "/data/dob"), ("age", "/data/age")]), &opts)
        .unwrap();
    block
        .add_case_updates(&mut form, &props(&[("name", "/data/name")]), &opts)
        .unwrap();

    assert_eq!(child_names(&form, block.elem()), vec!["update"]);
    let update = form.tree().child_elements(block.elem()).next().unwrap();
    assert_eq!(child_names(&form, update), vec!["age", "dob", "case_name"]);
    assert_eq!(
        bind_attr(&form, "/data/case/update/age", "relevant").as_deref(),
        Some("count(/data/age) > 0")
    );
}

#[test]
fn edit_guard_compares_with_current_value() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    let case: CaseXPath = CaseIDXPath::session().case();
    let opts = UpdateOptions {
        make_relative: false,
        edit_guard: Some(&case),
    };
    block
        .add_case_updates(&mut form, &props(&[("age", "/data/age")]), &opts)
        .unwrap();
    let relevant = bind_attr(&form, "/data/case/update/age", "relevant").unwrap();
    assert_eq!(
        relevant,
        format!("count(/data/age) > 0 and /data/age != {}", case.property("age"))
    );
}

#[test]
fn upload_properties_become_attachments() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    block
        .add_case_updates(
            &mut form,
            &props(&[("photo", "/data/photo"), ("age", "/data/age")]),
            &UpdateOptions::default(),
        )
        .unwrap();
    assert_eq!(child_names(&form, block.elem()), vec!["update", "attachment"]);
    let attachment = form.tree().child_elements(block.elem()).nth(1).unwrap();
    let photo = form.tree().child_elements(attachment).next().unwrap();
    assert_eq!(form.tree().attr(photo, "from"), Some("local"));
    assert_eq!(form.tree().attr(photo, "src"), Some(""));
    assert_eq!(
        bind_attr(&form, "/data/case/attachment/photo", "relevant").as_deref(),
        Some("count(/data/photo) = 1")
    );
    assert_eq!(
        bind_attr(&form, "/data/case/attachment/photo/@src", "calculate").as_deref(),
        Some("/data/photo")
    );
}

#[test]
fn index_relationships_are_validated() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    let index = |relationship: &'static str| IndexRef {
        reference_id: "host",
        case_type: "household",
        case_id: "instance('commcaresession')/session/data/case_id",
        relationship,
        relationship_question: None,
    };
    let err = block.add_index_ref(&mut form, &index("sibling")).unwrap_err();
    assert_eq!(err.case_kind(), Some(CaseErrorKind::InvalidRelationship));
    let err = block.add_index_ref(&mut form, &index("question")).unwrap_err();
    assert_eq!(err.case_kind(), Some(CaseErrorKind::InvalidRelationship));

    block.add_index_ref(&mut form, &index("extension")).unwrap();
    let index_node = form.tree().child_elements(block.elem()).next().unwrap();
    let host = form.tree().child_elements(index_node).next().unwrap();
    assert_eq!(form.tree().attr(host, "case_type"), Some("household"));
    assert_eq!(form.tree().attr(host, "relationship"), Some("extension"));
}

#[test]
fn relationship_answered_by_a_question() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    block
        .add_index_ref(
            &mut form,
            &IndexRef {
                reference_id: "parent",
                case_type: "household",
                case_id: "/data/name",
                relationship: "question",
                relationship_question: Some("/data/age"),
            },
        )
        .unwrap();
    assert_eq!(
        bind_attr(&form, "/data/case/index/parent/@relationship", "calculate").as_deref(),
        Some("/data/age")
    );
}

#[test]
fn owner_policies() {
    assert_eq!(OwnerPolicy::select(false, true), OwnerPolicy::Unowned);
    assert_eq!(OwnerPolicy::select(true, true), OwnerPolicy::CaseSharing);
    assert_eq!(OwnerPolicy::select(true, false), OwnerPolicy::User);

    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    let mut shared = create(Some("/data/name"), "patient");
    shared.owner = OwnerPolicy::CaseSharing;
    block.add_create_block(&mut form, &shared).unwrap();
    assert!(form.render_string().contains(r#"<instance id="groups" src="jr://fixture/user-groups"/>"#));
}

#[test]
fn relative_attachment_source_is_taken_from_each_bound_node() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "subcase_0/").unwrap();
    block
        .add_case_updates(
            &mut form,
            &props(&[("photo", "/data/photo")]),
            &UpdateOptions {
                make_relative: true,
                edit_guard: None,
            },
        )
        .unwrap();
    assert_eq!(
        bind_attr(&form, "/data/subcase_0/case/attachment/photo", "relevant").as_deref(),
        Some("count(../../../../photo) = 1")
    );
    assert_eq!(
        bind_attr(&form, "/data/subcase_0/case/attachment/photo/@src", "calculate").as_deref(),
        Some("../../../../../photo")
    );
}

#[test]
fn repeated_keys_keep_one_element() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    let opts = UpdateOptions::default();
    for _ in 0..2 {
        block
            .add_case_updates(
                &mut form,
                &props(&[("age", "/data/age"), ("photo", "/data/photo")]),
                &opts,
            )
            .unwrap();
    }
    block
        .add_case_updates(&mut form, &props(&[("age", "/data/dob")]), &opts)
        .unwrap();

    let mut parts = form.tree().child_elements(block.elem());
    let update = parts.next().unwrap();
    let attachment = parts.next().unwrap();
    assert_eq!(child_names(&form, update), vec!["age"]);
    assert_eq!(child_names(&form, attachment), vec!["photo"]);
    assert_eq!(
        bind_attr(&form, "/data/case/update/age", "calculate").as_deref(),
        Some("/data/dob")
    );
}

#[test]
fn edit_guard_declares_casedb() {
    let mut form = XForm::parse(FORM).unwrap();
    let mut block = CaseBlock::new(&mut form, "").unwrap();
    let case = CaseIDXPath::session().case();
    block
        .add_case_updates(
            &mut form,
            &props(&[("age", "/data/age")]),
            &UpdateOptions {
                make_relative: false,
                edit_guard: Some(&case),
            },
        )
        .unwrap();
    assert!(form.render_string().contains(r#"<instance id="casedb" src="jr://instance/casedb"/>"#));
}
