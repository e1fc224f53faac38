use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io::Write;
use tempfile::tempdir;
use xformcase::parser::{ContentSource, FsSource, ZipSource, archive_forms, list_forms, load_form};

const FORM: &str = r#"<h:html xmlns:h="http://www.w3.org/1999/xhtml" xmlns="http://www.w3.org/2002/xforms">
  <h:head><model><instance><data xmlns="http://openrosa.org/formdesigner/SRC"><q/></data></instance></model></h:head>
  <h:body><input ref="/data/q"><label>Q</label></input></h:body>
</h:html>"#;

fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

#[test]
fn loads_plain_form_file() {
    let tmp = tempdir().unwrap();
    let path = utf8(&tmp.path().join("form.xml"));
    fs::write(&path, FORM).unwrap();
    let form = load_form(path.as_str()).unwrap();
    assert_eq!(form.data_root_tag().unwrap(), "data");
}

#[test]
fn missing_file_has_context() {
    let tmp = tempdir().unwrap();
    let path = utf8(&tmp.path().join("nope.xml"));
    let err = load_form(path.as_str()).unwrap_err();
    assert!(format!("{:#}", err).contains("nope.xml"));
}

#[test]
fn loads_form_from_archive_member() {
    let tmp = tempdir().unwrap();
    let archive = utf8(&tmp.path().join("app.ccz"));
    {
        let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file("modules-0/forms-0.xml", options).unwrap();
        zip.write_all(FORM.as_bytes()).unwrap();
        zip.start_file("modules-0/forms-1.xml", options).unwrap();
        zip.write_all(FORM.as_bytes()).unwrap();
        zip.start_file("suite.xml", options).unwrap();
        zip.write_all(b"<suite/>").unwrap();
        zip.finish().unwrap();
    }

    let form = load_form(&format!("{}!modules-0/forms-0.xml", archive)).unwrap();
    assert_eq!(form.get_control_nodes().unwrap().len(), 1);

    let mut source = ZipSource::new(File::open(&archive).unwrap()).unwrap();
    let mut members = source.list_dir(Utf8Path::new("modules-0")).unwrap();
    members.sort();
    assert_eq!(
        members,
        vec![
            Utf8PathBuf::from("modules-0/forms-0.xml"),
            Utf8PathBuf::from("modules-0/forms-1.xml")
        ]
    );
    assert!(source.read_bytes(Utf8Path::new("missing.xml")).is_err());

    let mut locations = archive_forms(&archive).unwrap();
    locations.sort();
    assert_eq!(
        locations,
        vec![
            format!("{}!modules-0/forms-0.xml", archive),
            format!("{}!modules-0/forms-1.xml", archive),
            format!("{}!suite.xml", archive),
        ]
    );
    for location in &locations[..2] {
        assert!(load_form(location).is_ok());
    }
}

#[test]
fn fs_source_lists_files_only() {
    let tmp = tempdir().unwrap();
    let dir = utf8(tmp.path());
    fs::write(dir.join("a.xml"), FORM).unwrap();
    fs::create_dir(dir.join("sub")).unwrap();
    let files = FsSource.list_dir(&dir).unwrap();
    assert_eq!(files, vec![dir.join("a.xml")]);
    assert_eq!(FsSource.read_bytes(&dir.join("a.xml")).unwrap(), FORM.as_bytes());
}

#[test]
fn list_forms_keeps_xml_files() {
    let tmp = tempdir().unwrap();
    let dir = utf8(tmp.path());
    fs::write(dir.join("b.xml"), FORM).unwrap();
    fs::write(dir.join("a.xml"), FORM).unwrap();
    fs::write(dir.join("notes.txt"), "not a form").unwrap();
    let forms = list_forms(&mut FsSource, &dir).unwrap();
    assert_eq!(forms, vec![dir.join("a.xml"), dir.join("b.xml")]);
}
