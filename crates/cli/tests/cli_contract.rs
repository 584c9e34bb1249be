use assert_cmd::cargo::cargo_bin_cmd;
use pdf_markup_core::{Annotation, Rect, Tool};
use pdf_markup_engine::{PdfDocument, LETTER};
use pdf_markup_storage::AnnotationRecord;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn blank_pdf(dir: &Path, pages: usize) -> PathBuf {
    let path = dir.join("blank.pdf");
    let bytes = PdfDocument::blank(&vec![LETTER; pages])
        .and_then(|mut doc| doc.save_to_vec())
        .expect("blank PDF should build");
    fs::write(&path, bytes).expect("fixture should be written");
    path
}

fn records_file(dir: &Path, annotations: &[Annotation]) -> PathBuf {
    let path = dir.join("annotations.json");
    let records: Vec<AnnotationRecord> = annotations
        .iter()
        .map(|a| AnnotationRecord::from_annotation(a).expect("fixture annotation is valid"))
        .collect();
    fs::write(&path, serde_json::to_vec(&records).unwrap()).unwrap();
    path
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should contain valid json")
}

#[test]
fn info_reports_every_page() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = blank_pdf(temp.path(), 2);

    let output = cargo_bin_cmd!("pdf-markup").arg("info").arg(&pdf).assert().success();
    let value = stdout_json(output.get_output());

    assert_eq!(value["page_count"], 2);
    assert_eq!(value["pages"][1]["width"], 612.0);
    assert_eq!(value["pages"][1]["height"], 792.0);
}

#[test]
fn info_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("pdf-markup")
        .arg("info")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    fs::write(&path, b"definitely not a pdf").unwrap();

    cargo_bin_cmd!("pdf-markup")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn export_stamps_annotations_into_copy() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = blank_pdf(temp.path(), 1);
    let rect = Annotation::new(Tool::Rectangle, Rect::new(100.0, 100.0, 80.0, 40.0), 0);
    let stray = Annotation::new(Tool::Oval, Rect::new(10.0, 10.0, 20.0, 20.0), 5);
    let annotations = records_file(temp.path(), &[rect, stray.clone()]);
    let out = temp.path().join("out").join("flattened.pdf");

    let assert = cargo_bin_cmd!("pdf-markup")
        .arg("export")
        .arg(&pdf)
        .arg(&annotations)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();
    let value = stdout_json(assert.get_output());

    assert_eq!(value["stamped"], 1);
    assert_eq!(value["skipped"][0]["id"], stray.id().to_string());
    let doc = PdfDocument::load_mem(&fs::read(&out).unwrap()).unwrap();
    assert_eq!(doc.image_count(0).unwrap(), 1);
}

#[test]
fn export_rejects_malformed_annotations_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = blank_pdf(temp.path(), 1);
    let annotations = temp.path().join("annotations.json");
    fs::write(&annotations, b"{ nope").unwrap();

    cargo_bin_cmd!("pdf-markup")
        .arg("export")
        .arg(&pdf)
        .arg(&annotations)
        .arg("-o")
        .arg(temp.path().join("out.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed annotations file"));
}

#[test]
fn migrate_writes_current_records() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let legacy = temp.path().join("legacy.json");
    fs::write(
        &legacy,
        br#"{"annotations": [
            {"type": "freeText", "contents": "Hello"},
            {"type": "underline", "rect": [0, 0, 5, 5]}
        ]}"#,
    )
    .unwrap();
    let out = temp.path().join("records.json");

    let assert = cargo_bin_cmd!("pdf-markup")
        .arg("migrate")
        .arg(&legacy)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();
    let value = stdout_json(assert.get_output());
    assert_eq!(value["migrated"], 1);
    assert_eq!(value["dropped"][0]["index"], 1);

    let records: Vec<AnnotationRecord> = serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
    let text = records[0].to_annotation().unwrap();
    assert_eq!(text.tool(), Tool::Text);
    assert_eq!(text.properties().text, "Hello");
}

#[test]
fn inspect_counts_by_page_and_tool() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let annotations = records_file(
        temp.path(),
        &[
            Annotation::new(Tool::Rectangle, Rect::new(0.0, 0.0, 10.0, 10.0), 0),
            Annotation::new(Tool::Rectangle, Rect::new(20.0, 0.0, 10.0, 10.0), 0),
            Annotation::new(Tool::Note, Rect::new(0.0, 0.0, 24.0, 24.0), 3),
        ],
    );

    let assert = cargo_bin_cmd!("pdf-markup").arg("inspect").arg(&annotations).assert().success();
    let value = stdout_json(assert.get_output());

    assert_eq!(value["total"], 3);
    assert_eq!(value["unreadable"], 0);
    assert_eq!(value["pages"]["0"], 2);
    assert_eq!(value["pages"]["3"], 1);
    assert_eq!(value["tools"]["rectangle"], 2);
    assert_eq!(value["tools"]["note"], 1);
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("pdf-markup")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
