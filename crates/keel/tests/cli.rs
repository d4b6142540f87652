use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn ping_answers_pong() {
    Command::cargo_bin("keel")
        .unwrap()
        .arg("--ping")
        .assert()
        .success()
        .stdout(predicate::str::contains("pong"));
}

#[test]
fn check_summarizes_a_descriptor_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.unit");
    std::fs::write(
        &path,
        r#"{
            "units": [
                {"name": "a", "factory": "probe"},
                {"name": "b", "factory": "probe", "depends": ["a"]}
            ]
        }"#,
    )
    .unwrap();

    Command::cargo_bin("keel")
        .unwrap()
        .arg("check")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 unit(s)"))
        .stdout(predicate::str::contains("depends on a"));
}

#[test]
fn check_rejects_malformed_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.unit");
    std::fs::write(&path, "{not json").unwrap();

    Command::cargo_bin("keel")
        .unwrap()
        .arg("check")
        .arg(&path)
        .assert()
        .failure();
}
