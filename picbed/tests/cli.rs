use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(config.path(), yaml).expect("Writing temp config failed");
    config
}

#[test]
fn backends_lists_every_builtin_id() {
    let mut cmd = Command::cargo_bin("picbed").expect("Binary exists");
    cmd.arg("backends");
    cmd.assert().success().stdout(
        predicate::str::contains("smms")
            .and(predicate::str::contains("qiniu"))
            .and(predicate::str::contains("aliyun"))
            .and(predicate::str::contains("gitee"))
            .and(predicate::str::contains("github")),
    );
}

#[test]
fn check_without_selection_resolves_to_smms() {
    let config = config_file("is_contain_img_name: true\n");
    let mut cmd = Command::cargo_bin("picbed").expect("Binary exists");
    cmd.arg("check").arg("--config").arg(config.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("smms"))
        .stderr(predicate::str::contains("No image host selected"));
}

#[test]
fn check_fails_for_incomplete_qiniu_settings() {
    let config = config_file(
        "image_hosting_type: qiniu\nqiniu_image_hosting:\n  accessKey: ak\n  secretKey: sk\n  bucket: images\n",
    );
    let mut cmd = Command::cargo_bin("picbed").expect("Binary exists");
    cmd.arg("check").arg("--config").arg(config.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("missing: domain"));
}

#[test]
fn check_accepts_complete_github_settings() {
    let config = config_file(
        "image_hosting_type: GitHub\ngithub_image_hosting:\n  username: alice\n  repo: pics\n  token: T\n  jsdelivr: true\n",
    );
    let mut cmd = Command::cargo_bin("picbed").expect("Binary exists");
    cmd.arg("check").arg("--config").arg(config.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("github"));
}

#[test]
fn check_reports_unreadable_config_file() {
    let mut cmd = Command::cargo_bin("picbed").expect("Binary exists");
    cmd.arg("check")
        .arg("--config")
        .arg("/definitely/not/here.yaml");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn upload_with_missing_image_fails_without_touching_the_document() {
    let config = config_file("image_hosting_type: smms\n");
    let document = NamedTempFile::new().expect("temp document");
    write(document.path(), "# Post\n").expect("write document");

    let mut cmd = Command::cargo_bin("picbed").expect("Binary exists");
    cmd.arg("upload")
        .arg("--config")
        .arg(config.path())
        .arg("--document")
        .arg(document.path())
        .arg("/definitely/not/here.png");
    cmd.assert().failure().stderr(
        predicate::str::contains("err invalid input: could not read /definitely/not/here.png")
            .and(predicate::str::contains("1 of 1 uploads failed")),
    );

    assert_eq!(std::fs::read_to_string(document.path()).unwrap(), "# Post\n");
}

#[test]
fn upload_requires_at_least_one_file() {
    let config = config_file("image_hosting_type: smms\n");
    let mut cmd = Command::cargo_bin("picbed").expect("Binary exists");
    cmd.arg("upload").arg("--config").arg(config.path());
    cmd.assert().failure();
}
