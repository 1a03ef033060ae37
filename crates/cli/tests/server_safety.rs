use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn serve_http_refuses_non_loopback_without_public() {
    let dir = tempfile::TempDir::new().unwrap();
    Command::new(assert_cmd::cargo::cargo_bin!("tagtidy"))
        .current_dir(dir.path())
        .args(["serve-http", "--bind", "0.0.0.0:0"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Refusing to bind"));
}

#[test]
fn serve_http_rejects_missing_dataset_root() {
    let dir = tempfile::TempDir::new().unwrap();
    Command::new(assert_cmd::cargo::cargo_bin!("tagtidy"))
        .current_dir(dir.path())
        .args(["serve-http", "--bind", "127.0.0.1:0", "--dataset-root", "nope"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Invalid dataset root"));
}
