use assert_cmd::Command;

const BIN: &str = "trackectl";

/// Points `HOME` at a throwaway directory so a test run never touches the
/// developer's real configuration or measurement store.
fn isolated_cmd(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.env("HOME", home);
    cmd
}

#[test]
fn test_empty_args() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.assert().failure();
}

#[test]
fn test_help() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("-h").assert().success();
}

#[test]
fn test_version_keyword() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("help").assert().success();
}

#[test]
fn test_bad_keyword() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("bouh").assert().failure();
}

#[test]
fn test_version_subcommand() {
    let home = tempfile::tempdir().unwrap();
    isolated_cmd(home.path()).arg("version").assert().success();
}

#[test]
fn test_config() {
    let home = tempfile::tempdir().unwrap();
    isolated_cmd(home.path()).arg("config").assert().success();
}

#[test]
fn test_list_on_fresh_store() {
    let home = tempfile::tempdir().unwrap();
    isolated_cmd(home.path()).arg("list").assert().success();
}

#[test]
fn test_show_missing_measurement_fails() {
    let home = tempfile::tempdir().unwrap();
    isolated_cmd(home.path()).args(["show", "1"]).assert().failure();
}

#[test]
fn test_delete_missing_measurement_is_idempotent() {
    let home = tempfile::tempdir().unwrap();
    isolated_cmd(home.path()).args(["delete", "1"]).assert().success();
}

#[test]
fn test_simulate_then_show() {
    let home = tempfile::tempdir().unwrap();
    isolated_cmd(home.path()).args(["simulate", "WALKING", "--batches", "2"]).assert().success();
    isolated_cmd(home.path()).args(["show", "1"]).assert().success();
    isolated_cmd(home.path()).arg("list").assert().success();
}

#[test]
fn test_simulate_with_pause() {
    let home = tempfile::tempdir().unwrap();
    isolated_cmd(home.path())
        .args(["simulate", "RUNNING", "--batches", "4", "--with-pause"])
        .assert()
        .success();
}

#[test]
fn test_upload_without_collector_url_fails() {
    let home = tempfile::tempdir().unwrap();
    isolated_cmd(home.path()).args(["simulate", "CYCLING", "--batches", "1"]).assert().success();
    isolated_cmd(home.path()).args(["upload", "1"]).assert().failure();
}
