//! Black-box tests driving the `kiln` binary directly, the same way the old
//! `integration_*` suites exercised the CLI through `assert_cmd`.

use assert_cmd::Command;
use predicates::prelude::*;

fn kiln() -> Command {
    let mut cmd = Command::cargo_bin("kiln").unwrap();
    cmd.env("KILN_DATA_DIR", std::env::temp_dir().join(format!("kiln-cli-test-data-{}", std::process::id())));
    cmd.env("KILN_CACHE_DIR", std::env::temp_dir().join(format!("kiln-cli-test-cache-{}", std::process::id())));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn version_prints_bin_slash_semver() {
    kiln()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^kiln/\d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn help_with_no_args_lists_topics() {
    kiln()
        .assert()
        .success()
        .stdout(predicate::str::contains("update").and(predicate::str::contains("plugins")));
}

#[test]
fn help_flag_wins_over_an_unknown_command() {
    kiln()
        .args(["definitely-not-a-real-command", "--help"])
        .assert()
        .success();
}

#[test]
fn unknown_command_exits_127_with_suggestion() {
    kiln()
        .arg("updat")
        .assert()
        .code(127)
        .stderr(predicate::str::contains("did you mean"));
}

#[test]
fn plugins_list_runs_without_installed_plugins() {
    kiln().arg("plugins").assert().success();
}

#[test]
fn plugins_uninstall_accepts_its_unlink_alias() {
    kiln()
        .args(["unlink", "nonexistent-plugin"])
        .assert()
        .failure();
}
