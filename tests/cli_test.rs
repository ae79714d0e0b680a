//! CLI end-to-end tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn rxtest() -> Command {
    Command::new(assert_cmd::cargo_bin!("rxtest"))
}

/// Write `script` to a file in a fresh temp dir.
fn script_file(script: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("testinput");
    fs::write(&path, script).unwrap();
    (dir, path)
}

#[test]
fn test_help() {
    rxtest().arg("--help").assert().success();
}

#[test]
fn test_version() {
    rxtest()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rxtest"));
}

#[test]
fn test_script_file_is_echoed() {
    let (_dir, path) = script_file("/b+/\nabbbc\n\n/x/\nabc\n");
    rxtest()
        .arg("-q")
        .arg(&path)
        .assert()
        .success()
        .stdout("/b+/\nabbbc\n 0: bbb\n\n/x/\nabc\nNo match\n");
}

#[test]
fn test_banner_unless_quiet() {
    let (_dir, path) = script_file("/a/\na\n");
    rxtest()
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("rxtest version "))
        .stdout(predicate::str::ends_with("/a/\na\n 0: a\n"));
}

#[test]
fn test_stdin_is_not_echoed() {
    rxtest()
        .arg("-q")
        .write_stdin("/a/\nxay\n")
        .assert()
        .success()
        .stdout(" 0: a\n\n");
}

#[test]
fn test_output_file() {
    let (dir, path) = script_file("/c/\nabc\n");
    let out = dir.path().join("testoutput");
    rxtest().arg("-q").arg(&path).arg(&out).assert().success().stdout("");
    assert_eq!(fs::read_to_string(&out).unwrap(), "/c/\nabc\n 0: c\n");
}

#[test]
fn test_missing_input_file() {
    rxtest()
        .arg("/nonexistent/testinput")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open /nonexistent/testinput"))
        .stderr(predicate::str::contains("\"error\":true"));
}

#[test]
fn test_global_empty_matches() {
    let (_dir, path) = script_file("//g\naa\n");
    rxtest()
        .arg("-q")
        .arg(&path)
        .assert()
        .success()
        .stdout("//g\naa\n 0: \n 0: \n 0: \n");
}

#[test]
fn test_compile_failure_skips_data() {
    let (_dir, path) = script_file("/(a/\na\n\n/a/\na\n");
    rxtest()
        .arg("-q")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Failed: error"))
        .stdout(predicate::str::ends_with("a\n\n/a/\na\n 0: a\n"));
}

#[test]
fn test_info_option() {
    let (_dir, path) = script_file("/abc/\n");
    rxtest()
        .args(["-q", "-i"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Capturing subpattern count = 0\n"))
        .stdout(predicate::str::contains("First code unit = 'a'\n"));
}

#[test]
fn test_default_pattern_modifiers() {
    let (_dir, path) = script_file("/b/\nabc\n");
    rxtest()
        .args(["-q", "--pattern", "aftertext"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::ends_with(" 0: b\n 0+ c\n"));
}

#[test]
fn test_bad_default_modifiers() {
    let (_dir, path) = script_file("/b/\nabc\n");
    rxtest()
        .args(["-q", "--pattern", "bogus"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_MODIFIER"));
}

#[test]
fn test_sixteen_bit_width() {
    let (_dir, path) = script_file("/\\x{1234}/utf\n\\x{1234}\n");
    rxtest()
        .args(["-q", "-w", "16"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::ends_with(" 0: \\x{1234}\n"));
}

#[test]
fn test_load_is_unsupported() {
    let (_dir, path) = script_file("#load saved\n/a/\na\n");
    rxtest()
        .arg("-q")
        .arg(&path)
        .assert()
        .failure()
        .stdout("#load saved\n** #load not yet implemented\n")
        .stderr(predicate::str::contains("UNSUPPORTED_COMMAND"));
}

#[test]
fn test_config_report() {
    rxtest()
        .arg("-C")
        .assert()
        .success()
        .stdout(predicate::str::contains("\nCompiled with\n"))
        .stdout(predicate::str::contains("  16-bit support\n"))
        .stdout(predicate::str::contains("  Internal link size = 2\n"));
}

#[test]
fn test_config_report_json() {
    rxtest()
        .args(["-C", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"link_size\": 2"));
}

#[test]
fn test_config_item_exit_code() {
    rxtest().args(["-C", "linksize"]).assert().code(2).stdout("2\n");
    rxtest().args(["-C", "jit"]).assert().code(0).stdout("0\n");
    rxtest().args(["-C", "newline"]).assert().success().stdout("LF\n");
}

#[test]
fn test_config_unknown_item() {
    rxtest()
        .args(["-C", "nosuch"])
        .assert()
        .code(255)
        .stderr("** Unknown -C option 'nosuch'\n");
}

#[test]
fn test_invalid_width() {
    rxtest().args(["-w", "64"]).assert().failure();
}
