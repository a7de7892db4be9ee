//! Runs the `stepcheck` binary against the bundled programs.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn programs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("programs")
}

fn stepcheck(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stepcheck"))
        .args(args)
        .output()
        .expect("failed to run stepcheck")
}

fn program(name: &str) -> String {
    programs_dir()
        .join(format!("{name}.json"))
        .display()
        .to_string()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn check_passing_program_exits_zero() {
    let out = stepcheck(&["check", &program("contended")]);
    assert_eq!(out.status.code(), Some(0), "{}", stdout(&out));
    let text = stdout(&out);
    assert!(text.contains("Result: OK"));
    assert!(text.contains("property holds"));
}

#[test]
fn check_deadlock_prints_path() {
    let out = stepcheck(&["check", &program("lock_order")]);
    assert_eq!(out.status.code(), Some(1));
    let text = stdout(&out);
    assert!(text.contains("Result: VIOLATION"));
    assert!(text.contains("deadlock"));
    assert!(text.contains("Path (4 steps):"));
    assert!(text.contains("1: schedule=T0 (1/2)"));
}

#[test]
fn check_flags_override_program() {
    let out = stepcheck(&["check", &program("lock_order"), "--no-deadlock"]);
    assert_eq!(out.status.code(), Some(0));

    let out = stepcheck(&["check", &program("handoff"), "--max-states", "2"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stdout(&out).contains("Result: INCOMPLETE"));
}

#[test]
fn check_with_heuristics() {
    for strategy in ["bfs", "most-blocked", "random"] {
        let out = stepcheck(&[
            "check",
            &program("missed_notify"),
            "--strategy",
            strategy,
            "--seed",
            "3",
        ]);
        assert_eq!(out.status.code(), Some(1), "{strategy}");
    }
}

#[test]
fn check_hash_only_labels_result() {
    let out = stepcheck(&["check", &program("allocation"), "--hash-only"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(stdout(&out).contains("hash-only"));
}

#[test]
fn fingerprint_prints_initial_state() {
    let out = stepcheck(&["fingerprint", &program("lock_order")]);
    assert_eq!(out.status.code(), Some(0));
    let text = stdout(&out);
    assert!(text.starts_with('('));
    assert!(text.contains("5001"));
    assert!(text.contains("digest:"));

    let again = stepcheck(&["fingerprint", &program("lock_order")]);
    assert_eq!(stdout(&again), text);
}

#[test]
fn fingerprint_exclusion_shortens_output() {
    let full = stepcheck(&["fingerprint", &program("contended")]);
    let trimmed = stepcheck(&["fingerprint", &program("contended"), "--exclude", "count"]);
    assert_eq!(trimmed.status.code(), Some(0));
    assert_ne!(stdout(&full), stdout(&trimmed));
}

#[test]
fn validate_all_programs() {
    for entry in fs::read_dir(programs_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|e| e == "json") {
            let out = stepcheck(&["validate", path.to_str().unwrap()]);
            assert_eq!(out.status.code(), Some(0), "{}", path.display());
            assert!(stdout(&out).contains("validate: ok"));
        }
    }
}

#[test]
fn validate_reports_parse_error() {
    let dir = std::env::temp_dir().join(format!("stepcheck-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let bad = dir.join("bad.json");
    fs::write(&bad, "{\n  \"threads\": [,]\n}\n").unwrap();

    let out = stepcheck(&["validate", bad.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("parse error"), "{err}");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_file_is_an_error() {
    let out = stepcheck(&["check", "/nonexistent/program.json"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("failed to read"));
}
