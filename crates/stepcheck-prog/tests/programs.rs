//! Checks every program under `programs/` at the workspace root.

use std::fs;
use std::path::{Path, PathBuf};
use stepcheck_mc::{SearchDriver, Verdict, ViolationKind};
use stepcheck_prog::{Program, ProgramInterpreter};

fn find_programs(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if dir.is_dir() {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                files.extend(find_programs(&path));
            } else if path.extension().is_some_and(|e| e == "json") {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn programs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("programs")
}

fn load(path: &Path) -> Program {
    let source = fs::read_to_string(path).unwrap();
    Program::from_json(&source).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn check(path: &Path) -> stepcheck_mc::SearchReport {
    let program = load(path);
    let config = program.config.clone().unwrap_or_default();
    let interp = ProgramInterpreter::new(program).unwrap();
    SearchDriver::new(interp, config)
        .run()
        .unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

#[test]
fn all_programs_load() {
    let files = find_programs(&programs_dir());
    assert!(!files.is_empty(), "no programs found in {:?}", programs_dir());

    let mut failures = Vec::new();
    for file in &files {
        let source = fs::read_to_string(file).unwrap();
        let loaded = Program::from_json(&source).and_then(ProgramInterpreter::new);
        if let Err(e) = loaded {
            failures.push(format!("{}: {e}", file.display()));
        }
    }
    if !failures.is_empty() {
        panic!("load failures:\n{}", failures.join("\n"));
    }
}

#[test]
fn all_programs_check() {
    for file in find_programs(&programs_dir()) {
        let report = check(&file);
        assert!(
            report.stats.unique_states > 0,
            "{}: no states explored",
            file.display()
        );
    }
}

#[test]
fn known_verdicts() {
    let dir = programs_dir();
    let expected = [
        ("allocation", Verdict::PropertyHolds, None),
        ("coin", Verdict::ViolationFound, Some(ViolationKind::AssertionFailed)),
        ("contended", Verdict::PropertyHolds, None),
        ("handoff", Verdict::PropertyHolds, None),
        ("lock_order", Verdict::ViolationFound, Some(ViolationKind::Deadlock)),
        ("missed_notify", Verdict::ViolationFound, Some(ViolationKind::Deadlock)),
    ];
    for (name, verdict, kind) in expected {
        let report = check(&dir.join(format!("{name}.json")));
        assert_eq!(report.verdict(), verdict, "{name}: {report}");
        assert_eq!(
            report.first_violation().map(|v| v.violation.kind),
            kind,
            "{name}"
        );
    }
}

#[test]
fn embedded_config_is_used() {
    let report = check(&programs_dir().join("coin.json"));
    // halt_on_first_error is off, but only the maximum roll fails.
    assert_eq!(report.violations.len(), 1);
    assert!(report.violations[0].violation.message.contains("maximum"));
}
