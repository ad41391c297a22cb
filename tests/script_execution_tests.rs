//! Unit scripts executed by the real shell runner.
//!
//! Package operations are recorded; scripts really run under bash and
//! leave evidence in a temporary directory.

mod common;

use common::{Recorder, HOSTNAME};
use packlist::{
    parse_document, Backend, Scheduler, Selection, SemaphoreStore, Sequencer, ShellScriptRunner,
    Step, UnitOutcome,
};
use std::fs;
use tempfile::TempDir;

fn run_document(doc: &str, recorder: &Recorder, semaphores: &SemaphoreStore) -> packlist::RunReport {
    let mut registry = parse_document(doc).unwrap();
    let scripts = ShellScriptRunner::default();
    let backend = Backend {
        scripts: &scripts,
        ..recorder.backend()
    };
    let installed = recorder.snapshot();
    let selection = Selection::default();
    let sequencer = Sequencer {
        backend,
        selection: &selection,
        installed: &installed,
        semaphores,
        hostname: HOSTNAME,
        dry_run: false,
    };
    Scheduler::new(sequencer, false)
        .run(&mut registry, |_| {})
        .unwrap()
}

#[test]
fn test_post_once_script_runs_once_across_runs() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("runs.log");
    let semaphores = SemaphoreStore::new(dir.path().join("semaphores"));
    let doc = format!(
        "docker:\n  flags: post_once\n  post: echo ran >> '{}'\n",
        log.display()
    );

    let recorder = Recorder::new();
    let first = run_document(&doc, &recorder, &semaphores);
    let second = run_document(&doc, &recorder, &semaphores);

    assert_eq!(first.completed(), 1);
    assert_eq!(second.completed(), 1);
    assert_eq!(fs::read_to_string(&log).unwrap(), "ran\n");
    assert!(dir.path().join("semaphores/docker.post_once").exists());
}

#[test]
fn test_failing_pre_script_fails_unit_without_marker() {
    let dir = TempDir::new().unwrap();
    let semaphores = SemaphoreStore::new(dir.path());
    let recorder = Recorder::new();

    let report = run_document(
        "flaky:\n  flags: once\n  pre: test -e /nonexistent/packlist-marker\nafter\n",
        &recorder,
        &semaphores,
    );

    let UnitOutcome::Failed { failure } = &report.units[0].outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.step, Step::PreScript);
    assert!(failure.message.contains("exit code 1"), "{}", failure.message);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    // The next unit still runs
    assert_eq!(recorder.calls(), vec!["reinstall after"]);
}

#[test]
fn test_continued_script_runs_each_statement() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.txt");
    let semaphores = SemaphoreStore::new(dir.path().join("semaphores"));
    let doc = format!(
        "tool:\n  flags: virtual\n  post: echo first > '{0}' && \\\n    echo second >> '{0}'\n",
        out.display()
    );

    let report = run_document(&doc, &Recorder::new(), &semaphores);

    assert_eq!(report.units[0].outcome, UnitOutcome::Completed);
    assert_eq!(fs::read_to_string(&out).unwrap(), "first\nsecond\n");
}
