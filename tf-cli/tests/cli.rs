use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn transfuse() -> Command {
    Command::cargo_bin("transfuse").unwrap()
}

#[test]
fn url64_diagnostic() {
    transfuse()
        .arg("--url64")
        .arg("foo")
        .assert()
        .success()
        .stdout("Zm9v\n");
}

#[test]
fn hash_diagnostics_are_stable() {
    let first = transfuse()
        .arg("--hash32")
        .arg("Hello")
        .output()
        .unwrap()
        .stdout;
    let second = transfuse()
        .arg("--hash32")
        .arg("Hello")
        .output()
        .unwrap()
        .stdout;
    assert_eq!(first, second);
    assert!(!first.is_empty());

    let h64 = transfuse()
        .arg("--hash64")
        .arg("Hello")
        .output()
        .unwrap()
        .stdout;
    assert_ne!(first, h64);
}

#[test]
fn extract_text_emits_apertium_stream() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    fs::write(&input, "hello stream\n").unwrap();
    let state = dir.path().join("state");

    transfuse()
        .arg("-m")
        .arg("extract")
        .arg("-f")
        .arg("text")
        .arg("-d")
        .arg(&state)
        .arg("-i")
        .arg(&input)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[transfuse:")
                .and(predicate::str::contains("[tf-block:1-"))
                .and(predicate::str::contains("hello stream")),
        );

    // The work dir holds the whole state set.
    for file in ["original", "styled.xml", "content.xml", "extracted", "state.sqlite3"] {
        assert!(state.join(file).exists(), "missing {file}");
    }
}

#[test]
fn clean_round_trips_text_from_stdin() {
    transfuse()
        .arg("-m")
        .arg("clean")
        .arg("-f")
        .arg("text")
        .write_stdin("hello world\n")
        .assert()
        .success()
        .stdout("hello world\n");
}

#[test]
fn clean_round_trips_html_fragment() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.html");
    fs::write(&input, "<p>Hello <b>bold</b> world.</p>").unwrap();

    transfuse()
        .arg("-m")
        .arg("clean")
        .arg("-f")
        .arg("html-fragment")
        .arg("-i")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("<p>Hello <b>bold</b> world.</p>"));
}

#[test]
fn extract_then_inject_via_dir() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.html");
    fs::write(&input, "<p>two step</p>").unwrap();
    let state = dir.path().join("state");
    let stream = dir.path().join("stream");
    let out = dir.path().join("out.fragment");

    transfuse()
        .arg("-m")
        .arg("extract")
        .arg("-f")
        .arg("html-fragment")
        .arg("-d")
        .arg(&state)
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&stream)
        .assert()
        .success();

    transfuse()
        .arg("-m")
        .arg("inject")
        .arg("-k")
        .arg("-i")
        .arg(&stream)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let result = fs::read_to_string(&out).unwrap();
    assert!(result.contains("<p>two step</p>"), "result: {result}");
    assert!(state.join("state.sqlite3").exists());
}

#[test]
fn unknown_mode_fails() {
    transfuse()
        .arg("-m")
        .arg("bogus")
        .write_stdin("x")
        .assert()
        .failure();
}

#[test]
fn unknown_stream_fails() {
    transfuse()
        .arg("-s")
        .arg("bogus")
        .write_stdin("x")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown stream format"));
}
