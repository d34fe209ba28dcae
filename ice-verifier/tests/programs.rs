// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use std::process::{Command, Output};

fn ice_verifier() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ice-verifier"));
    cmd.arg("--color=never");
    cmd
}

fn infer(program: &str, extra: &[&str]) -> Output {
    ice_verifier()
        .arg("infer")
        .arg("--solver=bounded")
        .arg("--bound-radius=3")
        .args(extra)
        .arg(format!("programs/{program}.json"))
        .output()
        .expect("could not run ice-verifier")
}

fn stdout(out: &Output) -> String {
    String::from_utf8(out.stdout.clone()).expect("non-utf8 output")
}

#[test]
fn safe_programs() {
    for program in ["counter", "straight_line", "flag"] {
        let out = infer(program, &[]);
        assert_eq!(out.status.code(), Some(0), "{program} should be safe");
        assert!(stdout(&out).starts_with("safe\n"), "{program}: {}", stdout(&out));
    }
}

#[test]
fn safe_programs_verified() {
    let out = infer("counter", &["--verify", "--atoms"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(stdout(&out).starts_with("safe\n"));
}

#[test]
fn concurrent() {
    let out = infer("counter", &["--learners=2", "--teachers=2", "--atoms"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(stdout(&out).starts_with("safe\n"));

    let out = infer("merge", &["--learners=2"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stdout(&out).starts_with("unsafe\n"));
}

#[test]
fn unsafe_program() {
    let out = infer("merge", &[]);
    assert_eq!(out.status.code(), Some(2), "merge should be unsafe");
    assert!(stdout(&out).starts_with("unsafe\n"));
}

#[test]
fn bounded_verdicts_are_marked() {
    let out = infer("counter", &[]);
    let lines: Vec<String> = stdout(&out).lines().take(2).map(str::to_string).collect();
    assert_eq!(
        lines,
        vec!["safe", "note: bounded solver, integers range over [-3, 3]"]
    );
}

#[test]
fn malformed_program() {
    let out = infer("unknown_location", &[]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8(out.stderr).expect("non-utf8 output");
    assert!(stderr.contains("unknown location loop"), "{stderr}");

    let out = infer("missing", &[]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn print_clauses() {
    let out = ice_verifier()
        .arg("print")
        .arg("programs/counter.json")
        .output()
        .expect("could not run ice-verifier");
    assert!(out.status.success());
    insta::assert_snapshot!(stdout(&out).trim_end(), @r###"
    loop heads: mid
    0: fact entry -> mid: true & (x@1 = 0) => inv_mid(x@1, y@0)
    1: inductive mid -> mid: inv_mid(x@0, y@0) & (y@1 = (y@0 + 1)) => inv_mid(x@0, y@1)
    2: query mid -> error: inv_mid(x@0, y@0) & (x@0 != 0) => false
    clause 0 -> clause 1
    clause 0 -> clause 2
    clause 1 -> clause 1
    clause 1 -> clause 2
    "###);
}
