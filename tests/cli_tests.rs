// Binary smoke tests: REPL, -e, and script execution.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn eval_flag_prints_the_result() {
    Command::cargo_bin("mallow")
        .unwrap()
        .args(["-e", "(+ 1 2)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));
}

#[test]
fn repl_reads_forms_from_stdin() {
    Command::cargo_bin("mallow")
        .unwrap()
        .write_stdin("(def! x 20)\n(+ x 1)\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("21"));
}

#[test]
fn parse_errors_do_not_kill_the_repl() {
    Command::cargo_bin("mallow")
        .unwrap()
        .write_stdin("(1 2\n(+ 2 2)\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("4"));
}

#[test]
fn scripts_run_with_argv_bound() {
    let path = std::env::temp_dir().join("mallow_cli_script_test.mal");
    std::fs::write(&path, "(prn (* 6 7)) (prn (count *ARGV*))").unwrap();
    Command::cargo_bin("mallow")
        .unwrap()
        .arg(&path)
        .args(["one", "two"])
        .assert()
        .success()
        .stdout(predicate::str::contains("42").and(predicate::str::contains("2")));
    let _ = std::fs::remove_file(&path);
}
