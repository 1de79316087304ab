/// Integration tests for the promptl-parser debugging binary

use std::process::Command;

fn promptl_parser() -> Command {
    Command::new(env!("CARGO_BIN_EXE_promptl-parser"))
}

#[test]
fn test_expression_mode() {
    let output = promptl_parser().args(["--expr", "a + 1"]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Binary: +"), "stdout: {}", stdout);
    assert!(stdout.contains("  Identifier: a"), "stdout: {}", stdout);
}

#[test]
fn test_expression_error_has_position() {
    let output = promptl_parser().args(["--expr", "1 = 2"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("<expr>:1:1"), "stderr: {}", stderr);
    assert!(stderr.contains("invalid-assignment"), "stderr: {}", stderr);
}

#[test]
fn test_usage() {
    let output = promptl_parser().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--expr"));
}
