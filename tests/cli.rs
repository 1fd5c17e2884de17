use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn php() -> Command {
    Command::new(env!("CARGO_BIN_EXE_php"))
}

fn script(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(source.as_bytes()).expect("write script");
    file
}

#[test]
fn test_runs_script_file_with_arguments() {
    let file = script("<?php echo count($argv), ':', $argv[1], ':', $argc;");
    let output = php().arg(file.path()).arg("first").output().expect("run php");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "2:first:2");
}

#[test]
fn test_run_code_flag() {
    let output = php().args(["-r", "echo strtoupper('cli');"]).output().expect("run php");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "CLI");
}

#[test]
fn test_exit_status_is_propagated() {
    let output = php().args(["-r", "echo 'x'; exit(7);"]).output().expect("run php");
    assert_eq!(output.status.code(), Some(7));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "x");
}

#[test]
fn test_uncaught_exception_reports_on_stderr() {
    let file = script("<?php\necho 'partial';\nthrow new RuntimeException('broken');\n");
    let output = php().arg(file.path()).output().expect("run php");
    assert_eq!(output.status.code(), Some(255));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "partial");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PHP Fatal error:  Uncaught RuntimeException: broken"), "{stderr}");
    assert!(stderr.contains("on line 3"), "{stderr}");
}

#[test]
fn test_parse_error_is_reported() {
    let file = script("<?php echo ;");
    let output = php().arg(file.path()).output().expect("run php");
    assert_eq!(output.status.code(), Some(255));
    assert!(String::from_utf8_lossy(&output.stderr).contains("PHP Parse error:"));
}

#[test]
fn test_instruction_budget_flag() {
    let output = php()
        .args(["--max-instructions", "5000", "-r", "while (true) {}"])
        .output()
        .expect("run php");
    assert_eq!(output.status.code(), Some(255));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Instruction budget"));
}

#[test]
fn test_dump_ast_prints_json() {
    let file = script("<?php echo 1 + 2;");
    let output = php().arg("--dump-ast").arg(file.path()).output().expect("run php");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert!(json.get("statements").is_some_and(|s| s.is_array()));
}

#[test]
fn test_missing_file_fails() {
    let output = php().arg("/nonexistent/script.php").output().expect("run php");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Could not open input file"));
}

#[test]
fn test_dump_bytecode_lists_functions() {
    let file = script("<?php function answer() { return 42; } echo answer();");
    let output = Command::new(env!("CARGO_BIN_EXE_dump_bytecode"))
        .arg(file.path())
        .output()
        .expect("run dump_bytecode");
    assert!(output.status.success());
    let listing = String::from_utf8_lossy(&output.stdout);
    assert!(listing.contains("answer"), "{listing}");
    assert!(listing.contains("{main}"), "{listing}");
}
