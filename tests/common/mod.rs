//! Common test helpers for php-vm tests
//!
//! Every helper parses, compiles and runs a full script (including the
//! `<?php` opening tag) through the same path the binaries use.

#![allow(dead_code)]

use php_vm::core::value::Val;
use php_vm::vm::engine::{CapturingOutputWriter, VM, VmError};
use php_vm::vm::executor::{ExecutionConfig, compile_source, execute_code, execute_code_with_config};
use std::cell::RefCell;
use std::rc::Rc;

/// Execute PHP code and return the value of its top-level `return`.
///
/// Panics if execution fails.
pub fn run_code(code: &str) -> Val {
    execute_code(code).expect("code execution failed").value
}

/// Test-friendly execution config: a longer timeout, output captured.
pub fn create_test_vm() -> ExecutionConfig {
    ExecutionConfig {
        timeout_ms: 10_000,
        capture_output: true,
        ..Default::default()
    }
}

/// Execute code and return both its return value and everything it printed.
pub fn run_code_capture_output(code: &str) -> Result<(Val, String), VmError> {
    let result = execute_code_with_config(code, create_test_vm())?;
    Ok((result.value, result.stdout))
}

/// Output of a script that must run without error.
pub fn output_of(code: &str) -> String {
    match run_code_capture_output(code) {
        Ok((_, out)) => out,
        Err(err) => panic!("code execution failed: {}", err),
    }
}

/// Runs a script on a bare VM, keeping the output produced before any error.
pub fn run_partial(code: &str) -> (Result<Val, VmError>, String) {
    let program = match compile_source(code.as_bytes(), "test.php") {
        Ok(program) => program,
        Err(err) => return (Err(err), String::new()),
    };
    let mut vm = VM::new(program);
    let captured = Rc::new(RefCell::new(Vec::new()));
    let sink = captured.clone();
    vm.set_output_writer(Box::new(CapturingOutputWriter::new(move |bytes| {
        sink.borrow_mut().extend_from_slice(bytes);
    })));
    let result = vm.run();
    let out = String::from_utf8_lossy(&captured.borrow()).into_owned();
    (result, out)
}

/// Class and message of the exception that escaped the script.
pub fn uncaught(code: &str) -> (String, String) {
    match run_partial(code).0 {
        Err(VmError::Exception(exc)) => (exc.class, exc.message),
        Err(other) => panic!("expected an uncaught exception, got {}", other),
        Ok(val) => panic!("expected an uncaught exception, script returned {:?}", val),
    }
}

/// Execute code and return both value and VM state.
pub fn run_code_with_vm(code: &str) -> Result<(Val, VM), VmError> {
    let program = compile_source(code.as_bytes(), "test.php")?;
    let mut vm = VM::new(program);
    vm.set_output_writer(Box::new(CapturingOutputWriter::new(|_| {})));
    let value = vm.run()?;
    Ok((value, vm))
}

/// Bytes of a string value.
pub fn string_of(val: &Val) -> Vec<u8> {
    match val {
        Val::String(s) => s.as_ref().clone(),
        other => panic!("expected string, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_code() {
        assert!(matches!(run_code("<?php return 42;"), Val::Int(42)));
    }

    #[test]
    fn test_create_test_vm() {
        let config = create_test_vm();
        assert_eq!(config.timeout_ms, 10_000);
        assert!(config.capture_output);
    }

    #[test]
    fn test_run_code_with_vm() {
        let (val, vm) = run_code_with_vm("<?php return 100;").unwrap();
        assert!(matches!(val, Val::Int(100)));
        assert_eq!(vm.exit_status, 0);
    }
}
