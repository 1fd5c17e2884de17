mod common;
use common::create_test_vm;
use php_vm::vm::engine::VmError;
use php_vm::vm::executor::{ExecutionConfig, execute_code_with_config};

#[test]
fn test_instruction_budget_stops_infinite_loop() {
    let config = ExecutionConfig {
        max_instructions: 10_000,
        ..create_test_vm()
    };
    let result = execute_code_with_config("<?php while (true) {}", config);
    match result {
        Err(VmError::ResourceLimit(msg)) => assert!(msg.contains("10000"), "{msg}"),
        other => panic!("expected resource limit, got {:?}", other.map(|r| r.stdout)),
    }
}

#[test]
fn test_timeout_stops_long_running_script() {
    let config = ExecutionConfig {
        timeout_ms: 50,
        ..create_test_vm()
    };
    let result = execute_code_with_config("<?php $i = 0; while (true) { $i++; }", config);
    assert!(matches!(result, Err(VmError::ResourceLimit(_))));
}

#[test]
fn test_resource_limit_is_not_catchable() {
    let config = ExecutionConfig {
        max_instructions: 5_000,
        ..create_test_vm()
    };
    let result = execute_code_with_config(
        r#"<?php
        try {
            while (true) {}
        } catch (Throwable $e) {
            echo "caught";
        } finally {
            echo "finally";
        }
    "#,
        config,
    );
    assert!(matches!(result, Err(VmError::ResourceLimit(_))));
}

#[test]
fn test_scripts_within_budget_complete() {
    let config = ExecutionConfig {
        max_instructions: 1_000_000,
        enable_profiling: true,
        ..create_test_vm()
    };
    let result = execute_code_with_config(
        "<?php function f($n) { return $n; } $s = 0; for ($i = 0; $i < 100; $i++) { $s += f($i); } echo $s;",
        config,
    )
    .expect("script should finish");
    assert_eq!(result.stdout, "4950");
    assert!(result.opcodes_executed.is_some_and(|n| n > 100));
    assert_eq!(result.function_calls, Some(100));
}

#[test]
fn test_profiling_is_off_by_default() {
    let result = execute_code_with_config("<?php echo 1;", create_test_vm()).unwrap();
    assert!(result.opcodes_executed.is_none());
    assert!(result.function_calls.is_none());
}
