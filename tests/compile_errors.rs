use php_vm::compiler::error::CompileError;
use php_vm::vm::engine::VmError;
use php_vm::vm::executor::{compile_source, execute_code};

fn compile_error(source: &str) -> CompileError {
    match compile_source(source.as_bytes(), "test.php") {
        Err(VmError::Compile(err)) => err,
        Err(other) => panic!("expected compile error, got {}", other),
        Ok(_) => panic!("expected compile error, program compiled"),
    }
}

#[test]
fn test_break_outside_loop() {
    let err = compile_error("<?php\nif (true) {\n    break;\n}");
    match &err {
        CompileError::InvalidBreak { keyword, depth, at } => {
            assert_eq!(*keyword, "break");
            assert_eq!(*depth, 1);
            assert_eq!(at.line, 3);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.to_string().starts_with("'break' not in the 'loop' or 'switch' context"));
}

#[test]
fn test_continue_deeper_than_nesting() {
    let err = compile_error("<?php while (true) { continue 2; }");
    assert!(matches!(err, CompileError::InvalidBreak { keyword: "continue", depth: 2, .. }));
    assert!(err.to_string().starts_with("Cannot 'continue' 2 levels"));
}

#[test]
fn test_duplicate_declarations() {
    assert!(matches!(
        compile_error("<?php function a() {} function A() {}"),
        CompileError::Duplicate { what: "function", .. }
    ));
    assert!(matches!(
        compile_error("<?php class K {} class k {}"),
        CompileError::Duplicate { what: "class", .. }
    ));
    assert!(matches!(
        compile_error("<?php class K { function m() {} function M() {} }"),
        CompileError::Duplicate { .. }
    ));
}

#[test]
fn test_final_class_cannot_be_extended() {
    let err = compile_error("<?php final class F {} class G extends F {}");
    match err {
        CompileError::Inheritance { message, .. } => {
            assert!(message.contains("final class F"), "{message}");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_implementing_a_class_is_rejected() {
    let err = compile_error("<?php class NotAnInterface {} class C implements NotAnInterface {}");
    match err {
        CompileError::Inheritance { message, .. } => {
            assert_eq!(message, "C cannot implement NotAnInterface - it is not an interface");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_errors_carry_source_position() {
    let err = compile_error("<?php\n\n\nfunction x() {}\nfunction x() {}\n");
    assert_eq!(err.position().line, 5);
}

#[test]
fn test_syntax_errors_are_parse_errors() {
    let result = execute_code("<?php function (");
    match result {
        Err(VmError::Parse(msg)) => assert!(msg.contains("on line 1"), "{msg}"),
        other => panic!("expected parse error, got {:?}", other.map(|r| r.stdout)),
    }
}

#[test]
fn test_goto_is_not_supported() {
    assert!(matches!(execute_code("<?php goto end; end:"), Err(VmError::Parse(_))));
}

#[test]
fn test_well_formed_program_compiles_to_patched_jumps() {
    let program = compile_source(
        br#"<?php
        function loops($n) {
            $out = 0;
            for ($i = 0; $i < $n; $i++) {
                if ($i % 2) { continue; }
                while (true) { break; }
                try { $out += $i; } finally { $out++; }
            }
            return match(true) { $out > 10 => $out, default => 0 };
        }
        "#,
        "test.php",
    )
    .expect("compiles");
    let text = php_vm::compiler::disasm::disassemble(
        &program.interner,
        program.functions.values().next().expect("one function"),
    );
    assert!(text.contains("=== loops ==="), "{text}");
}
