mod common;
use common::{create_test_vm, output_of, uncaught};
use php_vm::vm::engine::VmError;
use php_vm::vm::executor::{ExecutionConfig, execute_code_with_config};

#[test]
fn test_strict_mode_rejects_scalar_coercion() {
    let (class, message) = uncaught(
        r#"<?php
        declare(strict_types=1);
        function add(int $a, int $b): int { return $a + $b; }
        echo add("1", 2);
    "#,
    );
    assert_eq!(class, "TypeError");
    assert!(
        message.starts_with("add(): Argument #1 ($a) must be of type int, string given"),
        "{message}"
    );
}

#[test]
fn test_strict_mode_allows_int_to_float_widening() {
    let out = output_of(
        r#"<?php
        declare(strict_types=1);
        function half(float $x): float { return $x / 2; }
        var_dump(half(3));
    "#,
    );
    assert_eq!(out, "float(1.5)\n");
}

#[test]
fn test_strict_mode_checks_return_values() {
    let (class, message) = uncaught(
        r#"<?php
        declare(strict_types=1);
        function label(): string { return 42; }
        label();
    "#,
    );
    assert_eq!(class, "TypeError");
    assert_eq!(message, "label(): Return value must be of type string, int returned");
}

#[test]
fn test_coercive_mode_converts_numeric_strings() {
    let out = output_of(
        r#"<?php
        function add(int $a, int $b): int { return $a + $b; }
        function text(): string { return 42; }
        var_dump(add("1", 2.0), text(), strlen(123));
    "#,
    );
    assert_eq!(out, "int(3)\nstring(2) \"42\"\nint(3)\n");
}

#[test]
fn test_nullable_union_and_class_types() {
    let out = output_of(
        r#"<?php
        declare(strict_types=1);
        class Box {}
        function describe(int|string|null $v, ?Box $b = null, iterable $it = []): string {
            return gettype($v) . ($b === null ? "" : "+box") . count($it);
        }
        echo describe(1), " ", describe("s", new Box, [1, 2]), " ", describe(null);
    "#,
    );
    assert_eq!(out, "integer0 string+box2 NULL0");
}

#[test]
fn test_class_type_mismatch() {
    let (class, message) = uncaught(
        r#"<?php
        class Cat {}
        class Dog {}
        function pet(Cat $c) {}
        pet(new Dog);
    "#,
    );
    assert_eq!(class, "TypeError");
    assert!(message.starts_with("pet(): Argument #1 ($c) must be of type Cat, Dog given"), "{message}");
}

#[test]
fn test_strict_override_from_config() {
    let config = ExecutionConfig {
        strict_types: true,
        ..create_test_vm()
    };
    let result = execute_code_with_config(
        "<?php function f(int $x) { return $x; } return f('5');",
        config,
    );
    match result {
        Err(VmError::Exception(exc)) => assert_eq!(exc.class, "TypeError"),
        other => panic!("expected TypeError, got {:?}", other.map(|r| r.stdout)),
    }
}

#[test]
fn test_typed_properties_are_checked() {
    let out = output_of(
        r#"<?php
        class Account {
            public int $balance = 0;
            public ?string $owner = null;
        }
        $a = new Account;
        $a->balance = "15";
        var_dump($a->balance);
        try {
            $a->balance = "lots";
        } catch (TypeError $e) {
            echo $e->getMessage();
        }
    "#,
    );
    assert_eq!(
        out,
        "int(15)\nCannot assign string to property Account::$balance of type int"
    );
}
