mod common;
use common::output_of;
use php_vm::compiler::error::CompileError;
use php_vm::vm::engine::VmError;
use php_vm::vm::executor::execute_code;

#[test]
fn test_trait_methods_properties_and_static() {
    let out = output_of(
        r#"<?php
        trait Counter {
            private int $count = 0;
            public static $instances = 0;
            public function increment(): static { $this->count++; return $this; }
            public function count(): int { return $this->count; }
            public static function make(): static { static::$instances++; return new static; }
        }
        class Clicks { use Counter; }
        class Views { use Counter; }
        $c = Clicks::make()->increment()->increment();
        Views::make();
        Views::make();
        echo $c->count(), Clicks::$instances, Views::$instances, get_class($c);
    "#,
    );
    assert_eq!(out, "212Clicks");
}

#[test]
fn test_insteadof_and_alias() {
    let out = output_of(
        r#"<?php
        trait Hello { public function greet() { return "Hello"; } }
        trait Hi { public function greet() { return "Hi"; } }
        class Greeter {
            use Hello, Hi {
                Hi::greet insteadof Hello;
                Hello::greet as protected formal;
            }
            public function both() { return $this->greet() . "/" . $this->formal(); }
        }
        echo (new Greeter)->both();
    "#,
    );
    assert_eq!(out, "Hi/Hello");
}

#[test]
fn test_unresolved_conflict_is_compile_error() {
    let result = execute_code(
        r#"<?php
        trait A { public function run() {} }
        trait B { public function run() {} }
        class C { use A, B; }
    "#,
    );
    match result {
        Err(VmError::Compile(CompileError::TraitConflict { class, method, .. })) => {
            assert_eq!(class, "C");
            assert_eq!(method, "run");
        }
        other => panic!("expected trait conflict, got {:?}", other.map(|r| r.stdout)),
    }
}

#[test]
fn test_class_method_overrides_trait_and_trait_overrides_parent() {
    let out = output_of(
        r#"<?php
        class Base { public function who() { return "base"; } public function what() { return "base-what"; } }
        trait T {
            public function who() { return "trait"; }
            public function what() { return "trait-what"; }
            public function where() { return __TRAIT__ . " in " . self::class . " " . __CLASS__; }
        }
        class Child extends Base {
            use T;
            public function what() { return "child-what/" . parent::what(); }
        }
        $c = new Child;
        echo $c->who(), " ", $c->what(), " ", $c->where();
    "#,
    );
    assert_eq!(out, "trait child-what/base-what T in Child Child");
}

#[test]
fn test_abstract_trait_method_must_be_implemented() {
    let out = output_of(
        r#"<?php
        trait Describes {
            abstract public function name(): string;
            public function describe() { return "I am " . $this->name(); }
        }
        class Cat { use Describes; public function name(): string { return "cat"; } }
        echo (new Cat)->describe();
    "#,
    );
    assert_eq!(out, "I am cat");

    let result = execute_code(
        r#"<?php
        trait Describes { abstract public function name(): string; }
        class Rock { use Describes; }
    "#,
    );
    assert!(matches!(result, Err(VmError::Compile(CompileError::Inheritance { .. }))));
}

#[test]
fn test_traits_using_traits() {
    let out = output_of(
        r#"<?php
        trait Loud { public function shout($s) { return strtoupper($s); } }
        trait Polite { use Loud; public function ask($s) { return $this->shout("please $s"); } }
        class Speaker { use Polite; }
        echo (new Speaker)->ask("sit");
    "#,
    );
    assert_eq!(out, "PLEASE SIT");
}
