mod common;
use common::{output_of, run_code, uncaught};
use php_vm::core::value::Val;

#[test]
fn test_recursion() {
    let val = run_code(
        r#"<?php
        function fib($n) { return $n < 2 ? $n : fib($n - 1) + fib($n - 2); }
        return fib(20);
    "#,
    );
    assert!(matches!(val, Val::Int(6765)));
}

#[test]
fn test_function_hoisting_and_conditional_declaration() {
    let out = output_of(
        r#"<?php
        echo early(), " ";
        function early() { return "hoisted"; }
        if (true) {
            function late() { return "declared"; }
        }
        echo late();
    "#,
    );
    assert_eq!(out, "hoisted declared");
}

#[test]
fn test_defaults_named_and_variadic_arguments() {
    let out = output_of(
        r#"<?php
        function greet($greeting, $name = "you", $punct = "!") {
            return "$greeting $name$punct";
        }
        function total(int $base, int ...$rest) { return $base + array_sum($rest); }
        echo greet("Hi"), " ", greet("Yo", punct: "?"), " ", greet(name: "Ann", greeting: "Hey"), " ";
        echo total(1), " ", total(1, 2, 3), " ", total(...[4, 5, 6]);
    "#,
    );
    assert_eq!(out, "Hi you! Yo you? Hey Ann! 1 6 15");
}

#[test]
fn test_by_reference_parameters() {
    let out = output_of(
        r#"<?php
        function addOne(&$x) { $x++; }
        function append(array &$list, $v) { $list[] = $v; }
        $n = 1;
        addOne($n);
        $items = [];
        append($items, 'a');
        append($items, 'b');
        $matrix = ['row' => [1]];
        addOne($matrix['row'][0]);
        echo $n, count($items), $matrix['row'][0];
    "#,
    );
    assert_eq!(out, "222");
}

#[test]
fn test_closures_capture_by_value_and_reference() {
    let out = output_of(
        r#"<?php
        $x = 1;
        $byVal = function () use ($x) { return $x; };
        $byRef = function () use (&$x) { return $x; };
        $x = 2;
        echo $byVal(), $byRef();
        $counter = function () { static $c = 0; return ++$c; };
        $counter(); $counter();
        echo $counter();
        $adder = fn($y) => $x + $y;
        $x = 100;
        echo " ", $adder(5);
    "#,
    );
    assert_eq!(out, "123 7");
}

#[test]
fn test_first_class_callable_syntax() {
    let out = output_of(
        r#"<?php
        class Math {
            public function __construct(private int $factor) {}
            public function scale($v) { return $v * $this->factor; }
            public static function square($v) { return $v * $v; }
        }
        $len = strlen(...);
        $scale = (new Math(3))->scale(...);
        $square = Math::square(...);
        echo $len("four"), " ", $scale(2), " ", $square(5), " ";
        echo implode(",", array_map($square, [1, 2, 3])), " ";
        echo get_class($len);
    "#,
    );
    assert_eq!(out, "4 6 25 1,4,9 Closure");
}

#[test]
fn test_callable_forms() {
    let out = output_of(
        r#"<?php
        class Greeter {
            public function hello($n) { return "hello $n"; }
            public static function hi($n) { return "hi $n"; }
            public function __invoke($n) { return "invoked $n"; }
        }
        $g = new Greeter;
        echo call_user_func('strtoupper', 'a'), "|";
        echo call_user_func([$g, 'hello'], 'b'), "|";
        echo call_user_func(['Greeter', 'hi'], 'c'), "|";
        echo call_user_func('Greeter::hi', 'd'), "|";
        echo call_user_func($g, 'e'), "|";
        echo call_user_func_array(fn($a, $b) => "$a-$b", ['b' => 2, 'a' => 1]);
        var_dump(is_callable([$g, 'nope']), is_callable('strlen'));
    "#,
    );
    assert_eq!(
        out,
        "A|hello b|hi c|hi d|invoked e|1-2bool(false)\nbool(true)\n"
    );
}

#[test]
fn test_func_get_args() {
    let out = output_of(
        r#"<?php
        function collect() { return func_num_args() . ":" . implode(",", func_get_args()); }
        echo collect(1, 2, 3);
    "#,
    );
    assert_eq!(out, "3:1,2,3");
}

#[test]
fn test_missing_argument_is_argument_count_error() {
    let (class, message) = uncaught(
        r#"<?php
        function needs($a, $b) { return $a; }
        needs(1);
    "#,
    );
    assert_eq!(class, "ArgumentCountError");
    assert!(message.starts_with("Too few arguments to function needs(), 1 passed"), "{message}");

    let (class, message) = uncaught(
        r#"<?php
        function needs($a, $b) { return $a; }
        needs(b: 2);
    "#,
    );
    assert_eq!(class, "ArgumentCountError");
    assert_eq!(message, "needs(): Argument #1 ($a) not passed");
}

#[test]
fn test_undefined_function_is_an_error() {
    let (class, message) = uncaught("<?php nothing_here();");
    assert_eq!(class, "Error");
    assert_eq!(message, "Call to undefined function nothing_here()");
}

#[test]
fn test_coercive_parameter_types() {
    let out = output_of(
        r#"<?php
        function typed(int $i, float $f, string $s, ?bool $b = null): string {
            return var_export([$i, $f, $s, $b], true);
        }
        echo typed("5", 2, 3.5);
    "#,
    );
    assert_eq!(out, "array (\n  0 => 5,\n  1 => 2.0,\n  2 => '3.5',\n  3 => NULL,\n)");
}

#[test]
fn test_invalid_argument_type_is_type_error() {
    let (class, message) = uncaught(
        r#"<?php
        function typed(int $i) { return $i; }
        typed("abc");
    "#,
    );
    assert_eq!(class, "TypeError");
    assert!(
        message.starts_with("typed(): Argument #1 ($i) must be of type int, string given"),
        "{message}"
    );
}

#[test]
fn test_return_type_is_checked() {
    let (class, message) = uncaught(
        r#"<?php
        function bad(): int { return []; }
        bad();
    "#,
    );
    assert_eq!(class, "TypeError");
    assert_eq!(message, "bad(): Return value must be of type int, array returned");
}

#[test]
fn test_closure_bind_and_call() {
    let out = output_of(
        r#"<?php
        class Secret { private $value = 'hidden'; }
        $peek = function () { return $this->value; };
        echo Closure::bind($peek, new Secret, Secret::class)(), " ";
        echo $peek->call(new Secret), " ";
        $bound = $peek->bindTo(new Secret, Secret::class);
        echo $bound();
    "#,
    );
    assert_eq!(out, "hidden hidden hidden");
}

#[test]
fn test_deep_recursion_hits_call_depth_limit() {
    let config = php_vm::vm::executor::ExecutionConfig {
        max_call_depth: 64,
        ..common::create_test_vm()
    };
    let result = php_vm::vm::executor::execute_code_with_config(
        "<?php function down($n) { return down($n + 1); } down(0);",
        config,
    );
    assert!(matches!(result, Err(php_vm::vm::engine::VmError::ResourceLimit(_))));
}
