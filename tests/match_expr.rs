mod common;
use common::{output_of, run_code, string_of, uncaught};

#[test]
fn test_match_selects_arm_by_strict_equality() {
    let val = run_code(r#"<?php return match(5 + 5) { 6 => "a", 10 => "b", default => "c" };"#);
    assert_eq!(string_of(&val), b"b");

    let val = run_code(r#"<?php return match("10") { 10 => "int", "10" => "string", default => "none" };"#);
    assert_eq!(string_of(&val), b"string");
}

#[test]
fn test_match_condition_lists_and_default() {
    let out = output_of(
        r#"<?php
        function size($n) {
            return match($n) {
                1, 2, 3 => "small",
                4, 5 => "medium",
                default => "large",
            };
        }
        echo size(2), size(5), size(100);
    "#,
    );
    assert_eq!(out, "smallmediumlarge");
}

#[test]
fn test_match_true_with_conditions() {
    let out = output_of(
        r#"<?php
        function grade($score) {
            return match(true) {
                $score >= 90 => "A",
                $score >= 80 => "B",
                default => "F",
            };
        }
        echo grade(95), grade(85), grade(10);
    "#,
    );
    assert_eq!(out, "ABF");
}

#[test]
fn test_match_evaluates_subject_once_and_arms_lazily() {
    let out = output_of(
        r#"<?php
        function subject() { echo "subject "; return 2; }
        function arm($v) { echo "arm$v "; return $v; }
        $r = match(subject()) {
            arm(1) => "one",
            arm(2) => "two",
            arm(3) => "three",
        };
        echo $r;
    "#,
    );
    assert_eq!(out, "subject arm1 arm2 two");
}

#[test]
fn test_unhandled_match_throws() {
    let (class, message) = uncaught(r#"<?php $x = 2; echo match($x) { 1 => "a" };"#);
    assert_eq!(class, "UnhandledMatchError");
    assert_eq!(message, "Unhandled match case 2");

    let (_, message) = uncaught(r#"<?php echo match("foo") { "bar" => 1 };"#);
    assert_eq!(message, "Unhandled match case 'foo'");
}

#[test]
fn test_unhandled_match_is_catchable() {
    let out = output_of(
        r#"<?php
        try {
            echo match([1]) { [2] => "no" };
        } catch (\UnhandledMatchError $e) {
            echo get_class($e), ": ", $e->getMessage();
        }
    "#,
    );
    assert_eq!(out, "UnhandledMatchError: Unhandled match case of type array");
}

#[test]
fn test_match_arm_can_throw() {
    let out = output_of(
        r#"<?php
        function parse($t) {
            return match($t) {
                "int" => 1,
                default => throw new InvalidArgumentException("unknown $t"),
            };
        }
        try { parse("x"); } catch (InvalidArgumentException $e) { echo $e->getMessage(); }
    "#,
    );
    assert_eq!(out, "unknown x");
}
