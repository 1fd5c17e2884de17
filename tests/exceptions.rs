mod common;
use common::{output_of, run_partial, uncaught};
use php_vm::vm::engine::VmError;

#[test]
fn test_try_catch_finally_order() {
    let out = output_of(
        r#"<?php
        try {
            echo "try ";
            throw new Exception("boom");
            echo "unreachable ";
        } catch (Exception $e) {
            echo "catch(", $e->getMessage(), ") ";
        } finally {
            echo "finally";
        }
    "#,
    );
    assert_eq!(out, "try catch(boom) finally");
}

#[test]
fn test_inner_finally_runs_before_outer_catch() {
    let out = output_of(
        r#"<?php
        try {
            try {
                echo "body ";
                throw new RuntimeException("x");
            } finally {
                echo "inner-finally ";
            }
        } catch (RuntimeException $e) {
            echo "outer-catch ";
        } finally {
            echo "outer-finally";
        }
    "#,
    );
    assert_eq!(out, "body inner-finally outer-catch outer-finally");
}

#[test]
fn test_catch_matches_by_class_hierarchy_and_union() {
    let out = output_of(
        r#"<?php
        class AppException extends Exception {}
        class NotFound extends AppException {}
        function attempt($e) {
            try {
                throw $e;
            } catch (InvalidArgumentException | NotFound $x) {
                return "union:" . get_class($x);
            } catch (AppException $x) {
                return "app";
            } catch (Throwable $x) {
                return "any:" . get_class($x);
            }
        }
        echo attempt(new NotFound), " ", attempt(new InvalidArgumentException), " ";
        echo attempt(new AppException), " ", attempt(new TypeError);
    "#,
    );
    assert_eq!(out, "union:NotFound union:InvalidArgumentException app any:TypeError");
}

#[test]
fn test_exception_unwinds_through_frames() {
    let out = output_of(
        r#"<?php
        function level3() { throw new LogicException("deep", 42); }
        function level2() { try { level3(); } finally { echo "cleanup2 "; } }
        function level1() { level2(); echo "not reached"; }
        try {
            level1();
        } catch (LogicException $e) {
            echo get_class($e), ":", $e->getMessage(), ":", $e->getCode(), ":", $e->getLine();
        }
    "#,
    );
    assert_eq!(out, "cleanup2 LogicException:deep:42:2");
}

#[test]
fn test_finally_return_overrides_try_return() {
    let out = output_of(
        r#"<?php
        function f() {
            try {
                return "try";
            } finally {
                echo "finally ";
            }
        }
        function g() {
            try {
                return "try";
            } finally {
                return "finally";
            }
        }
        function h() {
            try {
                throw new Exception("lost");
            } finally {
                return "swallowed";
            }
        }
        echo f(), " ", g(), " ", h();
    "#,
    );
    assert_eq!(out, "finally try finally swallowed");
}

#[test]
fn test_finally_runs_on_break_and_continue() {
    let out = output_of(
        r#"<?php
        for ($i = 0; $i < 3; $i++) {
            try {
                if ($i == 0) continue;
                if ($i == 2) break;
                echo "body$i ";
            } finally {
                echo "f$i ";
            }
        }
    "#,
    );
    assert_eq!(out, "f0 body1 f1 f2 ");
}

#[test]
fn test_exception_in_finally_replaces_pending() {
    let out = output_of(
        r#"<?php
        try {
            try {
                throw new Exception("first");
            } finally {
                throw new Exception("second");
            }
        } catch (Exception $e) {
            echo $e->getMessage(), " prev=", $e->getPrevious()?->getMessage() ?? "none";
        }
    "#,
    );
    assert_eq!(out, "second prev=first");
}

#[test]
fn test_rethrow_and_previous_chain() {
    let out = output_of(
        r#"<?php
        function load() {
            try {
                throw new RuntimeException("disk");
            } catch (RuntimeException $e) {
                throw new LogicException("load failed", 1, $e);
            }
        }
        try {
            load();
        } catch (Exception $e) {
            echo $e->getMessage(), " <- ", $e->getPrevious()->getMessage(), " ", get_class($e->getPrevious());
        }
    "#,
    );
    assert_eq!(out, "load failed <- disk RuntimeException");
}

#[test]
fn test_throw_as_expression() {
    let out = output_of(
        r#"<?php
        function need($v) { return $v ?? throw new InvalidArgumentException("missing"); }
        try { echo need(1), " "; need(null); } catch (InvalidArgumentException $e) { echo $e->getMessage(); }
    "#,
    );
    assert_eq!(out, "1 missing");
}

#[test]
fn test_engine_errors_are_catchable() {
    let out = output_of(
        r#"<?php
        try { echo 1 % 0; } catch (DivisionByZeroError $e) { echo get_class($e), ":", $e->getMessage(), " "; }
        try { echo intdiv(1, 0); } catch (ArithmeticError $e) { echo "arith "; }
        try { null_fn(); } catch (Error $e) { echo $e->getMessage(), " "; }
        try { $x = null; $x->method(); } catch (Error $e) { echo $e->getMessage(); }
    "#,
    );
    assert_eq!(
        out,
        "DivisionByZeroError:Modulo by zero arith Call to undefined function null_fn() Call to a member function method() on null"
    );
}

#[test]
fn test_uncaught_exception_surfaces_diagnostic() {
    let (result, out) = run_partial(
        r#"<?php
        echo "before ";
        function fail() { throw new DomainException("bad domain"); }
        fail();
        echo "after";
    "#,
    );
    assert_eq!(out, "before ");
    match result {
        Err(VmError::Exception(exc)) => {
            assert_eq!(exc.class, "DomainException");
            assert_eq!(exc.message, "bad domain");
            assert_eq!(exc.line, 3);
            assert!(exc.trace.contains("fail()"), "{}", exc.trace);
            let text = exc.to_string();
            assert!(text.starts_with("PHP Fatal error:  Uncaught DomainException: bad domain in test.php:3"), "{text}");
        }
        other => panic!("expected uncaught exception, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_exception_to_string_and_trace() {
    let out = output_of(
        r#"<?php
        function thrower() { throw new Exception("msg"); }
        try { thrower(); } catch (Exception $e) {
            echo count($e->getTrace()), " ", $e->getTrace()[0]['function'], "\n";
            echo $e;
        }
    "#,
    );
    let mut lines = out.lines();
    assert_eq!(lines.next(), Some("1 thrower"));
    assert_eq!(lines.next(), Some("Exception: msg in Standard input code:2"));
    assert_eq!(lines.next(), Some("Stack trace:"));
    assert!(lines.next().is_some_and(|l| l.starts_with("#0 ") && l.contains("thrower()")));
    assert_eq!(lines.next(), Some("#1 {main}"));
}

#[test]
fn test_throwing_non_object_is_error() {
    let (class, message) = uncaught("<?php throw 'text';");
    assert_eq!(class, "Error");
    assert_eq!(message, "Can only throw objects");
}

#[test]
fn test_error_exception_severity() {
    let out = output_of(
        r#"<?php
        $e = new ErrorException("warn", 0, E_WARNING);
        echo $e->getSeverity() === E_WARNING ? "ok" : "bad";
        var_dump($e instanceof Exception);
    "#,
    );
    assert_eq!(out, "okbool(true)\n");
}

#[test]
fn test_user_exception_with_custom_constructor() {
    let out = output_of(
        r#"<?php
        class HttpException extends Exception {
            public function __construct(private int $status, string $message = "") {
                parent::__construct($message ?: "HTTP $status", $status);
            }
            public function status() { return $this->status; }
        }
        try { throw new HttpException(404); }
        catch (HttpException $e) { echo $e->status(), " ", $e->getMessage(), " ", $e->getCode(); }
    "#,
    );
    assert_eq!(out, "404 HTTP 404 404");
}
