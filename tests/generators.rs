mod common;
use common::{output_of, run_code_with_vm, uncaught};
use php_vm::core::value::Val;

#[test]
fn test_simple_generator() {
    let (val, _vm) = run_code_with_vm(
        r#"<?php
        function gen() {
            yield 1;
            yield 2;
            yield 3;
        }
        $res = [];
        foreach (gen() as $v) {
            $res[] = $v;
        }
        return $res;
    "#,
    )
    .expect("Failed to execute code");

    if let Val::Array(arr) = val {
        assert_eq!(arr.len(), 3);
        assert!(matches!(arr.values().last(), Some(Val::Int(3))));
    } else {
        panic!("Expected array, got {:?}", val);
    }
}

#[test]
fn test_generator_protocol_and_return_value() {
    let out = output_of(
        r#"<?php
        function g() { echo "[start]"; yield 1; yield 2; return 3; }
        $gen = g();
        echo "created ";
        echo $gen->current(), " ";
        $gen->next();
        echo $gen->current(), " ";
        $gen->next();
        var_dump($gen->valid(), $gen->current(), $gen->getReturn());
        $gen->next();
        var_dump($gen->valid());
    "#,
    );
    assert_eq!(out, "created [start]1 2 bool(false)\nNULL\nint(3)\nbool(false)\n");
}

#[test]
fn test_generator_keys() {
    let out = output_of(
        r#"<?php
        function pairs() {
            yield 'a' => 1;
            yield 2;
            yield 10 => 3;
            yield 4;
        }
        foreach (pairs() as $k => $v) { echo "$k:$v "; }
    "#,
    );
    assert_eq!(out, "a:1 0:2 10:3 11:4 ");
}

#[test]
fn test_send_resumes_with_value() {
    let out = output_of(
        r#"<?php
        function accumulator() {
            $total = 0;
            while (true) {
                $x = yield $total;
                if ($x === null) { return $total; }
                $total += $x;
            }
        }
        $acc = accumulator();
        echo $acc->current(), " ";
        echo $acc->send(5), " ";
        echo $acc->send(10), " ";
        $acc->send(null);
        echo $acc->getReturn();
    "#,
    );
    assert_eq!(out, "0 5 15 15");
}

#[test]
fn test_send_before_start_runs_to_first_yield() {
    let out = output_of(
        r#"<?php
        function logger() {
            while (true) { $line = yield; echo "log: $line\n"; }
        }
        $l = logger();
        $l->send("one");
        $l->send("two");
    "#,
    );
    assert_eq!(out, "log: one\nlog: two\n");
}

#[test]
fn test_yield_from_delegates_and_returns() {
    let out = output_of(
        r#"<?php
        function inner() { yield 1; yield 2; return "inner-done"; }
        function outer() {
            $r = yield from inner();
            echo "[$r]";
            yield from [10, 20];
            yield 3;
            return "outer-done";
        }
        $g = outer();
        foreach ($g as $k => $v) { echo "$k=$v "; }
        echo $g->getReturn();
    "#,
    );
    assert_eq!(out, "0=1 1=2 [inner-done]0=10 1=20 0=3 outer-done");
}

#[test]
fn test_generator_throw() {
    let out = output_of(
        r#"<?php
        function guarded() {
            try {
                yield 1;
                yield 2;
            } catch (Exception $e) {
                echo "caught ", $e->getMessage(), " ";
                yield 99;
            }
        }
        $g = guarded();
        echo $g->current(), " ";
        echo $g->throw(new Exception("stop")), " ";
        $g->next();
        var_dump($g->valid());
    "#,
    );
    assert_eq!(out, "1 caught stop 99 bool(false)\n");
}

#[test]
fn test_exception_escapes_generator_to_consumer() {
    let out = output_of(
        r#"<?php
        function failing() { yield 1; throw new RuntimeException("gen failed"); }
        try {
            foreach (failing() as $v) { echo $v, " "; }
        } catch (RuntimeException $e) {
            echo $e->getMessage();
        }
    "#,
    );
    assert_eq!(out, "1 gen failed");
}

#[test]
fn test_destroying_suspended_generator_runs_finally() {
    let out = output_of(
        r#"<?php
        function resource() {
            echo "open ";
            try {
                yield 1;
                yield 2;
            } finally {
                echo "close ";
            }
        }
        foreach (resource() as $v) {
            echo "use$v ";
            break;
        }
        echo "after";
    "#,
    );
    assert_eq!(out, "open use1 close after");
}

#[test]
fn test_infinite_generator_with_limit() {
    let out = output_of(
        r#"<?php
        function naturals() { $i = 1; while (true) { yield $i++; } }
        $taken = [];
        foreach (naturals() as $n) {
            if ($n > 5) break;
            $taken[] = $n * $n;
        }
        echo implode(",", $taken);
    "#,
    );
    assert_eq!(out, "1,4,9,16,25");
}

#[test]
fn test_generator_methods_and_closures() {
    let out = output_of(
        r#"<?php
        class Tree {
            public function __construct(private $value, private array $children = []) {}
            public function walk() {
                yield $this->value;
                foreach ($this->children as $child) {
                    yield from $child->walk();
                }
            }
        }
        $t = new Tree(1, [new Tree(2, [new Tree(3)]), new Tree(4)]);
        echo implode(",", iterator_to_array($t->walk(), false)), " ";
        $squares = (function (array $xs) { foreach ($xs as $x) { yield $x => $x * $x; } })([2, 3]);
        var_dump(iterator_to_array($squares), $squares instanceof Traversable);
    "#,
    );
    assert_eq!(
        out,
        "1,2,3,4 array(2) {\n  [2]=>\n  int(4)\n  [3]=>\n  int(9)\n}\nbool(true)\n"
    );
}

#[test]
fn test_traversing_finished_generator_fails() {
    let (class, message) = uncaught(
        r#"<?php
        function once() { yield 1; }
        $g = once();
        foreach ($g as $v) {}
        foreach ($g as $v) {}
    "#,
    );
    assert_eq!(class, "Exception");
    assert_eq!(message, "Cannot traverse an already closed generator");
}

#[test]
fn test_get_return_before_completion_fails() {
    let (class, _) = uncaught(
        r#"<?php
        function g() { yield 1; return 2; }
        $gen = g();
        $gen->getReturn();
    "#,
    );
    assert_eq!(class, "Exception");
}
