mod common;
use common::{output_of, run_code_with_vm, string_of};

#[test]
fn test_destructor_runs_when_last_reference_goes() {
    let out = output_of(
        r#"<?php
        class Res {
            public function __construct(public $name) { echo "open {$this->name}\n"; }
            public function __destruct() { echo "close {$this->name}\n"; }
        }
        $a = new Res("a");
        $b = $a;
        unset($a);
        echo "still alive\n";
        $b = null;
        echo "gone\n";
    "#,
    );
    assert_eq!(out, "open a\nstill alive\nclose a\ngone\n");
}

#[test]
fn test_destructor_runs_on_scope_exit_and_overwrite() {
    let out = output_of(
        r#"<?php
        class Tmp {
            public function __construct(public $id) {}
            public function __destruct() { echo "d{$this->id} "; }
        }
        function work() {
            $t = new Tmp(1);
            echo "working ";
        }
        work();
        $x = new Tmp(2);
        $x = new Tmp(3);
        new Tmp(4);
        echo "end ";
    "#,
    );
    assert_eq!(out, "working d1 d2 d4 end d3 ");
}

#[test]
fn test_each_destructor_runs_exactly_once() {
    let out = output_of(
        r#"<?php
        class Counted {
            public static $destroyed = 0;
            public function __destruct() { self::$destroyed++; }
        }
        $objects = [];
        for ($i = 0; $i < 50; $i++) {
            $objects[] = new Counted;
        }
        $copy = $objects;
        unset($objects);
        echo Counted::$destroyed, " ";
        $copy = [];
        echo Counted::$destroyed;
    "#,
    );
    assert_eq!(out, "0 50");
}

#[test]
fn test_nested_objects_are_released_parent_first() {
    let out = output_of(
        r#"<?php
        class Part {
            public function __construct(public $name, public $child = null) {}
            public function __destruct() { echo "~{$this->name} "; }
        }
        $tree = new Part("root", new Part("mid", new Part("leaf")));
        unset($tree);
        echo "done";
    "#,
    );
    assert_eq!(out, "~root ~mid ~leaf done");
}

#[test]
fn test_globals_are_released_at_shutdown_in_reverse_order() {
    let out = output_of(
        r#"<?php
        class Named {
            public function __construct(public $n) {}
            public function __destruct() { echo "bye {$this->n}\n"; }
        }
        $first = new Named("first");
        $second = new Named("second");
        echo "script end\n";
    "#,
    );
    assert_eq!(out, "script end\nbye second\nbye first\n");
}

#[test]
fn test_cycles_are_collected_by_gc_collect_cycles() {
    let out = output_of(
        r#"<?php
        class Node {
            public $other;
            public function __construct(public $name) {}
            public function __destruct() { echo "free {$this->name} "; }
        }
        $a = new Node("a");
        $b = new Node("b");
        $a->other = $b;
        $b->other = $a;
        unset($a, $b);
        echo "unset ";
        $collected = gc_collect_cycles();
        echo "collected=$collected";
    "#,
    );
    assert!(out.starts_with("unset free "), "{out}");
    assert!(out.contains("free a") && out.contains("free b"), "{out}");
    assert!(out.ends_with("collected=2"), "{out}");
}

#[test]
fn test_collected_cycles_are_freed() {
    let (value, vm) = run_code_with_vm(
        r#"<?php
        $a = new stdClass;
        $b = new stdClass;
        $a->peer = $b;
        $b->peer = $a;
        unset($a, $b);
        $first = gc_collect_cycles();
        $second = gc_collect_cycles();
        return "$first,$second";
    "#,
    )
    .expect("script runs");
    assert_eq!(string_of(&value), b"2,0");
    assert_eq!(vm.store.live_count(), 0);
}

#[test]
fn test_reachable_cycles_are_kept() {
    let out = output_of(
        r#"<?php
        class Node {
            public $self;
            public function __destruct() { echo "destroyed "; }
        }
        $n = new Node;
        $n->self = $n;
        echo gc_collect_cycles(), " ";
        $n->self = null;
        unset($n);
        echo "end";
    "#,
    );
    assert_eq!(out, "0 destroyed end");
}

#[test]
fn test_cycles_through_arrays_are_collected_at_shutdown() {
    let out = output_of(
        r#"<?php
        class Holder {
            public $items = [];
            public function __destruct() { echo "holder gone"; }
        }
        function build() {
            $h = new Holder;
            $h->items[] = $h;
        }
        build();
        echo "after build ";
    "#,
    );
    assert_eq!(out, "after build holder gone");
}

#[test]
fn test_destructor_exception_is_catchable() {
    let out = output_of(
        r#"<?php
        class Grumpy {
            public function __destruct() { throw new RuntimeException("no"); }
        }
        try {
            $g = new Grumpy;
            unset($g);
        } catch (RuntimeException $e) {
            echo "caught ", $e->getMessage();
        }
    "#,
    );
    assert_eq!(out, "caught no");
}
