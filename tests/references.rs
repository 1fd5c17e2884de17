mod common;
use common::output_of;

#[test]
fn test_reference_assignment_shares_the_variable() {
    let out = output_of(
        r#"<?php
        $a = 1;
        $b = &$a;
        $b = 2;
        echo $a;
        unset($b);
        $b = 3;
        echo $a;
    "#,
    );
    assert_eq!(out, "22");
}

#[test]
fn test_arrays_are_copied_on_write() {
    let out = output_of(
        r#"<?php
        $a = [1, 2, 3];
        $b = $a;
        $b[] = 4;
        function modify(array $arr) { $arr[0] = 'changed'; return $arr; }
        $c = modify($a);
        echo count($a), count($b), $a[0], $c[0];
    "#,
    );
    assert_eq!(out, "341changed");
}

#[test]
fn test_objects_are_shared_handles() {
    let out = output_of(
        r#"<?php
        $o = new stdClass;
        $o->v = 1;
        $p = $o;
        $p->v = 2;
        function touch_obj($x) { $x->v = 3; $x = null; }
        touch_obj($o);
        echo $o->v;
        var_dump($o === $p);
    "#,
    );
    assert_eq!(out, "3bool(true)\n");
}

#[test]
fn test_foreach_by_reference() {
    let out = output_of(
        r#"<?php
        $prices = ['a' => 10, 'b' => 20];
        foreach ($prices as $k => &$price) {
            $price *= 2;
        }
        unset($price);
        echo implode(",", $prices), " ";
        $nested = [[1], [2]];
        foreach ($nested as &$inner) { $inner[] = 0; }
        unset($inner);
        echo json_like($nested);
        function json_like($a) { return implode("|", array_map(fn($x) => implode(",", $x), $a)); }
    "#,
    );
    assert_eq!(out, "20,40 1,0|2,0");
}

#[test]
fn test_dangling_foreach_reference_gotcha() {
    let out = output_of(
        r#"<?php
        $arr = [1, 2, 3];
        foreach ($arr as &$v) {}
        foreach ($arr as $v) {}
        echo implode(",", $arr);
    "#,
    );
    assert_eq!(out, "1,2,2");
}

#[test]
fn test_references_inside_arrays_survive_copies() {
    let out = output_of(
        r#"<?php
        $x = 1;
        $arr = [&$x, 2];
        $copy = $arr;
        $copy[0] = 'via copy';
        $copy[1] = 'not shared';
        echo $x, " ", $arr[1];
    "#,
    );
    assert_eq!(out, "via copy 2");
}

#[test]
fn test_reference_to_array_element_and_static() {
    let out = output_of(
        r#"<?php
        $config = ['db' => ['host' => 'a']];
        $host = &$config['db']['host'];
        $host = 'b';
        echo $config['db']['host'], " ";
        $list = [];
        $slot = &$list['new'];
        var_dump(array_key_exists('new', $list));
    "#,
    );
    assert_eq!(out, "b bool(true)\n");
}

#[test]
fn test_closure_by_reference_capture_counter() {
    let out = output_of(
        r#"<?php
        function make_counter() {
            $count = 0;
            return [
                function () use (&$count) { return ++$count; },
                function () use (&$count) { return $count; },
            ];
        }
        [$inc, $get] = make_counter();
        $inc(); $inc(); $inc();
        echo $get();
    "#,
    );
    assert_eq!(out, "3");
}

#[test]
fn test_by_ref_builtin_arguments() {
    let out = output_of(
        r#"<?php
        $stack = [3, 1, 2];
        sort($stack);
        array_push($stack, 9);
        $last = array_pop($stack);
        $first = array_shift($stack);
        echo implode(",", $stack), " $first $last ";
        $s = "a-b";
        $n = str_replace("-", "+", $s, $count);
        echo "$n $count";
    "#,
    );
    assert_eq!(out, "2,3 1 9 a+b 1");
}
