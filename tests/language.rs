mod common;
use common::{output_of, run_code, string_of};
use php_vm::core::value::Val;

#[test]
fn test_arithmetic_and_precedence() {
    assert!(matches!(run_code("<?php return 2 + 3 * 4 - 10 / 2;"), Val::Int(9)));
    assert!(matches!(run_code("<?php return 7 / 2;"), Val::Float(f) if f == 3.5));
    assert!(matches!(run_code("<?php return 7 % 3 + 2 ** 3;"), Val::Int(9)));
    assert!(matches!(run_code("<?php return intdiv(17, 5);"), Val::Int(3)));
    assert!(matches!(run_code("<?php return PHP_INT_MAX + 1;"), Val::Float(_)));
}

#[test]
fn test_string_concat_and_interpolation() {
    let out = output_of(
        r#"<?php
        $name = "World";
        $arr = ['k' => 'v', 2 => 'two'];
        $obj = new stdClass;
        $obj->p = 'prop';
        echo "Hello $name! {$arr['k']} $arr[2] $obj->p\n";
        echo 'single $name' . "\n";
        echo <<<EOT
        heredoc $name
        EOT;
    "#,
    );
    assert_eq!(out, "Hello World! v two prop\nsingle $name\nheredoc World");
}

#[test]
fn test_echo_scalar_conversions() {
    let out = output_of(
        r#"<?php
        echo true, "|", false, "|", null, "|", 1.0, "|", 0.1 + 0.2, "|", 1e20, "|", -0.5;
    "#,
    );
    assert_eq!(out, "1|||1|0.3|1.0E+20|-0.5");
}

#[test]
fn test_short_circuit_does_not_evaluate_rhs() {
    let out = output_of(
        r#"<?php
        function side($v) { echo "side "; return $v; }
        $a = false && side(true);
        $b = true || side(false);
        $c = null ?? side(3);
        $d = 4 ?? side(5);
        var_dump($a, $b, $c, $d);
    "#,
    );
    assert_eq!(out, "side bool(false)\nbool(true)\nint(3)\nint(4)\n");
}

#[test]
fn test_loops_with_break_and_continue() {
    let out = output_of(
        r#"<?php
        for ($i = 0; $i < 5; $i++) {
            if ($i == 1) continue;
            if ($i == 4) break;
            echo $i;
        }
        $j = 0;
        while (true) {
            $j++;
            for ($k = 0; $k < 10; $k++) {
                if ($k == 2) continue 2;
                if ($j == 3) break 2;
                echo "$j$k ";
            }
        }
        do { echo "once"; } while (false);
    "#,
    );
    assert_eq!(out, "02310 11 20 21 once");
}

#[test]
fn test_foreach_keys_and_destructuring() {
    let out = output_of(
        r#"<?php
        foreach (['a' => 1, 'b' => 2] as $k => $v) { echo "$k=$v "; }
        foreach ([[1, 2], [3, 4]] as [$x, $y]) { echo $x + $y, " "; }
        foreach ([['id' => 7, 'n' => 'x']] as ['id' => $id, 'n' => $n]) { echo "$id$n"; }
        [$p, [$q, $r]] = [1, [2, 3]];
        echo " $p$q$r";
    "#,
    );
    assert_eq!(out, "a=1 b=2 3 7 7x 123");
}

#[test]
fn test_foreach_iterates_over_snapshot() {
    let out = output_of(
        r#"<?php
        $a = [1, 2, 3];
        foreach ($a as $v) {
            $a[] = $v * 10;
            echo $v;
        }
        echo " ", count($a);
    "#,
    );
    assert_eq!(out, "123 6");
}

#[test]
fn test_switch_fallthrough_and_default() {
    let out = output_of(
        r#"<?php
        function classify($x) {
            switch ($x) {
                case 1:
                case 2:
                    return "small";
                case "10":
                    return "ten";
                default:
                    return "other";
            }
        }
        echo classify(2), classify(10), classify(99);
        switch (3) { case 3: echo "A"; case 4: echo "B"; break; case 5: echo "C"; }
    "#,
    );
    assert_eq!(out, "smalltenotherAB");
}

#[test]
fn test_isset_empty_unset() {
    let out = output_of(
        r#"<?php
        $a = ['x' => null, 'y' => 0, 'z' => [1]];
        var_dump(isset($a['x']), isset($a['y']), empty($a['y']), isset($a['z'][0]), isset($undefined));
        unset($a['z']);
        var_dump(array_key_exists('z', $a), empty($nope));
    "#,
    );
    assert_eq!(
        out,
        "bool(false)\nbool(true)\nbool(true)\nbool(true)\nbool(false)\nbool(false)\nbool(true)\n"
    );
}

#[test]
fn test_global_and_static_variables() {
    let out = output_of(
        r#"<?php
        $counter = 10;
        function bump() {
            global $counter;
            $counter++;
        }
        function tick() {
            static $n = 0;
            return ++$n;
        }
        bump(); bump();
        tick(); tick();
        echo $counter, " ", tick();
    "#,
    );
    assert_eq!(out, "12 3");
}

#[test]
fn test_constants_and_magic_constants() {
    let out = output_of(
        r#"<?php
        const GREETING = 'hi';
        define('ANSWER', 42);
        class K { const X = 'kx'; function m() { return __CLASS__ . ':' . __FUNCTION__ . ':' . __METHOD__; } }
        echo GREETING, ANSWER, K::X, " ", (new K)->m(), " ", __LINE__;
    "#,
    );
    assert_eq!(out, "hi42kx K:m:K::m 5");
}

#[test]
fn test_undefined_constant_is_an_error() {
    let (class, message) = common::uncaught("<?php echo NOPE;");
    assert_eq!(class, "Error");
    assert_eq!(message, "Undefined constant \"NOPE\"");
}

#[test]
fn test_comparison_semantics() {
    let out = output_of(
        r#"<?php
        var_dump(1 == "1", 1 === "1", "abc" == 0, null == false, [1, 2] == [1, 2], 1 <=> 2, "a" < "b");
    "#,
    );
    assert_eq!(
        out,
        "bool(true)\nbool(false)\nbool(false)\nbool(true)\nbool(true)\nint(-1)\nbool(true)\n"
    );
}

#[test]
fn test_increment_and_compound_assignment() {
    let out = output_of(
        r#"<?php
        $i = 5;
        echo $i++, ++$i, $i--, --$i, " ";
        $s = "a";
        $s .= "b";
        $n = 10;
        $n -= 3; $n *= 2; $n **= 2;
        $arr = ['c' => 1];
        $arr['c'] += 5;
        $arr['d'] ??= 'new';
        echo $s, $n, $arr['c'], $arr['d'];
        $z = 'Az'; $z++;
        echo " ", $z;
    "#,
    );
    assert_eq!(out, "5775 ab1966new Ba");
}

#[test]
fn test_casts() {
    let out = output_of(
        r#"<?php
        var_dump((int) "12abc", (float) "1.5", (bool) "0", (string) 3.0, (array) "x");
    "#,
    );
    assert_eq!(
        out,
        "int(12)\nfloat(1.5)\nbool(false)\nstring(1) \"3\"\narray(1) {\n  [0]=>\n  string(1) \"x\"\n}\n"
    );
}

#[test]
fn test_inline_html_is_echoed() {
    let out = output_of("before<?php echo 'in'; ?>after\n");
    assert_eq!(out, "beforeinafter\n");
}

#[test]
fn test_return_value_of_script() {
    let val = run_code("<?php $x = ['a', 'b']; return implode(',', $x);");
    assert_eq!(string_of(&val), b"a,b");
}

#[test]
fn test_exit_stops_execution() {
    let result = php_vm::vm::executor::execute_code("<?php echo 'a'; exit(3); echo 'b';").unwrap();
    assert_eq!(result.stdout, "a");
    assert_eq!(result.exit_status, 3);
}
