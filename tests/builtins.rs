mod common;
use common::{output_of, uncaught};

#[test]
fn test_var_dump_formats() {
    let out = output_of(
        r#"<?php
        class P { public $a = 1; protected $b = [true]; private $c = null; }
        var_dump(1.0, -2.5, "hé", [1 => 'x', 'k' => [null]], new P);
    "#,
    );
    let expected = concat!(
        "float(1)\n",
        "float(-2.5)\n",
        "string(3) \"hé\"\n",
        "array(2) {\n",
        "  [1]=>\n",
        "  string(1) \"x\"\n",
        "  [\"k\"]=>\n",
        "  array(1) {\n",
        "    [0]=>\n",
        "    NULL\n",
        "  }\n",
        "}\n",
        "object(P)#1 (3) {\n",
        "  [\"a\"]=>\n",
        "  int(1)\n",
        "  [\"b\":protected]=>\n",
        "  array(1) {\n",
        "    [0]=>\n",
        "    bool(true)\n",
        "  }\n",
        "  [\"c\":\"P\":private]=>\n",
        "  NULL\n",
        "}\n",
    );
    assert_eq!(out, expected);
}

#[test]
fn test_print_r_nested() {
    let out = output_of(
        r#"<?php
        print_r(['a' => 1, 'b' => [2, 3]]);
        echo print_r("text", true), "|", print_r(false, true), "|";
    "#,
    );
    let expected = concat!(
        "Array\n",
        "(\n",
        "    [a] => 1\n",
        "    [b] => Array\n",
        "        (\n",
        "            [0] => 2\n",
        "            [1] => 3\n",
        "        )\n",
        "\n",
        ")\n",
        "text||",
    );
    assert_eq!(out, expected);
}

#[test]
fn test_var_export_objects_and_scalars() {
    let out = output_of(
        r#"<?php
        var_export(true); echo "\n";
        var_export(1.5); echo "\n";
        var_export("it's"); echo "\n";
        $o = new stdClass; $o->x = 1;
        var_export($o);
    "#,
    );
    assert_eq!(out, "true\n1.5\n'it\\'s'\n(object) array(\n   'x' => 1,\n)");
}

#[test]
fn test_printf_and_sprintf() {
    let out = output_of(
        r#"<?php
        echo sprintf("%05.2f|%-5s|%5s|%x|%b|%'*8d|%+d|%%|%c", 3.14159, "ab", "cd", 255, 5, 42, 7, 65), "\n";
        $n = printf("%s has %d items\n", "cart", 3);
        echo $n, " ", sprintf('%2$s %1$s', 'world', 'hello');
    "#,
    );
    assert_eq!(out, "03.14|ab   |   cd|ff|101|******42|+7|%|A\ncart has 3 items\n17 hello world");
}

#[test]
fn test_string_functions() {
    let out = output_of(
        r#"<?php
        $s = "  Hello, World  ";
        echo trim($s), "|", strtoupper("abc"), "|", strtolower("ABC"), "|", ucfirst("php"), "|";
        echo strlen("hello"), "|", substr("abcdef", 1, 3), "|", substr("abcdef", -2), "|";
        echo strpos("hello", "l"), "|", var_export(strpos("hello", "z"), true), "|";
        echo str_repeat("ab", 3), "|", str_pad("7", 3, "0", STR_PAD_LEFT), "|";
        echo implode("-", explode(",", "a,b,c")), "|", count(explode(",", "a,b,c", 2)), "|";
        var_dump(str_contains("haystack", "st"), str_starts_with("haystack", "hay"));
        echo number_format(1234567.891, 2), "|", number_format(0.5), "|", number_format(-1234.5, 1, ',', '.');
    "#,
    );
    assert_eq!(
        out,
        "Hello, World|ABC|abc|Php|5|bcd|ef|2|false|ababab|007|a-b-c|2|bool(true)\nbool(true)\n1,234,567.89|1|-1.234,5"
    );
}

#[test]
fn test_array_functions() {
    let out = output_of(
        r#"<?php
        $a = ['x' => 1, 'y' => 2, 'z' => 3];
        echo implode(",", array_keys($a)), "|", implode(",", array_values($a)), "|";
        echo implode(",", array_map(fn($v) => $v * 10, $a)), "|";
        echo implode(",", array_keys(array_filter($a, fn($v) => $v % 2 == 1))), "|";
        echo array_reduce([1, 2, 3, 4], fn($c, $i) => $c + $i, 0), "|";
        echo implode(",", array_merge([1, 2], ['k' => 'v'], [3])), "|";
        echo implode(",", array_slice([1, 2, 3, 4, 5], 1, 3)), "|";
        echo implode(",", array_reverse([1, 2, 3])), "|", array_sum([1, 2.5]), "|";
        var_dump(in_array("2", [1, 2, 3]), in_array("2", [1, 2, 3], true), array_key_exists('y', $a));
        echo implode(",", range(1, 10, 3)), "|", implode(",", range('a', 'e', 2)), "|";
        echo implode(",", array_unique([3, "3", 1, 3])), "|", array_search(3, [1, 2, 3]);
    "#,
    );
    assert_eq!(
        out,
        "x,y,z|1,2,3|10,20,30|x,z|10|1,2,v,3|2,3,4|3,2,1|3.5|bool(true)\nbool(false)\nbool(true)\n1,4,7,10|a,c,e|3,1|2"
    );
}

#[test]
fn test_sorting_functions() {
    let out = output_of(
        r#"<?php
        $nums = [5, 3, 10, 1];
        sort($nums);
        echo implode(",", $nums), "|";
        rsort($nums);
        echo implode(",", $nums), "|";
        $people = [['n' => 'bob', 'a' => 30], ['n' => 'al', 'a' => 25], ['n' => 'cy', 'a' => 30]];
        usort($people, fn($x, $y) => $x['a'] <=> $y['a']);
        echo implode(",", array_column($people, 'n')), "|";
        $assoc = ['b' => 2, 'a' => 3, 'c' => 1];
        asort($assoc);
        echo implode(",", array_keys($assoc)), "|";
        ksort($assoc);
        echo implode(",", array_keys($assoc)), "|";
        $mixed = ["10", "9", "2", "1"];
        sort($mixed, SORT_STRING);
        echo implode(",", $mixed);
    "#,
    );
    assert_eq!(out, "1,3,5,10|10,5,3,1|al,bob,cy|c,b,a|a,b,c|1,10,2,9");
}

#[test]
fn test_math_functions() {
    let out = output_of(
        r#"<?php
        echo abs(-5), "|", max(1, 7, 3), "|", max([2, 9]), "|", min(4, 2), "|";
        echo floor(2.7), "|", ceil(2.1), "|", round(2.5), "|", round(-2.5), "|", round(1.234, 2), "|";
        echo sqrt(16), "|", intdiv(-7, 2), "|", 7 <=> 3, "|", PHP_INT_MAX;
    "#,
    );
    assert_eq!(out, "5|7|9|2|2|3|3|-3|1.23|4|-3|1|9223372036854775807");
}

#[test]
fn test_type_functions() {
    let out = output_of(
        r#"<?php
        echo gettype(1), gettype(1.0), gettype("s"), gettype(null), gettype([]), gettype(new stdClass), "|";
        echo get_debug_type(1), get_debug_type(null), get_debug_type(new ArrayObjectLike), get_debug_type(fn() => 1), "|";
        class ArrayObjectLike {}
        var_dump(is_numeric("1e3"), is_numeric("abc"), is_int(5), is_string(""), is_array([]), is_null(null));
        var_dump(intval("0x1A", 16), intval("42abc"), floatval("3.14xyz"), boolval("0"), strval(1.0));
    "#,
    );
    assert_eq!(
        out,
        concat!(
            "integerdoublestringNULLarrayobject|intnullArrayObjectLikeClosure|",
            "bool(true)\nbool(false)\nbool(true)\nbool(true)\nbool(true)\nbool(true)\n",
            "int(26)\nint(42)\nfloat(3.14)\nbool(false)\nstring(1) \"1\"\n"
        )
    );
}

#[test]
fn test_iterator_and_object_helpers() {
    let out = output_of(
        r#"<?php
        function gen() { yield 'a' => 1; yield 'b' => 2; }
        echo iterator_count(gen()), "|", implode(",", array_keys(iterator_to_array(gen()))), "|";
        $o1 = new stdClass;
        $o2 = new stdClass;
        var_dump(spl_object_id($o1) !== spl_object_id($o2), strlen(spl_object_hash($o1)));
    "#,
    );
    assert_eq!(out, "2|a,b|bool(true)\nint(32)\n");
}

#[test]
fn test_count_of_non_countable_is_type_error() {
    let (class, message) = uncaught("<?php count(5);");
    assert_eq!(class, "TypeError");
    assert_eq!(message, "count(): Argument #1 ($value) must be of type Countable|array, int given");
}

#[test]
fn test_builtin_argument_count_error() {
    let (class, message) = uncaught("<?php strlen();");
    assert_eq!(class, "ArgumentCountError");
    assert_eq!(message, "strlen() expects exactly 1 argument, 0 given");
}

#[test]
fn test_settype_and_constants() {
    let out = output_of(
        r#"<?php
        $v = "12";
        settype($v, "integer");
        var_dump($v);
        echo PHP_VERSION, "|", M_PI > 3.14 ? "pi" : "no", "|", PHP_EOL === "\n" ? "eol" : "no";
    "#,
    );
    assert_eq!(out, "int(12)\n8.3.0|pi|eol");
}
