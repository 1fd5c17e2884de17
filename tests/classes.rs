mod common;
use common::{output_of, run_code, string_of, uncaught};

#[test]
fn test_constructor_properties_and_methods() {
    let out = output_of(
        r#"<?php
        class Point {
            public $x = 0;
            public $y = 0;
            public function __construct($x, $y) { $this->x = $x; $this->y = $y; }
            public function len2() { return $this->x * $this->x + $this->y * $this->y; }
        }
        class Promoted {
            public function __construct(public readonly int $a, protected string $b = "b") {}
            public function b() { return $this->b; }
        }
        $p = new Point(3, 4);
        $q = new Promoted(7);
        echo $p->len2(), " ", $q->a, $q->b();
    "#,
    );
    assert_eq!(out, "25 7b");
}

#[test]
fn test_inheritance_and_parent_calls() {
    let out = output_of(
        r#"<?php
        class Animal {
            public function __construct(protected string $name) {}
            public function speak() { return $this->name . " makes a sound"; }
        }
        class Dog extends Animal {
            public function __construct() { parent::__construct("Dog"); }
            public function speak() { return parent::speak() . ": woof"; }
        }
        $d = new Dog;
        echo $d->speak(), "|";
        var_dump($d instanceof Animal, $d instanceof Dog, get_parent_class($d));
    "#,
    );
    assert_eq!(out, "Dog makes a sound: woof|bool(true)\nbool(true)\nstring(6) \"Animal\"\n");
}

#[test]
fn test_late_static_binding() {
    let out = output_of(
        r#"<?php
        class A {
            public static function who() { return static::class; }
            public static function selfWho() { return self::class; }
            public static function create() { return new static(); }
            public static function viaSelf() { return self::who(); }
            public function name() { return static::class; }
        }
        class B extends A {}
        echo B::who(), A::who(), B::selfWho(), " ";
        echo get_class(B::create()), " ", B::viaSelf(), " ", (new B)->name();
    "#,
    );
    // self:: forwards the calling class, so viaSelf() from B still sees B
    assert_eq!(out, "BAA B B B");
}

#[test]
fn test_late_bound_class_constants_and_static_properties() {
    let out = output_of(
        r#"<?php
        class Base {
            const NAME = 'base';
            public static $count = 0;
            public static function label() { return self::NAME . '/' . static::NAME; }
            public static function inc() { return ++static::$count; }
        }
        class Child extends Base {
            const NAME = 'child';
        }
        echo Child::label(), " ";
        Base::inc(); Child::inc();
        echo Base::$count;
    "#,
    );
    assert_eq!(out, "base/child 2");
}

#[test]
fn test_constant_expressions_evaluate_lazily() {
    let out = output_of(
        r#"<?php
        class Config {
            const BASE = 10;
            const DOUBLE = self::BASE * 2;
            const LIST = [self::BASE, self::DOUBLE];
            public $limits = [self::DOUBLE => 'x'];
        }
        echo Config::DOUBLE, " ", implode(",", Config::LIST), " ", array_key_first((new Config)->limits);
    "#,
    );
    assert_eq!(out, "20 10,20 20");
}

#[test]
fn test_visibility_is_enforced() {
    let (class, message) = uncaught(
        r#"<?php
        class Vault { private $gold = 1; }
        echo (new Vault)->gold;
    "#,
    );
    assert_eq!(class, "Error");
    assert_eq!(message, "Cannot access private property Vault::$gold");

    let (class, message) = uncaught(
        r#"<?php
        class Vault { protected function open() {} }
        (new Vault)->open();
    "#,
    );
    assert_eq!(class, "Error");
    assert_eq!(message, "Call to protected method Vault::open() from global scope");
}

#[test]
fn test_abstract_and_interface_cannot_be_instantiated() {
    let (class, message) = uncaught("<?php abstract class Shape {} new Shape;");
    assert_eq!(class, "InstantiationError");
    assert_eq!(message, "Cannot instantiate abstract class Shape");

    let (class, message) = uncaught("<?php interface Drawable {} new Drawable;");
    assert_eq!(class, "InstantiationError");
    assert_eq!(message, "Cannot instantiate interface Drawable");

    let (class, _) = uncaught("<?php trait Greets {} new Greets;");
    assert_eq!(class, "InstantiationError");
}

#[test]
fn test_instantiation_error_is_caught_before_plain_error() {
    let out = output_of(
        r#"<?php
        abstract class Base {}
        try {
            new Base;
        } catch (InstantiationError $e) {
            echo "instantiation ", $e instanceof Error ? "is-error" : "not-error";
        } catch (Error $e) {
            echo "plain ", get_class($e);
        }
    "#,
    );
    assert_eq!(out, "instantiation is-error");
}

#[test]
fn test_interfaces_and_abstract_methods() {
    let out = output_of(
        r#"<?php
        interface HasArea { const UNITS = 'cm'; public function area(): float; }
        abstract class Shape implements HasArea {
            abstract protected function name(): string;
            public function describe() { return $this->name() . "=" . $this->area() . static::UNITS; }
        }
        final class Square extends Shape {
            public function __construct(private float $side) {}
            protected function name(): string { return "square"; }
            public function area(): float { return $this->side ** 2; }
        }
        $s = new Square(1.5);
        echo $s->describe(), " ";
        var_dump($s instanceof HasArea, class_implements($s));
    "#,
    );
    assert_eq!(
        out,
        "square=2.25cm bool(true)\narray(1) {\n  [\"HasArea\"]=>\n  string(7) \"HasArea\"\n}\n"
    );
}

#[test]
fn test_magic_get_set_isset_unset() {
    let out = output_of(
        r#"<?php
        class Bag {
            private array $data = [];
            public function __get($n) { echo "get($n) "; return $this->data[$n] ?? null; }
            public function __set($n, $v) { echo "set($n) "; $this->data[$n] = $v; }
            public function __isset($n) { return isset($this->data[$n]); }
            public function __unset($n) { echo "unset($n) "; unset($this->data[$n]); }
        }
        $b = new Bag;
        $b->color = 'red';
        echo $b->color, " ";
        var_dump(isset($b->color));
        unset($b->color);
        var_dump(isset($b->color));
    "#,
    );
    assert_eq!(out, "set(color) get(color) red bool(true)\nunset(color) bool(false)\n");
}

#[test]
fn test_magic_call_and_call_static() {
    let out = output_of(
        r#"<?php
        class Proxy {
            public function __call($name, $args) { return "$name(" . implode(",", $args) . ")"; }
            public static function __callStatic($name, $args) { return "static $name"; }
        }
        echo (new Proxy)->anything(1, 2), " ", Proxy::other();
    "#,
    );
    assert_eq!(out, "anything(1,2) static other");
}

#[test]
fn test_to_string_and_stringable() {
    let out = output_of(
        r#"<?php
        class Money {
            public function __construct(private int $cents) {}
            public function __toString(): string { return sprintf("$%d.%02d", intdiv($this->cents, 100), $this->cents % 100); }
        }
        $m = new Money(1234);
        echo $m, " ", "Total: $m", " ", strlen($m), " ";
        var_dump($m instanceof Stringable);
    "#,
    );
    assert_eq!(out, "$12.34 Total: $12.34 6 bool(true)\n");
}

#[test]
fn test_clone_is_shallow_and_runs_clone_hook() {
    let out = output_of(
        r#"<?php
        class Node {
            public $children = [];
            public $meta;
            public function __construct() { $this->meta = new stdClass; $this->meta->v = 1; }
            public function __clone() { echo "cloned "; $this->children[] = 'copy'; }
        }
        $a = new Node;
        $b = clone $a;
        $b->meta->v = 2;
        echo count($a->children), count($b->children), $a->meta->v, " ";
        var_dump($a === $b, $a == $b, $a->meta === $b->meta);
    "#,
    );
    assert_eq!(out, "cloned 012 bool(false)\nbool(false)\nbool(true)\n");
}

#[test]
fn test_readonly_properties() {
    let out = output_of(
        r#"<?php
        class Id {
            public function __construct(public readonly string $value) {}
        }
        $id = new Id("a");
        try {
            $id->value = "b";
        } catch (Error $e) {
            echo $e->getMessage();
        }
    "#,
    );
    assert_eq!(out, "Cannot modify readonly property Id::$value");
}

#[test]
fn test_array_access_and_countable() {
    let out = output_of(
        r#"<?php
        class Collection implements ArrayAccess, Countable, IteratorAggregate {
            private $items = [];
            public function offsetExists($o): bool { return isset($this->items[$o]); }
            public function offsetGet($o): mixed { return $this->items[$o]; }
            public function offsetSet($o, $v): void { if ($o === null) { $this->items[] = $v; } else { $this->items[$o] = $v; } }
            public function offsetUnset($o): void { unset($this->items[$o]); }
            public function count(): int { return count($this->items); }
            public function getIterator(): Iterator { return new ArrayIteratorLike($this->items); }
        }
        class ArrayIteratorLike implements Iterator {
            private $i = 0;
            private $keys;
            public function __construct(private array $a) { $this->keys = array_keys($a); }
            public function current(): mixed { return $this->a[$this->keys[$this->i]]; }
            public function key(): mixed { return $this->keys[$this->i]; }
            public function next(): void { $this->i++; }
            public function rewind(): void { $this->i = 0; }
            public function valid(): bool { return $this->i < count($this->keys); }
        }
        $c = new Collection;
        $c[] = 'first';
        $c['k'] = 'second';
        echo $c[0], $c['k'], count($c), " ";
        var_dump(isset($c['k']), isset($c['missing']));
        unset($c[0]);
        foreach ($c as $k => $v) { echo "$k=>$v"; }
    "#,
    );
    assert_eq!(out, "firstsecond2 bool(true)\nbool(false)\nk=>second");
}

#[test]
fn test_anonymous_class() {
    let out = output_of(
        r#"<?php
        interface Logger { public function log($m); }
        $logger = new class("pre") implements Logger {
            public function __construct(private $prefix) {}
            public function log($m) { return "$this->prefix: $m"; }
        };
        echo $logger->log("msg"), " ";
        var_dump($logger instanceof Logger);
    "#,
    );
    assert_eq!(out, "pre: msg bool(true)\n");
}

#[test]
fn test_nullsafe_operator() {
    let out = output_of(
        r#"<?php
        class User { public ?User $manager = null; public $name = 'u'; public function boss() { return $this->manager; } }
        $u = new User;
        var_dump($u->manager?->name, $u?->boss()?->name);
        $u->manager = new User;
        echo $u->manager?->name;
    "#,
    );
    assert_eq!(out, "NULL\nNULL\nu");
}

#[test]
fn test_dynamic_class_and_method_names() {
    let val = run_code(
        r#"<?php
        class Greeter { public function hi() { return "hi"; } public static function make() { return new static; } }
        $cls = 'Greeter';
        $method = 'hi';
        $obj = $cls::make();
        $other = new $cls;
        return $obj->$method() . $other->{'hi'}() . $cls::class;
    "#,
    );
    assert_eq!(string_of(&val), b"hihiGreeter");
}

#[test]
fn test_property_hooks() {
    let out = output_of(
        r#"<?php
        class Temperature {
            public float $celsius = 0.0 {
                set(float $value) {
                    if ($value < -273.15) { throw new ValueError("too cold"); }
                    $this->celsius = $value;
                }
            }
            public float $fahrenheit {
                get => $this->celsius * 9 / 5 + 32;
            }
        }
        $t = new Temperature;
        $t->celsius = 100;
        echo $t->fahrenheit, " ";
        try { $t->celsius = -300; } catch (ValueError $e) { echo $e->getMessage(), " "; }
        $copy = clone $t;
        echo $copy->celsius;
    "#,
    );
    assert_eq!(out, "212 too cold 100");
}

#[test]
fn test_object_introspection_functions() {
    let out = output_of(
        r#"<?php
        class Person {
            public $name = 'n';
            protected $age = 3;
            private $secret = 's';
            public function vars() { return get_object_vars($this); }
            public function greet() {}
            private function hidden() {}
        }
        $p = new Person;
        echo implode(",", array_keys(get_object_vars($p))), " ";
        echo implode(",", array_keys($p->vars())), " ";
        echo implode(",", get_class_methods('Person')), " ";
        var_dump(method_exists($p, 'hidden'), property_exists('Person', 'secret'), class_exists('person'), interface_exists('Countable'));
    "#,
    );
    assert_eq!(
        out,
        "name name,age,secret vars,greet bool(true)\nbool(true)\nbool(true)\nbool(true)\n"
    );
}
