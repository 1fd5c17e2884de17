use crate::builtins::{arg, arg_string, expect_args};
use crate::core::value::{
    ArrayData, ArrayKey, NumericKind, ObjectRef, Symbol, Val, Visibility, format_float_repr, parse_numeric_prefix,
};
use crate::vm::engine::{VM, VmError};
use std::collections::HashSet;

/// How a property name is annotated by the dump functions.
enum PropLabel {
    Public,
    Protected,
    Private(String),
}

fn prop_label(vm: &VM, obj: &ObjectRef, name: Symbol) -> PropLabel {
    match obj.class().properties.get(&name) {
        Some(info) => match info.visibility {
            Visibility::Public => PropLabel::Public,
            Visibility::Protected => PropLabel::Protected,
            Visibility::Private => {
                let class = vm
                    .program
                    .class(info.declaring_class)
                    .map(|c| vm.class_name(c))
                    .unwrap_or_else(|| vm.sym_text(info.declaring_class));
                PropLabel::Private(class)
            }
        },
        None => PropLabel::Public,
    }
}

/// Initialised properties in storage order. Dumps read the raw slots and
/// skip visibility and hooks.
fn dump_properties(obj: &ObjectRef) -> Vec<(Symbol, Val)> {
    obj.borrow()
        .properties
        .iter()
        .filter(|(_, v)| !matches!(v, Val::Uninitialized))
        .map(|(k, v)| (*k, v.deref_clone()))
        .collect()
}

fn object_class_label(vm: &VM, obj: &ObjectRef) -> String {
    if obj.class().is_anonymous {
        "class@anonymous".to_string()
    } else {
        vm.class_name(obj.class())
    }
}

pub fn php_var_dump(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "var_dump", args, 1, usize::MAX)?;
    for value in args.iter() {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        dump_value(vm, &value.deref_clone(), 0, &mut seen, &mut out);
        vm.echo(&out)?;
    }
    Ok(Val::Null)
}

fn dump_value(vm: &VM, val: &Val, depth: usize, seen: &mut HashSet<usize>, out: &mut Vec<u8>) {
    let indent = " ".repeat(depth * 2);
    out.extend_from_slice(indent.as_bytes());
    match val {
        Val::Null | Val::Uninitialized | Val::AppendPlaceholder => out.extend_from_slice(b"NULL\n"),
        Val::Bool(b) => out.extend_from_slice(format!("bool({})\n", b).as_bytes()),
        Val::Int(i) => out.extend_from_slice(format!("int({})\n", i).as_bytes()),
        Val::Float(f) => out.extend_from_slice(format!("float({})\n", format_float_repr(*f)).as_bytes()),
        Val::String(s) => {
            out.extend_from_slice(format!("string({}) \"", s.len()).as_bytes());
            out.extend_from_slice(s);
            out.extend_from_slice(b"\"\n");
        }
        Val::Resource(r) => {
            out.extend_from_slice(format!("resource({}) of type ({})\n", r.id, r.kind).as_bytes());
        }
        Val::Ref(r) => {
            out.truncate(out.len() - indent.len());
            dump_value(vm, &r.get(), depth, seen, out);
        }
        Val::Array(arr) => {
            out.extend_from_slice(format!("array({}) {{\n", arr.len()).as_bytes());
            for (key, item) in arr.iter() {
                out.extend_from_slice(indent.as_bytes());
                match key {
                    ArrayKey::Int(i) => out.extend_from_slice(format!("  [{}]=>\n", i).as_bytes()),
                    ArrayKey::Str(s) => {
                        out.extend_from_slice(b"  [\"");
                        out.extend_from_slice(s);
                        out.extend_from_slice(b"\"]=>\n");
                    }
                }
                dump_value(vm, &item, depth + 1, seen, out);
            }
            out.extend_from_slice(indent.as_bytes());
            out.extend_from_slice(b"}\n");
        }
        Val::Object(obj) => {
            if !seen.insert(obj.addr()) {
                out.extend_from_slice(b"*RECURSION*\n");
                return;
            }
            let props = dump_properties(obj);
            let header = format!("object({})#{} ({}) {{\n", object_class_label(vm, obj), obj.id(), props.len());
            out.extend_from_slice(header.as_bytes());
            for (name, item) in props {
                out.extend_from_slice(indent.as_bytes());
                out.extend_from_slice(b"  [\"");
                out.extend_from_slice(vm.program.interner.text(name));
                out.push(b'"');
                match prop_label(vm, obj, name) {
                    PropLabel::Public => {}
                    PropLabel::Protected => out.extend_from_slice(b":protected"),
                    PropLabel::Private(class) => {
                        out.extend_from_slice(format!(":\"{}\":private", class).as_bytes());
                    }
                }
                out.extend_from_slice(b"]=>\n");
                dump_value(vm, &item, depth + 1, seen, out);
            }
            out.extend_from_slice(indent.as_bytes());
            out.extend_from_slice(b"}\n");
            seen.remove(&obj.addr());
        }
    }
}

pub fn php_var_export(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "var_export", args, 1, 2)?;
    let mut out = Vec::new();
    export_value(vm, &arg(args, 0), 0, &mut out);
    if arg(args, 1).to_bool() {
        return Ok(Val::string(out));
    }
    vm.echo(&out)?;
    Ok(Val::Null)
}

fn export_string(s: &[u8], out: &mut Vec<u8>) {
    out.push(b'\'');
    for &b in s {
        match b {
            b'\'' => out.extend_from_slice(b"\\'"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }
    out.push(b'\'');
}

fn export_value(vm: &VM, val: &Val, depth: usize, out: &mut Vec<u8>) {
    let indent = " ".repeat(depth * 2);
    match val {
        Val::Null | Val::Uninitialized | Val::AppendPlaceholder | Val::Resource(_) => out.extend_from_slice(b"NULL"),
        Val::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Val::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Val::Float(f) => {
            let mut text = format_float_repr(*f);
            if f.is_finite() && !text.contains(['.', 'E', 'N', 'I']) {
                text.push_str(".0");
            }
            out.extend_from_slice(text.as_bytes());
        }
        Val::String(s) => export_string(s, out),
        Val::Ref(r) => export_value(vm, &r.get(), depth, out),
        Val::Array(arr) => {
            out.extend_from_slice(b"array (\n");
            for (key, item) in arr.iter() {
                out.extend_from_slice(indent.as_bytes());
                out.extend_from_slice(b"  ");
                match key {
                    ArrayKey::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
                    ArrayKey::Str(s) => export_string(s, out),
                }
                out.extend_from_slice(b" => ");
                if matches!(item, Val::Array(_) | Val::Object(_)) {
                    out.push(b'\n');
                    out.extend_from_slice(indent.as_bytes());
                    out.extend_from_slice(b"  ");
                }
                export_value(vm, &item, depth + 1, out);
                out.extend_from_slice(b",\n");
            }
            out.extend_from_slice(indent.as_bytes());
            out.push(b')');
        }
        Val::Object(obj) => {
            if obj.class().lname == vm.program.sym.std_class {
                out.extend_from_slice(b"(object) array(\n");
            } else {
                out.extend_from_slice(format!("\\{}::__set_state(array(\n", vm.class_name(obj.class())).as_bytes());
            }
            for (name, item) in dump_properties(obj) {
                out.extend_from_slice(indent.as_bytes());
                out.extend_from_slice(b"   ");
                export_string(vm.program.interner.text(name), out);
                out.extend_from_slice(b" => ");
                if matches!(item, Val::Array(_) | Val::Object(_)) {
                    out.push(b'\n');
                    out.extend_from_slice(indent.as_bytes());
                    out.extend_from_slice(b"  ");
                }
                export_value(vm, &item, depth + 1, out);
                out.extend_from_slice(b",\n");
            }
            out.extend_from_slice(indent.as_bytes());
            if obj.class().lname == vm.program.sym.std_class {
                out.push(b')');
            } else {
                out.extend_from_slice(b"))");
            }
        }
    }
}

pub fn php_print_r(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "print_r", args, 1, 2)?;
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    print_r_value(vm, &arg(args, 0), 0, &mut seen, &mut out)?;
    if arg(args, 1).to_bool() {
        return Ok(Val::string(out));
    }
    vm.echo(&out)?;
    Ok(Val::Bool(true))
}

fn print_r_value(
    vm: &mut VM,
    val: &Val,
    depth: usize,
    seen: &mut HashSet<usize>,
    out: &mut Vec<u8>,
) -> Result<(), VmError> {
    let pad = " ".repeat(depth * 8);
    match val {
        Val::Array(arr) => {
            out.extend_from_slice(b"Array\n");
            out.extend_from_slice(pad.as_bytes());
            out.extend_from_slice(b"(\n");
            for (key, item) in arr.iter() {
                out.extend_from_slice(pad.as_bytes());
                out.extend_from_slice(b"    [");
                out.extend_from_slice(&key.to_bytes());
                out.extend_from_slice(b"] => ");
                print_r_value(vm, &item.deref_clone(), depth + 1, seen, out)?;
                out.push(b'\n');
            }
            out.extend_from_slice(pad.as_bytes());
            out.extend_from_slice(b")\n");
        }
        Val::Object(obj) => {
            out.extend_from_slice(format!("{} Object\n", object_class_label(vm, obj)).as_bytes());
            if !seen.insert(obj.addr()) {
                out.extend_from_slice(b" *RECURSION*");
                return Ok(());
            }
            out.extend_from_slice(pad.as_bytes());
            out.extend_from_slice(b"(\n");
            for (name, item) in dump_properties(obj) {
                out.extend_from_slice(pad.as_bytes());
                out.extend_from_slice(b"    [");
                out.extend_from_slice(vm.program.interner.text(name));
                match prop_label(vm, obj, name) {
                    PropLabel::Public => {}
                    PropLabel::Protected => out.extend_from_slice(b":protected"),
                    PropLabel::Private(class) => out.extend_from_slice(format!(":{}:private", class).as_bytes()),
                }
                out.extend_from_slice(b"] => ");
                print_r_value(vm, &item, depth + 1, seen, out)?;
                out.push(b'\n');
            }
            out.extend_from_slice(pad.as_bytes());
            out.extend_from_slice(b")\n");
            seen.remove(&obj.addr());
        }
        Val::Ref(r) => print_r_value(vm, &r.get(), depth, seen, out)?,
        other => out.extend_from_slice(&vm.to_string_bytes(other)?),
    }
    Ok(())
}

pub fn php_gettype(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "gettype", args, 1, 1)?;
    Ok(Val::string(arg(args, 0).gettype_name()))
}

pub fn php_get_debug_type(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "get_debug_type", args, 1, 1)?;
    let ty = vm.debug_type(&arg(args, 0));
    Ok(Val::string(ty))
}

macro_rules! type_predicate {
    ($name:ident, $php:literal, $pat:pat) => {
        pub fn $name(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
            expect_args(vm, $php, args, 1, 1)?;
            Ok(Val::Bool(matches!(arg(args, 0), $pat)))
        }
    };
}

type_predicate!(php_is_null, "is_null", Val::Null | Val::Uninitialized);
type_predicate!(php_is_bool, "is_bool", Val::Bool(_));
type_predicate!(php_is_int, "is_int", Val::Int(_));
type_predicate!(php_is_float, "is_float", Val::Float(_));
type_predicate!(php_is_string, "is_string", Val::String(_));
type_predicate!(php_is_array, "is_array", Val::Array(_));
type_predicate!(php_is_object, "is_object", Val::Object(_));
type_predicate!(php_is_scalar, "is_scalar", Val::Bool(_) | Val::Int(_) | Val::Float(_) | Val::String(_));

pub fn php_is_numeric(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "is_numeric", args, 1, 1)?;
    let numeric = match arg(args, 0) {
        Val::Int(_) | Val::Float(_) => true,
        // Trailing whitespace is allowed, leading is too
        Val::String(s) => parse_numeric_prefix(&s).1 == NumericKind::Full,
        _ => false,
    };
    Ok(Val::Bool(numeric))
}

pub fn php_is_iterable(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "is_iterable", args, 1, 1)?;
    let iterable = match arg(args, 0) {
        Val::Array(_) => true,
        Val::Object(obj) => obj.class().is_a(vm.program.sym.traversable),
        _ => false,
    };
    Ok(Val::Bool(iterable))
}

pub fn php_is_countable(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "is_countable", args, 1, 1)?;
    let countable = match arg(args, 0) {
        Val::Array(_) => true,
        Val::Object(obj) => obj.class().is_a(vm.program.sym.countable),
        _ => false,
    };
    Ok(Val::Bool(countable))
}

pub fn php_intval(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "intval", args, 1, 2)?;
    let base = if args.len() > 1 { arg(args, 1).to_int() } else { 10 };
    match arg(args, 0) {
        Val::String(s) if base != 10 => Ok(Val::Int(parse_int_base(&s, base))),
        other => Ok(Val::Int(other.to_int())),
    }
}

/// `intval($s, $base)` for bases other than 10; base 0 detects the prefix.
fn parse_int_base(s: &[u8], base: i64) -> i64 {
    let text = String::from_utf8_lossy(s);
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, digits) = match base {
        0 if lower.starts_with("0x") => (16, &digits[2..]),
        0 if lower.starts_with("0b") => (2, &digits[2..]),
        0 if lower.starts_with("0o") => (8, &digits[2..]),
        0 if lower.starts_with('0') && lower.len() > 1 => (8, &digits[1..]),
        0 => (10, digits),
        16 if lower.starts_with("0x") => (16, &digits[2..]),
        2 if lower.starts_with("0b") => (2, &digits[2..]),
        8 if lower.starts_with("0o") => (8, &digits[2..]),
        b if (2..=36).contains(&b) => (b as u32, digits),
        _ => return 0,
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    let magnitude = i64::from_str_radix(&digits[..end], radix).unwrap_or(if end == 0 { 0 } else { i64::MAX });
    if negative { -magnitude } else { magnitude }
}

pub fn php_floatval(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "floatval", args, 1, 1)?;
    Ok(Val::Float(arg(args, 0).to_float()))
}

pub fn php_boolval(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "boolval", args, 1, 1)?;
    Ok(Val::Bool(arg(args, 0).to_bool()))
}

pub fn php_strval(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strval", args, 1, 1)?;
    Ok(Val::string(arg_string(vm, args, 0)?))
}

pub fn php_settype(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "settype", args, 2, 2)?;
    let value = arg(args, 0);
    let ty = arg_string(vm, args, 1)?.to_ascii_lowercase();
    let converted = match ty.as_slice() {
        b"int" | b"integer" => Val::Int(value.to_int()),
        b"float" | b"double" => Val::Float(value.to_float()),
        b"bool" | b"boolean" => Val::Bool(value.to_bool()),
        b"string" => Val::string(vm.to_string_bytes(&value)?),
        b"null" => Val::Null,
        b"array" => match value {
            Val::Array(_) => value,
            Val::Null => Val::empty_array(),
            Val::Object(obj) => Val::Array(std::rc::Rc::new(properties_array(vm, &obj))),
            scalar => Val::Array(std::rc::Rc::new(ArrayData::from(vec![scalar]))),
        },
        _ => {
            return Err(vm.throw_error(b"ValueError", "settype(): Argument #2 ($type) must be a valid type"));
        }
    };
    crate::builtins::write_back(args, 0, converted);
    Ok(Val::Bool(true))
}

fn properties_array(vm: &VM, obj: &ObjectRef) -> ArrayData {
    let mut arr = ArrayData::new();
    for (name, value) in dump_properties(obj) {
        arr.insert(ArrayKey::from_bytes(vm.program.interner.text(name)), value);
    }
    arr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_base() {
        assert_eq!(parse_int_base(b"ff", 16), 255);
        assert_eq!(parse_int_base(b"0x1A", 16), 26);
        assert_eq!(parse_int_base(b"0x1A", 0), 26);
        assert_eq!(parse_int_base(b"012", 0), 10);
        assert_eq!(parse_int_base(b"101", 2), 5);
        assert_eq!(parse_int_base(b"-z", 36), -35);
        assert_eq!(parse_int_base(b"12xyz", 10), 12);
    }

    #[test]
    fn test_export_string_escapes_quotes() {
        let mut out = Vec::new();
        export_string(b"it's a \\ test", &mut out);
        assert_eq!(out, b"'it\\'s a \\\\ test'");
    }
}
