use crate::builtins::{arg, arg_array, arg_int, arg_type_error, expect_args, ref_array, write_back};
use crate::core::value::{ArrayData, ArrayKey, Numeric, Reference, Val};
use crate::vm::engine::{VM, VmError, strict_equals};
use crate::vm::opcode::ArithOp;
use std::cmp::Ordering;
use std::rc::Rc;

pub const COUNT_NORMAL: i64 = 0;
pub const COUNT_RECURSIVE: i64 = 1;

pub const SORT_REGULAR: i64 = 0;
pub const SORT_NUMERIC: i64 = 1;
pub const SORT_STRING: i64 = 2;

pub const ARRAY_FILTER_USE_BOTH: i64 = 1;
pub const ARRAY_FILTER_USE_KEY: i64 = 2;

fn array_val(data: ArrayData) -> Val {
    Val::Array(Rc::new(data))
}

fn count_recursive(arr: &ArrayData) -> i64 {
    arr.values()
        .map(|v| match v {
            Val::Array(inner) => 1 + count_recursive(&inner),
            _ => 1,
        })
        .sum()
}

pub fn php_count(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "count", args, 1, 2)?;
    match arg(args, 0) {
        Val::Array(arr) if arg_int(args, 1) == COUNT_RECURSIVE => Ok(Val::Int(count_recursive(&arr))),
        Val::Array(arr) => Ok(Val::Int(arr.len() as i64)),
        Val::Object(obj) if obj.class().is_a(vm.program.sym.countable) => {
            let n = vm.call_method(&obj, b"count", Vec::new())?;
            Ok(Val::Int(n.to_int()))
        }
        other => Err(arg_type_error(vm, "count", 0, "value", "Countable|array", &other)),
    }
}

pub fn php_array_keys(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_keys", args, 1, 3)?;
    let arr = arg_array(vm, "array_keys", args, 0, "array")?;
    let filter = (args.len() > 1).then(|| arg(args, 1));
    let strict = arg(args, 2).to_bool();
    let mut keys = Vec::with_capacity(arr.len());
    for (key, value) in arr.iter() {
        if let Some(search) = &filter {
            let hit = if strict { strict_equals(&value, search) } else { vm.loose_equals(&value, search)? };
            if !hit {
                continue;
            }
        }
        keys.push(key.to_val());
    }
    Ok(array_val(ArrayData::from(keys)))
}

pub fn php_array_values(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_values", args, 1, 1)?;
    let arr = arg_array(vm, "array_values", args, 0, "array")?;
    Ok(array_val(ArrayData::from(arr.values().collect::<Vec<_>>())))
}

pub fn php_array_merge(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    let mut out = ArrayData::new();
    for index in 0..args.len() {
        let arr = arg_array(vm, "array_merge", args, index, "arrays")?;
        for (key, value) in arr.iter() {
            match key {
                ArrayKey::Int(_) => {
                    out.push(value);
                }
                ArrayKey::Str(_) => out.insert_raw(key.clone(), value),
            }
        }
    }
    Ok(array_val(out))
}

pub fn php_array_combine(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_combine", args, 2, 2)?;
    let keys = arg_array(vm, "array_combine", args, 0, "keys")?;
    let values = arg_array(vm, "array_combine", args, 1, "values")?;
    if keys.len() != values.len() {
        return Err(vm.throw_error(
            b"ValueError",
            "array_combine(): Argument #1 ($keys) and argument #2 ($values) must have the same number of elements",
        ));
    }
    let mut out = ArrayData::with_capacity(keys.len());
    for (key, value) in keys.values().zip(values.values()) {
        let key = vm.to_array_key(&key)?;
        out.insert_raw(key, value);
    }
    Ok(array_val(out))
}

pub fn php_array_flip(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_flip", args, 1, 1)?;
    let arr = arg_array(vm, "array_flip", args, 0, "array")?;
    let mut out = ArrayData::with_capacity(arr.len());
    for (key, value) in arr.iter() {
        if let Val::Int(_) | Val::String(_) = value {
            let new_key = vm.to_array_key(&value)?;
            out.insert_raw(new_key, key.to_val());
        }
    }
    Ok(array_val(out))
}

pub fn php_array_map(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_map", args, 2, usize::MAX)?;
    let callback = arg(args, 0);
    if args.len() == 2 {
        let arr = arg_array(vm, "array_map", args, 1, "array")?;
        if callback.is_null() {
            return Ok(Val::Array(arr));
        }
        let mut out = ArrayData::with_capacity(arr.len());
        for (key, value) in arr.iter() {
            let mapped = vm.call_value(&callback, vec![value])?;
            out.insert_raw(key.clone(), mapped);
        }
        return Ok(array_val(out));
    }
    let mut columns = Vec::with_capacity(args.len() - 1);
    for index in 1..args.len() {
        let arr = arg_array(vm, "array_map", args, index, "arrays")?;
        columns.push(arr.values().collect::<Vec<_>>());
    }
    let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = ArrayData::with_capacity(rows);
    for row in 0..rows {
        let values: Vec<Val> = columns.iter().map(|c| c.get(row).cloned().unwrap_or_default()).collect();
        let mapped = if callback.is_null() {
            array_val(ArrayData::from(values))
        } else {
            vm.call_value(&callback, values)?
        };
        out.push(mapped);
    }
    Ok(array_val(out))
}

pub fn php_array_filter(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_filter", args, 1, 3)?;
    let arr = arg_array(vm, "array_filter", args, 0, "array")?;
    let callback = arg(args, 1);
    let mode = arg_int(args, 2);
    let mut out = ArrayData::new();
    for (key, value) in arr.iter() {
        let keep = if callback.is_null() {
            value.to_bool()
        } else {
            let call_args = match mode {
                ARRAY_FILTER_USE_KEY => vec![key.to_val()],
                ARRAY_FILTER_USE_BOTH => vec![value.clone(), key.to_val()],
                _ => vec![value.clone()],
            };
            vm.call_value(&callback, call_args)?.to_bool()
        };
        if keep {
            out.insert_raw(key.clone(), value);
        }
    }
    Ok(array_val(out))
}

pub fn php_array_reduce(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_reduce", args, 2, 3)?;
    let arr = arg_array(vm, "array_reduce", args, 0, "array")?;
    let callback = arg(args, 1);
    let mut carry = arg(args, 2);
    for value in arr.values() {
        carry = vm.call_value(&callback, vec![carry, value])?;
    }
    Ok(carry)
}

pub fn php_array_walk(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_walk", args, 2, 3)?;
    let mut arr = ref_array(vm, "array_walk", args, 0)?;
    let callback = arg(args, 1);
    let extra = (args.len() > 2).then(|| arg(args, 2));
    let keys: Vec<ArrayKey> = arr.map.keys().cloned().collect();
    for key in keys {
        let Some(value) = arr.get(&key) else { continue };
        // Each element is handed out as a reference so `function (&$v)` can write it.
        let cell = Reference::new(value);
        let mut call_args = vec![Val::Ref(cell.clone()), key.to_val()];
        call_args.extend(extra.clone());
        vm.call_value(&callback, call_args)?;
        arr.insert(key, cell.get());
    }
    write_back(args, 0, array_val(arr));
    Ok(Val::Bool(true))
}

fn search(vm: &mut VM, args: &[Val], name: &str) -> Result<Option<ArrayKey>, VmError> {
    expect_args(vm, name, args, 2, 3)?;
    let needle = arg(args, 0);
    let haystack = arg_array(vm, name, args, 1, "haystack")?;
    let strict = arg(args, 2).to_bool();
    for (key, value) in haystack.iter() {
        let hit = if strict { strict_equals(&value, &needle) } else { vm.loose_equals(&value, &needle)? };
        if hit {
            return Ok(Some(key.clone()));
        }
    }
    Ok(None)
}

pub fn php_in_array(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    Ok(Val::Bool(search(vm, args, "in_array")?.is_some()))
}

pub fn php_array_search(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    Ok(match search(vm, args, "array_search")? {
        Some(key) => key.to_val(),
        None => Val::Bool(false),
    })
}

pub fn php_array_key_exists(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_key_exists", args, 2, 2)?;
    let arr = arg_array(vm, "array_key_exists", args, 1, "array")?;
    let key = vm.to_array_key(&arg(args, 0))?;
    Ok(Val::Bool(arr.contains_key(&key)))
}

pub fn php_array_key_first(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_key_first", args, 1, 1)?;
    let arr = arg_array(vm, "array_key_first", args, 0, "array")?;
    Ok(arr.map.keys().next().map(ArrayKey::to_val).unwrap_or_default())
}

pub fn php_array_key_last(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_key_last", args, 1, 1)?;
    let arr = arg_array(vm, "array_key_last", args, 0, "array")?;
    Ok(arr.map.keys().last().map(ArrayKey::to_val).unwrap_or_default())
}

pub fn php_array_push(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_push", args, 1, usize::MAX)?;
    let mut arr = ref_array(vm, "array_push", args, 0)?;
    for value in &args[1..] {
        arr.push(value.deref_clone());
    }
    let len = arr.len();
    write_back(args, 0, array_val(arr));
    Ok(Val::Int(len as i64))
}

pub fn php_array_pop(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_pop", args, 1, 1)?;
    let mut arr = ref_array(vm, "array_pop", args, 0)?;
    let Some((key, value)) = arr.map.pop() else {
        return Ok(Val::Null);
    };
    if let ArrayKey::Int(i) = key
        && i + 1 == arr.next_free
    {
        arr.next_free = i;
    }
    write_back(args, 0, array_val(arr));
    Ok(value.into_deref())
}

/// Renumbers integer keys from zero, keeping string keys.
fn reindex(entries: impl Iterator<Item = (ArrayKey, Val)>) -> ArrayData {
    let mut out = ArrayData::new();
    for (key, value) in entries {
        match key {
            ArrayKey::Int(_) => {
                out.push(value);
            }
            key => out.insert_raw(key, value),
        }
    }
    out
}

pub fn php_array_shift(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_shift", args, 1, 1)?;
    let arr = ref_array(vm, "array_shift", args, 0)?;
    let mut entries = arr.map.into_iter();
    let Some((_, first)) = entries.next() else {
        return Ok(Val::Null);
    };
    write_back(args, 0, array_val(reindex(entries)));
    Ok(first.into_deref())
}

pub fn php_array_unshift(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_unshift", args, 1, usize::MAX)?;
    let arr = ref_array(vm, "array_unshift", args, 0)?;
    let prepended = args[1..].iter().map(|v| (ArrayKey::Int(0), v.deref_clone()));
    let out = reindex(prepended.chain(arr.map));
    let len = out.len();
    write_back(args, 0, array_val(out));
    Ok(Val::Int(len as i64))
}

pub fn php_array_splice(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_splice", args, 2, 4)?;
    let arr = ref_array(vm, "array_splice", args, 0)?;
    let len = arr.len() as i64;
    let offset = arg_int(args, 1);
    let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) } as usize;
    let end = match arg(args, 2) {
        Val::Null => len as usize,
        l => {
            let l = l.to_int();
            (if l < 0 { (len + l).max(start as i64) } else { (start as i64 + l).min(len) }) as usize
        }
    };
    let replacement: Vec<Val> = match arg(args, 3) {
        Val::Array(r) => r.values().collect(),
        Val::Null if args.len() < 4 => Vec::new(),
        other => vec![other],
    };
    let mut removed = Vec::new();
    let mut kept = Vec::new();
    let mut pending = Some(replacement);
    for (i, (key, value)) in arr.map.into_iter().enumerate() {
        if i == start
            && let Some(values) = pending.take()
        {
            kept.extend(values.into_iter().map(|v| (ArrayKey::Int(0), v)));
        }
        if i >= start && i < end {
            removed.push(value.into_deref());
        } else {
            kept.push((key, value));
        }
    }
    if let Some(values) = pending {
        kept.extend(values.into_iter().map(|v| (ArrayKey::Int(0), v)));
    }
    write_back(args, 0, array_val(reindex(kept.into_iter())));
    Ok(array_val(ArrayData::from(removed)))
}

pub fn php_array_sum(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_sum", args, 1, 1)?;
    let arr = arg_array(vm, "array_sum", args, 0, "array")?;
    let mut total = Val::Int(0);
    for value in arr.values() {
        if let Some(n) = value.to_number() {
            total = vm.arith(ArithOp::Add, &total, &n.into_val())?;
        }
    }
    Ok(total)
}

pub fn php_array_product(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_product", args, 1, 1)?;
    let arr = arg_array(vm, "array_product", args, 0, "array")?;
    let mut total = Val::Int(1);
    for value in arr.values() {
        let n = value.to_number().unwrap_or(Numeric::Int(1));
        total = vm.arith(ArithOp::Mul, &total, &n.into_val())?;
    }
    Ok(total)
}

pub fn php_array_reverse(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_reverse", args, 1, 2)?;
    let arr = arg_array(vm, "array_reverse", args, 0, "array")?;
    let preserve = arg(args, 1).to_bool();
    let entries = arr.iter().map(|(k, v)| (k.clone(), v)).collect::<Vec<_>>().into_iter().rev();
    if preserve {
        let mut out = ArrayData::with_capacity(arr.len());
        for (key, value) in entries {
            out.insert_raw(key, value);
        }
        return Ok(array_val(out));
    }
    Ok(array_val(reindex(entries)))
}

pub fn php_array_slice(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_slice", args, 2, 4)?;
    let arr = arg_array(vm, "array_slice", args, 0, "array")?;
    let len = arr.len() as i64;
    let offset = arg_int(args, 1);
    let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
    let end = match arg(args, 2) {
        Val::Null => len,
        l => {
            let l = l.to_int();
            if l < 0 { (len + l).max(start) } else { (start + l).min(len) }
        }
    };
    let preserve = arg(args, 3).to_bool();
    let entries = arr
        .iter()
        .skip(start as usize)
        .take((end - start).max(0) as usize)
        .map(|(k, v)| (k.clone(), v));
    if preserve {
        let mut out = ArrayData::new();
        for (key, value) in entries {
            out.insert_raw(key, value);
        }
        return Ok(array_val(out));
    }
    Ok(array_val(reindex(entries)))
}

pub fn php_array_fill(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_fill", args, 3, 3)?;
    let start = arg_int(args, 0);
    let count = arg_int(args, 1);
    if count < 0 {
        return Err(vm.throw_error(b"ValueError", "array_fill(): Argument #2 ($count) must be greater than or equal to 0"));
    }
    let value = arg(args, 2);
    let mut out = ArrayData::with_capacity(count as usize);
    for i in 0..count {
        out.insert_raw(ArrayKey::Int(start + i), value.clone());
    }
    Ok(array_val(out))
}

pub fn php_array_fill_keys(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_fill_keys", args, 2, 2)?;
    let keys = arg_array(vm, "array_fill_keys", args, 0, "keys")?;
    let value = arg(args, 1);
    let mut out = ArrayData::with_capacity(keys.len());
    for key in keys.values() {
        let key = vm.to_array_key(&key)?;
        out.insert_raw(key, value.clone());
    }
    Ok(array_val(out))
}

pub fn php_array_unique(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_unique", args, 1, 2)?;
    let arr = arg_array(vm, "array_unique", args, 0, "array")?;
    let mut seen: Vec<Vec<u8>> = Vec::new();
    let mut out = ArrayData::new();
    for (key, value) in arr.iter() {
        let text = vm.to_string_bytes(&value)?;
        if seen.contains(&text) {
            continue;
        }
        seen.push(text);
        out.insert_raw(key.clone(), value);
    }
    Ok(array_val(out))
}

pub fn php_array_column(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_column", args, 2, 3)?;
    let rows = arg_array(vm, "array_column", args, 0, "array")?;
    let column = arg(args, 1);
    let index = arg(args, 2);
    let mut out = ArrayData::new();
    for row in rows.values() {
        let fetch = |vm: &mut VM, field: &Val| -> Result<Option<Val>, VmError> {
            match &row {
                Val::Array(fields) => {
                    let key = vm.to_array_key(field)?;
                    Ok(fields.get(&key))
                }
                Val::Object(obj) => {
                    let name = vm.to_string_bytes(field)?;
                    let sym = vm.program.interner.intern(&name);
                    Ok(obj.property(sym).map(Val::into_deref))
                }
                _ => Ok(None),
            }
        };
        let value = if column.is_null() {
            Some(row.clone())
        } else {
            fetch(vm, &column)?
        };
        let Some(value) = value else { continue };
        let key = if index.is_null() { None } else { fetch(vm, &index)? };
        match key {
            Some(k) => {
                let k = vm.to_array_key(&k)?;
                out.insert_raw(k, value);
            }
            None => {
                out.push(value);
            }
        }
    }
    Ok(array_val(out))
}

pub fn php_array_chunk(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_chunk", args, 2, 3)?;
    let arr = arg_array(vm, "array_chunk", args, 0, "array")?;
    let size = arg_int(args, 1);
    if size < 1 {
        return Err(vm.throw_error(b"ValueError", "array_chunk(): Argument #2 ($length) must be greater than 0"));
    }
    let preserve = arg(args, 2).to_bool();
    let entries: Vec<(ArrayKey, Val)> = arr.iter().map(|(k, v)| (k.clone(), v)).collect();
    let mut out = ArrayData::new();
    for chunk in entries.chunks(size as usize) {
        let mut piece = ArrayData::with_capacity(chunk.len());
        for (key, value) in chunk {
            if preserve {
                piece.insert_raw(key.clone(), value.clone());
            } else {
                piece.push(value.clone());
            }
        }
        out.push(array_val(piece));
    }
    Ok(array_val(out))
}

/// Shared body of `array_diff`/`array_intersect` and their key variants.
fn set_operation(vm: &mut VM, name: &str, args: &[Val], by_key: bool, keep_common: bool) -> Result<Val, VmError> {
    expect_args(vm, name, args, 1, usize::MAX)?;
    let first = arg_array(vm, name, args, 0, "array")?;
    let mut others = Vec::with_capacity(args.len() - 1);
    for index in 1..args.len() {
        others.push(arg_array(vm, name, args, index, "arrays")?);
    }
    let mut out = ArrayData::new();
    for (key, value) in first.iter() {
        let mut in_all = true;
        let mut in_any = false;
        for other in &others {
            let found = if by_key {
                other.contains_key(key)
            } else {
                let needle = vm.to_string_bytes(&value)?;
                let mut hit = false;
                for candidate in other.values() {
                    if vm.to_string_bytes(&candidate)? == needle {
                        hit = true;
                        break;
                    }
                }
                hit
            };
            in_all &= found;
            in_any |= found;
        }
        let keep = if keep_common { in_all } else { !in_any };
        if keep {
            out.insert_raw(key.clone(), value);
        }
    }
    Ok(array_val(out))
}

pub fn php_array_diff(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    set_operation(vm, "array_diff", args, false, false)
}

pub fn php_array_diff_key(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    set_operation(vm, "array_diff_key", args, true, false)
}

pub fn php_array_intersect(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    set_operation(vm, "array_intersect", args, false, true)
}

pub fn php_array_intersect_key(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    set_operation(vm, "array_intersect_key", args, true, true)
}

pub fn php_array_is_list(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "array_is_list", args, 1, 1)?;
    let arr = arg_array(vm, "array_is_list", args, 0, "array")?;
    Ok(Val::Bool(arr.is_list()))
}

pub fn php_range(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "range", args, 2, 3)?;
    let (start, end) = (arg(args, 0), arg(args, 1));
    let step = if args.len() > 2 { arg(args, 2) } else { Val::Int(1) };
    let is_char = |v: &Val| matches!(v, Val::String(s) if s.len() == 1 && !s[0].is_ascii_digit());
    if is_char(&start) && is_char(&end) {
        let (Val::String(a), Val::String(b)) = (&start, &end) else {
            return Ok(Val::empty_array());
        };
        let step = step.to_int().unsigned_abs().max(1) as usize;
        let (a, b) = (a[0], b[0]);
        let chars: Vec<Val> = if a <= b {
            (a..=b).step_by(step).map(|c| Val::string(vec![c])).collect()
        } else {
            (b..=a).rev().step_by(step).map(|c| Val::string(vec![c])).collect()
        };
        return Ok(array_val(ArrayData::from(chars)));
    }
    let is_float = |v: &Val| matches!(v.to_number(), Some(Numeric::Float(_)));
    let fractional_step = matches!(step.to_number(), Some(Numeric::Float(f)) if f.fract() != 0.0);
    let use_float = is_float(&start) || is_float(&end) || fractional_step;
    let step_abs = step.to_float().abs();
    if step_abs == 0.0 {
        return Err(vm.throw_error(b"ValueError", "range(): Argument #3 ($step) cannot be 0"));
    }
    let (a, b) = (start.to_float(), end.to_float());
    if step_abs > (b - a).abs() && a != b {
        return Err(vm.throw_error(b"ValueError", "range(): Argument #3 ($step) must not exceed the specified range"));
    }
    let count = ((b - a).abs() / step_abs).floor() as usize + 1;
    let direction = if b >= a { 1.0 } else { -1.0 };
    let values: Vec<Val> = (0..count)
        .map(|i| {
            let v = a + direction * step_abs * i as f64;
            if use_float { Val::Float(v) } else { Val::Int(v as i64) }
        })
        .collect();
    Ok(array_val(ArrayData::from(values)))
}

// ---- sorting ------------------------------------------------------------

/// Stable merge sort with a comparator that may throw. User comparators
/// need not be consistent, so the standard library sorts are not used.
fn merge_sort<T: Clone>(
    items: Vec<T>,
    cmp: &mut dyn FnMut(&T, &T) -> Result<Ordering, VmError>,
) -> Result<Vec<T>, VmError> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, cmp)?;
    let right = merge_sort(right, cmp)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut li = left.into_iter().peekable();
    let mut ri = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (li.peek(), ri.peek()) {
        if cmp(l, r)? == Ordering::Greater {
            out.extend(ri.next());
        } else {
            out.extend(li.next());
        }
    }
    out.extend(li);
    out.extend(ri);
    Ok(out)
}

fn compare_with_flags(vm: &mut VM, a: &Val, b: &Val, flags: i64) -> Result<Ordering, VmError> {
    Ok(match flags & 0xF {
        SORT_NUMERIC => a.to_float().partial_cmp(&b.to_float()).unwrap_or(Ordering::Equal),
        SORT_STRING => vm.to_string_bytes(a)?.cmp(&vm.to_string_bytes(b)?),
        _ => vm.compare(a, b)?.cmp(&0),
    })
}

/// What a sort orders by and whether keys survive.
#[derive(Clone, Copy)]
enum SortBy {
    Value,
    Key,
}

fn sort_impl(
    vm: &mut VM,
    name: &str,
    args: &[Val],
    by: SortBy,
    reverse: bool,
    keep_keys: bool,
    user: Option<Val>,
) -> Result<Val, VmError> {
    let arr = ref_array(vm, name, args, 0)?;
    let flags = if user.is_none() { arg_int(args, 1) } else { SORT_REGULAR };
    let entries: Vec<(ArrayKey, Val)> = arr.map.into_iter().map(|(k, v)| (k, v)).collect();
    let mut cmp = |x: &(ArrayKey, Val), y: &(ArrayKey, Val)| -> Result<Ordering, VmError> {
        let (a, b) = match by {
            SortBy::Value => (x.1.deref_clone(), y.1.deref_clone()),
            SortBy::Key => (x.0.to_val(), y.0.to_val()),
        };
        let ord = match &user {
            Some(callback) => vm.call_value(callback, vec![a, b])?.to_int().cmp(&0),
            None => compare_with_flags(vm, &a, &b, flags)?,
        };
        Ok(if reverse { ord.reverse() } else { ord })
    };
    let sorted = merge_sort(entries, &mut cmp)?;
    let out = if keep_keys {
        let mut out = ArrayData::with_capacity(sorted.len());
        for (key, value) in sorted {
            out.insert_raw(key, value);
        }
        out
    } else {
        ArrayData::from(sorted.into_iter().map(|(_, v)| v).collect::<Vec<_>>())
    };
    write_back(args, 0, array_val(out));
    Ok(Val::Bool(true))
}

pub fn php_sort(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "sort", args, 1, 2)?;
    sort_impl(vm, "sort", args, SortBy::Value, false, false, None)
}

pub fn php_rsort(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "rsort", args, 1, 2)?;
    sort_impl(vm, "rsort", args, SortBy::Value, true, false, None)
}

pub fn php_asort(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "asort", args, 1, 2)?;
    sort_impl(vm, "asort", args, SortBy::Value, false, true, None)
}

pub fn php_arsort(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "arsort", args, 1, 2)?;
    sort_impl(vm, "arsort", args, SortBy::Value, true, true, None)
}

pub fn php_ksort(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "ksort", args, 1, 2)?;
    sort_impl(vm, "ksort", args, SortBy::Key, false, true, None)
}

pub fn php_krsort(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "krsort", args, 1, 2)?;
    sort_impl(vm, "krsort", args, SortBy::Key, true, true, None)
}

pub fn php_usort(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "usort", args, 2, 2)?;
    let callback = arg(args, 1);
    sort_impl(vm, "usort", args, SortBy::Value, false, false, Some(callback))
}

pub fn php_uasort(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "uasort", args, 2, 2)?;
    let callback = arg(args, 1);
    sort_impl(vm, "uasort", args, SortBy::Value, false, true, Some(callback))
}

pub fn php_uksort(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "uksort", args, 2, 2)?;
    let callback = arg(args, 1);
    sort_impl(vm, "uksort", args, SortBy::Key, false, true, Some(callback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sort_is_stable() {
        let items = vec![(1, 'a'), (0, 'b'), (1, 'c'), (0, 'd')];
        let sorted = merge_sort(items, &mut |x: &(i32, char), y: &(i32, char)| Ok(x.0.cmp(&y.0))).unwrap();
        assert_eq!(sorted, vec![(0, 'b'), (0, 'd'), (1, 'a'), (1, 'c')]);
    }

    #[test]
    fn test_merge_sort_survives_inconsistent_comparator() {
        let items: Vec<i32> = (0..50).collect();
        let sorted = merge_sort(items, &mut |_: &i32, _: &i32| Ok(Ordering::Greater)).unwrap();
        assert_eq!(sorted.len(), 50);
    }

    #[test]
    fn test_reindex_keeps_string_keys() {
        let entries = vec![
            (ArrayKey::Int(5), Val::Int(1)),
            (ArrayKey::from_bytes(b"k"), Val::Int(2)),
            (ArrayKey::Int(9), Val::Int(3)),
        ];
        let out = reindex(entries.into_iter());
        let keys: Vec<Vec<u8>> = out.map.keys().map(ArrayKey::to_bytes).collect();
        assert_eq!(keys, vec![b"0".to_vec(), b"k".to_vec(), b"1".to_vec()]);
    }

    #[test]
    fn test_count_recursive() {
        let inner = Val::Array(Rc::new(ArrayData::from(vec![Val::Int(1), Val::Int(2)])));
        let outer = ArrayData::from(vec![Val::Int(0), inner]);
        assert_eq!(count_recursive(&outer), 4);
    }
}
