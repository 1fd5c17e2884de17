use crate::builtins::{arg, arg_type_error, expect_args};
use crate::core::value::{ArrayData, ObjectRef, Val};
use crate::vm::engine::{VM, VmError};
use std::rc::Rc;

/// Key/value pairs of an array or Traversable argument.
fn traversable_pairs(vm: &mut VM, name: &str, args: &[Val]) -> Result<Vec<(Val, Val)>, VmError> {
    match arg(args, 0) {
        Val::Array(arr) => Ok(arr.iter().map(|(k, v)| (k.to_val(), v)).collect()),
        Val::Object(obj) if obj.class().is_a(vm.program.sym.traversable) => vm.iterate_object(&obj),
        other => Err(arg_type_error(vm, name, 0, "iterator", "Traversable|array", &other)),
    }
}

pub fn php_iterator_to_array(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "iterator_to_array", args, 1, 2)?;
    let preserve_keys = args.len() < 2 || arg(args, 1).to_bool();
    let pairs = traversable_pairs(vm, "iterator_to_array", args)?;
    let mut out = ArrayData::with_capacity(pairs.len());
    for (key, value) in pairs {
        if preserve_keys {
            if matches!(key, Val::Array(_) | Val::Object(_)) {
                return Err(vm.throw_error(b"TypeError", "Cannot access offset of type array on array"));
            }
            let key = vm.to_array_key(&key)?;
            out.insert(key, value);
        } else {
            out.push(value);
        }
    }
    Ok(Val::Array(Rc::new(out)))
}

pub fn php_iterator_count(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "iterator_count", args, 1, 1)?;
    Ok(Val::Int(traversable_pairs(vm, "iterator_count", args)?.len() as i64))
}

fn object_arg(vm: &mut VM, name: &str, args: &[Val]) -> Result<ObjectRef, VmError> {
    match arg(args, 0) {
        Val::Object(obj) => Ok(obj),
        other => Err(arg_type_error(vm, name, 0, "object", "object", &other)),
    }
}

pub fn php_spl_object_id(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "spl_object_id", args, 1, 1)?;
    let obj = object_arg(vm, "spl_object_id", args)?;
    Ok(Val::Int(i64::from(obj.id())))
}

/// 32 hex digits derived from the object id.
pub fn php_spl_object_hash(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "spl_object_hash", args, 1, 1)?;
    let obj = object_arg(vm, "spl_object_hash", args)?;
    Ok(Val::string(format!("{:032x}", obj.id())))
}
