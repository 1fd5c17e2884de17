use crate::builtins::{arg, arg_int, arg_string, arg_type_error, expect_args};
use crate::core::value::{ArrayData, ArrayKey, Val};
use crate::vm::engine::{VM, VmError};
use std::rc::Rc;

/// Arguments of the user function that called the builtin.
fn caller_args(vm: &mut VM, name: &str) -> Result<Vec<Val>, VmError> {
    match vm.frames.last() {
        Some(frame) if !frame.is_main => Ok(frame.args.iter().map(Val::deref_clone).collect()),
        _ => Err(vm.throw_error(b"Error", format!("{}() cannot be called from the global scope", name))),
    }
}

pub fn php_func_get_args(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "func_get_args", args, 0, 0)?;
    let values = caller_args(vm, "func_get_args")?;
    Ok(Val::Array(Rc::new(ArrayData::from(values))))
}

pub fn php_func_num_args(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "func_num_args", args, 0, 0)?;
    Ok(Val::Int(caller_args(vm, "func_num_args")?.len() as i64))
}

pub fn php_func_get_arg(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "func_get_arg", args, 1, 1)?;
    let position = arg_int(args, 0);
    let values = caller_args(vm, "func_get_arg")?;
    if position < 0 || position as usize >= values.len() {
        return Err(vm.throw_error(
            b"ValueError",
            "func_get_arg(): Argument #1 ($position) must be less than the number of the arguments passed to the currently executed function",
        ));
    }
    Ok(values[position as usize].clone())
}

pub fn php_call_user_func(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "call_user_func", args, 1, usize::MAX)?;
    let callback = arg(args, 0);
    let rest = args[1..].iter().map(Val::deref_clone).collect();
    vm.call_value(&callback, rest)
}

/// String keys of the argument array become named arguments.
pub fn php_call_user_func_array(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "call_user_func_array", args, 2, 2)?;
    let callback = arg(args, 0);
    let Val::Array(list) = arg(args, 1) else {
        let given = arg(args, 1);
        return Err(arg_type_error(vm, "call_user_func_array", 1, "args", "array", &given));
    };
    let mut call = vm.callable_to_call(&callback)?;
    for (key, value) in list.iter() {
        match key {
            ArrayKey::Int(_) if !call.named.is_empty() => {
                return Err(vm.throw_error(b"Error", "Cannot use positional argument after named argument"));
            }
            ArrayKey::Int(_) => call.args.push(value),
            ArrayKey::Str(name) => {
                let name = vm.program.interner.intern(name);
                call.named.push((name, value));
            }
        }
    }
    vm.call_pending(call)
}

pub fn php_function_exists(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "function_exists", args, 1, 1)?;
    let name = arg_string(vm, args, 0)?;
    let name = name.strip_prefix(b"\\").unwrap_or(&name);
    let exists = vm
        .program
        .interner
        .find_lower(name)
        .is_some_and(|lname| vm.program.function_exists(lname));
    Ok(Val::Bool(exists))
}

pub fn php_is_callable(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "is_callable", args, 1, 3)?;
    let value = arg(args, 0);
    Ok(Val::Bool(vm.is_callable(&value)))
}

pub fn php_gc_collect_cycles(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "gc_collect_cycles", args, 0, 0)?;
    Ok(Val::Int(vm.collect_cycles()? as i64))
}

pub fn php_gc_enable(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "gc_enable", args, 0, 0)?;
    Ok(Val::Null)
}

pub fn php_gc_enabled(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "gc_enabled", args, 0, 0)?;
    Ok(Val::Bool(true))
}

pub fn php_define(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "define", args, 2, 3)?;
    let name = arg_string(vm, args, 0)?;
    let sym = vm.program.interner.intern(&name);
    if vm.program.constants.contains_key(&sym) {
        return Ok(Val::Bool(false));
    }
    vm.program.constants.insert(sym, arg(args, 1));
    Ok(Val::Bool(true))
}

pub fn php_defined(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "defined", args, 1, 1)?;
    let name = arg_string(vm, args, 0)?;
    let found = vm
        .program
        .interner
        .find(&name)
        .is_some_and(|sym| vm.program.constants.contains_key(&sym));
    Ok(Val::Bool(found))
}

pub fn php_constant(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "constant", args, 1, 1)?;
    let name = arg_string(vm, args, 0)?;
    if let Some(at) = name.windows(2).position(|w| w == b"::") {
        let class = vm.lookup_class_bytes(&name[..at])?;
        let constant = vm.program.interner.intern(&name[at + 2..]);
        return vm.class_constant(&class, constant);
    }
    let value = vm
        .program
        .interner
        .find(&name)
        .and_then(|sym| vm.program.constants.get(&sym).cloned());
    match value {
        Some(value) => Ok(value),
        None => {
            let msg = format!("Undefined constant \"{}\"", String::from_utf8_lossy(&name));
            Err(vm.throw_error(b"Error", msg))
        }
    }
}
