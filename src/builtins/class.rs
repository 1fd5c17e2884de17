//! `Closure` and `Generator` methods plus the class introspection functions.

use crate::builtins::{arg, arg_string, arg_type_error, expect_args};
use crate::compiler::chunk::ClassKind;
use crate::core::value::{ArrayData, ArrayKey, ObjectRef, Val};
use crate::runtime::context::ClassDef;
use crate::vm::ClosureState;
use crate::vm::engine::{VM, VmError};
use crate::vm::frame::{Callee, PendingCall};
use std::rc::Rc;

fn this_object(vm: &mut VM, this: Option<&ObjectRef>, method: &str) -> Result<ObjectRef, VmError> {
    match this {
        Some(obj) => Ok(obj.clone()),
        None => Err(vm.throw_error(b"Error", format!("Non-static method {}() cannot be called statically", method))),
    }
}

fn class_name_val(vm: &VM, class: &ClassDef) -> Val {
    Val::string(vm.program.interner.text(class.name).to_vec())
}

// ---- Closure ------------------------------------------------------------

fn closure_state(vm: &mut VM, val: &Val, name: &str) -> Result<Rc<ClosureState>, VmError> {
    match val {
        Val::Object(obj) => match obj.internal::<ClosureState>() {
            Some(state) => Ok(state),
            None => Err(arg_type_error(vm, name, 0, "closure", "Closure", val)),
        },
        other => Err(arg_type_error(vm, name, 0, "closure", "Closure", other)),
    }
}

/// Copy of a closure with a new `$this` and scope. `scope` follows the
/// `Closure::bind` convention: an object takes its class, `"static"`
/// keeps the current scope.
fn rebind(vm: &mut VM, state: &ClosureState, new_this: Val, scope: Option<Val>) -> Result<Val, VmError> {
    let Callee::User { func, scope: old_scope, static_class, captures, .. } = &state.callee else {
        return Ok(Val::Object(vm.new_closure(state.callee.clone(), state.magic.clone())?));
    };
    let new_scope = match scope {
        None => old_scope.clone(),
        Some(Val::Object(obj)) => Some(obj.class().clone()),
        Some(Val::Null) => old_scope.clone(),
        Some(other) => {
            let name = vm.to_string_bytes(&other)?;
            if name.eq_ignore_ascii_case(b"static") {
                old_scope.clone()
            } else {
                Some(vm.lookup_class_bytes(&name)?)
            }
        }
    };
    let this = match new_this {
        Val::Object(obj) => {
            // Static closures keep running without $this.
            if func.is_static {
                return Ok(Val::Null);
            }
            Some(obj)
        }
        _ => None,
    };
    let static_class = match &this {
        Some(obj) => Some(obj.class().clone()),
        None => new_scope.clone().or_else(|| static_class.clone()),
    };
    let callee = Callee::User {
        func: func.clone(),
        this,
        scope: new_scope,
        static_class,
        captures: captures.clone(),
    };
    Ok(Val::Object(vm.new_closure(callee, state.magic.clone())?))
}

/// `Closure::bind($closure, $newThis, $newScope = "static")`
pub fn closure_bind(vm: &mut VM, _this: Option<&ObjectRef>, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "Closure::bind", args, 2, 3)?;
    let state = closure_state(vm, &arg(args, 0), "Closure::bind")?;
    let scope = (args.len() > 2).then(|| arg(args, 2));
    rebind(vm, &state, arg(args, 1), scope)
}

pub fn closure_bind_to(vm: &mut VM, this: Option<&ObjectRef>, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "Closure::bindTo", args, 1, 2)?;
    let closure = this_object(vm, this, "Closure::bindTo")?;
    let state = closure_state(vm, &Val::Object(closure), "Closure::bindTo")?;
    let scope = (args.len() > 1).then(|| arg(args, 1));
    rebind(vm, &state, arg(args, 0), scope)
}

/// `$closure->call($newThis, ...$args)` binds temporarily and calls.
pub fn closure_call(vm: &mut VM, this: Option<&ObjectRef>, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "Closure::call", args, 1, usize::MAX)?;
    let closure = this_object(vm, this, "Closure::call")?;
    let state = closure_state(vm, &Val::Object(closure), "Closure::call")?;
    let new_this = arg(args, 0);
    let Val::Object(target) = &new_this else {
        return Err(arg_type_error(vm, "Closure::call", 0, "newThis", "object", &new_this));
    };
    let bound = rebind(vm, &state, new_this.clone(), Some(Val::Object(target.clone())))?;
    if bound.is_null() {
        return Ok(Val::Null);
    }
    vm.call_value(&bound, args[1..].to_vec())
}

pub fn closure_from_callable(vm: &mut VM, _this: Option<&ObjectRef>, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "Closure::fromCallable", args, 1, 1)?;
    let callable = arg(args, 0);
    if let Val::Object(obj) = &callable
        && obj.internal::<ClosureState>().is_some()
    {
        return Ok(callable);
    }
    let call = vm.callable_to_call(&callable)?;
    let PendingCall { callee, magic, .. } = call;
    Ok(Val::Object(vm.new_closure(callee, magic)?))
}

pub fn closure_invoke(vm: &mut VM, this: Option<&ObjectRef>, args: &mut [Val]) -> Result<Val, VmError> {
    let closure = this_object(vm, this, "Closure::__invoke")?;
    vm.call_value(&Val::Object(closure), args.to_vec())
}

// ---- Generator ----------------------------------------------------------

pub fn generator_current(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let generator = this_object(vm, this, "Generator::current")?;
    vm.generator_current(&generator)
}

pub fn generator_key(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let generator = this_object(vm, this, "Generator::key")?;
    vm.generator_key(&generator)
}

pub fn generator_next(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let generator = this_object(vm, this, "Generator::next")?;
    vm.generator_next(&generator)?;
    Ok(Val::Null)
}

pub fn generator_rewind(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let generator = this_object(vm, this, "Generator::rewind")?;
    vm.generator_rewind(&generator)?;
    Ok(Val::Null)
}

pub fn generator_valid(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let generator = this_object(vm, this, "Generator::valid")?;
    Ok(Val::Bool(vm.generator_valid(&generator)?))
}

pub fn generator_send(vm: &mut VM, this: Option<&ObjectRef>, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "Generator::send", args, 1, 1)?;
    let generator = this_object(vm, this, "Generator::send")?;
    vm.generator_send(&generator, arg(args, 0))
}

pub fn generator_throw(vm: &mut VM, this: Option<&ObjectRef>, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "Generator::throw", args, 1, 1)?;
    let generator = this_object(vm, this, "Generator::throw")?;
    match arg(args, 0) {
        Val::Object(exc) if exc.class().is_a(vm.program.sym.throwable) => vm.generator_throw(&generator, exc),
        other => Err(arg_type_error(vm, "Generator::throw", 0, "exception", "Throwable", &other)),
    }
}

pub fn generator_get_return(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let generator = this_object(vm, this, "Generator::getReturn")?;
    vm.generator_return(&generator)
}

// ---- class functions ----------------------------------------------------

/// Class named by an object or a class-name string; `None` when unknown.
fn class_of(vm: &mut VM, val: &Val, allow_string: bool) -> Result<Option<Rc<ClassDef>>, VmError> {
    Ok(match val {
        Val::Object(obj) => Some(obj.class().clone()),
        Val::String(name) if allow_string => vm.program.find_class(name).cloned(),
        _ => None,
    })
}

pub fn php_get_class(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "get_class", args, 0, 1)?;
    if args.is_empty() {
        return match vm.current_scope() {
            Some(scope) => Ok(class_name_val(vm, &scope)),
            None => Err(vm.throw_error(b"Error", "get_class() without arguments must be called from within a class")),
        };
    }
    match arg(args, 0) {
        Val::Object(obj) => Ok(class_name_val(vm, obj.class())),
        other => Err(arg_type_error(vm, "get_class", 0, "object", "object", &other)),
    }
}

pub fn php_get_parent_class(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "get_parent_class", args, 0, 1)?;
    let class = if args.is_empty() {
        vm.current_scope()
    } else {
        class_of(vm, &arg(args, 0), true)?
    };
    Ok(match class.and_then(|c| c.parent.clone()) {
        Some(parent) => class_name_val(vm, &parent),
        None => Val::Bool(false),
    })
}

pub fn php_get_called_class(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "get_called_class", args, 0, 0)?;
    let class = vm.frames.last().and_then(|f| f.static_class.clone());
    match class {
        Some(class) => Ok(class_name_val(vm, &class)),
        None => Err(vm.throw_error(b"Error", "get_called_class() must be called from within a class")),
    }
}

/// Properties accessible from the calling scope, dynamic ones included.
pub fn php_get_object_vars(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "get_object_vars", args, 1, 1)?;
    let Val::Object(obj) = arg(args, 0) else {
        let given = arg(args, 0);
        return Err(arg_type_error(vm, "get_object_vars", 0, "object", "object", &given));
    };
    let mut out = ArrayData::new();
    for name in vm.visible_properties(&obj) {
        let value = obj.property(name).unwrap_or_default();
        let key = ArrayKey::from_bytes(vm.program.interner.text(name));
        out.insert_raw(key, value);
    }
    Ok(Val::Array(Rc::new(out)))
}

pub fn php_get_class_methods(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "get_class_methods", args, 1, 1)?;
    let target = arg(args, 0);
    let Some(class) = class_of(vm, &target, true)? else {
        return Err(arg_type_error(vm, "get_class_methods", 0, "object_or_class", "object|string", &target));
    };
    let scope = vm.current_scope();
    let names: Vec<Val> = class
        .methods
        .iter()
        .filter(|(lname, entry)| vm.method_visible_from(&class, **lname, entry.visibility, entry.scope, scope.as_deref()))
        .map(|(_, entry)| Val::string(vm.program.interner.text(entry.name).to_vec()))
        .collect();
    Ok(Val::Array(Rc::new(ArrayData::from(names))))
}

pub fn php_method_exists(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "method_exists", args, 2, 2)?;
    let Some(class) = class_of(vm, &arg(args, 0), true)? else {
        return Ok(Val::Bool(false));
    };
    let method = arg_string(vm, args, 1)?;
    let found = vm
        .program
        .interner
        .find_lower(&method)
        .is_some_and(|lname| class.find_method(lname).is_some());
    Ok(Val::Bool(found))
}

pub fn php_property_exists(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "property_exists", args, 2, 2)?;
    let target = arg(args, 0);
    let Some(class) = class_of(vm, &target, true)? else {
        return Ok(Val::Bool(false));
    };
    let name = arg_string(vm, args, 1)?;
    let Some(sym) = vm.program.interner.find(&name) else {
        return Ok(Val::Bool(false));
    };
    if class.properties.contains_key(&sym) || class.static_props.contains_key(&sym) {
        return Ok(Val::Bool(true));
    }
    Ok(Val::Bool(match &target {
        Val::Object(obj) => obj.borrow().properties.contains_key(&sym),
        _ => false,
    }))
}

fn kind_exists(vm: &mut VM, name: &str, args: &[Val], kind: ClassKind) -> Result<Val, VmError> {
    expect_args(vm, name, args, 1, 2)?;
    let class_name = arg_string(vm, args, 0)?;
    Ok(Val::Bool(vm.program.find_class(&class_name).is_some_and(|c| c.kind == kind)))
}

pub fn php_class_exists(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    kind_exists(vm, "class_exists", args, ClassKind::Class)
}

pub fn php_interface_exists(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    kind_exists(vm, "interface_exists", args, ClassKind::Interface)
}

pub fn php_trait_exists(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    kind_exists(vm, "trait_exists", args, ClassKind::Trait)
}

/// Shared body of `is_a` and `is_subclass_of`.
fn instance_check(vm: &mut VM, name: &str, args: &[Val], allow_string_default: bool, proper: bool) -> Result<Val, VmError> {
    expect_args(vm, name, args, 2, 3)?;
    let allow_string = if args.len() > 2 { arg(args, 2).to_bool() } else { allow_string_default };
    let Some(class) = class_of(vm, &arg(args, 0), allow_string)? else {
        return Ok(Val::Bool(false));
    };
    let target = arg_string(vm, args, 1)?;
    let Some(target) = vm.program.find_class(&target).cloned() else {
        return Ok(Val::Bool(false));
    };
    if proper && class.lname == target.lname {
        return Ok(Val::Bool(false));
    }
    Ok(Val::Bool(class.is_subclass_of(&target)))
}

pub fn php_is_a(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    instance_check(vm, "is_a", args, false, false)
}

pub fn php_is_subclass_of(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    instance_check(vm, "is_subclass_of", args, true, true)
}

pub fn php_class_implements(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "class_implements", args, 1, 2)?;
    let Some(class) = class_of(vm, &arg(args, 0), true)? else {
        return Ok(Val::Bool(false));
    };
    let mut out = ArrayData::new();
    for lname in &class.interfaces {
        if let Some(interface) = vm.program.class(*lname) {
            let name = vm.program.interner.text(interface.name).to_vec();
            out.insert_raw(ArrayKey::from_bytes(&name), Val::string(name));
        }
    }
    Ok(Val::Array(Rc::new(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Program;

    #[test]
    fn test_class_of_respects_allow_string() {
        let mut vm = VM::new(Program::new());
        let name = Val::string(b"stdClass".to_vec());
        assert!(class_of(&mut vm, &name, true).unwrap().is_some());
        assert!(class_of(&mut vm, &name, false).unwrap().is_none());
        assert!(class_of(&mut vm, &Val::Int(1), true).unwrap().is_none());
    }

    #[test]
    fn test_static_call_of_instance_method_fails() {
        let mut vm = VM::new(Program::new());
        assert!(this_object(&mut vm, None, "Generator::current").is_err());
    }
}
