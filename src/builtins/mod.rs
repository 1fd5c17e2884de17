//! Builtin functions and the methods of builtin classes
//!
//! Every handler has the [`NativeHandler`](crate::runtime::registry::NativeHandler)
//! shape `fn(&mut VM, &mut [Val]) -> Result<Val, VmError>`; class methods
//! additionally receive `$this`. Registration happens in
//! [`CoreExtension`](crate::runtime::core_extension::CoreExtension).

pub mod array;
pub mod class;
pub mod exception;
pub mod function;
pub mod math;
pub mod spl;
pub mod string;
pub mod variable;

use crate::core::value::{ArrayData, Val};
use crate::vm::engine::{VM, VmError};
use std::rc::Rc;

/// Argument `index` with references resolved; null when it was not passed.
pub(crate) fn arg(args: &[Val], index: usize) -> Val {
    args.get(index).map(Val::deref_clone).unwrap_or_default()
}

/// Throws `ArgumentCountError` unless `min <= args.len() <= max`.
pub(crate) fn expect_args(
    vm: &mut VM,
    name: &str,
    args: &[Val],
    min: usize,
    max: usize,
) -> Result<(), VmError> {
    let given = args.len();
    if given >= min && given <= max {
        return Ok(());
    }
    let msg = if given < min {
        let qualifier = if min == max { "exactly" } else { "at least" };
        format!("{}() expects {} {} argument{}, {} given", name, qualifier, min, plural(min), given)
    } else {
        let qualifier = if min == max { "exactly" } else { "at most" };
        format!("{}() expects {} {} argument{}, {} given", name, qualifier, max, plural(max), given)
    };
    Err(vm.throw_error(b"ArgumentCountError", msg))
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// `TypeError` for argument `index` of `name` (zero-based).
pub(crate) fn arg_type_error(vm: &mut VM, name: &str, index: usize, param: &str, expected: &str, given: &Val) -> VmError {
    let given = vm.debug_type(given);
    vm.type_error(format!(
        "{}(): Argument #{} (${}) must be of type {}, {} given",
        name,
        index + 1,
        param,
        expected,
        given
    ))
}

pub(crate) fn arg_string(vm: &mut VM, args: &[Val], index: usize) -> Result<Vec<u8>, VmError> {
    match args.get(index) {
        Some(val) => vm.to_string_bytes(val),
        None => Ok(Vec::new()),
    }
}

pub(crate) fn arg_int(args: &[Val], index: usize) -> i64 {
    arg(args, index).to_int()
}

pub(crate) fn arg_float(args: &[Val], index: usize) -> f64 {
    arg(args, index).to_float()
}

/// Argument that must be an array.
pub(crate) fn arg_array(
    vm: &mut VM,
    name: &str,
    args: &[Val],
    index: usize,
    param: &str,
) -> Result<Rc<ArrayData>, VmError> {
    match arg(args, index) {
        Val::Array(arr) => Ok(arr),
        other => Err(arg_type_error(vm, name, index, param, "array", &other)),
    }
}

/// Stores `val` into a by-reference argument.
pub(crate) fn write_back(args: &[Val], index: usize, val: Val) {
    if let Some(Val::Ref(cell)) = args.get(index) {
        cell.set(val);
    }
}

/// The array behind a by-reference argument, for in-place functions
/// such as `sort` and `array_push`.
pub(crate) fn ref_array(
    vm: &mut VM,
    name: &str,
    args: &[Val],
    index: usize,
) -> Result<ArrayData, VmError> {
    match arg(args, index) {
        Val::Array(arr) => Ok(Rc::unwrap_or_clone(arr)),
        other => Err(arg_type_error(vm, name, index, "array", "array", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Reference;
    use crate::runtime::context::Program;

    #[test]
    fn test_arg_resolves_references() {
        let args = vec![Val::Ref(Reference::new(Val::Int(4)))];
        assert!(matches!(arg(&args, 0), Val::Int(4)));
        assert!(matches!(arg(&args, 1), Val::Null));
    }

    #[test]
    fn test_write_back_only_touches_references() {
        let cell = Reference::new(Val::Null);
        let args = vec![Val::Ref(cell.clone()), Val::Int(1)];
        write_back(&args, 0, Val::Int(9));
        write_back(&args, 1, Val::Int(9));
        assert!(matches!(cell.get(), Val::Int(9)));
        assert!(matches!(args[1], Val::Int(1)));
    }

    #[test]
    fn test_argument_count_message() {
        let mut vm = VM::new(Program::new());
        let err = expect_args(&mut vm, "strlen", &[], 1, 1).unwrap_err();
        let VmError::Thrown(exc) = err else {
            panic!("expected a thrown error");
        };
        assert_eq!(vm.class_name(exc.class()), "ArgumentCountError");
        let message = exc.property(vm.program.sym.message).unwrap();
        assert!(matches!(message, Val::String(s) if s.as_slice() == b"strlen() expects exactly 1 argument, 0 given"));
    }
}
