//! Methods shared by `Exception` and `Error`, and through them by every
//! other throwable class.

use crate::builtins::{arg, arg_type_error};
use crate::core::value::{ObjectRef, Val};
use crate::vm::engine::{VM, VmError};

fn receiver(vm: &mut VM, this: Option<&ObjectRef>) -> Result<ObjectRef, VmError> {
    this.cloned()
        .ok_or_else(|| vm.throw_error(b"Error", "Non-static method cannot be called statically"))
}

/// `__construct(string $message = "", int $code = 0, ?Throwable $previous = null)`
pub fn exception_construct(vm: &mut VM, this: Option<&ObjectRef>, args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    let class = vm.class_name(exc.class());
    let method = format!("{}::__construct", class);
    let sym = vm.program.sym;
    if args.len() > 3 {
        return Err(vm.throw_error(
            b"ArgumentCountError",
            format!("{}() expects at most 3 arguments, {} given", method, args.len()),
        ));
    }
    if !args.is_empty() {
        let message = arg(args, 0);
        if matches!(message, Val::Array(_) | Val::Object(_)) {
            return Err(arg_type_error(vm, &method, 0, "message", "string", &message));
        }
        let message = vm.to_string_val(&message)?;
        exc.set_property(sym.message, message);
    }
    if args.len() > 1 {
        let code = arg(args, 1);
        match code {
            Val::Int(_) | Val::Bool(_) | Val::Null => exc.set_property(sym.code, Val::Int(code.to_int())),
            Val::Float(f) if f.fract() == 0.0 => exc.set_property(sym.code, Val::Int(f as i64)),
            other => return Err(arg_type_error(vm, &method, 1, "code", "int", &other)),
        }
    }
    match arg(args, 2) {
        Val::Null => {}
        Val::Object(previous) if previous.class().is_a(sym.throwable) => {
            exc.set_property(sym.previous, Val::Object(previous));
        }
        other => return Err(arg_type_error(vm, &method, 2, "previous", "?Throwable", &other)),
    }
    Ok(Val::Null)
}

/// `ErrorException::__construct($message, $code, $severity, $filename, $line, $previous)`
pub fn error_exception_construct(vm: &mut VM, this: Option<&ObjectRef>, args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    let mut base: Vec<Val> = args.iter().take(2).map(Val::deref_clone).collect();
    if args.len() > 5 {
        base.resize(2, Val::Null);
        base.push(arg(args, 5));
    }
    exception_construct(vm, Some(&exc), &mut base)?;
    let severity = if args.len() > 2 { arg(args, 2).to_int() } else { 1 };
    let severity_sym = vm.program.interner.intern(b"severity");
    exc.set_property(severity_sym, Val::Int(severity));
    let sym = vm.program.sym;
    if let Val::String(file) = arg(args, 3) {
        exc.set_property(sym.file, Val::String(file));
    }
    if let Val::Int(line) = arg(args, 4) {
        exc.set_property(sym.line, Val::Int(line));
    }
    Ok(Val::Null)
}

pub fn error_exception_get_severity(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    let severity = vm.program.interner.intern(b"severity");
    Ok(exc.property(severity).unwrap_or(Val::Int(1)))
}

pub fn exception_get_message(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    Ok(exc.property(vm.program.sym.message).unwrap_or_else(|| Val::string(Vec::new())))
}

pub fn exception_get_code(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    Ok(exc.property(vm.program.sym.code).unwrap_or(Val::Int(0)))
}

pub fn exception_get_file(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    Ok(exc.property(vm.program.sym.file).unwrap_or_else(|| Val::string(Vec::new())))
}

pub fn exception_get_line(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    Ok(exc.property(vm.program.sym.line).unwrap_or(Val::Int(0)))
}

pub fn exception_get_trace(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    Ok(exc.property(vm.program.sym.trace).unwrap_or_else(Val::empty_array))
}

pub fn exception_get_trace_as_string(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    Ok(Val::string(vm.trace_as_string(&exc)))
}

pub fn exception_get_previous(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    Ok(exc.property(vm.program.sym.previous).unwrap_or_default())
}

/// One link of the `__toString` chain.
fn describe(vm: &mut VM, exc: &ObjectRef) -> Result<String, VmError> {
    let sym = vm.program.sym;
    let message = vm.to_string_bytes(&exc.property(sym.message).unwrap_or_default())?;
    let file = vm.to_string_bytes(&exc.property(sym.file).unwrap_or_default())?;
    let line = exc.property(sym.line).map(|v| v.to_int()).unwrap_or(0);
    let class = vm.class_name(exc.class());
    let head = if message.is_empty() {
        class
    } else {
        format!("{}: {}", class, String::from_utf8_lossy(&message))
    };
    Ok(format!(
        "{} in {}:{}\nStack trace:\n{}",
        head,
        String::from_utf8_lossy(&file),
        line,
        vm.trace_as_string(exc)
    ))
}

/// Innermost previous exception first, each later one introduced by "Next".
pub fn exception_to_string(vm: &mut VM, this: Option<&ObjectRef>, _args: &mut [Val]) -> Result<Val, VmError> {
    let exc = receiver(vm, this)?;
    let mut chain = vec![exc.clone()];
    while let Some(Val::Object(previous)) = chain.last().and_then(|e| e.property(vm.program.sym.previous)) {
        if chain.iter().any(|seen| seen.ptr_eq(&previous)) {
            break;
        }
        chain.push(previous);
    }
    let mut out = String::new();
    for (i, link) in chain.iter().rev().enumerate() {
        if i > 0 {
            out.push_str("\n\nNext ");
        }
        out.push_str(&describe(vm, link)?);
    }
    Ok(Val::string(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Program;

    #[test]
    fn test_to_string_without_message() {
        let mut vm = VM::new(Program::new());
        let exc = vm.create_exception(b"RuntimeException", "", None).unwrap();
        let text = exception_to_string(&mut vm, Some(&exc), &mut []).unwrap();
        let Val::String(text) = text else { panic!("expected a string") };
        assert!(text.starts_with(b"RuntimeException in "));
        assert!(text.ends_with(b"#0 {main}"));
    }

    #[test]
    fn test_to_string_lists_previous_first() {
        let mut vm = VM::new(Program::new());
        let inner = vm.create_exception(b"LogicException", "inner", None).unwrap();
        let outer = vm.create_exception(b"RuntimeException", "outer", Some(inner)).unwrap();
        let Val::String(text) = exception_to_string(&mut vm, Some(&outer), &mut []).unwrap() else {
            panic!("expected a string")
        };
        let text = String::from_utf8_lossy(&text).into_owned();
        let inner_at = text.find("LogicException: inner").unwrap();
        let outer_at = text.find("Next RuntimeException: outer").unwrap();
        assert!(inner_at < outer_at);
    }
}
