//! Exception construction
//!
//! Runtime errors raised by the engine are ordinary PHP exception objects
//! (`Error`, `TypeError`, `ArgumentCountError`, ...) so user code can catch
//! them like anything it throws itself.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_exceptions.c` - zend_throw_error, zend_fetch_debug_backtrace

use crate::core::value::{ArrayData, ArrayKey, ObjectRef, Val};
use crate::vm::engine::{VM, VmError};
use std::rc::Rc;

impl VM {
    /// Creates an exception of the builtin class `class` and returns it as
    /// an in-flight error, ready to be returned with `Err(..)`.
    pub fn throw_error(&mut self, class: &[u8], message: impl Into<String>) -> VmError {
        let message = message.into();
        match self.create_exception(class, &message, None) {
            Ok(exc) => VmError::Thrown(exc),
            Err(err) => err,
        }
    }

    /// `TypeError` shorthand.
    pub fn type_error(&mut self, message: impl Into<String>) -> VmError {
        self.throw_error(b"TypeError", message)
    }

    pub fn create_exception(
        &mut self,
        class: &[u8],
        message: &str,
        previous: Option<ObjectRef>,
    ) -> Result<ObjectRef, VmError> {
        let class = self.program.find_class(class).cloned().ok_or_else(|| {
            VmError::Fatal(format!(
                "Exception class {} is not registered",
                String::from_utf8_lossy(class)
            ))
        })?;
        let exc = self.instantiate(&class)?;
        exc.set_property(self.program.sym.message, Val::string(message.as_bytes()));
        if let Some(previous) = previous {
            exc.set_property(self.program.sym.previous, Val::Object(previous));
        }
        Ok(exc)
    }

    /// `throw $value`
    pub(crate) fn throw_value(&mut self, value: Val) -> VmError {
        match value {
            Val::Object(obj) if obj.class().is_a(self.program.sym.throwable) => VmError::Thrown(obj),
            _ => self.throw_error(b"Error", "Can only throw objects"),
        }
    }

    /// Records where a throwable was created: file, line and the call stack.
    pub(crate) fn fill_throwable(&self, exc: &ObjectRef) {
        let sym = self.program.sym;
        exc.set_property(sym.file, Val::string(self.program.file_name.clone()));
        exc.set_property(sym.line, Val::Int(i64::from(self.current_line())));
        exc.set_property(sym.trace, self.backtrace());
    }

    /// Stack trace as `debug_backtrace()` reports it, innermost call first.
    pub(crate) fn backtrace(&self) -> Val {
        let mut trace = ArrayData::new();
        for i in (1..self.frames.len()).rev() {
            let callee = &self.frames[i];
            let caller = &self.frames[i - 1];
            let mut entry = ArrayData::new();
            entry.insert(
                ArrayKey::Str(Rc::new(b"file".to_vec())),
                Val::string(self.program.file_name.clone()),
            );
            entry.insert(
                ArrayKey::Str(Rc::new(b"line".to_vec())),
                Val::Int(i64::from(caller.line())),
            );
            let name = self.program.interner.text(callee.func.name);
            let (class, function) = match name.windows(2).position(|w| w == b"::") {
                Some(at) => (Some(&name[..at]), &name[at + 2..]),
                None => (None, name),
            };
            entry.insert(ArrayKey::Str(Rc::new(b"function".to_vec())), Val::string(function));
            if let Some(class) = class {
                entry.insert(ArrayKey::Str(Rc::new(b"class".to_vec())), Val::string(class));
                let kind: &[u8] = if callee.this.is_some() { b"->" } else { b"::" };
                entry.insert(ArrayKey::Str(Rc::new(b"type".to_vec())), Val::string(kind));
            }
            trace.push(Val::Array(Rc::new(entry)));
        }
        Val::Array(Rc::new(trace))
    }
}
