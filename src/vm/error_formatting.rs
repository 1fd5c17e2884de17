//! Error message formatting
//!
//! Turns values and exception objects into the text PHP prints in error
//! messages: type names for `TypeError`, the `Stack trace:` block and the
//! report of an uncaught exception.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_exceptions.c` - zend_exception_error, getTraceAsString
//! - Zend: `$PHP_SRC_PATH/Zend/zend_API.c` - zend_zval_value_name

use crate::core::value::{ObjectRef, Val};
use crate::vm::engine::{UncaughtException, VM};

/// Longest string shown verbatim in error messages.
const MAX_STRING_PARAM_LEN: usize = 15;

impl VM {
    /// `get_debug_type()`: class name for objects, scalar type names otherwise.
    pub fn debug_type(&self, val: &Val) -> String {
        match val {
            Val::Null | Val::Uninitialized => "null".into(),
            Val::Bool(_) => "bool".into(),
            Val::Int(_) => "int".into(),
            Val::Float(_) => "float".into(),
            Val::String(_) => "string".into(),
            Val::Array(_) => "array".into(),
            Val::Object(obj) => {
                if obj.class().is_anonymous {
                    "class@anonymous".into()
                } else {
                    self.class_name(obj.class())
                }
            }
            Val::Resource(_) => "resource".into(),
            Val::Ref(r) => self.debug_type(&r.get()),
            Val::AppendPlaceholder => "mixed".into(),
        }
    }

    pub(crate) fn match_subject_display(&self, val: &Val) -> String {
        match val {
            Val::Int(i) => i.to_string(),
            Val::String(s) => quote_string_param(s),
            other => format!("of type {}", self.debug_type(other)),
        }
    }

    /// `Exception::getTraceAsString()`
    pub fn trace_as_string(&self, exc: &ObjectRef) -> String {
        let mut out = String::new();
        let mut index = 0;
        if let Some(Val::Array(trace)) = exc.property(self.program.sym.trace) {
            for entry in trace.values() {
                let Val::Array(entry) = entry else { continue };
                let field = |name: &[u8]| {
                    entry
                        .get(&crate::core::value::ArrayKey::from_bytes(name))
                        .map(|v| String::from_utf8_lossy(&v.scalar_to_bytes()).into_owned())
                };
                let file = field(b"file").unwrap_or_default();
                let line = field(b"line").unwrap_or_default();
                let function = field(b"function").unwrap_or_default();
                let call = match (field(b"class"), field(b"type")) {
                    (Some(class), Some(kind)) => format!("{}{}{}", class, kind, function),
                    _ => function,
                };
                out.push_str(&format!("#{} {}({}): {}()\n", index, file, line, call));
                index += 1;
            }
        }
        out.push_str(&format!("#{} {{main}}", index));
        out
    }

    pub(crate) fn describe_uncaught(&self, exc: &ObjectRef) -> UncaughtException {
        let sym = self.program.sym;
        let text = |val: Option<Val>| {
            val.map(|v| String::from_utf8_lossy(&v.scalar_to_bytes()).into_owned())
                .unwrap_or_default()
        };
        UncaughtException {
            class: self.class_name(exc.class()),
            message: text(exc.property(sym.message)),
            file: text(exc.property(sym.file)),
            line: exc.property(sym.line).map(|v| v.to_int()).unwrap_or(0),
            trace: self.trace_as_string(exc),
        }
    }
}

/// `'abc'` or `'abcdefghijklmno...'` for long strings.
pub fn quote_string_param(bytes: &[u8]) -> String {
    if bytes.len() > MAX_STRING_PARAM_LEN {
        format!(
            "'{}...'",
            String::from_utf8_lossy(&bytes[..MAX_STRING_PARAM_LEN])
        )
    } else {
        format!("'{}'", String::from_utf8_lossy(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_strings_are_truncated() {
        assert_eq!(quote_string_param(b"foo"), "'foo'");
        assert_eq!(
            quote_string_param(b"abcdefghijklmnopqrstuvwxyz"),
            "'abcdefghijklmno...'"
        );
    }
}
