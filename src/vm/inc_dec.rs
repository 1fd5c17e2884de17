/// Increment/Decrement operations for PHP values
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - increment_function/decrement_function
use crate::core::value::{Numeric, NumericKind, Val, parse_numeric_prefix};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::IncDecKind;
use std::rc::Rc;

/// Outcome of `++`/`--` on a value that is not a number, string or null.
#[derive(Debug, PartialEq, Eq)]
pub enum IncDecError {
    /// Arrays and objects cannot be incremented: carries the type name
    Unsupported(&'static str),
}

/// Increment a value following PHP semantics
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - increment_function
pub fn increment_value(val: Val) -> Result<Val, IncDecError> {
    match val {
        // INT: increment by 1, overflow to float
        Val::Int(i) => Ok(match i.checked_add(1) {
            Some(n) => Val::Int(n),
            None => Val::Float(i as f64 + 1.0),
        }),
        Val::Float(f) => Ok(Val::Float(f + 1.0)),
        Val::Null | Val::Uninitialized => Ok(Val::Int(1)),
        Val::String(s) => Ok(increment_string(s)),
        // Booleans and resources are left alone
        Val::Bool(_) | Val::Resource(_) => Ok(val),
        Val::Ref(r) => increment_value(r.get()),
        Val::Array(_) => Err(IncDecError::Unsupported("array")),
        Val::Object(_) | Val::AppendPlaceholder => Err(IncDecError::Unsupported("object")),
    }
}

/// Decrement a value following PHP semantics
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - decrement_function
pub fn decrement_value(val: Val) -> Result<Val, IncDecError> {
    match val {
        Val::Int(i) => Ok(match i.checked_sub(1) {
            Some(n) => Val::Int(n),
            None => Val::Float(i as f64 - 1.0),
        }),
        Val::Float(f) => Ok(Val::Float(f - 1.0)),
        // NULL-- stays NULL
        Val::Null | Val::Uninitialized => Ok(Val::Null),
        Val::String(s) => Ok(decrement_string(s)),
        Val::Bool(_) | Val::Resource(_) => Ok(val),
        Val::Ref(r) => decrement_value(r.get()),
        Val::Array(_) => Err(IncDecError::Unsupported("array")),
        Val::Object(_) | Val::AppendPlaceholder => Err(IncDecError::Unsupported("object")),
    }
}

/// Numeric strings increment as numbers, others use Perl-style
/// alphanumeric carry ("a9" -> "b0", "Zz" -> "AAa").
/// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - increment_string
fn increment_string(s: Rc<Vec<u8>>) -> Val {
    if s.is_empty() {
        return Val::string("1");
    }
    if let (n, NumericKind::Full) = parse_numeric_prefix(&s) {
        return match n {
            Numeric::Int(i) => match i.checked_add(1) {
                Some(n) => Val::Int(n),
                None => Val::Float(i as f64 + 1.0),
            },
            Numeric::Float(f) => Val::Float(f + 1.0),
        };
    }

    let mut result = (*s).clone();
    let mut pos = result.len();
    loop {
        if pos == 0 {
            break;
        }
        pos -= 1;
        let (wrapped, first) = match result[pos] {
            b'z' => (b'a', b'a'),
            b'Z' => (b'A', b'A'),
            b'9' => (b'0', b'1'),
            ch if ch.is_ascii_alphanumeric() => {
                result[pos] = ch + 1;
                return Val::String(Rc::new(result));
            }
            // Stop at the first non-alphanumeric character
            _ => return Val::String(Rc::new(result)),
        };
        result[pos] = wrapped;
        let carry_stops = pos == 0 || !result[pos - 1].is_ascii_alphanumeric();
        if carry_stops {
            result.insert(pos, first);
            break;
        }
    }
    Val::String(Rc::new(result))
}

/// Only numeric strings decrement; "" becomes -1, anything else is unchanged.
fn decrement_string(s: Rc<Vec<u8>>) -> Val {
    if s.is_empty() {
        return Val::Int(-1);
    }
    match parse_numeric_prefix(&s) {
        (Numeric::Int(i), NumericKind::Full) => match i.checked_sub(1) {
            Some(n) => Val::Int(n),
            None => Val::Float(i as f64 - 1.0),
        },
        (Numeric::Float(f), NumericKind::Full) => Val::Float(f - 1.0),
        _ => Val::String(s),
    }
}

impl VM {
    /// Applies `kind` to `current`. Returns the expression result and the
    /// value to store back.
    pub(crate) fn inc_dec_value(&mut self, kind: IncDecKind, current: Val) -> Result<(Val, Val), VmError> {
        let updated = match kind {
            IncDecKind::PreInc | IncDecKind::PostInc => increment_value(current.clone()),
            IncDecKind::PreDec | IncDecKind::PostDec => decrement_value(current.clone()),
        };
        let updated = match updated {
            Ok(val) => val,
            Err(IncDecError::Unsupported(_)) => {
                let verb = match kind {
                    IncDecKind::PreInc | IncDecKind::PostInc => "increment",
                    IncDecKind::PreDec | IncDecKind::PostDec => "decrement",
                };
                let ty = self.debug_type(&current);
                return Err(self.type_error(format!("Cannot {} {}", verb, ty)));
            }
        };
        Ok(match kind {
            IncDecKind::PreInc | IncDecKind::PreDec => (updated.clone(), updated),
            IncDecKind::PostInc | IncDecKind::PostDec => (current, updated),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(val: Val) -> Vec<u8> {
        match val {
            Val::String(s) => s.to_vec(),
            other => panic!("Expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_increment_int() {
        assert!(matches!(increment_value(Val::Int(5)), Ok(Val::Int(6))));
        assert!(matches!(increment_value(Val::Int(-1)), Ok(Val::Int(0))));
    }

    #[test]
    fn test_increment_int_overflow() {
        match increment_value(Val::Int(i64::MAX)) {
            Ok(Val::Float(f)) => assert!((f - 9223372036854775808.0).abs() < 1.0),
            other => panic!("Expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_increment_null() {
        assert!(matches!(increment_value(Val::Null), Ok(Val::Int(1))));
        assert!(matches!(decrement_value(Val::Null), Ok(Val::Null)));
    }

    #[test]
    fn test_increment_string_numeric() {
        assert!(matches!(increment_value(Val::string("5")), Ok(Val::Int(6))));
        assert!(matches!(increment_value(Val::string("5.5")), Ok(Val::Float(f)) if f == 6.5));
    }

    #[test]
    fn test_increment_string_alphanumeric() {
        assert_eq!(text(increment_value(Val::string("a")).unwrap()), b"b");
        assert_eq!(text(increment_value(Val::string("z")).unwrap()), b"aa");
        assert_eq!(text(increment_value(Val::string("Az")).unwrap()), b"Ba");
        assert_eq!(text(increment_value(Val::string("a9")).unwrap()), b"b0");
        assert_eq!(text(increment_value(Val::string("Zz")).unwrap()), b"AAa");
    }

    #[test]
    fn test_decrement_string() {
        assert!(matches!(decrement_value(Val::string("5")), Ok(Val::Int(4))));
        assert!(matches!(decrement_value(Val::string("")), Ok(Val::Int(-1))));
        assert_eq!(text(decrement_value(Val::string("abc")).unwrap()), b"abc");
    }

    #[test]
    fn test_arrays_are_rejected() {
        assert_eq!(
            increment_value(Val::empty_array()).unwrap_err(),
            IncDecError::Unsupported("array")
        );
    }
}
