//! Comparison operations
//!
//! Loose comparison (`==`, `<`, `<=>`, ...) following the PHP 8 rules;
//! strict identity (`===`) lives next to the dispatch loop.
//!
//! ## PHP 8 Semantics
//!
//! - `null <=> string`: null compares as `""`
//! - `bool <=> any`: both sides converted to bool
//! - `number <=> string`: numeric comparison if the string is numeric,
//!   otherwise the number is compared as a string
//! - `string <=> string`: numeric if both are numeric strings, bytewise otherwise
//! - Arrays: smaller count first, then element by element in the order of the
//!   left operand; a key missing on the right makes them uncomparable
//! - Objects of the same class compare property by property
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.c` - zend_compare, zend_is_identical
//! - PHP Manual: https://www.php.net/manual/en/language.operators.comparison.php

use crate::core::value::{NumericKind, Val, parse_numeric_prefix};
use crate::vm::engine::{VM, VmError};
use std::cmp::Ordering;

/// Result of comparing operands that have no order.
const UNCOMPARABLE: i64 = 1;

fn ordering(o: Ordering) -> i64 {
    match o {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn compare_f64(a: f64, b: f64) -> i64 {
    a.partial_cmp(&b).map(ordering).unwrap_or(UNCOMPARABLE)
}

fn numeric_string(s: &[u8]) -> Option<crate::core::value::Numeric> {
    match parse_numeric_prefix(s) {
        (n, NumericKind::Full) => Some(n),
        _ => None,
    }
}

impl VM {
    /// `$a == $b`
    pub fn loose_equals(&mut self, a: &Val, b: &Val) -> Result<bool, VmError> {
        match (a, b) {
            (Val::Object(x), Val::Object(y)) if x.ptr_eq(y) => Ok(true),
            (Val::Object(x), Val::Object(y)) if !std::rc::Rc::ptr_eq(x.class(), y.class()) => Ok(false),
            (Val::Array(x), Val::Array(y)) => {
                if x.len() != y.len() {
                    return Ok(false);
                }
                for (key, value) in x.iter() {
                    let Some(other) = y.get(key) else {
                        return Ok(false);
                    };
                    if !self.loose_equals(&value, &other)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(self.compare(a, b)? == 0),
        }
    }

    /// `$a <=> $b`
    pub fn compare(&mut self, a: &Val, b: &Val) -> Result<i64, VmError> {
        let a = a.deref_clone();
        let b = b.deref_clone();
        Ok(match (&a, &b) {
            (Val::Bool(_) | Val::Null | Val::Uninitialized, Val::Bool(_))
            | (Val::Bool(_), Val::Null | Val::Uninitialized) => {
                ordering(a.to_bool().cmp(&b.to_bool()))
            }
            (Val::Null | Val::Uninitialized, Val::Null | Val::Uninitialized) => 0,
            (Val::Null | Val::Uninitialized, Val::String(s)) => {
                if s.is_empty() {
                    0
                } else {
                    -1
                }
            }
            (Val::String(s), Val::Null | Val::Uninitialized) => {
                if s.is_empty() {
                    0
                } else {
                    1
                }
            }
            (Val::Bool(_), _) | (_, Val::Bool(_)) => ordering(a.to_bool().cmp(&b.to_bool())),
            (Val::Null | Val::Uninitialized, Val::Object(_)) => -1,
            (Val::Object(_), Val::Null | Val::Uninitialized) => 1,
            (Val::Null | Val::Uninitialized, _) | (_, Val::Null | Val::Uninitialized) => {
                ordering(a.to_bool().cmp(&b.to_bool()))
            }
            (Val::Int(x), Val::Int(y)) => ordering(x.cmp(y)),
            (Val::Int(_) | Val::Float(_), Val::Int(_) | Val::Float(_)) => {
                compare_f64(a.to_float(), b.to_float())
            }
            (Val::Int(_) | Val::Float(_), Val::String(s)) => match numeric_string(s) {
                Some(n) => self.compare(&a, &n.into_val())?,
                None => ordering(a.scalar_to_bytes().as_slice().cmp(s.as_slice())),
            },
            (Val::String(s), Val::Int(_) | Val::Float(_)) => match numeric_string(s) {
                Some(n) => self.compare(&n.into_val(), &b)?,
                None => ordering(s.as_slice().cmp(b.scalar_to_bytes().as_slice())),
            },
            (Val::String(x), Val::String(y)) => match (numeric_string(x), numeric_string(y)) {
                (Some(n), Some(m)) => self.compare(&n.into_val(), &m.into_val())?,
                _ => ordering(x.as_slice().cmp(y.as_slice())),
            },
            (Val::Array(x), Val::Array(y)) => {
                if x.len() != y.len() {
                    return Ok(ordering(x.len().cmp(&y.len())));
                }
                for (key, value) in x.iter() {
                    let Some(other) = y.get(key) else {
                        return Ok(UNCOMPARABLE);
                    };
                    let c = self.compare(&value, &other)?;
                    if c != 0 {
                        return Ok(c);
                    }
                }
                0
            }
            (Val::Array(_), _) => 1,
            (_, Val::Array(_)) => -1,
            (Val::Object(x), Val::Object(y)) => {
                if x.ptr_eq(y) {
                    return Ok(0);
                }
                if !std::rc::Rc::ptr_eq(x.class(), y.class()) {
                    return Ok(UNCOMPARABLE);
                }
                let left: Vec<(crate::core::value::Symbol, Val)> = x
                    .borrow()
                    .properties
                    .iter()
                    .map(|(k, v)| (*k, v.deref_clone()))
                    .collect();
                for (name, value) in left {
                    let Some(other) = y.property(name) else {
                        return Ok(UNCOMPARABLE);
                    };
                    let c = self.compare(&value, &other)?;
                    if c != 0 {
                        return Ok(c);
                    }
                }
                0
            }
            (Val::Object(obj), Val::String(s)) => {
                if obj.class().find_method(self.program.sym.to_string).is_some() {
                    let text = self.to_string_bytes(&a)?;
                    ordering(text.as_slice().cmp(s.as_slice()))
                } else {
                    1
                }
            }
            (Val::String(s), Val::Object(obj)) => {
                if obj.class().find_method(self.program.sym.to_string).is_some() {
                    let text = self.to_string_bytes(&b)?;
                    ordering(s.as_slice().cmp(text.as_slice()))
                } else {
                    -1
                }
            }
            (Val::Object(_), _) => 1,
            (_, Val::Object(_)) => -1,
            _ => compare_f64(a.to_float(), b.to_float()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Program;
    use crate::vm::engine::strict_equals;

    fn vm() -> VM {
        VM::new(Program::new())
    }

    #[test]
    fn test_php8_string_number_comparison() {
        let mut vm = vm();
        assert!(!vm.loose_equals(&Val::Int(0), &Val::string("foo")).unwrap());
        assert!(vm.loose_equals(&Val::Int(42), &Val::string("42")).unwrap());
        assert!(vm.loose_equals(&Val::string("1e3"), &Val::string("1000")).unwrap());
        assert!(!vm.loose_equals(&Val::string("abc"), &Val::string("ABC")).unwrap());
    }

    #[test]
    fn test_null_comparisons() {
        let mut vm = vm();
        assert!(vm.loose_equals(&Val::Null, &Val::string("")).unwrap());
        assert!(!vm.loose_equals(&Val::Null, &Val::string("0")).unwrap());
        assert!(vm.loose_equals(&Val::Null, &Val::Int(0)).unwrap());
        assert!(vm.loose_equals(&Val::Null, &Val::Bool(false)).unwrap());
    }

    #[test]
    fn test_spaceship() {
        let mut vm = vm();
        assert_eq!(vm.compare(&Val::Int(1), &Val::Int(2)).unwrap(), -1);
        assert_eq!(vm.compare(&Val::Float(2.5), &Val::Int(2)).unwrap(), 1);
        assert_eq!(vm.compare(&Val::string("a"), &Val::string("b")).unwrap(), -1);
    }

    #[test]
    fn test_strict_identity() {
        assert!(strict_equals(&Val::Int(1), &Val::Int(1)));
        assert!(!strict_equals(&Val::Int(1), &Val::Float(1.0)));
        assert!(!strict_equals(&Val::Int(1), &Val::string("1")));
    }

    #[test]
    fn test_array_comparison() {
        let mut vm = vm();
        let a = Val::Array(std::rc::Rc::new(vec![Val::Int(1), Val::Int(2)].into()));
        let b = Val::Array(std::rc::Rc::new(vec![Val::string("1"), Val::Int(2)].into()));
        assert!(vm.loose_equals(&a, &b).unwrap());
        assert!(!strict_equals(&a, &b));
    }
}
