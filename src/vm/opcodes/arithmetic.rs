//! Arithmetic operations
//!
//! Implements PHP arithmetic operations following Zend engine semantics.
//!
//! ## PHP Semantics
//!
//! PHP arithmetic operations perform automatic type juggling:
//! - Numeric strings are converted to integers/floats
//! - Booleans: true=1, false=0
//! - null converts to 0
//! - Arrays and objects throw `TypeError` (except `array + array`, the union)
//! - Integer overflow promotes the result to float
//!
//! ## Operations
//!
//! - **Add**: `$a + $b` - Addition with type coercion, array union
//! - **Sub**: `$a - $b` - Subtraction
//! - **Mul**: `$a * $b` - Multiplication
//! - **Div**: `$a / $b` - Division (int when exact, float otherwise)
//! - **Mod**: `$a % $b` - Integer remainder, sign of the dividend
//! - **Pow**: `$a ** $b` - Exponentiation
//! - **Concat**: `$a . $b` - String concatenation
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.c` - arithmetic functions
//! - PHP Manual: https://www.php.net/manual/en/language.operators.arithmetic.php

use crate::core::value::{Numeric, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::ArithOp;
use std::rc::Rc;

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
            ArithOp::Pow => "**",
            ArithOp::Concat => ".",
            ArithOp::BitAnd => "&",
            ArithOp::BitOr => "|",
            ArithOp::BitXor => "^",
            ArithOp::Shl => "<<",
            ArithOp::Shr => ">>",
        }
    }
}

impl VM {
    /// Applies a binary operator to two values.
    /// Reference: $PHP_SRC_PATH/Zend/zend_operators.c - add_function, sub_function, ...
    pub fn arith(&mut self, op: ArithOp, a: &Val, b: &Val) -> Result<Val, VmError> {
        let a = a.deref_clone();
        let b = b.deref_clone();
        match op {
            ArithOp::Concat => {
                let mut out = self.to_string_bytes(&a)?;
                out.extend_from_slice(&self.to_string_bytes(&b)?);
                Ok(Val::string(out))
            }
            ArithOp::BitAnd | ArithOp::BitOr | ArithOp::BitXor | ArithOp::Shl | ArithOp::Shr => {
                self.bitwise(op, &a, &b)
            }
            ArithOp::Add => {
                if let (Val::Array(x), Val::Array(y)) = (&a, &b) {
                    let mut union = (**x).clone();
                    for (key, value) in y.map.iter() {
                        if !union.contains_key(key) {
                            union.insert_raw(key.clone(), value.clone());
                        }
                    }
                    return Ok(Val::Array(Rc::new(union)));
                }
                let (x, y) = self.numeric_operands(op, &a, &b)?;
                Ok(add(x, y))
            }
            ArithOp::Sub => {
                let (x, y) = self.numeric_operands(op, &a, &b)?;
                Ok(match (x, y) {
                    (Numeric::Int(x), Numeric::Int(y)) => match x.checked_sub(y) {
                        Some(r) => Val::Int(r),
                        None => Val::Float(x as f64 - y as f64),
                    },
                    (x, y) => Val::Float(x.as_f64() - y.as_f64()),
                })
            }
            ArithOp::Mul => {
                let (x, y) = self.numeric_operands(op, &a, &b)?;
                Ok(match (x, y) {
                    (Numeric::Int(x), Numeric::Int(y)) => match x.checked_mul(y) {
                        Some(r) => Val::Int(r),
                        None => Val::Float(x as f64 * y as f64),
                    },
                    (x, y) => Val::Float(x.as_f64() * y.as_f64()),
                })
            }
            ArithOp::Div => {
                let (x, y) = self.numeric_operands(op, &a, &b)?;
                if y.as_f64() == 0.0 {
                    return Err(self.throw_error(b"DivisionByZeroError", "Division by zero"));
                }
                Ok(match (x, y) {
                    (Numeric::Int(x), Numeric::Int(y)) if y != -1 || x != i64::MIN => {
                        if x % y == 0 {
                            Val::Int(x / y)
                        } else {
                            Val::Float(x as f64 / y as f64)
                        }
                    }
                    (x, y) => Val::Float(x.as_f64() / y.as_f64()),
                })
            }
            ArithOp::Mod => {
                let (x, y) = self.numeric_operands(op, &a, &b)?;
                let x = to_int(x);
                let y = to_int(y);
                if y == 0 {
                    return Err(self.throw_error(b"DivisionByZeroError", "Modulo by zero"));
                }
                Ok(Val::Int(x.wrapping_rem(y)))
            }
            ArithOp::Pow => {
                let (x, y) = self.numeric_operands(op, &a, &b)?;
                Ok(pow(x, y))
            }
        }
    }

    /// Converts both operands of an arithmetic operator to numbers.
    fn numeric_operands(&mut self, op: ArithOp, a: &Val, b: &Val) -> Result<(Numeric, Numeric), VmError> {
        match (a.to_number(), b.to_number()) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => {
                let left = self.debug_type(a);
                let right = self.debug_type(b);
                Err(self.type_error(format!(
                    "Unsupported operand types: {} {} {}",
                    left,
                    op.symbol(),
                    right
                )))
            }
        }
    }
}

fn to_int(n: Numeric) -> i64 {
    match n {
        Numeric::Int(i) => i,
        Numeric::Float(f) => crate::core::value::float_to_int(f),
    }
}

fn add(x: Numeric, y: Numeric) -> Val {
    match (x, y) {
        (Numeric::Int(x), Numeric::Int(y)) => match x.checked_add(y) {
            Some(r) => Val::Int(r),
            None => Val::Float(x as f64 + y as f64),
        },
        (x, y) => Val::Float(x.as_f64() + y.as_f64()),
    }
}

fn pow(base: Numeric, exp: Numeric) -> Val {
    if let (Numeric::Int(b), Numeric::Int(e)) = (base, exp)
        && e >= 0
    {
        let mut result: i64 = 1;
        let mut overflow = false;
        for _ in 0..e.min(64) {
            match result.checked_mul(b) {
                Some(r) => result = r,
                None => {
                    overflow = true;
                    break;
                }
            }
        }
        if !overflow && (e <= 64 || b == 0 || b == 1) {
            return Val::Int(result);
        }
        if !overflow && b == -1 {
            return Val::Int(if e % 2 == 0 { 1 } else { -1 });
        }
        return Val::Float((b as f64).powf(e as f64));
    }
    Val::Float(base.as_f64().powf(exp.as_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Program;

    fn vm() -> VM {
        VM::new(Program::new())
    }

    #[test]
    fn test_add_integers() {
        let mut vm = vm();
        let result = vm.arith(ArithOp::Add, &Val::Int(2), &Val::Int(3));
        assert!(matches!(result, Ok(Val::Int(5))));
    }

    #[test]
    fn test_add_overflow_promotes_to_float() {
        let mut vm = vm();
        let result = vm.arith(ArithOp::Add, &Val::Int(i64::MAX), &Val::Int(1));
        assert!(matches!(result, Ok(Val::Float(_))));
    }

    #[test]
    fn test_add_with_numeric_string() {
        let mut vm = vm();
        let result = vm.arith(ArithOp::Add, &Val::string("10"), &Val::Int(5));
        assert!(matches!(result, Ok(Val::Int(15))));
        let result = vm.arith(ArithOp::Add, &Val::string("1.5"), &Val::Int(1));
        assert!(matches!(result, Ok(Val::Float(f)) if f == 2.5));
    }

    #[test]
    fn test_divide_exact_and_inexact() {
        let mut vm = vm();
        assert!(matches!(vm.arith(ArithOp::Div, &Val::Int(10), &Val::Int(2)), Ok(Val::Int(5))));
        assert!(matches!(
            vm.arith(ArithOp::Div, &Val::Int(7), &Val::Int(2)),
            Ok(Val::Float(f)) if f == 3.5
        ));
    }

    #[test]
    fn test_division_by_zero_throws() {
        let mut vm = vm();
        let result = vm.arith(ArithOp::Div, &Val::Int(1), &Val::Int(0));
        match result {
            Err(VmError::Thrown(exc)) => {
                assert_eq!(vm.class_name(exc.class()), "DivisionByZeroError");
            }
            other => panic!("expected DivisionByZeroError, got {:?}", other),
        }
    }

    #[test]
    fn test_modulo_keeps_dividend_sign() {
        let mut vm = vm();
        assert!(matches!(vm.arith(ArithOp::Mod, &Val::Int(-7), &Val::Int(3)), Ok(Val::Int(-1))));
        assert!(matches!(vm.arith(ArithOp::Mod, &Val::Int(i64::MIN), &Val::Int(-1)), Ok(Val::Int(0))));
    }

    #[test]
    fn test_power() {
        let mut vm = vm();
        assert!(matches!(vm.arith(ArithOp::Pow, &Val::Int(2), &Val::Int(10)), Ok(Val::Int(1024))));
        assert!(matches!(vm.arith(ArithOp::Pow, &Val::Int(2), &Val::Int(-1)), Ok(Val::Float(f)) if f == 0.5));
        assert!(matches!(vm.arith(ArithOp::Pow, &Val::Int(2), &Val::Int(64)), Ok(Val::Float(_))));
    }

    #[test]
    fn test_array_union() {
        let mut vm = vm();
        let a = Val::Array(Rc::new(vec![Val::Int(1), Val::Int(2)].into()));
        let b = Val::Array(Rc::new(vec![Val::Int(9), Val::Int(9), Val::Int(3)].into()));
        match vm.arith(ArithOp::Add, &a, &b) {
            Ok(Val::Array(arr)) => {
                let values: Vec<i64> = arr.values().map(|v| v.to_int()).collect();
                assert_eq!(values, vec![1, 2, 3]);
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_array_plus_int_is_type_error() {
        let mut vm = vm();
        let result = vm.arith(ArithOp::Add, &Val::empty_array(), &Val::Int(1));
        assert!(matches!(result, Err(VmError::Thrown(_))));
    }
}
