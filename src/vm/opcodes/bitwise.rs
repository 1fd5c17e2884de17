//! Bitwise operations
//!
//! Implements PHP bitwise operators following Zend semantics.
//!
//! ## PHP Semantics
//!
//! - Operands are converted to integers, except when both are strings: then
//!   `&`, `|` and `^` work byte by byte
//! - Shifting by a negative amount throws `ArithmeticError`
//! - Shifting by 64 or more yields 0 (or -1 for `>>` of a negative number)
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.c` - bitwise_or_function, shift_left_function
//! - PHP Manual: https://www.php.net/manual/en/language.operators.bitwise.php

use crate::core::value::Val;
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::ArithOp;

impl VM {
    pub(crate) fn bitwise(&mut self, op: ArithOp, a: &Val, b: &Val) -> Result<Val, VmError> {
        if let (Val::String(x), Val::String(y)) = (a, b)
            && matches!(op, ArithOp::BitAnd | ArithOp::BitOr | ArithOp::BitXor)
        {
            return Ok(Val::string(string_bitwise(op, x, y)));
        }
        if matches!(a, Val::Array(_) | Val::Object(_)) || matches!(b, Val::Array(_) | Val::Object(_)) {
            let left = self.debug_type(a);
            let right = self.debug_type(b);
            return Err(self.type_error(format!(
                "Unsupported operand types: {} {} {}",
                left,
                op.symbol(),
                right
            )));
        }
        let x = a.to_int();
        let y = b.to_int();
        Ok(Val::Int(match op {
            ArithOp::BitAnd => x & y,
            ArithOp::BitOr => x | y,
            ArithOp::BitXor => x ^ y,
            ArithOp::Shl | ArithOp::Shr => {
                if y < 0 {
                    return Err(self.throw_error(b"ArithmeticError", "Bit shift by negative number"));
                }
                match (op, y >= 64) {
                    (ArithOp::Shl, true) => 0,
                    (ArithOp::Shl, false) => x.wrapping_shl(y as u32),
                    (_, true) => {
                        if x < 0 {
                            -1
                        } else {
                            0
                        }
                    }
                    (_, false) => x >> y,
                }
            }
            _ => return Err(VmError::Fatal(format!("{:?} is not a bitwise operator", op))),
        }))
    }

    /// `~$a`
    pub(crate) fn bitwise_not(&mut self, val: &Val) -> Result<Val, VmError> {
        match val.deref_clone() {
            Val::Int(i) => Ok(Val::Int(!i)),
            Val::Float(f) => Ok(Val::Int(!crate::core::value::float_to_int(f))),
            Val::String(s) => Ok(Val::string(s.iter().map(|b| !b).collect::<Vec<u8>>())),
            other => {
                let ty = self.debug_type(&other);
                Err(self.type_error(format!("Cannot perform bitwise not on {}", ty)))
            }
        }
    }
}

/// Byte-wise `&`/`|`/`^`: `&` and `^` stop at the shorter operand, `|`
/// keeps the tail of the longer one.
fn string_bitwise(op: ArithOp, x: &[u8], y: &[u8]) -> Vec<u8> {
    let (short, long) = if x.len() <= y.len() { (x, y) } else { (y, x) };
    let mut out: Vec<u8> = short
        .iter()
        .zip(long.iter())
        .map(|(a, b)| match op {
            ArithOp::BitAnd => a & b,
            ArithOp::BitOr => a | b,
            _ => a ^ b,
        })
        .collect();
    if op == ArithOp::BitOr {
        out.extend_from_slice(&long[short.len()..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Program;

    #[test]
    fn test_integer_operators() {
        let mut vm = VM::new(Program::new());
        assert!(matches!(vm.bitwise(ArithOp::BitAnd, &Val::Int(12), &Val::Int(10)), Ok(Val::Int(8))));
        assert!(matches!(vm.bitwise(ArithOp::BitOr, &Val::Int(12), &Val::Int(10)), Ok(Val::Int(14))));
        assert!(matches!(vm.bitwise(ArithOp::BitXor, &Val::Int(12), &Val::Int(10)), Ok(Val::Int(6))));
        assert!(matches!(vm.bitwise_not(&Val::Int(0)), Ok(Val::Int(-1))));
    }

    #[test]
    fn test_shifts() {
        let mut vm = VM::new(Program::new());
        assert!(matches!(vm.bitwise(ArithOp::Shl, &Val::Int(1), &Val::Int(4)), Ok(Val::Int(16))));
        assert!(matches!(vm.bitwise(ArithOp::Shr, &Val::Int(-16), &Val::Int(2)), Ok(Val::Int(-4))));
        assert!(matches!(vm.bitwise(ArithOp::Shl, &Val::Int(1), &Val::Int(70)), Ok(Val::Int(0))));
        assert!(matches!(vm.bitwise(ArithOp::Shr, &Val::Int(-1), &Val::Int(70)), Ok(Val::Int(-1))));
        assert!(vm.bitwise(ArithOp::Shl, &Val::Int(1), &Val::Int(-1)).is_err());
    }

    #[test]
    fn test_string_operands() {
        assert_eq!(string_bitwise(ArithOp::BitOr, b"a", b"BC"), b"cC".to_vec());
        assert_eq!(string_bitwise(ArithOp::BitAnd, b"ab", b"a"), b"a".to_vec());
    }
}
