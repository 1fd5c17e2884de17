//! Literal parsing and compile-time folding of constant expressions.

use crate::core::value::{ArrayData, ArrayKey, Val};
use crate::parser::ast::{ArrayItem, BinaryOp, Expr, UnaryOp};
use std::rc::Rc;

/// Parses an integer literal as the lexer delivers it (separators removed).
/// Values that do not fit in an `i64` become floats.
pub fn parse_int_literal(text: &[u8]) -> Val {
    let (negative, digits) = match text.first() {
        Some(b'-') => (true, &text[1..]),
        _ => (false, text),
    };
    let (radix, body) = match digits {
        [b'0', b'x' | b'X', rest @ ..] => (16, rest),
        [b'0', b'b' | b'B', rest @ ..] => (2, rest),
        [b'0', b'o' | b'O', rest @ ..] => (8, rest),
        [b'0', rest @ ..] if !rest.is_empty() => (8, rest),
        _ => (10, digits),
    };
    let mut value: i64 = 0;
    let mut overflow = false;
    for &b in body {
        let Some(d) = (b as char).to_digit(radix) else {
            break;
        };
        match value
            .checked_mul(radix as i64)
            .and_then(|v| v.checked_add(d as i64))
        {
            Some(v) => value = v,
            None => {
                overflow = true;
                break;
            }
        }
    }
    if overflow {
        let f = oversized_to_float(body, radix);
        return Val::Float(if negative { -f } else { f });
    }
    Val::Int(if negative { -value } else { value })
}

/// Converts digits that overflow `i64` with a single rounding step.
fn oversized_to_float(body: &[u8], radix: u32) -> f64 {
    let len = body
        .iter()
        .position(|&b| (b as char).to_digit(radix).is_none())
        .unwrap_or(body.len());
    let digits = &body[..len];
    if radix == 10 {
        return std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(f64::INFINITY);
    }
    let mut wide: u128 = 0;
    for &b in digits {
        let d = (b as char).to_digit(radix).unwrap_or(0);
        match wide.checked_mul(radix as u128).and_then(|v| v.checked_add(d as u128)) {
            Some(v) => wide = v,
            None => {
                return digits
                    .iter()
                    .filter_map(|&b| (b as char).to_digit(radix))
                    .fold(0.0, |f, d| f * radix as f64 + d as f64);
            }
        }
    }
    wide as f64
}

pub fn parse_float_literal(text: &[u8]) -> Val {
    let s = std::str::from_utf8(text).unwrap_or("0");
    Val::Float(s.parse::<f64>().unwrap_or(0.0))
}

/// Evaluates `expr` when it is built only from literals.
pub fn fold(source: &[u8], expr: &Expr<'_>) -> Option<Val> {
    match expr {
        Expr::Integer { value, .. } => Some(parse_int_literal(value)),
        Expr::Float { value, .. } => Some(parse_float_literal(value)),
        Expr::String { value, .. } => Some(Val::string(value.to_vec())),
        Expr::Identifier { name, .. } => {
            let text = name.as_str(source);
            let text = text.strip_prefix(b"\\").unwrap_or(text);
            if text.eq_ignore_ascii_case(b"true") {
                Some(Val::Bool(true))
            } else if text.eq_ignore_ascii_case(b"false") {
                Some(Val::Bool(false))
            } else if text.eq_ignore_ascii_case(b"null") {
                Some(Val::Null)
            } else {
                None
            }
        }
        Expr::Unary { op, expr, .. } => {
            let inner = fold(source, expr)?;
            match (op, inner) {
                (UnaryOp::Minus, Val::Int(i)) => Some(match i.checked_neg() {
                    Some(n) => Val::Int(n),
                    None => Val::Float(-(i as f64)),
                }),
                (UnaryOp::Minus, Val::Float(f)) => Some(Val::Float(-f)),
                (UnaryOp::Plus, v @ (Val::Int(_) | Val::Float(_))) => Some(v),
                (UnaryOp::Not, v) => Some(Val::Bool(!v.to_bool())),
                _ => None,
            }
        }
        Expr::Binary {
            left, op, right, ..
        } => {
            let l = fold(source, left)?;
            let r = fold(source, right)?;
            fold_binary(*op, l, r)
        }
        Expr::Array { items, .. } => fold_array(source, items),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, l: Val, r: Val) -> Option<Val> {
    match (op, &l, &r) {
        (BinaryOp::Concat, Val::String(_) | Val::Int(_), Val::String(_) | Val::Int(_)) => {
            let mut bytes = l.scalar_to_bytes();
            bytes.extend_from_slice(&r.scalar_to_bytes());
            Some(Val::string(bytes))
        }
        (BinaryOp::Plus, Val::Int(a), Val::Int(b)) => a.checked_add(*b).map(Val::Int),
        (BinaryOp::Minus, Val::Int(a), Val::Int(b)) => a.checked_sub(*b).map(Val::Int),
        (BinaryOp::Mul, Val::Int(a), Val::Int(b)) => a.checked_mul(*b).map(Val::Int),
        (BinaryOp::ShiftLeft, Val::Int(a), Val::Int(b)) if (0..64).contains(b) => {
            Some(Val::Int(a.wrapping_shl(*b as u32)))
        }
        (BinaryOp::BitOr, Val::Int(a), Val::Int(b)) => Some(Val::Int(a | b)),
        (BinaryOp::BitAnd, Val::Int(a), Val::Int(b)) => Some(Val::Int(a & b)),
        (BinaryOp::Plus, Val::Float(a), Val::Float(b)) => Some(Val::Float(a + b)),
        (BinaryOp::Mul, Val::Float(a), Val::Float(b)) => Some(Val::Float(a * b)),
        _ => None,
    }
}

fn fold_array(source: &[u8], items: &[ArrayItem<'_>]) -> Option<Val> {
    let mut array = ArrayData::with_capacity(items.len());
    for item in items {
        if item.by_ref || item.unpack {
            return None;
        }
        let value = fold(source, item.value)?;
        match item.key {
            Some(key) => {
                let key = match fold(source, key)? {
                    Val::Int(i) => ArrayKey::Int(i),
                    Val::String(s) => ArrayKey::from_bytes(&s),
                    Val::Bool(b) => ArrayKey::Int(b as i64),
                    Val::Null => ArrayKey::Str(Rc::new(Vec::new())),
                    _ => return None,
                };
                array.insert(key, value);
            }
            None => {
                array.push(value);
            }
        }
    }
    Some(Val::Array(Rc::new(array)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_literals_in_every_base() {
        assert!(matches!(parse_int_literal(b"0x1F"), Val::Int(31)));
        assert!(matches!(parse_int_literal(b"0b101"), Val::Int(5)));
        assert!(matches!(parse_int_literal(b"0o17"), Val::Int(15)));
        assert!(matches!(parse_int_literal(b"017"), Val::Int(15)));
        assert!(matches!(parse_int_literal(b"0"), Val::Int(0)));
        assert!(matches!(parse_int_literal(b"-12"), Val::Int(-12)));
    }

    #[test]
    fn oversized_integer_becomes_float() {
        match parse_int_literal(b"9223372036854775808") {
            Val::Float(f) => assert_eq!(f, 9223372036854775808.0),
            other => panic!("expected float, got {other:?}"),
        }
        match parse_int_literal(b"99999999999999999999") {
            Val::Float(f) => assert_eq!(f, 1e20),
            other => panic!("expected float, got {other:?}"),
        }
        match parse_int_literal(b"0xFFFFFFFFFFFFFFFF") {
            Val::Float(f) => assert_eq!(f, 18446744073709551615.0),
            other => panic!("expected float, got {other:?}"),
        }
    }
}
