use crate::builtins::{arg, arg_float, arg_int, arg_string, arg_type_error, expect_args};
use crate::core::value::{Numeric, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::ArithOp;

/// Rounds half away from zero at `places` decimals (negative places round
/// to tens, hundreds, ...). The scaled value is first cut to 15 significant
/// digits so that `round(1.005, 2)` gives `1.01`.
pub fn round_half_away(value: f64, places: i64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let places = places.clamp(-308, 308) as i32;
    let factor = 10f64.powi(places.abs());
    let scaled = if places >= 0 { value * factor } else { value / factor };
    if !scaled.is_finite() {
        return value;
    }
    let pre_rounded: f64 = format!("{:.14e}", scaled).parse().unwrap_or(scaled);
    let rounded = pre_rounded.round();
    let result = if places >= 0 { rounded / factor } else { rounded * factor };
    if result.is_finite() { result } else { value }
}

fn number_arg(vm: &mut VM, name: &str, args: &[Val], index: usize) -> Result<Numeric, VmError> {
    let value = arg(args, index);
    match value.to_number() {
        Some(n) => Ok(n),
        None => Err(arg_type_error(vm, name, index, "num", "int|float", &value)),
    }
}

pub fn php_abs(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "abs", args, 1, 1)?;
    Ok(match number_arg(vm, "abs", args, 0)? {
        Numeric::Int(i) => match i.checked_abs() {
            Some(v) => Val::Int(v),
            None => Val::Float(-(i as f64)),
        },
        Numeric::Float(f) => Val::Float(f.abs()),
    })
}

pub fn php_floor(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "floor", args, 1, 1)?;
    Ok(Val::Float(number_arg(vm, "floor", args, 0)?.as_f64().floor()))
}

pub fn php_ceil(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "ceil", args, 1, 1)?;
    Ok(Val::Float(number_arg(vm, "ceil", args, 0)?.as_f64().ceil()))
}

pub fn php_round(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "round", args, 1, 2)?;
    let value = number_arg(vm, "round", args, 0)?.as_f64();
    Ok(Val::Float(round_half_away(value, arg_int(args, 1))))
}

pub fn php_sqrt(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "sqrt", args, 1, 1)?;
    Ok(Val::Float(arg_float(args, 0).sqrt()))
}

pub fn php_pow(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "pow", args, 2, 2)?;
    let (base, exp) = (arg(args, 0), arg(args, 1));
    vm.arith(ArithOp::Pow, &base, &exp)
}

pub fn php_fmod(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "fmod", args, 2, 2)?;
    Ok(Val::Float(arg_float(args, 0) % arg_float(args, 1)))
}

pub fn php_intdiv(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "intdiv", args, 2, 2)?;
    let (a, b) = (arg_int(args, 0), arg_int(args, 1));
    if b == 0 {
        return Err(vm.throw_error(b"DivisionByZeroError", "Division by zero"));
    }
    match a.checked_div(b) {
        Some(q) => Ok(Val::Int(q)),
        None => Err(vm.throw_error(b"ArithmeticError", "Division of PHP_INT_MIN by -1 is not an integer")),
    }
}

pub fn php_pi(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "pi", args, 0, 0)?;
    Ok(Val::Float(std::f64::consts::PI))
}

/// `max()`/`min()`: a single array argument or at least two values.
fn extreme(vm: &mut VM, name: &str, args: &[Val], want_greater: bool) -> Result<Val, VmError> {
    expect_args(vm, name, args, 1, usize::MAX)?;
    let candidates: Vec<Val> = if args.len() == 1 {
        match arg(args, 0) {
            Val::Array(arr) if arr.is_empty() => {
                let msg = format!("{}(): Argument #1 ($value) must contain at least one element", name);
                return Err(vm.throw_error(b"ValueError", msg));
            }
            Val::Array(arr) => arr.values().map(|v| v.deref_clone()).collect(),
            other => return Err(arg_type_error(vm, name, 0, "value", "array", &other)),
        }
    } else {
        args.iter().map(Val::deref_clone).collect()
    };
    let mut best = candidates[0].clone();
    for candidate in candidates.into_iter().skip(1) {
        let ord = vm.compare(&candidate, &best)?;
        if (want_greater && ord > 0) || (!want_greater && ord < 0) {
            best = candidate;
        }
    }
    Ok(best)
}

pub fn php_max(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    extreme(vm, "max", args, true)
}

pub fn php_min(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    extreme(vm, "min", args, false)
}

pub fn php_is_nan(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "is_nan", args, 1, 1)?;
    Ok(Val::Bool(arg_float(args, 0).is_nan()))
}

pub fn php_is_infinite(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "is_infinite", args, 1, 1)?;
    Ok(Val::Bool(arg_float(args, 0).is_infinite()))
}

pub fn php_is_finite(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "is_finite", args, 1, 1)?;
    Ok(Val::Bool(arg_float(args, 0).is_finite()))
}

fn to_base(vm: &mut VM, name: &str, args: &[Val], radix: u32) -> Result<Val, VmError> {
    expect_args(vm, name, args, 1, 1)?;
    let n = arg_int(args, 0) as u64;
    let text = match radix {
        2 => format!("{:b}", n),
        8 => format!("{:o}", n),
        _ => format!("{:x}", n),
    };
    Ok(Val::string(text))
}

fn from_base(vm: &mut VM, name: &str, args: &[Val], radix: u32) -> Result<Val, VmError> {
    expect_args(vm, name, args, 1, 1)?;
    let digits: String = String::from_utf8_lossy(&arg_string(vm, args, 0)?)
        .chars()
        .filter(|c| c.is_digit(radix))
        .collect();
    if digits.is_empty() {
        return Ok(Val::Int(0));
    }
    Ok(match i64::from_str_radix(&digits, radix) {
        Ok(n) => Val::Int(n),
        // Overflow turns into a float like PHP does
        Err(_) => Val::Float(digits.chars().fold(0.0, |acc, c| {
            acc * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0))
        })),
    })
}

pub fn php_dechex(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    to_base(vm, "dechex", args, 16)
}

pub fn php_decbin(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    to_base(vm, "decbin", args, 2)
}

pub fn php_decoct(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    to_base(vm, "decoct", args, 8)
}

pub fn php_hexdec(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    from_base(vm, "hexdec", args, 16)
}

pub fn php_bindec(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    from_base(vm, "bindec", args, 2)
}

pub fn php_octdec(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    from_base(vm, "octdec", args, 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_half_away(2.5, 0), 3.0);
        assert_eq!(round_half_away(-2.5, 0), -3.0);
        assert_eq!(round_half_away(1.005, 2), 1.01);
        assert_eq!(round_half_away(1234.5678, -2), 1200.0);
        assert_eq!(round_half_away(3.14159, 3), 3.142);
    }

    #[test]
    fn test_round_keeps_non_finite() {
        assert!(round_half_away(f64::NAN, 2).is_nan());
        assert_eq!(round_half_away(f64::INFINITY, 0), f64::INFINITY);
    }
}
