//! Shared pieces of the numeric tower.
//!
//! Arithmetic dispatches on the left operand's class (see the `fixnum`,
//! `bignum` and `float` primitive modules); this module holds what they
//! have in common: operand classification, normalisation of integer
//! results, cross-kind comparison and hashing, and the error messages.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

use crate::errors::{ErrorKind, Unwind};
use crate::objects::{BigNum, Float};
use crate::value::{FIXNUM_MAX, Value};
use crate::vm::VM;

/// A numeric operand, unboxed.
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    Fixed(i64),
    Big(BigInt),
    Float(f64),
}

impl Number {
    pub fn to_f64(&self) -> f64 {
        match self {
            Number::Fixed(n) => *n as f64,
            Number::Big(n) => n.to_f64().unwrap_or(f64::NAN),
            Number::Float(f) => *f,
        }
    }

    /// The integer value, `None` for floats.
    pub fn to_bigint(&self) -> Option<BigInt> {
        match self {
            Number::Fixed(n) => Some(BigInt::from(*n)),
            Number::Big(n) => Some(n.clone()),
            Number::Float(_) => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Fixed(n) => *n == 0,
            Number::Big(n) => n.is_zero(),
            Number::Float(f) => *f == 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    pub const ALL: [BinOp; 12] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::FloorDiv,
        BinOp::Mod,
        BinOp::Pow,
        BinOp::And,
        BinOp::Or,
        BinOp::Xor,
        BinOp::Shl,
        BinOp::Shr,
    ];

    pub const fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

/// Classifies `value`; `None` for anything that is not a number.
pub fn number_of(vm: &VM, value: Value) -> Option<Number> {
    if let Some(n) = value.as_fixnum() {
        return Some(Number::Fixed(n));
    }
    if let Some(f) = vm.heap.try_body::<Float>(value) {
        return Some(Number::Float(f.value));
    }
    vm.heap
        .try_body::<BigNum>(value)
        .map(|big| Number::Big(big.value().clone()))
}

/// Boxes an integer result, demoting to a fixnum when it fits.
pub fn normalize(vm: &mut VM, value: BigInt) -> Value {
    match value.to_i64().and_then(Value::try_from_i64) {
        Some(fixnum) => fixnum,
        None => vm.new_bignum(value),
    }
}

pub fn from_i128(vm: &mut VM, value: i128) -> Value {
    match i64::try_from(value).ok().and_then(Value::try_from_i64) {
        Some(fixnum) => fixnum,
        None => vm.new_bignum(BigInt::from(value)),
    }
}

// ── Errors ──

pub fn binop_type_error(vm: &mut VM, op: &str, lhs: Value, rhs: Value) -> Unwind {
    let message = format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        vm.type_name(lhs),
        vm.type_name(rhs)
    );
    vm.raise_error(ErrorKind::TypeError, &message)
}

pub fn comparison_error(vm: &mut VM, lhs: Value, rhs: Value) -> Unwind {
    let message = format!("comparison of {} with {} failed", vm.type_name(lhs), vm.type_name(rhs));
    vm.raise_error(ErrorKind::TypeError, &message)
}

pub fn integer_division_by_zero(vm: &mut VM, lhs: &Number) -> Unwind {
    let message = match lhs {
        Number::Big(_) => "Bignum division by zero",
        _ => "Fixnum division by zero",
    };
    vm.raise_error(ErrorKind::ZeroDivisionError, message)
}

pub fn float_division_by_zero(vm: &mut VM) -> Unwind {
    vm.raise_error(ErrorKind::ZeroDivisionError, "float division")
}

pub fn zero_to_negative_power(vm: &mut VM) -> Unwind {
    vm.raise_error(ErrorKind::ZeroDivisionError, "0.0 cannot be raised to a negative power")
}

// ── Shared arithmetic ──

/// Floored float modulo: the result takes the sign of `b`.
pub fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
}

/// `base ** exp` for integers, following the promotion rules: negative
/// exponents produce floats, huge exponents are only allowed for the bases
/// whose powers stay bounded.
pub fn int_pow(vm: &mut VM, base: &BigInt, exp: &BigInt) -> Result<Value, Unwind> {
    if exp.is_negative() {
        if base.is_zero() {
            return Err(zero_to_negative_power(vm));
        }
        let base = base.to_f64().unwrap_or(f64::NAN);
        let exp = exp.to_f64().unwrap_or(f64::NEG_INFINITY);
        return Ok(vm.new_float(base.powf(exp)));
    }
    let one = BigInt::from(1);
    if base.is_zero() {
        return Ok(Value::from_i64(if exp.is_zero() { 1 } else { 0 }));
    }
    if *base == one {
        return Ok(Value::from_i64(1));
    }
    if *base == -one {
        let odd = exp.bit(0);
        return Ok(Value::from_i64(if odd { -1 } else { 1 }));
    }
    // |base| >= 2 here, so the result has at least (bits - 1) * exp bits
    let bits = base.bits().saturating_sub(1) as u128;
    let exp = match exp.to_u64() {
        Some(exp) if bits * exp as u128 <= MAX_INT_BITS as u128 => exp as u32,
        _ => return Err(vm.raise_error(ErrorKind::ValueError, "exponent too large")),
    };
    let result = base.pow(exp);
    Ok(normalize(vm, result))
}

/// Largest integer, in bits, that `**` and `<<` will build.
pub const MAX_INT_BITS: u64 = 1 << 26;

/// Shifts an integer left by `width` bits (right when negative).
///
/// Right shifts never fail; they bottom out at `0` or `-1`. A left shift
/// whose result would exceed [`MAX_INT_BITS`] raises `ValueError`.
pub fn int_shift(vm: &mut VM, value: &Number, width: i64) -> Result<Value, Unwind> {
    let n = match value {
        Number::Fixed(n) => BigInt::from(*n),
        Number::Big(n) => n.clone(),
        Number::Float(_) => return Err(vm.raise_error(ErrorKind::TypeError, "shift of a Float")),
    };
    if width < 0 {
        let w = width.unsigned_abs().min(n.bits() + 1);
        return Ok(normalize(vm, n >> w as usize));
    }
    let w = width as u64;
    if n.bits().saturating_add(w) > MAX_INT_BITS {
        if n.is_zero() {
            return Ok(Value::from_i64(0));
        }
        return Err(vm.raise_error(ErrorKind::ValueError, "shift width too large"));
    }
    if let Number::Fixed(small) = value {
        if w < 64 {
            return Ok(from_i128(vm, (*small as i128) << w));
        }
    }
    Ok(normalize(vm, n << w as usize))
}

/// `a / b` as a float, correctly rounded even when neither operand fits
/// an `f64`. `b` must be non-zero.
pub fn int_true_div(a: &BigInt, b: &BigInt) -> f64 {
    if let (Some(x), Some(y)) = (a.to_f64(), b.to_f64()) {
        // exact conversions keep the single rounding of the division
        if x.abs() < 2f64.powi(53) && y.abs() < 2f64.powi(53) {
            return x / y;
        }
    }
    let negative = a.is_negative() != b.is_negative();
    let (a, b) = (a.abs(), b.abs());
    // scale so the integer quotient carries 55 significant bits
    let scale = b.bits() as i64 - a.bits() as i64 + 55;
    let (num, den) = if scale >= 0 {
        (a << scale as usize, b)
    } else {
        (a, b << scale.unsigned_abs() as usize)
    };
    let (mut q, r) = num.div_rem(&den);
    if !r.is_zero() {
        // sticky bit so the conversion rounds the way the exact value would
        q |= BigInt::from(1);
    }
    let magnitude = ldexp(q.to_f64().unwrap_or(f64::INFINITY), -scale);
    if negative { -magnitude } else { magnitude }
}

/// `x * 2^exp` without overflowing the intermediate power.
fn ldexp(mut x: f64, exp: i64) -> f64 {
    let mut exp = exp.clamp(-2200, 2200) as i32;
    while exp > 1000 {
        x *= 2f64.powi(1000);
        exp -= 1000;
    }
    while exp < -1000 {
        x *= 2f64.powi(-1000);
        exp += 1000;
    }
    x * 2f64.powi(exp)
}

// ── Comparison and hashing ──

fn cmp_int_float(int: &BigInt, f: f64) -> Option<Ordering> {
    if f.is_nan() {
        return None;
    }
    if f.is_infinite() {
        return Some(if f > 0.0 { Ordering::Less } else { Ordering::Greater });
    }
    let floor = f.floor();
    let floor_int = BigInt::from_f64(floor)?;
    Some(match int.cmp(&floor_int) {
        Ordering::Equal if f > floor => Ordering::Less,
        ordering => ordering,
    })
}

/// Mathematical ordering across kinds; `None` when a NaN is involved.
pub fn compare_numbers(lhs: &Number, rhs: &Number) -> Option<Ordering> {
    match (lhs, rhs) {
        (Number::Fixed(a), Number::Fixed(b)) => Some(a.cmp(b)),
        (Number::Float(a), Number::Float(b)) => a.partial_cmp(b),
        (Number::Float(a), int) => cmp_int_float(&int.to_bigint()?, *a).map(Ordering::reverse),
        (int, Number::Float(b)) => cmp_int_float(&int.to_bigint()?, *b),
        (a, b) => Some(a.to_bigint()?.cmp(&b.to_bigint()?)),
    }
}

const HASH_MODULUS: i64 = (1 << 61) - 1;

fn bigint_hash(value: &BigInt) -> i64 {
    let modulus = BigInt::from(HASH_MODULUS);
    let reduced = (value.abs() % modulus).to_i64().unwrap_or(0);
    if value.is_negative() { -reduced } else { reduced }
}

/// Hash consistent with [`compare_numbers`] equality: equal numbers hash
/// equally whatever their kind. Always fits a fixnum.
pub fn hash_number(number: &Number) -> i64 {
    match number {
        Number::Fixed(n) => *n,
        Number::Big(n) => bigint_hash(n),
        Number::Float(f) => {
            if f.is_finite() && f.fract() == 0.0 {
                if let Some(int) = BigInt::from_f64(*f) {
                    return match int.to_i64().filter(|n| Value::fits_fixnum(*n)) {
                        Some(n) => n,
                        None => bigint_hash(&int),
                    };
                }
            }
            let bits = f.to_bits();
            ((bits ^ (bits >> 31)) as i64) & FIXNUM_MAX
        }
    }
}
