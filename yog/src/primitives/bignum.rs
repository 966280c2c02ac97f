use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::errors::Unwind;
use crate::objects::BigNum;
use crate::numeric::{
    BinOp, Number, binop_type_error, int_pow, int_shift, int_true_div, integer_division_by_zero,
    normalize, number_of,
};
use crate::primitives::{PrimitiveDesc, arg, float};
use crate::value::Value;
use crate::vm::VM;

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("+", 1, bignum_add),
        PrimitiveDesc::new("-", 1, bignum_sub),
        PrimitiveDesc::new("*", 1, bignum_mul),
        PrimitiveDesc::new("/", 1, bignum_div),
        PrimitiveDesc::new("//", 1, bignum_floor_div),
        PrimitiveDesc::new("%", 1, bignum_mod),
        PrimitiveDesc::new("**", 1, bignum_pow),
        PrimitiveDesc::new("&", 1, bignum_and),
        PrimitiveDesc::new("|", 1, bignum_or),
        PrimitiveDesc::new("^", 1, bignum_xor),
        PrimitiveDesc::new("<<", 1, bignum_shl),
        PrimitiveDesc::new(">>", 1, bignum_shr),
        PrimitiveDesc::new("-self", 0, bignum_negate),
        PrimitiveDesc::new("+self", 0, bignum_identity),
        PrimitiveDesc::new("~self", 0, bignum_invert),
        PrimitiveDesc::new("to_s", 0, bignum_to_s),
    ]
}

fn expect_bignum(vm: &VM, value: Value) -> Result<BigInt, Unwind> {
    Ok(vm.heap.body::<BigNum>(value)?.value().clone())
}

fn big_to_f64(value: &BigInt) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Widths outside `i64` saturate; `int_shift` rejects or clamps them.
fn shift_width(width: &BigInt) -> i64 {
    width
        .to_i64()
        .unwrap_or(if width.is_negative() { i64::MIN } else { i64::MAX })
}

/// `a op right` for an integer `a` that is (or was promoted to) a bignum.
/// `lhs` and `rhs` are the original operands, used for error messages.
pub fn bignum_binary(
    vm: &mut VM,
    op: BinOp,
    a: &BigInt,
    right: Number,
    lhs: Value,
    rhs: Value,
) -> Result<Value, Unwind> {
    let b = match right {
        Number::Fixed(n) => BigInt::from(n),
        Number::Big(n) => n,
        Number::Float(_) => return float::float_binary(vm, op, big_to_f64(a), right, lhs, rhs),
    };
    match op {
        BinOp::Add => Ok(normalize(vm, a + b)),
        BinOp::Sub => Ok(normalize(vm, a - b)),
        BinOp::Mul => Ok(normalize(vm, a * b)),
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b.is_zero() => {
            Err(integer_division_by_zero(vm, &Number::Big(a.clone())))
        }
        BinOp::Div => Ok(vm.new_float(int_true_div(a, &b))),
        BinOp::FloorDiv => Ok(normalize(vm, a.div_floor(&b))),
        BinOp::Mod => Ok(normalize(vm, a.mod_floor(&b))),
        BinOp::Pow => int_pow(vm, a, &b),
        BinOp::And => Ok(normalize(vm, a & b)),
        BinOp::Or => Ok(normalize(vm, a | b)),
        BinOp::Xor => Ok(normalize(vm, a ^ b)),
        BinOp::Shl => int_shift(vm, &Number::Big(a.clone()), shift_width(&b)),
        BinOp::Shr => int_shift(vm, &Number::Big(a.clone()), shift_width(&b).saturating_neg()),
    }
}

fn binary(vm: &mut VM, op: BinOp, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let rhs = arg(args, 0)?;
    let a = expect_bignum(vm, receiver)?;
    let Some(right) = number_of(vm, rhs) else {
        return Err(binop_type_error(vm, op.symbol(), receiver, rhs));
    };
    bignum_binary(vm, op, &a, right, receiver, rhs)
}

pub fn bignum_add(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Add, receiver, args)
}

pub fn bignum_sub(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Sub, receiver, args)
}

pub fn bignum_mul(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Mul, receiver, args)
}

pub fn bignum_div(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Div, receiver, args)
}

pub fn bignum_floor_div(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::FloorDiv, receiver, args)
}

pub fn bignum_mod(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Mod, receiver, args)
}

pub fn bignum_pow(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Pow, receiver, args)
}

pub fn bignum_and(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::And, receiver, args)
}

pub fn bignum_or(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Or, receiver, args)
}

pub fn bignum_xor(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Xor, receiver, args)
}

pub fn bignum_shl(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Shl, receiver, args)
}

pub fn bignum_shr(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Shr, receiver, args)
}

pub fn bignum_negate(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let a = expect_bignum(vm, receiver)?;
    Ok(normalize(vm, -a))
}

pub fn bignum_identity(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    vm.heap.body::<BigNum>(receiver)?;
    Ok(receiver)
}

pub fn bignum_invert(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let a = expect_bignum(vm, receiver)?;
    Ok(normalize(vm, !a))
}

pub fn bignum_to_s(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let text = expect_bignum(vm, receiver)?.to_string();
    Ok(vm.new_string(&text))
}
