use crate::errors::Unwind;
use crate::format::format_float;
use crate::numeric::{
    BinOp, Number, binop_type_error, float_division_by_zero, float_mod, number_of,
    zero_to_negative_power,
};
use crate::objects::Float;
use crate::primitives::{PrimitiveDesc, arg};
use crate::value::Value;
use crate::vm::VM;

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("+", 1, float_add),
        PrimitiveDesc::new("-", 1, float_sub),
        PrimitiveDesc::new("*", 1, float_mul),
        PrimitiveDesc::new("/", 1, float_div),
        PrimitiveDesc::new("//", 1, float_floor_div),
        PrimitiveDesc::new("%", 1, float_mod_primitive),
        PrimitiveDesc::new("**", 1, float_pow),
        PrimitiveDesc::new("&", 1, float_and),
        PrimitiveDesc::new("|", 1, float_or),
        PrimitiveDesc::new("^", 1, float_xor),
        PrimitiveDesc::new("<<", 1, float_shl),
        PrimitiveDesc::new(">>", 1, float_shr),
        PrimitiveDesc::new("-self", 0, float_negate),
        PrimitiveDesc::new("+self", 0, float_identity),
        PrimitiveDesc::new("to_s", 0, float_to_s),
    ]
}

fn expect_float(vm: &VM, value: Value) -> Result<f64, Unwind> {
    Ok(vm.heap.body::<Float>(value)?.value)
}

/// `a op right` where at least one side is a float. Integer operands are
/// converted through `f64`; the result is never demoted.
pub fn float_binary(
    vm: &mut VM,
    op: BinOp,
    a: f64,
    right: Number,
    lhs: Value,
    rhs: Value,
) -> Result<Value, Unwind> {
    let b = right.to_f64();
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if right.is_zero() => {
            return Err(float_division_by_zero(vm));
        }
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => float_mod(a, b),
        BinOp::Pow if a == 0.0 && b < 0.0 => return Err(zero_to_negative_power(vm)),
        BinOp::Pow => a.powf(b),
        BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Shl | BinOp::Shr => {
            return Err(binop_type_error(vm, op.symbol(), lhs, rhs));
        }
    };
    Ok(vm.new_float(result))
}

fn binary(vm: &mut VM, op: BinOp, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let rhs = arg(args, 0)?;
    let a = expect_float(vm, receiver)?;
    let Some(right) = number_of(vm, rhs) else {
        return Err(binop_type_error(vm, op.symbol(), receiver, rhs));
    };
    float_binary(vm, op, a, right, receiver, rhs)
}

pub fn float_add(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Add, receiver, args)
}

pub fn float_sub(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Sub, receiver, args)
}

pub fn float_mul(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Mul, receiver, args)
}

pub fn float_div(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Div, receiver, args)
}

pub fn float_floor_div(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::FloorDiv, receiver, args)
}

pub fn float_mod_primitive(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Mod, receiver, args)
}

pub fn float_pow(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Pow, receiver, args)
}

pub fn float_and(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::And, receiver, args)
}

pub fn float_or(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Or, receiver, args)
}

pub fn float_xor(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Xor, receiver, args)
}

pub fn float_shl(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Shl, receiver, args)
}

pub fn float_shr(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    binary(vm, BinOp::Shr, receiver, args)
}

pub fn float_negate(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let a = expect_float(vm, receiver)?;
    Ok(vm.new_float(-a))
}

pub fn float_identity(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    expect_float(vm, receiver)?;
    Ok(receiver)
}

pub fn float_to_s(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let text = format_float(expect_float(vm, receiver)?);
    Ok(vm.new_string(&text))
}
