use num_bigint::BigInt;
use num_integer::Integer;

use crate::errors::{InvariantViolation, Unwind};
use crate::numeric::{
    BinOp, Number, binop_type_error, from_i128, int_pow, int_shift, integer_division_by_zero,
    number_of,
};
use crate::primitives::{PrimitiveDesc, arg, bignum, float};
use crate::value::Value;
use crate::vm::VM;

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("+", 1, fixnum_add),
        PrimitiveDesc::new("-", 1, fixnum_sub),
        PrimitiveDesc::new("*", 1, fixnum_mul),
        PrimitiveDesc::new("/", 1, fixnum_div),
        PrimitiveDesc::new("//", 1, fixnum_floor_div),
        PrimitiveDesc::new("%", 1, fixnum_mod),
        PrimitiveDesc::new("**", 1, fixnum_pow),
        PrimitiveDesc::new("&", 1, fixnum_and),
        PrimitiveDesc::new("|", 1, fixnum_or),
        PrimitiveDesc::new("^", 1, fixnum_xor),
        PrimitiveDesc::new("<<", 1, fixnum_shl),
        PrimitiveDesc::new(">>", 1, fixnum_shr),
        PrimitiveDesc::new("-self", 0, fixnum_negate),
        PrimitiveDesc::new("+self", 0, fixnum_identity),
        PrimitiveDesc::new("~self", 0, fixnum_invert),
        PrimitiveDesc::new("to_s", 0, fixnum_to_s),
    ]
}

pub(crate) fn expect_fixnum(value: Value) -> Result<i64, InvariantViolation> {
    value.as_fixnum().ok_or(InvariantViolation::NotAFixnum(value))
}

/// `receiver op rhs` with a fixnum on the left. Mixed operands are handed
/// to the wider kind: a bignum rhs promotes the receiver, a float rhs makes
/// the whole operation a float one.
pub fn fixnum_binary(vm: &mut VM, op: BinOp, receiver: Value, rhs: Value) -> Result<Value, Unwind> {
    let a = expect_fixnum(receiver)?;
    let Some(right) = number_of(vm, rhs) else {
        return Err(binop_type_error(vm, op.symbol(), receiver, rhs));
    };
    let b = match right {
        Number::Fixed(b) => b,
        Number::Big(_) => {
            return bignum::bignum_binary(vm, op, &BigInt::from(a), right, receiver, rhs);
        }
        Number::Float(_) => return float::float_binary(vm, op, a as f64, right, receiver, rhs),
    };
    let (x, y) = (a as i128, b as i128);
    match op {
        BinOp::Add => Ok(from_i128(vm, x + y)),
        BinOp::Sub => Ok(from_i128(vm, x - y)),
        BinOp::Mul => Ok(from_i128(vm, x * y)),
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0 => {
            Err(integer_division_by_zero(vm, &Number::Fixed(a)))
        }
        BinOp::Div => Ok(vm.new_float(a as f64 / b as f64)),
        BinOp::FloorDiv => Ok(from_i128(vm, x.div_floor(&y))),
        BinOp::Mod => Ok(from_i128(vm, x.mod_floor(&y))),
        BinOp::Pow => int_pow(vm, &BigInt::from(a), &BigInt::from(b)),
        BinOp::And => Ok(Value::from_i64(a & b)),
        BinOp::Or => Ok(Value::from_i64(a | b)),
        BinOp::Xor => Ok(Value::from_i64(a ^ b)),
        BinOp::Shl => int_shift(vm, &Number::Fixed(a), b),
        BinOp::Shr => int_shift(vm, &Number::Fixed(a), -b),
    }
}

pub fn fixnum_add(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Add, receiver, arg(args, 0)?)
}

pub fn fixnum_sub(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Sub, receiver, arg(args, 0)?)
}

pub fn fixnum_mul(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Mul, receiver, arg(args, 0)?)
}

pub fn fixnum_div(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Div, receiver, arg(args, 0)?)
}

pub fn fixnum_floor_div(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::FloorDiv, receiver, arg(args, 0)?)
}

pub fn fixnum_mod(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Mod, receiver, arg(args, 0)?)
}

pub fn fixnum_pow(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Pow, receiver, arg(args, 0)?)
}

pub fn fixnum_and(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::And, receiver, arg(args, 0)?)
}

pub fn fixnum_or(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Or, receiver, arg(args, 0)?)
}

pub fn fixnum_xor(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Xor, receiver, arg(args, 0)?)
}

pub fn fixnum_shl(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Shl, receiver, arg(args, 0)?)
}

pub fn fixnum_shr(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    fixnum_binary(vm, BinOp::Shr, receiver, arg(args, 0)?)
}

pub fn fixnum_negate(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let a = expect_fixnum(receiver)?;
    Ok(from_i128(vm, -(a as i128)))
}

pub fn fixnum_identity(_vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    expect_fixnum(receiver)?;
    Ok(receiver)
}

pub fn fixnum_invert(_vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    Ok(Value::from_i64(!expect_fixnum(receiver)?))
}

pub fn fixnum_to_s(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let a = expect_fixnum(receiver)?;
    Ok(vm.new_string(&a.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::objects::{BigNum, Float};
    use crate::value::{FIXNUM_MAX, FIXNUM_MIN};

    fn fix(n: i64) -> Value {
        Value::from_i64(n)
    }

    fn raised(vm: &VM, result: Result<Value, Unwind>) -> (Value, String) {
        let exc = result.expect_err("should raise").exception().expect("raised");
        (vm.class_of(exc).expect("class"), vm.exception_message(exc))
    }

    #[test]
    fn small_arithmetic_stays_fixnum() {
        let mut vm = VM::default();
        assert_eq!(fixnum_binary(&mut vm, BinOp::Add, fix(40), fix(2)), Ok(fix(42)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Sub, fix(2), fix(40)), Ok(fix(-38)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Mul, fix(-6), fix(7)), Ok(fix(-42)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Pow, fix(2), fix(10)), Ok(fix(1024)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::And, fix(0b1100), fix(0b1010)), Ok(fix(0b1000)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Or, fix(0b1100), fix(0b1010)), Ok(fix(0b1110)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Xor, fix(0b1100), fix(0b1010)), Ok(fix(0b0110)));
    }

    #[test]
    fn overflow_promotes_to_bignum() {
        let mut vm = VM::default();
        let sum = fixnum_binary(&mut vm, BinOp::Add, fix(FIXNUM_MAX), fix(1)).expect("add");
        assert_eq!(
            vm.heap.body::<BigNum>(sum).map(|b| b.value().clone()),
            Ok(BigInt::from(FIXNUM_MAX) + 1)
        );
        let product = fixnum_binary(&mut vm, BinOp::Mul, fix(0xffff_ffff), fix(0xffff_ffff)).expect("mul");
        assert!(vm.heap.try_body::<BigNum>(product).is_some());
        let negated = fixnum_negate(&mut vm, fix(FIXNUM_MIN), &[]).expect("neg");
        assert!(vm.heap.try_body::<BigNum>(negated).is_some());
    }

    #[test]
    fn doubling_a_wide_literal() {
        let mut vm = VM::default();
        let product = fixnum_binary(&mut vm, BinOp::Mul, fix(2), fix(0xdeadbeefface)).expect("mul");
        assert_eq!(product, fix(0x1bd5b7ddff59c));
        let sum = fixnum_binary(&mut vm, BinOp::Add, fix(0xffffffff), fix(0xffffffff)).expect("add");
        assert_eq!(sum, fix(0x1fffffffe));
    }

    #[test]
    fn division_is_floored_and_true_division_is_float() {
        let mut vm = VM::default();
        assert_eq!(fixnum_binary(&mut vm, BinOp::FloorDiv, fix(-7), fix(2)), Ok(fix(-4)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Mod, fix(-7), fix(2)), Ok(fix(1)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Mod, fix(7), fix(-2)), Ok(fix(-1)));
        let quotient = fixnum_binary(&mut vm, BinOp::Div, fix(7), fix(2)).expect("div");
        assert_eq!(vm.heap.body::<Float>(quotient).map(|f| f.value), Ok(3.5));
    }

    #[test]
    fn division_by_zero_raises() {
        let mut vm = VM::default();
        let zero_div = vm.special.error(ErrorKind::ZeroDivisionError);
        for op in [BinOp::Div, BinOp::FloorDiv, BinOp::Mod] {
            let result = fixnum_binary(&mut vm, op, fix(1), fix(0));
            assert_eq!(raised(&vm, result), (zero_div, "Fixnum division by zero".to_owned()));
        }
        let result = fixnum_binary(&mut vm, BinOp::Pow, fix(0), fix(-1));
        assert_eq!(raised(&vm, result).0, zero_div);
    }

    #[test]
    fn negative_exponent_gives_float() {
        let mut vm = VM::default();
        let result = fixnum_binary(&mut vm, BinOp::Pow, fix(2), fix(-2)).expect("pow");
        assert_eq!(vm.heap.body::<Float>(result).map(|f| f.value), Ok(0.25));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Pow, fix(5), fix(0)), Ok(fix(1)));
    }

    #[test]
    fn shifts_reverse_direction_on_negative_width() {
        let mut vm = VM::default();
        assert_eq!(fixnum_binary(&mut vm, BinOp::Shl, fix(1), fix(4)), Ok(fix(16)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Shl, fix(16), fix(-4)), Ok(fix(1)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Shr, fix(1), fix(-4)), Ok(fix(16)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Shr, fix(-5), fix(100)), Ok(fix(-1)));
        assert_eq!(fixnum_binary(&mut vm, BinOp::Shr, fix(5), fix(64)), Ok(fix(0)));
        let wide = fixnum_binary(&mut vm, BinOp::Shl, fix(1), fix(80)).expect("shl");
        assert_eq!(
            vm.heap.body::<BigNum>(wide).map(|b| b.value().clone()),
            Ok(BigInt::from(1) << 80)
        );
    }

    #[test]
    fn non_numeric_operands_raise_type_error() {
        let mut vm = VM::default();
        let type_error = vm.special.error(ErrorKind::TypeError);
        let result = fixnum_binary(&mut vm, BinOp::Add, fix(1), Value::TRUE);
        assert_eq!(
            raised(&vm, result),
            (type_error, "unsupported operand type(s) for +: 'Fixnum' and 'Bool'".to_owned())
        );
        let result = fixnum_binary(&mut vm, BinOp::Mul, fix(1), Value::NIL);
        assert_eq!(raised(&vm, result).0, type_error);
    }

    #[test]
    fn mixed_with_float_is_float() {
        let mut vm = VM::default();
        let half = vm.new_float(0.5);
        let sum = fixnum_binary(&mut vm, BinOp::Add, fix(1), half).expect("add");
        assert_eq!(vm.heap.body::<Float>(sum).map(|f| f.value), Ok(1.5));
        let zero = vm.new_float(0.0);
        let result = fixnum_binary(&mut vm, BinOp::Div, fix(1), zero);
        assert_eq!(raised(&vm, result).1, "float division");
        let result = fixnum_binary(&mut vm, BinOp::And, fix(1), half);
        assert_eq!(raised(&vm, result).0, vm.special.error(ErrorKind::TypeError));
    }

    #[test]
    fn unary_and_rendering() {
        let mut vm = VM::default();
        assert_eq!(fixnum_invert(&mut vm, fix(5), &[]), Ok(fix(-6)));
        assert_eq!(fixnum_identity(&mut vm, fix(5), &[]), Ok(fix(5)));
        let text = vm.call_method(fix(-42), "to_s", &[]).expect("to_s");
        assert_eq!(vm.str_of(text), Ok("-42"));
    }
}
