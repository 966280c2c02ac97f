use std::cmp::Ordering;

use crate::errors::{InvariantViolation, Unwind};
use crate::numeric::{comparison_error, compare_numbers, hash_number, number_of};
use crate::value::Value;
use crate::vm::VM;

pub mod bignum;
pub mod fixnum;
pub mod float;
pub mod general;
pub mod parsing;

pub type PrimitiveFn = fn(&mut VM, Value, &[Value]) -> Result<Value, Unwind>;

#[derive(Clone, Copy)]
pub struct PrimitiveDesc {
    pub name: &'static str,
    pub arity: u8,
    pub func: PrimitiveFn,
}

impl PrimitiveDesc {
    pub const fn new(name: &'static str, arity: u8, func: PrimitiveFn) -> Self {
        Self { name, arity, func }
    }
}

/// Registers every native method on the built-in classes.
pub fn install(vm: &mut VM) -> Result<(), Unwind> {
    let special = vm.special.clone();
    vm.define_methods(special.object, &general::object_primitives())?;
    vm.define_methods(special.class, &general::class_primitives())?;
    vm.define_methods(special.nil, &general::nil_primitives())?;
    vm.define_methods(special.bool, &general::bool_primitives())?;
    vm.define_methods(special.symbol, &general::symbol_primitives())?;
    vm.define_methods(special.string, &general::string_primitives())?;
    vm.define_methods(special.array, &general::array_primitives())?;
    vm.define_methods(special.dict, &general::dict_primitives())?;
    vm.define_methods(
        special.error(crate::errors::ErrorKind::Exception),
        &general::exception_primitives(),
    )?;
    for class in [special.fixnum, special.bignum, special.float] {
        vm.define_methods(class, &comparison_primitives())?;
    }
    vm.define_methods(special.fixnum, &fixnum::primitives())?;
    vm.define_methods(special.bignum, &bignum::primitives())?;
    vm.define_methods(special.float, &float::primitives())?;
    Ok(())
}

pub(crate) fn arg(args: &[Value], index: usize) -> Result<Value, InvariantViolation> {
    args.get(index)
        .copied()
        .ok_or_else(|| InvariantViolation::Other(format!("missing argument {index}")))
}

#[inline]
pub(crate) fn bool_value(value: bool) -> Value {
    Value::from_bool(value)
}

// ── Comparisons shared by Fixnum, Bignum and Float ──

pub fn comparison_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("<=>", 1, num_compare),
        PrimitiveDesc::new("==", 1, num_eq),
        PrimitiveDesc::new("!=", 1, num_ne),
        PrimitiveDesc::new("<", 1, num_lt),
        PrimitiveDesc::new("<=", 1, num_le),
        PrimitiveDesc::new(">", 1, num_gt),
        PrimitiveDesc::new(">=", 1, num_ge),
        PrimitiveDesc::new("hash", 0, num_hash),
    ]
}

/// `None` when either side is NaN; TypeError for a non-numeric operand.
fn ordering(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Option<Ordering>, Unwind> {
    let rhs = arg(args, 0)?;
    match (number_of(vm, receiver), number_of(vm, rhs)) {
        (Some(lhs), Some(rhs)) => Ok(compare_numbers(&lhs, &rhs)),
        _ => Err(comparison_error(vm, receiver, rhs)),
    }
}

pub fn num_compare(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    Ok(match ordering(vm, receiver, args)? {
        Some(Ordering::Less) => Value::from_i64(-1),
        Some(Ordering::Equal) => Value::from_i64(0),
        Some(Ordering::Greater) => Value::from_i64(1),
        None => Value::NIL,
    })
}

fn numbers_equal(vm: &VM, receiver: Value, rhs: Value) -> bool {
    match (number_of(vm, receiver), number_of(vm, rhs)) {
        (Some(lhs), Some(rhs)) => compare_numbers(&lhs, &rhs) == Some(Ordering::Equal),
        _ => false,
    }
}

pub fn num_eq(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    Ok(bool_value(numbers_equal(vm, receiver, arg(args, 0)?)))
}

pub fn num_ne(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    Ok(bool_value(!numbers_equal(vm, receiver, arg(args, 0)?)))
}

pub fn num_lt(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    Ok(bool_value(ordering(vm, receiver, args)? == Some(Ordering::Less)))
}

pub fn num_le(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let ordering = ordering(vm, receiver, args)?;
    Ok(bool_value(matches!(ordering, Some(Ordering::Less | Ordering::Equal))))
}

pub fn num_gt(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    Ok(bool_value(ordering(vm, receiver, args)? == Some(Ordering::Greater)))
}

pub fn num_ge(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let ordering = ordering(vm, receiver, args)?;
    Ok(bool_value(matches!(ordering, Some(Ordering::Greater | Ordering::Equal))))
}

pub fn num_hash(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let number = number_of(vm, receiver).ok_or(InvariantViolation::Other(format!(
        "hash of non-number {receiver:?}"
    )))?;
    Ok(Value::from_i64(hash_number(&number)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn comparisons_cross_numeric_kinds() {
        let mut vm = VM::default();
        let half = vm.new_float(0.5);
        vm.set_global("half", half).expect("root");
        let one = Value::from_i64(1);
        assert_eq!(vm.call_method(one, ">", &[half]), Ok(Value::TRUE));
        assert_eq!(vm.call_method(half, "<=>", &[one]), Ok(Value::from_i64(-1)));
        assert_eq!(vm.call_method(one, "<=>", &[one]), Ok(Value::from_i64(0)));
        assert_eq!(vm.call_method(one, "!=", &[half]), Ok(Value::TRUE));
    }

    #[test]
    fn equality_with_non_numbers_is_false_but_ordering_raises() {
        let mut vm = VM::default();
        let one = Value::from_i64(1);
        assert_eq!(vm.call_method(one, "==", &[Value::NIL]), Ok(Value::FALSE));
        let err = vm.call_method(one, "<", &[Value::NIL]).expect_err("ordering");
        let exc = err.exception().expect("raised");
        assert_eq!(vm.class_of(exc), Ok(vm.special.error(ErrorKind::TypeError)));
        assert_eq!(vm.exception_message(exc), "comparison of Fixnum with Nil failed");
    }

    #[test]
    fn nan_compares_as_nil() {
        let mut vm = VM::default();
        let nan = vm.new_float(f64::NAN);
        vm.set_global("nan", nan).expect("root");
        assert_eq!(vm.call_method(nan, "<=>", &[nan]), Ok(Value::NIL));
        assert_eq!(vm.call_method(nan, "==", &[nan]), Ok(Value::FALSE));
        assert_eq!(vm.call_method(nan, "<", &[Value::from_i64(1)]), Ok(Value::FALSE));
    }
}
