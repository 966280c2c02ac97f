//! Methods of the non-numeric built-in classes.

use crate::errors::{ErrorKind, Unwind};
use crate::numeric::binop_type_error;
use crate::objects::{Array, Class, Exception, Str};
use crate::primitives::{PrimitiveDesc, arg, bool_value, parsing};
use crate::strategy::str_hash;
use crate::table;
use crate::value::{FIXNUM_MAX, Value};
use crate::vm::VM;

// ── Object ──

pub fn object_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("==", 1, object_eq),
        PrimitiveDesc::new("!=", 1, object_ne),
        PrimitiveDesc::new("hash", 0, object_hash),
        PrimitiveDesc::new("to_s", 0, object_to_s),
        PrimitiveDesc::new("class", 0, object_class),
        PrimitiveDesc::new("kind_of?", 1, object_kind_of),
    ]
}

pub fn object_eq(_vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    Ok(bool_value(receiver == arg(args, 0)?))
}

/// Negation of whatever `==` the receiver's class defines.
pub fn object_ne(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let eq = vm.call_method(receiver, "==", &[arg(args, 0)?])?;
    Ok(bool_value(!eq.is_truthy()))
}

pub fn object_hash(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let hash = if receiver.is_ref() {
        vm.heap.get(receiver)?.header.id().lower
    } else {
        receiver.raw() >> 2
    };
    Ok(Value::from_i64((hash as i64) & FIXNUM_MAX))
}

pub fn object_to_s(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let text = if receiver.is_ref() {
        let id = vm.heap.get(receiver)?.header.id().lower;
        format!("#<{}:{id:#x}>", vm.type_name(receiver))
    } else {
        format!("#<{}>", vm.type_name(receiver))
    };
    Ok(vm.new_string(&text))
}

pub fn object_class(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    vm.class_of(receiver)
}

pub fn object_kind_of(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let class = arg(args, 0)?;
    if vm.heap.try_body::<Class>(class).is_none() {
        let message = format!("kind_of?() argument must be a Class, not {}", vm.type_name(class));
        return Err(vm.raise_error(ErrorKind::TypeError, &message));
    }
    Ok(bool_value(vm.is_instance_of(receiver, class)?))
}

// ── Class ──

pub fn class_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("new", 0, class_new),
        PrimitiveDesc::new("name", 0, class_name),
        PrimitiveDesc::new("to_s", 0, class_name),
    ]
}

pub fn class_new(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    vm.instantiate(receiver)
}

pub fn class_name(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let name = vm.class_name(receiver);
    Ok(vm.new_string(&name))
}

// ── Nil, Bool, Symbol ──

pub fn nil_primitives() -> Vec<PrimitiveDesc> {
    vec![PrimitiveDesc::new("to_s", 0, nil_to_s)]
}

pub fn nil_to_s(vm: &mut VM, _receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    Ok(vm.new_string("nil"))
}

pub fn bool_primitives() -> Vec<PrimitiveDesc> {
    vec![PrimitiveDesc::new("to_s", 0, bool_to_s)]
}

pub fn bool_to_s(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    Ok(vm.new_string(if receiver.is_truthy() { "true" } else { "false" }))
}

pub fn symbol_primitives() -> Vec<PrimitiveDesc> {
    vec![PrimitiveDesc::new("to_s", 0, symbol_to_s)]
}

pub fn symbol_to_s(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let name = vm.symbol_name(receiver).unwrap_or_default().to_owned();
    Ok(vm.new_string(&name))
}

// ── String ──

pub fn string_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("==", 1, string_eq),
        PrimitiveDesc::new("hash", 0, string_hash),
        PrimitiveDesc::new("to_s", 0, string_to_s),
        PrimitiveDesc::new("+", 1, string_concat),
        PrimitiveDesc::new("size", 0, string_size),
        PrimitiveDesc::new("to_number", 0, string_to_number),
    ]
}

pub fn string_eq(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let other = arg(args, 0)?;
    let lhs = vm.heap.body::<Str>(receiver)?;
    let equal = vm
        .heap
        .try_body::<Str>(other)
        .is_some_and(|rhs| rhs.as_bytes() == lhs.as_bytes());
    Ok(bool_value(equal))
}

pub fn string_hash(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let hash = str_hash(vm.heap.body::<Str>(receiver)?.as_bytes());
    Ok(Value::from_i64((hash as i64) & FIXNUM_MAX))
}

pub fn string_to_s(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    vm.heap.body::<Str>(receiver)?;
    Ok(receiver)
}

pub fn string_concat(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let other = arg(args, 0)?;
    let Some(rhs) = vm.heap.try_body::<Str>(other).map(|s| s.as_str().to_owned()) else {
        return Err(binop_type_error(vm, "+", receiver, other));
    };
    let text = format!("{}{rhs}", vm.str_of(receiver)?);
    Ok(vm.new_string(&text))
}

pub fn string_size(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let len = vm.heap.body::<Str>(receiver)?.as_str().chars().count();
    Ok(Value::from_i64(len as i64))
}

pub fn string_to_number(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let text = vm.str_of(receiver)?.to_owned();
    parsing::parse_number(vm, &text)
}

// ── Array ──

pub fn array_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("size", 0, array_size),
        PrimitiveDesc::new("[]", 1, array_at),
        PrimitiveDesc::new("push", 1, array_push),
    ]
}

pub fn array_size(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    Ok(Value::from_i64(vm.heap.body::<Array>(receiver)?.len() as i64))
}

/// Negative indices count from the end.
pub fn array_at(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let index = arg(args, 0)?;
    let Some(index) = index.as_fixnum() else {
        let message = format!("array indices must be Fixnum, not {}", vm.type_name(index));
        return Err(vm.raise_error(ErrorKind::TypeError, &message));
    };
    let array = vm.heap.body::<Array>(receiver)?;
    let len = array.len() as i64;
    let slot = if index < 0 { index + len } else { index };
    match usize::try_from(slot).ok().and_then(|slot| array.get(slot)) {
        Some(item) => Ok(item),
        None => Err(vm.raise_error(ErrorKind::IndexError, "array index out of range")),
    }
}

pub fn array_push(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let item = arg(args, 0)?;
    vm.heap.body_mut::<Array>(receiver)?.push(item);
    Ok(receiver)
}

// ── Dict ──

pub fn dict_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("[]", 1, dict_fetch),
        PrimitiveDesc::new("[]=", 2, dict_store),
        PrimitiveDesc::new("get", 1, dict_get),
        PrimitiveDesc::new("include?", 1, dict_include),
        PrimitiveDesc::new("delete", 1, dict_delete),
        PrimitiveDesc::new("size", 0, dict_size),
    ]
}

pub fn dict_fetch(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    table::fetch(vm, receiver, arg(args, 0)?)
}

pub fn dict_store(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    let value = arg(args, 1)?;
    table::insert(vm, receiver, arg(args, 0)?, value)?;
    Ok(value)
}

/// Lenient lookup: `nil` on a miss.
pub fn dict_get(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    Ok(table::lookup(vm, receiver, arg(args, 0)?)?.unwrap_or(Value::NIL))
}

pub fn dict_include(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    Ok(bool_value(table::lookup(vm, receiver, arg(args, 0)?)?.is_some()))
}

pub fn dict_delete(vm: &mut VM, receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
    Ok(table::delete(vm, receiver, arg(args, 0)?)?.unwrap_or(Value::NIL))
}

pub fn dict_size(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    Ok(Value::from_i64(table::size(vm, receiver)? as i64))
}

// ── Exception ──

pub fn exception_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("to_s", 0, exception_to_s),
        PrimitiveDesc::new("message", 0, exception_message),
    ]
}

pub fn exception_to_s(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    let message = vm.heap.body::<Exception>(receiver)?.message;
    if vm.heap.try_body::<Str>(message).is_some() {
        return Ok(message);
    }
    Ok(vm.new_string(""))
}

pub fn exception_message(vm: &mut VM, receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
    Ok(vm.heap.body::<Exception>(receiver)?.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(vm: &mut VM, value: Value) -> String {
        vm.to_display(value).expect("to_s")
    }

    #[test]
    fn immediates_render_by_class() {
        let mut vm = VM::default();
        assert_eq!(display(&mut vm, Value::NIL), "nil");
        assert_eq!(display(&mut vm, Value::TRUE), "true");
        assert_eq!(display(&mut vm, Value::FALSE), "false");
        let sym = vm.intern("answer").expect("intern");
        assert_eq!(display(&mut vm, sym), "answer");
        let object = vm.special.object;
        let obj = vm.instantiate(object).expect("new");
        assert!(display(&mut vm, obj).starts_with("#<Object:0x"));
    }

    #[test]
    fn object_equality_is_identity_and_ne_negates() {
        let mut vm = VM::default();
        let object = vm.special.object;
        let a = vm.instantiate(object).expect("new");
        vm.set_global("a", a).expect("root");
        let b = vm.instantiate(object).expect("new");
        vm.set_global("b", b).expect("root");
        assert_eq!(vm.call_method(a, "==", &[a]), Ok(Value::TRUE));
        assert_eq!(vm.call_method(a, "==", &[b]), Ok(Value::FALSE));
        assert_eq!(vm.call_method(a, "!=", &[b]), Ok(Value::TRUE));
        let ha = vm.call_method(a, "hash", &[]).expect("hash");
        assert_eq!(vm.call_method(a, "hash", &[]), Ok(ha));
        assert!(ha.is_fixnum());
    }

    #[test]
    fn kind_of_walks_the_superclass_chain() {
        let mut vm = VM::default();
        let object = vm.special.object;
        let key_error = vm.special.error(ErrorKind::KeyError);
        let exc = vm.new_exception(key_error, "k");
        vm.set_global("exc", exc).expect("root");
        let base = vm.special.error(ErrorKind::Exception);
        assert_eq!(vm.call_method(exc, "kind_of?", &[base]), Ok(Value::TRUE));
        assert_eq!(vm.call_method(exc, "kind_of?", &[object]), Ok(Value::TRUE));
        let fixnum = vm.special.fixnum;
        assert_eq!(vm.call_method(exc, "kind_of?", &[fixnum]), Ok(Value::FALSE));
        assert_eq!(vm.call_method(exc, "class", &[]), Ok(key_error));
        assert_eq!(display(&mut vm, exc), "k");
    }

    #[test]
    fn strings_compare_by_content() {
        let mut vm = VM::default();
        let a = vm.new_string("abc");
        vm.set_global("a", a).expect("root");
        let b = vm.new_string("abc");
        vm.set_global("b", b).expect("root");
        assert_eq!(vm.call_method(a, "==", &[b]), Ok(Value::TRUE));
        assert_eq!(vm.call_method(a, "==", &[Value::NIL]), Ok(Value::FALSE));
        assert_eq!(vm.call_method(a, "hash", &[]), vm.call_method(b, "hash", &[]));
        let joined = vm.call_method(a, "+", &[b]).expect("concat");
        assert_eq!(vm.str_of(joined), Ok("abcabc"));
        assert_eq!(vm.call_method(a, "size", &[]), Ok(Value::from_i64(3)));
    }

    #[test]
    fn dict_methods_use_value_keys() {
        let mut vm = VM::default();
        let dict_class = vm.special.dict;
        let dict = vm.call_method(dict_class, "new", &[]).expect("new");
        vm.set_global("dict", dict).expect("root");
        let key = vm.new_string("k");
        vm.set_global("key", key).expect("root");
        let probe = vm.new_string("k");
        vm.set_global("probe", probe).expect("root");
        vm.call_method(dict, "[]=", &[key, Value::from_i64(1)]).expect("store");
        assert_eq!(vm.call_method(dict, "[]", &[probe]), Ok(Value::from_i64(1)));
        assert_eq!(vm.call_method(dict, "include?", &[probe]), Ok(Value::TRUE));
        assert_eq!(vm.call_method(dict, "size", &[]), Ok(Value::from_i64(1)));
        assert_eq!(vm.call_method(dict, "delete", &[probe]), Ok(Value::from_i64(1)));
        assert_eq!(vm.call_method(dict, "get", &[probe]), Ok(Value::NIL));

        let err = vm.call_method(dict, "[]", &[probe]).expect_err("miss");
        let exc = err.exception().expect("raised");
        assert_eq!(vm.class_of(exc), Ok(vm.special.error(ErrorKind::KeyError)));
        assert_eq!(vm.exception_message(exc), "k");
    }

    #[test]
    fn arrays_index_from_both_ends() {
        let mut vm = VM::default();
        let array = vm.new_array(vec![Value::from_i64(1), Value::from_i64(2)]);
        vm.set_global("array", array).expect("root");
        assert_eq!(vm.call_method(array, "[]", &[Value::from_i64(-1)]), Ok(Value::from_i64(2)));
        vm.call_method(array, "push", &[Value::from_i64(3)]).expect("push");
        assert_eq!(vm.call_method(array, "size", &[]), Ok(Value::from_i64(3)));
        let err = vm.call_method(array, "[]", &[Value::from_i64(3)]).expect_err("range");
        let exc = err.exception().expect("raised");
        assert_eq!(vm.class_of(exc), Ok(vm.special.error(ErrorKind::IndexError)));
    }
}
