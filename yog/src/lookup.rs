//! Classes, method dispatch and instance attributes.

use std::rc::Rc;

use crate::errors::{ErrorKind, InvariantViolation, Unwind};
use crate::frame::FrameKind;
use crate::header::ObjectType;
use crate::objects::{Array, Class, Exception, Instance, NativeMethod, ObjectBody, Str, Table};
use crate::primitives::PrimitiveDesc;
use crate::strategy::{SymbolKeys, ValueKeys};
use crate::table;
use crate::value::Value;
use crate::vm::VM;

impl VM {
    pub fn class_name(&self, class: Value) -> String {
        self.heap
            .try_body::<Class>(class)
            .and_then(|body| self.symbol_name(body.name))
            .unwrap_or("?")
            .to_owned()
    }

    /// Defines a class below `superclass`; instances get the superclass's
    /// body kind.
    pub fn new_class(&mut self, name: &str, superclass: Value) -> Result<Value, Unwind> {
        self.with_handles(|vm, hs| -> Result<Value, Unwind> {
            hs.pin(vm, superclass);
            let instance_type = vm.heap.body::<Class>(superclass)?.instance_type;
            let name = vm.intern(name)?;
            let methods = table::create(vm, Rc::new(SymbolKeys));
            let class_class = vm.special.class;
            Ok(vm.alloc(
                class_class,
                ObjectBody::Class(Class {
                    name,
                    superclass,
                    methods,
                    instance_type,
                }),
            ))
        })
    }

    pub fn define_method(&mut self, class: Value, desc: PrimitiveDesc) -> Result<(), Unwind> {
        self.with_handles(|vm, hs| -> Result<(), Unwind> {
            hs.pin(vm, class);
            let selector = vm.intern(desc.name)?;
            let methods = vm.heap.body::<Class>(class)?.methods;
            let native_class = vm.special.native_function;
            let method = vm.alloc(native_class, ObjectBody::Native(NativeMethod::from(desc)));
            table::insert(vm, methods, selector, method)?;
            Ok(())
        })
    }

    pub fn define_methods(&mut self, class: Value, descs: &[PrimitiveDesc]) -> Result<(), Unwind> {
        for &desc in descs {
            self.define_method(class, desc)?;
        }
        Ok(())
    }

    /// Looks `selector` up in `class` and then its superclasses.
    pub fn find_method(&mut self, class: Value, selector: Value) -> Result<Option<Value>, Unwind> {
        let mut cursor = class;
        while !cursor.is_nil() {
            let (methods, superclass) = {
                let body = self.heap.body::<Class>(cursor)?;
                (body.methods, body.superclass)
            };
            if let Some(method) = table::lookup(self, methods, selector)? {
                return Ok(Some(method));
            }
            cursor = superclass;
        }
        Ok(None)
    }

    /// Sends `name` to `receiver`. The call runs in its own method frame
    /// with receiver and arguments rooted.
    pub fn call_method(&mut self, receiver: Value, name: &str, args: &[Value]) -> Result<Value, Unwind> {
        self.with_handles(|vm, hs| -> Result<Value, Unwind> {
            hs.pin(vm, receiver);
            for &arg in args {
                hs.pin(vm, arg);
            }
            let selector = vm.intern(name)?;
            let class = vm.class_of(receiver)?;
            let Some(method) = vm.find_method(class, selector)? else {
                let message = format!("'{}' object has no attribute '{name}'", vm.class_name(class));
                return Err(vm.raise_error(ErrorKind::AttributeError, &message));
            };
            let native = *vm.heap.body::<NativeMethod>(method)?;
            if args.len() != native.arity as usize {
                let message = format!(
                    "{name}() takes exactly {} argument(s) ({} given)",
                    native.arity,
                    args.len()
                );
                return Err(vm.raise_error(ErrorKind::ArgumentError, &message));
            }
            let frame_name = format!("{}#{name}", vm.class_name(class));
            vm.call_frame(FrameKind::Method, frame_name, receiver, |vm| {
                (native.func)(vm, receiver, args)
            })
        })
    }

    /// Renders `value` through its `to_s` method.
    pub fn to_display(&mut self, value: Value) -> Result<String, Unwind> {
        let text = self.call_method(value, "to_s", &[])?;
        match self.heap.try_body::<Str>(text) {
            Some(text) => Ok(text.as_str().to_owned()),
            None => Err(self.raise_error(ErrorKind::TypeError, "to_s must return String")),
        }
    }

    pub fn is_subclass(&self, class: Value, ancestor: Value) -> Result<bool, Unwind> {
        let mut cursor = class;
        while !cursor.is_nil() {
            if cursor == ancestor {
                return Ok(true);
            }
            cursor = self.heap.body::<Class>(cursor)?.superclass;
        }
        Ok(false)
    }

    pub fn is_instance_of(&self, value: Value, class: Value) -> Result<bool, Unwind> {
        let own = self.class_of(value)?;
        self.is_subclass(own, class)
    }

    /// `Class#new`: a default-initialised instance of `class`.
    pub fn instantiate(&mut self, class: Value) -> Result<Value, Unwind> {
        let body = match self.heap.body::<Class>(class)?.instance_type {
            Some(ObjectType::Object) => ObjectBody::Object(Instance::default()),
            Some(ObjectType::Exception) => ObjectBody::Exception(Exception::default()),
            Some(ObjectType::Str) => ObjectBody::Str(Str::new("")),
            Some(ObjectType::Array) => ObjectBody::Array(Array::default()),
            Some(ObjectType::Table) => ObjectBody::Table(Table::new(Rc::new(ValueKeys), 0)),
            _ => {
                let message = format!("cannot create '{}' instances", self.class_name(class));
                return Err(self.raise_error(ErrorKind::TypeError, &message));
            }
        };
        Ok(self.alloc(class, body))
    }

    fn attrs_slot(&mut self, object: Value) -> Option<&mut Value> {
        let object = self.heap.get_mut(object).ok()?;
        match &mut object.body {
            ObjectBody::Object(instance) => Some(&mut instance.attrs),
            ObjectBody::Exception(exc) => Some(&mut exc.attrs),
            _ => None,
        }
    }

    /// Sets an instance attribute; the attribute table is created on first
    /// write.
    pub fn set_attr(&mut self, object: Value, name: &str, value: Value) -> Result<(), Unwind> {
        self.with_handles(|vm, hs| -> Result<(), Unwind> {
            hs.pin(vm, object);
            hs.pin(vm, value);
            let key = vm.intern(name)?;
            let attrs = vm.attrs_slot(object).map(|slot| *slot);
            let Some(attrs) = attrs else {
                let message = format!("cannot set attribute '{name}' on '{}' object", vm.type_name(object));
                return Err(vm.raise_error(ErrorKind::TypeError, &message));
            };
            let attrs = if attrs.is_undef() {
                let fresh = table::create(vm, Rc::new(SymbolKeys));
                let slot = vm
                    .attrs_slot(object)
                    .ok_or(InvariantViolation::StaleReference(object))?;
                *slot = fresh;
                fresh
            } else {
                attrs
            };
            table::insert(vm, attrs, key, value)?;
            Ok(())
        })
    }

    pub fn get_attr(&mut self, object: Value, name: &str) -> Result<Value, Unwind> {
        let key = self.with_handles(|vm, hs| {
            hs.pin(vm, object);
            vm.intern(name)
        })?;
        let attrs = self.attrs_slot(object).map(|slot| *slot).unwrap_or(Value::UNDEF);
        if !attrs.is_undef() {
            if let Some(value) = table::lookup(self, attrs, key)? {
                return Ok(value);
            }
        }
        let message = format!("'{}' object has no attribute '{name}'", self.type_name(object));
        Err(self.raise_error(ErrorKind::AttributeError, &message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapSettings;
    use crate::primitives::PrimitiveDesc;

    fn answer(_vm: &mut VM, _receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
        Ok(Value::from_i64(42))
    }

    fn first_arg(_vm: &mut VM, _receiver: Value, args: &[Value]) -> Result<Value, Unwind> {
        Ok(args[0])
    }

    fn raised_class(vm: &VM, err: Unwind) -> Value {
        let exc = err.exception().expect("raised");
        vm.class_of(exc).expect("class")
    }

    #[test]
    fn methods_are_inherited_through_superclasses() {
        let mut vm = VM::default();
        let object = vm.special.object;
        let base = vm.new_class("Base", object).expect("class");
        vm.set_global("Base", base).expect("global");
        let derived = vm.new_class("Derived", base).expect("class");
        vm.set_global("Derived", derived).expect("global");
        vm.define_method(base, PrimitiveDesc::new("answer", 0, answer)).expect("define");
        vm.define_method(base, PrimitiveDesc::new("echo", 1, first_arg)).expect("define");

        let obj = vm.instantiate(derived).expect("new");
        vm.set_global("obj", obj).expect("global");
        assert_eq!(vm.call_method(obj, "answer", &[]), Ok(Value::from_i64(42)));
        assert_eq!(vm.call_method(obj, "echo", &[Value::TRUE]), Ok(Value::TRUE));
        assert!(vm.is_instance_of(obj, base).expect("instance"));
        assert!(vm.is_instance_of(obj, object).expect("instance"));
        assert_eq!(vm.class_name(derived), "Derived");
    }

    #[test]
    fn missing_methods_raise_attribute_error() {
        let mut vm = VM::default();
        let err = vm.call_method(Value::NIL, "frobnicate", &[]).expect_err("missing");
        let exc = err.exception().expect("raised");
        assert_eq!(vm.class_of(exc), Ok(vm.special.error(ErrorKind::AttributeError)));
        assert_eq!(vm.exception_message(exc), "'Nil' object has no attribute 'frobnicate'");
    }

    #[test]
    fn arity_is_checked_before_the_call() {
        let mut vm = VM::default();
        let err = vm.call_method(Value::from_i64(1), "+", &[]).expect_err("arity");
        assert_eq!(raised_class(&vm, err), vm.special.error(ErrorKind::ArgumentError));
    }

    #[test]
    fn method_calls_push_a_named_frame() {
        fn depth(vm: &mut VM, _receiver: Value, _args: &[Value]) -> Result<Value, Unwind> {
            let name = vm.current_frame().map(|frame| frame.name.clone()).unwrap_or_default();
            Ok(vm.new_string(&name))
        }
        let mut vm = VM::default();
        let object = vm.special.object;
        vm.define_method(object, PrimitiveDesc::new("where", 0, depth)).expect("define");
        let name = vm.call_method(Value::from_i64(5), "where", &[]).expect("call");
        assert_eq!(vm.str_of(name), Ok("Fixnum#where"));
        assert_eq!(vm.frame_depth(), 0);
    }

    #[test]
    fn attributes_round_trip_and_survive_collection() {
        let mut vm = VM::new(HeapSettings {
            gc_threshold: 4,
            ..HeapSettings::default()
        });
        let object = vm.special.object;
        let obj = vm.instantiate(object).expect("new");
        vm.set_global("obj", obj).expect("global");
        let text = vm.new_string("value");
        vm.set_attr(obj, "field", text).expect("set");
        vm.collect_garbage();
        let read = vm.get_attr(obj, "field").expect("get");
        assert_eq!(vm.str_of(read), Ok("value"));

        let err = vm.get_attr(obj, "missing").expect_err("miss");
        assert_eq!(raised_class(&vm, err), vm.special.error(ErrorKind::AttributeError));
        let err = vm.set_attr(Value::from_i64(1), "x", Value::NIL).expect_err("immediate");
        assert_eq!(raised_class(&vm, err), vm.special.error(ErrorKind::TypeError));
    }

    #[test]
    fn numbers_cannot_be_instantiated() {
        let mut vm = VM::default();
        let fixnum = vm.special.fixnum;
        let err = vm.instantiate(fixnum).expect_err("not instantiable");
        assert_eq!(raised_class(&vm, err), vm.special.error(ErrorKind::TypeError));
    }
}
