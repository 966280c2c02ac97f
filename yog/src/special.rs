use std::rc::Rc;

use crate::errors::{ErrorKind, Unwind};
use crate::header::ObjectType;
use crate::heap::HeapSettings;
use crate::objects::{Class, ObjectBody, Table};
use crate::primitives;
use crate::strategy::{StringKeys, SymbolKeys};
use crate::table;
use crate::value::Value;
use crate::vm::VM;

/// Classes the runtime itself needs to reach without a global lookup.
#[derive(Debug, Clone)]
pub struct SpecialClasses {
    pub object: Value,
    pub class: Value,
    pub nil: Value,
    pub bool: Value,
    pub symbol: Value,
    pub fixnum: Value,
    pub bignum: Value,
    pub float: Value,
    pub string: Value,
    pub array: Value,
    pub dict: Value,
    pub dict_iterator: Value,
    pub native_function: Value,
    pub errors: [Value; ErrorKind::COUNT],
}

impl SpecialClasses {
    pub(crate) fn placeholder() -> Self {
        Self {
            object: Value::UNDEF,
            class: Value::UNDEF,
            nil: Value::UNDEF,
            bool: Value::UNDEF,
            symbol: Value::UNDEF,
            fixnum: Value::UNDEF,
            bignum: Value::UNDEF,
            float: Value::UNDEF,
            string: Value::UNDEF,
            array: Value::UNDEF,
            dict: Value::UNDEF,
            dict_iterator: Value::UNDEF,
            native_function: Value::UNDEF,
            errors: [Value::UNDEF; ErrorKind::COUNT],
        }
    }

    #[inline]
    pub fn error(&self, kind: ErrorKind) -> Value {
        self.errors[kind as usize]
    }

    /// Every class paired with its global name.
    pub fn named(&self) -> Vec<(&'static str, Value)> {
        let mut named = vec![
            ("Object", self.object),
            ("Class", self.class),
            ("Nil", self.nil),
            ("Bool", self.bool),
            ("Symbol", self.symbol),
            ("Fixnum", self.fixnum),
            ("Bignum", self.bignum),
            ("Float", self.float),
            ("String", self.string),
            ("Array", self.array),
            ("Dict", self.dict),
            ("DictIterator", self.dict_iterator),
            ("NativeFunction", self.native_function),
        ];
        named.extend(ErrorKind::ALL.iter().map(|&kind| (kind.class_name(), self.error(kind))));
        named
    }

    pub(crate) fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for class in [
            &mut self.object,
            &mut self.class,
            &mut self.nil,
            &mut self.bool,
            &mut self.symbol,
            &mut self.fixnum,
            &mut self.bignum,
            &mut self.float,
            &mut self.string,
            &mut self.array,
            &mut self.dict,
            &mut self.dict_iterator,
            &mut self.native_function,
        ] {
            visitor(class);
        }
        for class in self.errors.iter_mut() {
            visitor(class);
        }
    }
}

/// Builds a ready VM: class graph, symbol table, globals and every native
/// method. Panics only if the runtime cannot construct itself.
pub fn bootstrap(settings: HeapSettings) -> VM {
    match try_bootstrap(settings) {
        Ok(vm) => vm,
        Err(err) => panic!("failed to bootstrap the runtime: {err}"),
    }
}

fn raw_class(vm: &mut VM, superclass: Value, instance_type: Option<ObjectType>) -> Value {
    vm.heap.insert(
        Value::NIL,
        ObjectBody::Class(Class {
            superclass,
            instance_type,
            ..Class::default()
        }),
    )
}

fn try_bootstrap(settings: HeapSettings) -> Result<VM, Unwind> {
    let mut vm = VM::empty(settings);
    // Nothing is rooted until the special classes are in place.
    vm.heap.set_collection_enabled(false);

    // ── Class graph ──
    let object = raw_class(&mut vm, Value::NIL, Some(ObjectType::Object));
    let mut classes = SpecialClasses::placeholder();
    classes.object = object;
    classes.class = raw_class(&mut vm, object, None);
    classes.nil = raw_class(&mut vm, object, None);
    classes.bool = raw_class(&mut vm, object, None);
    classes.symbol = raw_class(&mut vm, object, None);
    classes.fixnum = raw_class(&mut vm, object, None);
    classes.bignum = raw_class(&mut vm, object, None);
    classes.float = raw_class(&mut vm, object, None);
    classes.string = raw_class(&mut vm, object, Some(ObjectType::Str));
    classes.array = raw_class(&mut vm, object, Some(ObjectType::Array));
    classes.dict = raw_class(&mut vm, object, Some(ObjectType::Table));
    classes.dict_iterator = raw_class(&mut vm, object, None);
    classes.native_function = raw_class(&mut vm, object, None);
    let exception = raw_class(&mut vm, object, Some(ObjectType::Exception));
    for kind in ErrorKind::ALL {
        classes.errors[kind as usize] = match kind {
            ErrorKind::Exception => exception,
            _ => raw_class(&mut vm, exception, Some(ObjectType::Exception)),
        };
    }
    vm.special = classes;

    let class_class = vm.special.class;
    for (_, class) in vm.special.named() {
        vm.heap.get_mut(class)?.header.set_klass(class_class);
    }

    // ── Symbols ──
    let dict = vm.special.dict;
    vm.symbols.table = vm
        .heap
        .insert(dict, ObjectBody::Table(Table::new(Rc::new(StringKeys), 0)));

    // ── Method tables and names ──
    for (name, class) in vm.special.named() {
        let methods = table::create(&mut vm, Rc::new(SymbolKeys));
        let name = vm.intern(name)?;
        let body = vm.heap.body_mut::<Class>(class)?;
        body.methods = methods;
        body.name = name;
    }

    // ── Globals ──
    vm.globals = table::create(&mut vm, Rc::new(SymbolKeys));
    for (name, class) in vm.special.named() {
        vm.set_global(name, class)?;
    }

    primitives::install(&mut vm)?;

    vm.heap.reset_allocation_count();
    vm.heap.set_collection_enabled(true);
    log::debug!(
        "bootstrapped runtime: {} classes, {} live objects",
        vm.special.named().len(),
        vm.heap.live_objects()
    );
    Ok(vm)
}
