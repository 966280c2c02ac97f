use num_bigint::BigInt;

use crate::errors::{InvariantViolation, Unwind};
use crate::frame::{Frame, UnwindState, UnwindTarget};
use crate::heap::{GcStats, Heap, HeapSettings, RootProvider};
use crate::interning::SymbolTable;
use crate::objects::{Array, BigNum, Exception, Float, ObjectBody, Str};
use crate::special::{self, SpecialClasses};
use crate::value::Value;
use crate::visitor::trace_body;

/// One interpreter instance: heap, well-known classes, symbol table and
/// the native call state (frames, unwind targets, handle scopes).
pub struct VM {
    pub heap: Heap,
    pub special: SpecialClasses,
    pub(crate) symbols: SymbolTable,
    /// Symbol-keyed table of global bindings.
    pub(crate) globals: Value,
    /// Root stack backing every open [`crate::handles::HandleSet`].
    pub(crate) handles: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) targets: Vec<UnwindTarget>,
    /// Exceptions and resources held only by Rust locals while cleanups or
    /// handlers run.
    pub(crate) in_flight: Vec<Value>,
    pub(crate) unwind_state: UnwindState,
}

/// Every root outside the heap, borrowed disjointly from the heap itself.
struct VmRoots<'a> {
    special: &'a mut SpecialClasses,
    symbols: &'a mut Value,
    globals: &'a mut Value,
    handles: &'a mut Vec<Value>,
    frames: &'a mut Vec<Frame>,
    targets: &'a mut Vec<UnwindTarget>,
    in_flight: &'a mut Vec<Value>,
    /// Object under construction: its class and fields are live too.
    pending: Option<(&'a mut Value, &'a mut ObjectBody)>,
}

impl RootProvider for VmRoots<'_> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        self.special.visit_roots(visitor);
        visitor(self.symbols);
        visitor(self.globals);
        for root in self.handles.iter_mut() {
            visitor(root);
        }
        for frame in self.frames.iter_mut() {
            frame.visit_roots(visitor);
        }
        for target in self.targets.iter_mut() {
            for class in target.classes.iter_mut() {
                visitor(class);
            }
        }
        for value in self.in_flight.iter_mut() {
            visitor(value);
        }
        if let Some((klass, body)) = self.pending.as_mut() {
            visitor(klass);
            trace_body(body, visitor);
        }
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new(HeapSettings::default())
    }
}

impl VM {
    pub fn new(settings: HeapSettings) -> Self {
        special::bootstrap(settings)
    }

    /// A VM with no classes yet; [`special::bootstrap`] fills it in.
    pub(crate) fn empty(settings: HeapSettings) -> Self {
        Self {
            heap: Heap::new(settings),
            special: SpecialClasses::placeholder(),
            symbols: SymbolTable::new(),
            globals: Value::UNDEF,
            handles: Vec::with_capacity(64),
            frames: Vec::new(),
            targets: Vec::new(),
            in_flight: Vec::new(),
            unwind_state: UnwindState::Running,
        }
    }

    fn roots<'a>(
        special: &'a mut SpecialClasses,
        symbols: &'a mut SymbolTable,
        globals: &'a mut Value,
        handles: &'a mut Vec<Value>,
        frames: &'a mut Vec<Frame>,
        targets: &'a mut Vec<UnwindTarget>,
        in_flight: &'a mut Vec<Value>,
        pending: Option<(&'a mut Value, &'a mut ObjectBody)>,
    ) -> VmRoots<'a> {
        VmRoots {
            special,
            symbols: &mut symbols.table,
            globals,
            handles,
            frames,
            targets,
            in_flight,
            pending,
        }
    }

    /// Visits every root slot. A moving collector would rewrite them here.
    pub fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        let mut roots = Self::roots(
            &mut self.special,
            &mut self.symbols,
            &mut self.globals,
            &mut self.handles,
            &mut self.frames,
            &mut self.targets,
            &mut self.in_flight,
            None,
        );
        roots.visit_roots(visitor);
    }

    pub fn collect_garbage(&mut self) -> GcStats {
        self.collect_with_pending(None)
    }

    fn collect_with_pending(&mut self, pending: Option<(&mut Value, &mut ObjectBody)>) -> GcStats {
        let mut roots = Self::roots(
            &mut self.special,
            &mut self.symbols,
            &mut self.globals,
            &mut self.handles,
            &mut self.frames,
            &mut self.targets,
            &mut self.in_flight,
            pending,
        );
        self.heap.collect(&mut roots)
    }

    /// Allocates a managed object, collecting first when the heap asks for
    /// it. The body is fully initialised before its reference escapes.
    pub fn alloc(&mut self, klass: Value, body: ObjectBody) -> Value {
        let mut klass = klass;
        let mut body = body;
        if self.heap.should_collect() {
            self.collect_with_pending(Some((&mut klass, &mut body)));
        }
        self.heap.insert(klass, body)
    }

    // ── constructors ───────────────────────────────────────────────

    pub fn new_string(&mut self, text: &str) -> Value {
        self.alloc(self.special.string, ObjectBody::Str(Str::new(text)))
    }

    pub fn new_float(&mut self, value: f64) -> Value {
        self.alloc(self.special.float, ObjectBody::Float(Float::new(value)))
    }

    /// Boxes `value` without normalising; see [`crate::numeric::normalize`].
    pub fn new_bignum(&mut self, value: BigInt) -> Value {
        self.alloc(self.special.bignum, ObjectBody::BigNum(BigNum::new(value)))
    }

    pub fn new_array(&mut self, items: Vec<Value>) -> Value {
        self.alloc(self.special.array, ObjectBody::Array(Array::from_vec(items)))
    }

    pub fn new_exception(&mut self, class: Value, message: &str) -> Value {
        let message = self.new_string(message);
        self.alloc(
            class,
            ObjectBody::Exception(Exception {
                message,
                ..Exception::default()
            }),
        )
    }

    // ── inspection ─────────────────────────────────────────────────

    pub fn str_of(&self, value: Value) -> Result<&str, Unwind> {
        Ok(self.heap.body::<Str>(value)?.as_str())
    }

    /// Class of any value, immediates included.
    pub fn class_of(&self, value: Value) -> Result<Value, Unwind> {
        if value.is_fixnum() {
            return Ok(self.special.fixnum);
        }
        if value.is_ref() {
            return Ok(self.heap.get(value)?.header.klass());
        }
        if value.is_symbol() {
            return Ok(self.special.symbol);
        }
        match value {
            Value::NIL => Ok(self.special.nil),
            Value::TRUE | Value::FALSE => Ok(self.special.bool),
            _ => Err(InvariantViolation::Other(format!("{value:?} has no class")).into()),
        }
    }

    /// Name of the class of `value`, for diagnostics.
    pub fn type_name(&self, value: Value) -> String {
        match self.class_of(value) {
            Ok(class) => self.class_name(class),
            Err(_) => "?".to_owned(),
        }
    }

    pub fn symbol_name(&self, symbol: Value) -> Option<&str> {
        symbol.as_symbol().and_then(|id| self.symbols.name(id))
    }

    // ── globals ────────────────────────────────────────────────────

    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), Unwind> {
        self.with_handles(|vm, hs| -> Result<(), Unwind> {
            hs.pin(vm, value);
            let key = vm.intern(name)?;
            let globals = vm.globals;
            crate::table::insert(vm, globals, key, value)?;
            Ok(())
        })
    }

    pub fn get_global(&mut self, name: &str) -> Result<Option<Value>, Unwind> {
        let key = self.intern(name)?;
        let globals = self.globals;
        crate::table::lookup(self, globals, key)
    }
}
