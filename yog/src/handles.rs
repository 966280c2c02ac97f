//! Scoped GC roots.
//!
//! A native operation that must keep values alive across a call that may
//! allocate opens a handle scope with [`VM::with_handles`] and pins the
//! values into it. Every scope is branded with its own lifetime, so a
//! [`Handle`] cannot escape the closure that created its scope, and scopes
//! necessarily close in LIFO order.

use core::marker::PhantomData;

use crate::value::Value;
use crate::vm::VM;

/// Invariant brand tying handles to exactly one scope.
type Brand<'scope> = PhantomData<fn(&'scope ()) -> &'scope ()>;

/// One open handle scope. Slots live on the VM's root stack above `base`.
pub struct HandleSet<'scope> {
    base: usize,
    _brand: Brand<'scope>,
}

/// A copyable, scope-bounded rooted slot.
#[derive(Clone, Copy)]
pub struct Handle<'scope> {
    slot: usize,
    _brand: Brand<'scope>,
}

impl<'scope> HandleSet<'scope> {
    /// Registers `value` as a root for the rest of the scope.
    #[inline]
    pub fn pin(&mut self, vm: &mut VM, value: Value) -> Handle<'scope> {
        debug_assert!(vm.handles.len() >= self.base, "handle stack shrank under an open scope");
        let slot = vm.handles.len();
        vm.handles.push(value);
        Handle {
            slot,
            _brand: PhantomData,
        }
    }

    /// Number of slots pinned in this scope.
    pub fn len(&self, vm: &VM) -> usize {
        vm.handles.len() - self.base
    }

    pub fn is_empty(&self, vm: &VM) -> bool {
        self.len(vm) == 0
    }
}

impl<'scope> Handle<'scope> {
    #[inline]
    pub fn get(self, vm: &VM) -> Value {
        vm.handles[self.slot]
    }

    #[inline]
    pub fn set(self, vm: &mut VM, value: Value) {
        vm.handles[self.slot] = value;
    }
}

impl VM {
    /// Runs `f` with a fresh handle scope and releases its slots on every
    /// return path, including an `Err` unwinding through it.
    pub fn with_handles<R>(&mut self, f: impl for<'scope> FnOnce(&mut VM, &mut HandleSet<'scope>) -> R) -> R {
        let base = self.handles.len();
        let mut set = HandleSet {
            base,
            _brand: PhantomData,
        };
        let result = f(self, &mut set);
        debug_assert!(
            self.handles.len() >= base,
            "HandleSet drop must follow LIFO scope order"
        );
        self.handles.truncate(base);
        result
    }

    /// Depth of the root stack, for diagnostics.
    pub fn handle_depth(&self) -> usize {
        self.handles.len()
    }
}
