//! Key strategies: how a table hashes and compares its keys.
//!
//! A strategy is chosen when a table is created and shared by all its
//! entries.

use crate::errors::{ErrorKind, InvariantViolation, Unwind};
use crate::objects::Str;
use crate::value::Value;
use crate::vm::VM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Symbol,
    String,
    Value,
    Custom,
}

pub trait KeyStrategy {
    fn name(&self) -> &'static str;

    fn kind(&self) -> StrategyKind {
        StrategyKind::Custom
    }

    fn hash(&self, vm: &mut VM, key: Value) -> Result<u64, Unwind>;

    /// `key` is the probe, `other` the key stored in the table.
    fn equal(&self, vm: &mut VM, key: Value, other: Value) -> Result<bool, Unwind>;
}

/// `h = h * 997 + byte`, then folded with `h >> 5`.
pub fn str_hash(bytes: &[u8]) -> u64 {
    let h = bytes
        .iter()
        .fold(0u64, |h, &b| h.wrapping_mul(997).wrapping_add(b as u64));
    h.wrapping_add(h >> 5)
}

/// Identity comparison; symbols hash to their id.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymbolKeys;

impl KeyStrategy for SymbolKeys {
    fn name(&self) -> &'static str {
        "symbol"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Symbol
    }

    fn hash(&self, _vm: &mut VM, key: Value) -> Result<u64, Unwind> {
        Ok(match key.as_symbol() {
            Some(id) => id.0 as u64,
            None => key.raw(),
        })
    }

    fn equal(&self, _vm: &mut VM, key: Value, other: Value) -> Result<bool, Unwind> {
        Ok(key == other)
    }
}

/// Exact byte comparison of string keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringKeys;

impl KeyStrategy for StringKeys {
    fn name(&self) -> &'static str {
        "string"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::String
    }

    fn hash(&self, vm: &mut VM, key: Value) -> Result<u64, Unwind> {
        let s = vm.heap.body::<Str>(key)?;
        Ok(str_hash(s.as_bytes()))
    }

    fn equal(&self, vm: &mut VM, key: Value, other: Value) -> Result<bool, Unwind> {
        if key == other {
            return Ok(true);
        }
        let a = vm.heap.body::<Str>(key)?;
        let b = vm.heap.body::<Str>(other)?;
        Ok(a.as_bytes() == b.as_bytes())
    }
}

/// Dispatches to the key's own `hash` and `==` methods.
///
/// A raise from `==` is swallowed and treated as "not equal" so that a
/// misbehaving key cannot leave a traversal half done. Compatibility
/// behaviour; the exception is logged and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueKeys;

impl KeyStrategy for ValueKeys {
    fn name(&self) -> &'static str {
        "value"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Value
    }

    fn hash(&self, vm: &mut VM, key: Value) -> Result<u64, Unwind> {
        let hash = vm.call_method(key, "hash", &[])?;
        match hash.as_fixnum() {
            Some(n) => Ok(n as u64),
            None => Err(vm.raise_error(ErrorKind::TypeError, "hash() must return Fixnum")),
        }
    }

    fn equal(&self, vm: &mut VM, key: Value, other: Value) -> Result<bool, Unwind> {
        match vm.call_method(key, "==", &[other]) {
            Ok(result) => Ok(result.is_truthy()),
            Err(Unwind::Raise(exc)) => {
                vm.discard_exception(exc, "key comparison");
                Ok(false)
            }
            Err(fatal @ Unwind::Fatal(_)) => Err(fatal),
        }
    }
}

pub(crate) fn require_kind(
    strategy: &dyn KeyStrategy,
    kind: StrategyKind,
) -> Result<(), InvariantViolation> {
    if strategy.kind() == kind {
        Ok(())
    } else {
        Err(InvariantViolation::UnsupportedStrategy(strategy.name()))
    }
}
