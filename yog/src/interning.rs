//! Symbol interning.
//!
//! Names map to symbols through a string-keyed table living on the heap, so
//! the name strings are ordinary managed objects kept alive by the table.

use crate::errors::Unwind;
use crate::table;
use crate::value::Value;
use crate::vm::VM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

pub struct SymbolTable {
    /// String-keyed table: name → symbol.
    pub(crate) table: Value,
    names: Vec<String>,
}

impl SymbolTable {
    pub(crate) fn new() -> Self {
        Self {
            table: Value::UNDEF,
            names: Vec::new(),
        }
    }

    pub fn name(&self, id: SymbolId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl VM {
    /// Returns the unique symbol for `name`, creating it on first use.
    pub fn intern(&mut self, name: &str) -> Result<Value, Unwind> {
        let symbols = self.symbols.table;
        if let Some(symbol) = table::lookup_str(self, symbols, name)? {
            return Ok(symbol);
        }
        let id = SymbolId(self.symbols.names.len() as u32);
        self.symbols.names.push(name.to_owned());
        let symbol = Value::from_symbol(id);
        let key = self.new_string(name);
        table::add_direct(self, symbols, key, symbol)?;
        Ok(symbol)
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}
