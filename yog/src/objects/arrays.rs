use crate::value::Value;

/// Growable array of values.
#[derive(Debug, Default, Clone)]
pub struct Array {
    items: Vec<Value>,
}

impl Array {
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self { items }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.get(index).copied()
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [Value] {
        &mut self.items
    }
}
