/// Boxed double. Immutable once allocated.
#[derive(Debug, Default, Clone, Copy)]
pub struct Float {
    pub value: f64,
}

impl Float {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}
