use crate::primitives::{PrimitiveDesc, PrimitiveFn};

/// A native method stored in a class's method table.
#[derive(Clone, Copy)]
pub struct NativeMethod {
    pub name: &'static str,
    pub arity: u8,
    pub func: PrimitiveFn,
}

impl From<PrimitiveDesc> for NativeMethod {
    fn from(desc: PrimitiveDesc) -> Self {
        Self {
            name: desc.name,
            arity: desc.arity,
            func: desc.func,
        }
    }
}

impl core::fmt::Debug for NativeMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NativeMethod")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}
