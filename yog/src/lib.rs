//! Managed-object runtime core: tagged values, a collected heap with
//! explicit rooting, hash tables with pluggable key strategies, the
//! numeric tower, and frame-based unwinding.

pub mod errors;
pub mod format;
pub mod frame;
pub mod handles;
pub mod header;
pub mod heap;
pub mod interning;
pub mod lookup;
pub mod numeric;
pub mod objects;
pub mod primitives;
pub mod special;
pub mod strategy;
pub mod table;
pub mod value;
pub mod visitor;
pub mod vm;

pub use errors::{ErrorKind, InvariantViolation, Unwind};
pub use frame::{FrameKind, Rootable, Termination, UnwindState};
pub use handles::{Handle, HandleSet};
pub use heap::{GcStats, HeapSettings, RootProvider};
pub use numeric::{BinOp, Number};
pub use table::ForeachAction;
pub use value::Value;
pub use vm::VM;
