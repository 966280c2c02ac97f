//! Slot-arena heap with a mark-sweep collector.
//!
//! References are `(slot index, generation)` pairs, so a reference that
//! outlives its object is caught on access instead of aliasing whatever
//! reuses the slot.
//!
//! This module does not know about the VM. Consumers provide:
//! - A [`RootProvider`] to supply live roots at collection time.
//! - Object tracing through [`crate::visitor::trace_object`].

use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::InvariantViolation;
use crate::header::{Header, HeaderFlags, ObjectId, ObjectType};
use crate::objects::{BodyKind, HeapObject, ObjectBody};
use crate::value::{GENERATION_MASK, Value};
use crate::visitor::trace_object;

// ── Public API types ──────────────────────────────────────────────────

/// Consumers implement this to provide GC roots.
///
/// The visitor receives `&mut Value` so a moving collector could rewrite
/// roots in place.
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value));
}

impl RootProvider for Vec<Value> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for root in self.iter_mut() {
            visitor(root);
        }
    }
}

// ── Heap settings ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HeapSettings {
    /// Allocations between two collections.
    pub gc_threshold: usize,
    /// Slots reserved up front.
    pub initial_capacity: usize,
    /// Collect before every allocation.
    pub stress: bool,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            gc_threshold: 4096,
            initial_capacity: 1024,
            stress: false,
        }
    }
}

impl HeapSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.gc_threshold == 0 {
            return Err("gc_threshold must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    pub last_marked: usize,
    pub last_freed: usize,
}

// ── Heap ──────────────────────────────────────────────────────────────

struct Slot {
    generation: u32,
    object: Option<HeapObject>,
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

pub struct Heap {
    settings: HeapSettings,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    allocated_since_gc: usize,
    collection_enabled: bool,
    instance_id: u64,
    next_serial: u64,
    stats: GcStats,
}

impl Heap {
    pub fn new(settings: HeapSettings) -> Self {
        let slots = Vec::with_capacity(settings.initial_capacity);
        Self {
            settings,
            slots,
            free: Vec::new(),
            live: 0,
            allocated_since_gc: 0,
            collection_enabled: true,
            instance_id: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            next_serial: 0,
            stats: GcStats::default(),
        }
    }

    #[inline]
    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    #[inline]
    pub fn live_objects(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    pub fn set_collection_enabled(&mut self, enabled: bool) {
        self.collection_enabled = enabled;
    }

    pub(crate) fn reset_allocation_count(&mut self) {
        self.allocated_since_gc = 0;
    }

    /// The allocator's trigger point.
    #[inline]
    pub fn should_collect(&self) -> bool {
        self.collection_enabled
            && (self.settings.stress || self.allocated_since_gc >= self.settings.gc_threshold)
    }

    /// Stores a fully initialised body and returns a reference to it.
    ///
    /// Never collects; the caller decides when to run [`Heap::collect`].
    pub fn insert(&mut self, klass: Value, body: ObjectBody) -> Value {
        let id = ObjectId {
            upper: self.instance_id,
            lower: self.next_serial,
        };
        self.next_serial += 1;
        let object = HeapObject {
            header: Header::new(body.object_type(), klass, id),
            body,
        };
        self.allocated_since_gc += 1;
        self.live += 1;

        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                Value::from_slot(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                Value::from_slot(index, 0)
            }
        }
    }

    fn slot(&self, value: Value) -> Option<&HeapObject> {
        if !value.is_ref() {
            return None;
        }
        self.slots
            .get(value.slot_index() as usize)
            .filter(|slot| slot.generation == value.slot_generation())
            .and_then(|slot| slot.object.as_ref())
    }

    fn slot_mut(&mut self, value: Value) -> Option<&mut HeapObject> {
        if !value.is_ref() {
            return None;
        }
        self.slots
            .get_mut(value.slot_index() as usize)
            .filter(|slot| slot.generation == value.slot_generation())
            .and_then(|slot| slot.object.as_mut())
    }

    pub fn get(&self, value: Value) -> Result<&HeapObject, InvariantViolation> {
        if !value.is_ref() {
            return Err(InvariantViolation::NotAReference(value));
        }
        self.slot(value)
            .ok_or(InvariantViolation::StaleReference(value))
    }

    pub fn get_mut(&mut self, value: Value) -> Result<&mut HeapObject, InvariantViolation> {
        if !value.is_ref() {
            return Err(InvariantViolation::NotAReference(value));
        }
        self.slot_mut(value)
            .ok_or(InvariantViolation::StaleReference(value))
    }

    #[inline]
    pub fn is_live(&self, value: Value) -> bool {
        self.slot(value).is_some()
    }

    pub fn object_type(&self, value: Value) -> Result<ObjectType, InvariantViolation> {
        Ok(self.get(value)?.header.object_type())
    }

    /// `Some(object_type)` for live references, `None` for immediates.
    pub fn type_of(&self, value: Value) -> Option<ObjectType> {
        self.slot(value).map(|object| object.header.object_type())
    }

    pub fn body<T: BodyKind>(&self, value: Value) -> Result<&T, InvariantViolation> {
        let object = self.get(value)?;
        T::from_body(&object.body)
            .ok_or_else(|| InvariantViolation::type_mismatch(T::TYPE, object.header.object_type()))
    }

    pub fn body_mut<T: BodyKind>(&mut self, value: Value) -> Result<&mut T, InvariantViolation> {
        let object = self.get_mut(value)?;
        let found = object.header.object_type();
        T::from_body_mut(&mut object.body)
            .ok_or_else(|| InvariantViolation::type_mismatch(T::TYPE, found))
    }

    /// Like [`Heap::body`] but `None` when `value` is not a live `T`.
    pub fn try_body<T: BodyKind>(&self, value: Value) -> Option<&T> {
        self.slot(value).and_then(|object| T::from_body(&object.body))
    }

    /// Marks everything reachable from `roots`, then frees the rest.
    ///
    /// Marking uses an explicit worklist and the header's `MARKED` bit, so
    /// cycles and deep graphs need no recursion.
    pub fn collect(&mut self, roots: &mut dyn RootProvider) -> GcStats {
        let mut worklist: Vec<Value> = Vec::with_capacity(64);
        roots.visit_roots(&mut |root| {
            if root.is_ref() {
                worklist.push(*root);
            }
        });

        let mut marked = 0;
        while let Some(value) = worklist.pop() {
            let Some(object) = self.slot_mut(value) else {
                log::warn!("collector skipped stale reference {value:?}");
                continue;
            };
            if object.header.has_flag(HeaderFlags::MARKED) {
                continue;
            }
            object.header.add_flag(HeaderFlags::MARKED);
            marked += 1;
            trace_object(object, &mut |child| {
                if child.is_ref() {
                    worklist.push(*child);
                }
            });
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(object) = slot.object.as_mut() else {
                continue;
            };
            if object.header.has_flag(HeaderFlags::MARKED) {
                object.header.remove_flag(HeaderFlags::MARKED);
            } else {
                slot.object = None;
                // a slot whose generation is exhausted is retired for good
                // rather than wrapped, so no stale reference can alias it
                if slot.generation < GENERATION_MASK {
                    slot.generation += 1;
                    self.free.push(index as u32);
                }
                freed += 1;
            }
        }

        self.live -= freed;
        self.allocated_since_gc = 0;
        self.stats = GcStats {
            collections: self.stats.collections + 1,
            last_marked: marked,
            last_freed: freed,
        };
        log::debug!(
            "gc #{}: marked {marked}, freed {freed}, live {}",
            self.stats.collections,
            self.live
        );
        self.stats
    }
}
