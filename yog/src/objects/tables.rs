use std::rc::Rc;

use crate::errors::InvariantViolation;
use crate::strategy::KeyStrategy;
use crate::value::Value;

/// Maximum average chain length before an insert grows the bin array.
pub const MAX_DENSITY: usize = 5;

/// Bin counts: the first prime above each power of two from 8 upwards.
const TABLE_PRIMES: [usize; 28] = [
    8 + 3,
    16 + 3,
    32 + 5,
    64 + 3,
    128 + 3,
    256 + 27,
    512 + 9,
    1024 + 9,
    2048 + 5,
    4096 + 3,
    8192 + 27,
    16384 + 43,
    32768 + 3,
    65536 + 45,
    131072 + 29,
    262144 + 3,
    524288 + 21,
    1048576 + 7,
    2097152 + 17,
    4194304 + 15,
    8388608 + 9,
    16777216 + 43,
    33554432 + 35,
    67108864 + 15,
    134217728 + 29,
    268435456 + 3,
    536870912 + 11,
    1073741824 + 85,
];

pub const MIN_BINS: usize = TABLE_PRIMES[0];

/// Smallest table prime `>= n`, saturating at the largest one.
pub fn table_prime_at_least(n: usize) -> usize {
    TABLE_PRIMES
        .iter()
        .copied()
        .find(|&prime| prime >= n)
        .unwrap_or(TABLE_PRIMES[TABLE_PRIMES.len() - 1])
}

/// Generation-checked index of an entry inside its table's slab.
///
/// The generation is 64 bits wide, so a stale id cannot alias a reused
/// slot in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    index: u32,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub hash: u64,
    pub key: Value,
    pub record: Value,
    pub next: Option<EntryId>,
}

impl Entry {
    /// Entries removed by `delete_safe` keep their chain position with an
    /// `undef` key until `cleanup_safe` unlinks them.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.key.is_undef()
    }
}

#[derive(Debug, Clone)]
struct EntrySlot {
    generation: u64,
    entry: Option<Entry>,
}

/// Open-chained hash table body.
///
/// `bins` holds the chain heads; entries live in a slab so that rehashing
/// relinks them without copying and stale [`EntryId`]s are detectable.
#[derive(Clone)]
pub struct Table {
    strategy: Rc<dyn KeyStrategy>,
    bins: Vec<Option<EntryId>>,
    slots: Vec<EntrySlot>,
    free: Vec<u32>,
    num_entries: usize,
    /// Bumped on every structural change; external iterators compare it.
    stamp: u64,
}

impl Table {
    pub fn new(strategy: Rc<dyn KeyStrategy>, size: usize) -> Self {
        let bins = table_prime_at_least(size.max(MIN_BINS));
        Self {
            strategy,
            bins: vec![None; bins],
            slots: Vec::new(),
            free: Vec::new(),
            num_entries: 0,
            stamp: 0,
        }
    }

    #[inline]
    pub fn strategy(&self) -> Rc<dyn KeyStrategy> {
        Rc::clone(&self.strategy)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.num_entries
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    #[inline]
    pub fn bins_len(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    #[inline]
    fn touch(&mut self) {
        self.stamp = self.stamp.wrapping_add(1);
    }

    #[inline]
    pub fn bin_of(&self, hash: u64) -> usize {
        (hash % self.bins.len() as u64) as usize
    }

    #[inline]
    pub fn bin_head(&self, bin: usize) -> Option<EntryId> {
        self.bins.get(bin).copied().flatten()
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Whether the next insert must grow the table first.
    #[inline]
    pub fn needs_grow(&self) -> bool {
        self.num_entries + 1 > MAX_DENSITY * self.bins.len()
    }

    /// Prepends a new entry to its chain. Does not look for an equal key.
    pub fn prepend(&mut self, hash: u64, key: Value, record: Value) -> EntryId {
        let bin = self.bin_of(hash);
        let entry = Entry {
            hash,
            key,
            record,
            next: self.bins[bin],
        };
        let id = self.alloc_entry(entry);
        self.bins[bin] = Some(id);
        self.num_entries += 1;
        self.touch();
        id
    }

    fn alloc_entry(&mut self, entry: Entry) -> EntryId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                EntryId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(EntrySlot {
                    generation: 0,
                    entry: Some(entry),
                });
                EntryId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn free_entry(&mut self, id: EntryId) -> Option<Entry> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation += 1;
        self.free.push(id.index);
        Some(entry)
    }

    /// Relinks every entry into a fresh bin array of `new_bins` chains.
    ///
    /// Entries are prepended in old-bin order, so chain order is not
    /// preserved.
    pub fn rehash(&mut self, new_bins: usize) {
        let old_bins = std::mem::replace(&mut self.bins, vec![None; new_bins]);
        for head in old_bins {
            let mut cursor = head;
            while let Some(id) = cursor {
                let Some(&Entry { hash, next, .. }) = self.entry(id) else {
                    break;
                };
                let bin = (hash % new_bins as u64) as usize;
                let head = self.bins[bin];
                if let Some(entry) = self.entry_mut(id) {
                    entry.next = head;
                }
                self.bins[bin] = Some(id);
                cursor = next;
            }
        }
        self.touch();
    }

    /// Unlinks `id` from its chain and frees it.
    pub fn unlink(&mut self, id: EntryId) -> Result<Entry, InvariantViolation> {
        let (hash, next) = match self.entry(id) {
            Some(entry) => (entry.hash, entry.next),
            None => return Err(InvariantViolation::CorruptedTable("unlink of a dead entry")),
        };
        let bin = self.bin_of(hash);
        let mut prev: Option<EntryId> = None;
        let mut cursor = self.bins[bin];
        while let Some(current) = cursor {
            if current == id {
                match prev {
                    None => self.bins[bin] = next,
                    Some(prev) => {
                        if let Some(prev) = self.entry_mut(prev) {
                            prev.next = next;
                        }
                    }
                }
                let removed = self
                    .free_entry(id)
                    .ok_or(InvariantViolation::CorruptedTable("entry vanished while unlinking"))?;
                if !removed.is_tombstone() {
                    self.num_entries -= 1;
                }
                self.touch();
                return Ok(removed);
            }
            prev = cursor;
            cursor = self.entry(current).and_then(|entry| entry.next);
        }
        Err(InvariantViolation::CorruptedTable("entry not reachable from its bin"))
    }

    /// Replaces key and value with `undef` without touching the chain.
    pub fn tombstone(&mut self, id: EntryId) -> Option<Entry> {
        let entry = self.entry_mut(id)?;
        if entry.is_tombstone() {
            return None;
        }
        let old = *entry;
        entry.key = Value::UNDEF;
        entry.record = Value::UNDEF;
        self.num_entries -= 1;
        Some(old)
    }

    /// Whether `id` is still reachable from the head of `bin`.
    pub fn chain_contains(&self, bin: usize, id: EntryId) -> bool {
        let mut cursor = self.bin_head(bin);
        while let Some(current) = cursor {
            if current == id {
                return true;
            }
            cursor = self.entry(current).and_then(|entry| entry.next);
        }
        false
    }

    /// Linked entry ids, tombstones included, in bin order.
    pub fn entry_ids(&self) -> Vec<EntryId> {
        let mut ids = Vec::with_capacity(self.num_entries);
        for head in &self.bins {
            let mut cursor = *head;
            while let Some(id) = cursor {
                let Some(entry) = self.entry(id) else {
                    break;
                };
                ids.push(id);
                cursor = entry.next;
            }
        }
        ids
    }

    /// Every allocated entry, tombstones included. Slab order.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut())
    }

    /// Chain of `bin` as `(key, record)` pairs, for dumps.
    pub fn chain(&self, bin: usize) -> Vec<(Value, Value)> {
        let mut pairs = Vec::new();
        let mut cursor = self.bin_head(bin);
        while let Some(id) = cursor {
            let Some(entry) = self.entry(id) else {
                break;
            };
            pairs.push((entry.key, entry.record));
            cursor = entry.next;
        }
        pairs
    }
}

impl core::fmt::Debug for Table {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Table")
            .field("strategy", &self.strategy.name())
            .field("bins", &self.bins.len())
            .field("entries", &self.num_entries)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterPosition {
    /// Before the first entry.
    Fresh,
    At { bin: usize, entry: EntryId },
    Done,
}

/// External cursor over a table.
///
/// Mutating the table while a cursor is live is a precondition violation;
/// it is detected through the table's stamp.
#[derive(Debug, Clone)]
pub struct TableIterator {
    pub table: Value,
    pub position: IterPosition,
    pub stamp: u64,
}
