//! Hash table operations.
//!
//! Every operation takes the VM and the table's reference. Strategy calls
//! may run arbitrary methods (and therefore allocate, collect, or even
//! mutate the table being worked on), so table, key and value are pinned
//! for the duration of each operation and every chain step re-validates the
//! entry it is about to touch. The collector does not move objects, so a
//! pinned value stays valid as is.

use std::fmt::Write as _;
use std::rc::Rc;

use crate::errors::{ErrorKind, InvariantViolation, Unwind};
use crate::objects::{EntryId, IterPosition, ObjectBody, Str, Table, TableIterator};
use crate::objects::tables::table_prime_at_least;
use crate::strategy::{KeyStrategy, StrategyKind, require_kind, str_hash};
use crate::value::Value;
use crate::vm::VM;

/// What a [`foreach`] visitor wants done next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeachAction {
    Continue,
    Stop,
    /// Unlink the entry just visited, then continue with its successor.
    Delete,
    /// Verify the entry just visited is still reachable before continuing.
    Check,
}

pub fn create(vm: &mut VM, strategy: Rc<dyn KeyStrategy>) -> Value {
    create_with_size(vm, strategy, 0)
}

pub fn create_with_size(vm: &mut VM, strategy: Rc<dyn KeyStrategy>, size: usize) -> Value {
    let dict = vm.special.dict;
    vm.alloc(dict, ObjectBody::Table(Table::new(strategy, size)))
}

fn strategy_of(vm: &VM, table: Value) -> Result<Rc<dyn KeyStrategy>, Unwind> {
    Ok(vm.heap.body::<Table>(table)?.strategy())
}

/// Scans the chain for `hash` and returns the first live entry whose key
/// matches. Table and key must already be rooted.
fn find(
    vm: &mut VM,
    strategy: &dyn KeyStrategy,
    table: Value,
    key: Value,
    hash: u64,
) -> Result<Option<EntryId>, Unwind> {
    let mut cursor = {
        let t = vm.heap.body::<Table>(table)?;
        t.bin_head(t.bin_of(hash))
    };
    while let Some(id) = cursor {
        let (entry_hash, entry_key, next) = match vm.heap.body::<Table>(table)?.entry(id) {
            Some(entry) => (entry.hash, entry.key, entry.next),
            None => {
                log::warn!("table chain changed under a lookup; treating key as absent");
                return Ok(None);
            }
        };
        if entry_hash == hash
            && !entry_key.is_undef()
            && (entry_key == key || strategy.equal(vm, key, entry_key)?)
        {
            return Ok(Some(id));
        }
        cursor = next;
    }
    Ok(None)
}

/// Prepends without searching, growing first if the density bound would
/// be exceeded.
fn add_hashed(vm: &mut VM, table: Value, hash: u64, key: Value, record: Value) -> Result<EntryId, Unwind> {
    let t = vm.heap.body_mut::<Table>(table)?;
    if t.needs_grow() {
        let old = t.bins_len();
        let new = table_prime_at_least(old * 2);
        t.rehash(new);
        log::trace!("rehashed table {table:?}: {old} -> {new} bins");
    }
    Ok(t.prepend(hash, key, record))
}

pub fn lookup(vm: &mut VM, table: Value, key: Value) -> Result<Option<Value>, Unwind> {
    vm.with_handles(|vm, hs| -> Result<Option<Value>, Unwind> {
        hs.pin(vm, table);
        hs.pin(vm, key);
        let strategy = strategy_of(vm, table)?;
        let hash = strategy.hash(vm, key)?;
        let Some(id) = find(vm, &*strategy, table, key, hash)? else {
            return Ok(None);
        };
        Ok(vm.heap.body::<Table>(table)?.entry(id).map(|entry| entry.record))
    })
}

/// Strict lookup: a miss raises `KeyError` carrying the key's `to_s`.
pub fn fetch(vm: &mut VM, table: Value, key: Value) -> Result<Value, Unwind> {
    if let Some(record) = lookup(vm, table, key)? {
        return Ok(record);
    }
    let message = vm.to_display(key)?;
    Err(vm.raise_error(ErrorKind::KeyError, &message))
}

/// Lookup in a string-keyed table by a Rust string; allocates nothing.
pub fn lookup_str(vm: &VM, table: Value, name: &str) -> Result<Option<Value>, Unwind> {
    let t = vm.heap.body::<Table>(table)?;
    require_kind(&*t.strategy(), StrategyKind::String)?;
    let hash = str_hash(name.as_bytes());
    let mut cursor = t.bin_head(t.bin_of(hash));
    while let Some(id) = cursor {
        let entry = t
            .entry(id)
            .ok_or(InvariantViolation::CorruptedTable("dangling chain link"))?;
        if entry.hash == hash && !entry.is_tombstone() && vm.heap.body::<Str>(entry.key)?.as_str() == name {
            return Ok(Some(entry.record));
        }
        cursor = entry.next;
    }
    Ok(None)
}

/// Sets `key` to `record`. Returns whether the key was already present; an
/// existing entry keeps its original key object.
pub fn insert(vm: &mut VM, table: Value, key: Value, record: Value) -> Result<bool, Unwind> {
    vm.with_handles(|vm, hs| -> Result<bool, Unwind> {
        hs.pin(vm, table);
        hs.pin(vm, key);
        hs.pin(vm, record);
        let strategy = strategy_of(vm, table)?;
        let hash = strategy.hash(vm, key)?;
        if let Some(id) = find(vm, &*strategy, table, key, hash)? {
            if let Some(entry) = vm.heap.body_mut::<Table>(table)?.entry_mut(id) {
                entry.record = record;
                return Ok(true);
            }
        }
        add_hashed(vm, table, hash, key, record)?;
        Ok(false)
    })
}

/// Adds an entry the caller knows to be absent.
pub fn add_direct(vm: &mut VM, table: Value, key: Value, record: Value) -> Result<(), Unwind> {
    vm.with_handles(|vm, hs| -> Result<(), Unwind> {
        hs.pin(vm, table);
        hs.pin(vm, key);
        hs.pin(vm, record);
        let hash = strategy_of(vm, table)?.hash(vm, key)?;
        add_hashed(vm, table, hash, key, record)?;
        Ok(())
    })
}

/// Removes `key`, returning its value if it was present.
pub fn delete(vm: &mut VM, table: Value, key: Value) -> Result<Option<Value>, Unwind> {
    vm.with_handles(|vm, hs| -> Result<Option<Value>, Unwind> {
        hs.pin(vm, table);
        hs.pin(vm, key);
        let strategy = strategy_of(vm, table)?;
        let hash = strategy.hash(vm, key)?;
        let Some(id) = find(vm, &*strategy, table, key, hash)? else {
            return Ok(None);
        };
        let removed = vm.heap.body_mut::<Table>(table)?.unlink(id)?;
        Ok(Some(removed.record))
    })
}

/// Like [`delete`] but leaves a tombstone in the chain so that traversals
/// in progress stay valid. [`cleanup_safe`] reclaims tombstones later.
pub fn delete_safe(vm: &mut VM, table: Value, key: Value) -> Result<Option<Value>, Unwind> {
    vm.with_handles(|vm, hs| -> Result<Option<Value>, Unwind> {
        hs.pin(vm, table);
        hs.pin(vm, key);
        let strategy = strategy_of(vm, table)?;
        let hash = strategy.hash(vm, key)?;
        let Some(id) = find(vm, &*strategy, table, key, hash)? else {
            return Ok(None);
        };
        let removed = vm.heap.body_mut::<Table>(table)?.tombstone(id);
        Ok(removed.map(|entry| entry.record))
    })
}

/// Unlinks every tombstone; returns how many were reclaimed.
pub fn cleanup_safe(vm: &mut VM, table: Value) -> Result<usize, Unwind> {
    let t = vm.heap.body_mut::<Table>(table)?;
    let dead: Vec<EntryId> = t
        .entry_ids()
        .into_iter()
        .filter(|&id| t.entry(id).is_some_and(|entry| entry.is_tombstone()))
        .collect();
    for &id in &dead {
        t.unlink(id)?;
    }
    Ok(dead.len())
}

/// Visits every live entry in bin order.
///
/// Returns `Ok(false)` when the traversal had to be abandoned because the
/// table changed under it (a [`ForeachAction::Check`] failed, or the entry
/// just visited disappeared), `Ok(true)` otherwise.
pub fn foreach(
    vm: &mut VM,
    table: Value,
    mut visit: impl FnMut(&mut VM, Value, Value) -> Result<ForeachAction, Unwind>,
) -> Result<bool, Unwind> {
    vm.with_handles(|vm, hs| -> Result<bool, Unwind> {
        hs.pin(vm, table);
        let key = hs.pin(vm, Value::NIL);
        let record = hs.pin(vm, Value::NIL);
        let mut bin = 0;
        while bin < vm.heap.body::<Table>(table)?.bins_len() {
            let mut cursor = vm.heap.body::<Table>(table)?.bin_head(bin);
            while let Some(id) = cursor {
                let entry = match vm.heap.body::<Table>(table)?.entry(id) {
                    Some(entry) => *entry,
                    None => return Ok(false),
                };
                if entry.is_tombstone() {
                    cursor = entry.next;
                    continue;
                }
                key.set(vm, entry.key);
                record.set(vm, entry.record);
                let action = visit(vm, entry.key, entry.record)?;

                let t = vm.heap.body_mut::<Table>(table)?;
                let Some(&current) = t.entry(id) else {
                    return Ok(false);
                };
                match action {
                    ForeachAction::Continue => cursor = current.next,
                    ForeachAction::Stop => return Ok(true),
                    ForeachAction::Delete => {
                        t.unlink(id)?;
                        cursor = current.next;
                    }
                    ForeachAction::Check => {
                        if !t.chain_contains(t.bin_of(current.hash), id) {
                            return Ok(false);
                        }
                        cursor = current.next;
                    }
                }
            }
            bin += 1;
        }
        Ok(true)
    })
}

/// Snapshot of the live `(key, value)` pairs in iteration order.
pub fn entries(vm: &VM, table: Value) -> Result<Vec<(Value, Value)>, Unwind> {
    let t = vm.heap.body::<Table>(table)?;
    Ok(t
        .entry_ids()
        .into_iter()
        .filter_map(|id| t.entry(id))
        .filter(|entry| !entry.is_tombstone())
        .map(|entry| (entry.key, entry.record))
        .collect())
}

pub fn size(vm: &VM, table: Value) -> Result<usize, Unwind> {
    Ok(vm.heap.body::<Table>(table)?.len())
}

/// A new table with the same strategy, bin count and chain order.
pub fn copy(vm: &mut VM, table: Value) -> Result<Value, Unwind> {
    let object = vm.heap.get(table)?;
    let klass = object.header.klass();
    let ObjectBody::Table(body) = &object.body else {
        return Err(InvariantViolation::type_mismatch(
            crate::header::ObjectType::Table,
            object.body.object_type(),
        )
        .into());
    };
    let body = body.clone();
    Ok(vm.alloc(klass, ObjectBody::Table(body)))
}

/// Renders bins and chains, logs it at debug level and returns it.
pub fn dump(vm: &VM, table: Value) -> Result<String, Unwind> {
    let t = vm.heap.body::<Table>(table)?;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "table {table:?} [{}]: {} entries in {} bins",
        t.strategy().name(),
        t.len(),
        t.bins_len()
    );
    for bin in 0..t.bins_len() {
        let chain = t.chain(bin);
        if chain.is_empty() {
            continue;
        }
        let _ = write!(out, "  {bin:>5}:");
        for (key, record) in chain {
            let _ = write!(out, " {key:?} => {record:?};");
        }
        out.push('\n');
    }
    log::debug!("{out}");
    Ok(out)
}

// ── External iteration ──

pub fn iterator(vm: &mut VM, table: Value) -> Result<Value, Unwind> {
    let stamp = vm.heap.body::<Table>(table)?.stamp();
    let class = vm.special.dict_iterator;
    Ok(vm.alloc(
        class,
        ObjectBody::TableIterator(TableIterator {
            table,
            position: IterPosition::Fresh,
            stamp,
        }),
    ))
}

fn checked_table<'a>(vm: &'a VM, iter: &TableIterator) -> Result<&'a Table, Unwind> {
    let t = vm.heap.body::<Table>(iter.table)?;
    if t.stamp() != iter.stamp {
        return Err(InvariantViolation::TableModifiedDuringIteration.into());
    }
    Ok(t)
}

/// Advances to the next live entry; `false` once exhausted.
pub fn iter_next(vm: &mut VM, iter: Value) -> Result<bool, Unwind> {
    let cursor_state = vm.heap.body::<TableIterator>(iter)?.clone();
    let t = checked_table(vm, &cursor_state)?;
    let (mut bin, mut cursor) = match cursor_state.position {
        IterPosition::Fresh => (0, t.bin_head(0)),
        IterPosition::At { bin, entry } => {
            let current = t
                .entry(entry)
                .ok_or(InvariantViolation::CorruptedTable("iterator entry vanished"))?;
            (bin, current.next)
        }
        IterPosition::Done => return Ok(false),
    };
    let position = 'scan: loop {
        while let Some(id) = cursor {
            let entry = t
                .entry(id)
                .ok_or(InvariantViolation::CorruptedTable("dangling chain link"))?;
            if !entry.is_tombstone() {
                break 'scan IterPosition::At { bin, entry: id };
            }
            cursor = entry.next;
        }
        bin += 1;
        if bin >= t.bins_len() {
            break IterPosition::Done;
        }
        cursor = t.bin_head(bin);
    };
    vm.heap.body_mut::<TableIterator>(iter)?.position = position;
    Ok(matches!(position, IterPosition::At { .. }))
}

fn current_entry(vm: &VM, iter: Value) -> Result<(Value, Value), Unwind> {
    let cursor = vm.heap.body::<TableIterator>(iter)?;
    let t = checked_table(vm, cursor)?;
    let IterPosition::At { entry, .. } = cursor.position else {
        return Err(InvariantViolation::IteratorNotPositioned.into());
    };
    let entry = t
        .entry(entry)
        .ok_or(InvariantViolation::CorruptedTable("iterator entry vanished"))?;
    Ok((entry.key, entry.record))
}

pub fn current_key(vm: &VM, iter: Value) -> Result<Value, Unwind> {
    Ok(current_entry(vm, iter)?.0)
}

pub fn current_value(vm: &VM, iter: Value) -> Result<Value, Unwind> {
    Ok(current_entry(vm, iter)?.1)
}
