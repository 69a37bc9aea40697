//! Ordered hybrid table.
//!
//! Entries live in one arena, threaded into a doubly linked list by insertion
//! order. Three indices map keys to arena slots: strings, positive integral
//! numbers (the array part) and everything else. Setting a present key to nil
//! leaves a tombstone in place so `next_key` cursors stay valid; tombstones
//! are collected by the next insertion that would otherwise add a live entry.

use crate::coerce::array_index;
use crate::error::{InvalidKeyKind, ScriptError};
use crate::script::{check_owner, next_unowned_ref_id, Script, ScriptId};
use crate::value::{Value, ValueKind};
use indexmap::IndexMap;
use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// Shared, mutable handle to a table.
pub type TableRef = Rc<RefCell<Table>>;

/// Slot in the entry arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct EntryIdx(u32);

struct Entry {
    key: Value,
    value: Value,
    prev: Option<EntryIdx>,
    next: Option<EntryIdx>,
}

/// A key/value pair as returned by `next_key`.
#[derive(Clone, Debug, PartialEq)]
pub struct TablePair {
    pub key: Value,
    pub value: Value,
}

/// Which index a key belongs to.
enum Slot<'a> {
    Str(&'a Rc<str>),
    Array(usize),
    Generic(&'a Value),
}

fn slot_of(key: &Value) -> Slot<'_> {
    match key.kind() {
        ValueKind::String(s) => Slot::Str(s),
        ValueKind::Number(n) => match array_index(*n) {
            Some(i) => Slot::Array(i),
            None => Slot::Generic(key),
        },
        _ => Slot::Generic(key),
    }
}

pub struct Table {
    ref_id: u64,
    owner: Option<ScriptId>,
    entries: Vec<Option<Entry>>,
    free: Vec<u32>,
    head: Option<EntryIdx>,
    tail: Option<EntryIdx>,
    string_index: IndexMap<Rc<str>, EntryIdx>,
    array_index: IndexMap<usize, EntryIdx>,
    generic_index: IndexMap<Value, EntryIdx>,
    cached_length: Cell<Option<usize>>,
    contains_nil_entries: bool,
    /// Last array slot filled by `init_next_array_keys`.
    init_array: usize,
    metatable: Option<TableRef>,
}

impl Table {
    /// Create an empty table owned by `script`.
    pub fn new(script: &Script) -> Self {
        Self::build(
            script.next_ref_id(),
            Some(script.id()),
            script.options().table_capacity_hint,
        )
    }

    /// Create an empty table that belongs to no script.
    pub fn new_prime() -> Self {
        Self::build(next_unowned_ref_id(), None, 0)
    }

    /// Create a table whose array part holds `values` at keys 1..=n.
    pub fn with_values(
        script: &Script,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Self, ScriptError> {
        let mut t = Table::new(script);
        for (i, v) in values.into_iter().enumerate() {
            t.set_int(i as i64 + 1, v)?;
        }
        Ok(t)
    }

    fn build(ref_id: u64, owner: Option<ScriptId>, capacity: usize) -> Self {
        Table {
            ref_id,
            owner,
            entries: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            string_index: IndexMap::with_capacity(capacity),
            array_index: IndexMap::with_capacity(capacity),
            generic_index: IndexMap::new(),
            cached_length: Cell::new(Some(0)),
            contains_nil_entries: false,
            init_array: 0,
            metatable: None,
        }
    }

    /// Id drawn from the owning script's counter. Shows up in print strings.
    pub fn ref_id(&self) -> u64 {
        self.ref_id
    }

    /// The script this table was created by. `None` for prime tables.
    pub fn owner_script(&self) -> Option<ScriptId> {
        self.owner
    }

    // ---- arena ----

    fn entry(&self, idx: EntryIdx) -> Option<&Entry> {
        self.entries.get(idx.0 as usize).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, idx: EntryIdx) -> Option<&mut Entry> {
        self.entries.get_mut(idx.0 as usize).and_then(Option::as_mut)
    }

    /// Allocate an entry and link it at the tail.
    fn alloc(&mut self, key: Value, value: Value) -> EntryIdx {
        let entry = Entry {
            key,
            value,
            prev: self.tail,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(i) => {
                self.entries[i as usize] = Some(entry);
                EntryIdx(i)
            }
            None => {
                self.entries.push(Some(entry));
                EntryIdx((self.entries.len() - 1) as u32)
            }
        };
        match self.tail {
            Some(t) => {
                if let Some(e) = self.entry_mut(t) {
                    e.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        idx
    }

    /// Unlink an entry from the order list and free its slot.
    fn unlink(&mut self, idx: EntryIdx) -> Option<Entry> {
        let entry = self.entries.get_mut(idx.0 as usize)?.take()?;
        match entry.prev {
            Some(p) => {
                if let Some(e) = self.entry_mut(p) {
                    e.next = entry.next;
                }
            }
            None => self.head = entry.next,
        }
        match entry.next {
            Some(n) => {
                if let Some(e) = self.entry_mut(n) {
                    e.prev = entry.prev;
                }
            }
            None => self.tail = entry.prev,
        }
        self.free.push(idx.0);
        Some(entry)
    }

    fn first_live_from(&self, mut cursor: Option<EntryIdx>) -> Option<&Entry> {
        while let Some(idx) = cursor {
            let e = self.entry(idx)?;
            if e.value.is_not_nil() {
                return Some(e);
            }
            cursor = e.next;
        }
        None
    }

    // ---- indices ----

    fn find(&self, slot: &Slot<'_>) -> Option<EntryIdx> {
        match slot {
            Slot::Str(s) => {
                let key: &str = s;
                self.string_index.get(key).copied()
            }
            Slot::Array(i) => self.array_index.get(i).copied(),
            Slot::Generic(v) => self.generic_index.get(*v).copied(),
        }
    }

    fn index_insert(&mut self, key: &Value, idx: EntryIdx) {
        match slot_of(key) {
            Slot::Str(s) => {
                self.string_index.insert(s.clone(), idx);
            }
            Slot::Array(i) => {
                self.array_index.insert(i, idx);
            }
            Slot::Generic(v) => {
                self.generic_index.insert(v.clone(), idx);
            }
        }
    }

    fn index_remove(&mut self, key: &Value) -> Option<EntryIdx> {
        match slot_of(key) {
            Slot::Str(s) => {
                let key: &str = s;
                self.string_index.swap_remove(key)
            }
            Slot::Array(i) => self.array_index.swap_remove(&i),
            Slot::Generic(v) => self.generic_index.swap_remove(v),
        }
    }

    fn live_value(&self, idx: Option<EntryIdx>) -> Option<Value> {
        self.entry(idx?)
            .filter(|e| e.value.is_not_nil())
            .map(|e| e.value.clone())
    }

    fn array_slot_live(&self, i: usize) -> bool {
        self.live_value(self.array_index.get(&i).copied()).is_some()
    }

    // ---- core set/remove ----

    /// Store `value` in the slot `existing` points at, or in a new entry keyed
    /// by `make_key()`. `append_at` is the array key when called from `append`.
    fn perform_set(
        &mut self,
        existing: Option<EntryIdx>,
        is_number: bool,
        make_key: impl FnOnce() -> Value,
        value: Value,
        append_at: Option<usize>,
    ) {
        let value_is_nil = value.is_nil();
        let was_live = match existing {
            Some(idx) => match self.entry_mut(idx) {
                Some(e) => {
                    let live = e.value.is_not_nil();
                    e.value = value;
                    live
                }
                None => false,
            },
            None => {
                // Nil on an absent key leaves no trace.
                if value_is_nil {
                    return;
                }
                let key = make_key().as_read_only();
                let idx = self.alloc(key.clone(), value);
                self.index_insert(&key, idx);
                false
            }
        };

        if self.contains_nil_entries && !value_is_nil && !was_live {
            self.collect_dead_keys();
        } else if value_is_nil {
            self.contains_nil_entries = true;
            if is_number {
                self.cached_length.set(None);
            }
        } else if is_number && !was_live {
            match append_at {
                Some(k) if !self.array_slot_live(k + 1) => self.cached_length.set(Some(k)),
                _ => self.cached_length.set(None),
            }
        }
    }

    fn perform_remove(&mut self, idx: Option<EntryIdx>, is_number: bool) -> bool {
        let Some(idx) = idx else {
            return false;
        };
        let Some(entry) = self.unlink(idx) else {
            return false;
        };
        if is_number {
            self.cached_length.set(None);
        }
        entry.value.is_not_nil()
    }

    fn check_value_owner(&self, value: &Value) -> Result<(), ScriptError> {
        if value.as_table().is_some_and(|t| self.is_cell_of(t)) {
            return Ok(());
        }
        check_owner(self.owner, value.owner_script()?)
    }

    /// True when `t` is the cell holding `self`. That cell is mutably
    /// borrowed for as long as `&mut self` lives.
    fn is_cell_of(&self, t: &TableRef) -> bool {
        std::ptr::eq(t.as_ptr() as *const Table, self)
    }

    // ---- get ----

    /// Value stored at `key`, or nil.
    pub fn get(&self, key: &Value) -> Value {
        self.raw_get(key).unwrap_or_else(Value::read_only_nil)
    }

    /// Value stored at `key`. Absent keys and tombstones give `None`.
    pub fn raw_get(&self, key: &Value) -> Option<Value> {
        if key.is_nil_or_nan() {
            return None;
        }
        self.live_value(self.find(&slot_of(key)))
    }

    /// Like [`Table::get`] for a string key, without building a key value.
    pub fn get_str(&self, key: &str) -> Value {
        self.raw_get_str(key).unwrap_or_else(Value::read_only_nil)
    }

    pub fn raw_get_str(&self, key: &str) -> Option<Value> {
        self.live_value(self.string_index.get(key).copied())
    }

    /// Like [`Table::get`] for an integer key.
    pub fn get_int(&self, key: i64) -> Value {
        self.raw_get_int(key).unwrap_or_else(Value::read_only_nil)
    }

    pub fn raw_get_int(&self, key: i64) -> Option<Value> {
        let n = key as f64;
        match array_index(n) {
            Some(i) => self.live_value(self.array_index.get(&i).copied()),
            None => self.raw_get(&Value::number(n)),
        }
    }

    // ---- set ----

    /// Store `value` at `key`.
    ///
    /// A new key goes to the end of the iteration order. Storing nil leaves a
    /// tombstone so an ongoing `next_key` walk stays valid; setting the key
    /// again before the tombstone is collected keeps its original position.
    ///
    /// Fails on a nil or NaN key, or when the key or value belongs to another
    /// script.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), ScriptError> {
        match key.kind() {
            ValueKind::Nil | ValueKind::Void => {
                return Err(ScriptError::InvalidKey(InvalidKeyKind::Nil))
            }
            ValueKind::Number(n) if n.is_nan() => {
                return Err(ScriptError::InvalidKey(InvalidKeyKind::NaN))
            }
            _ => {}
        }
        self.check_value_owner(&key)?;
        self.check_value_owner(&value)?;
        let (existing, is_number) = {
            let slot = slot_of(&key);
            (self.find(&slot), matches!(slot, Slot::Array(_)))
        };
        self.perform_set(existing, is_number, || key, value, None);
        Ok(())
    }

    /// Like [`Table::set`] for a string key.
    pub fn set_str(&mut self, key: &str, value: Value) -> Result<(), ScriptError> {
        self.check_value_owner(&value)?;
        let existing = self.string_index.get(key).copied();
        self.perform_set(existing, false, || Value::string(key), value, None);
        Ok(())
    }

    /// Like [`Table::set`] for an integer key. Keys below 1 go through the
    /// generic index.
    pub fn set_int(&mut self, key: i64, value: Value) -> Result<(), ScriptError> {
        let n = key as f64;
        let Some(i) = array_index(n) else {
            return self.set(Value::number(n), value);
        };
        self.check_value_owner(&value)?;
        let existing = self.array_index.get(&i).copied();
        self.perform_set(existing, true, || Value::number(n), value, None);
        Ok(())
    }

    /// Store `value` at `length() + 1`.
    pub fn append(&mut self, value: Value) -> Result<(), ScriptError> {
        self.check_value_owner(&value)?;
        let k = self.length() + 1;
        let existing = self.array_index.get(&k).copied();
        self.perform_set(existing, true, || Value::number(k as f64), value, Some(k));
        Ok(())
    }

    /// Fill the next array slot during table construction. A tuple in the
    /// last position spreads over consecutive slots.
    pub fn init_next_array_keys(&mut self, value: Value, last_pos: bool) -> Result<(), ScriptError> {
        if last_pos {
            if let Some(items) = value.as_tuple() {
                let n = items.len();
                for (i, item) in items.iter().enumerate() {
                    self.init_next_array_keys(item.clone(), i + 1 == n)?;
                }
                return Ok(());
            }
        }
        self.init_array += 1;
        self.set_int(self.init_array as i64, value.to_scalar())
    }

    // ---- remove ----

    /// Remove an entry. Returns whether a live value was removed.
    pub fn remove(&mut self, key: &Value) -> bool {
        if key.is_nil_or_nan() {
            return false;
        }
        let is_number = matches!(slot_of(key), Slot::Array(_));
        let idx = self.index_remove(key);
        self.perform_remove(idx, is_number)
    }

    pub fn remove_str(&mut self, key: &str) -> bool {
        let idx = self.string_index.swap_remove(key);
        self.perform_remove(idx, false)
    }

    pub fn remove_int(&mut self, key: i64) -> bool {
        self.remove(&Value::number(key as f64))
    }

    /// Remove every entry. The metatable is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.string_index.clear();
        self.array_index.clear();
        self.generic_index.clear();
        self.cached_length.set(Some(0));
        self.contains_nil_entries = false;
        self.init_array = 0;
    }

    /// Drop all tombstones.
    pub fn collect_dead_keys(&mut self) {
        let mut dead = Vec::new();
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(e) = self.entry(idx) else { break };
            if e.value.is_nil() {
                dead.push(idx);
            }
            cursor = e.next;
        }
        for &idx in &dead {
            if let Some(entry) = self.unlink(idx) {
                self.index_remove(&entry.key);
            }
        }
        self.contains_nil_entries = false;
        self.cached_length.set(None);
        trace!(
            target: "lunara::table",
            table = self.ref_id,
            collected = dead.len(),
            "collected dead keys"
        );
    }

    // ---- traversal ----

    /// The live pair after `key` in insertion order; nil starts from the
    /// beginning. `Ok(None)` marks the end.
    pub fn next_key(&self, key: &Value) -> Result<Option<TablePair>, ScriptError> {
        let start = if key.is_nil() {
            self.head
        } else {
            let idx = if key.is_nil_or_nan() {
                None
            } else {
                self.find(&slot_of(key))
            };
            let idx = idx.ok_or(ScriptError::InvalidKey(InvalidKeyKind::NextKey))?;
            self.entry(idx).and_then(|e| e.next)
        };
        Ok(self.first_live_from(start).map(|e| TablePair {
            key: e.key.clone(),
            value: e.value.clone(),
        }))
    }

    /// Live pairs in insertion order.
    pub fn pairs(&self) -> Pairs<'_> {
        Pairs {
            table: self,
            cursor: self.head,
        }
    }

    /// Live keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Value> + '_ {
        self.pairs().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.pairs().map(|(_, v)| v)
    }

    /// True when no live entry remains. Tombstones do not count.
    pub fn is_empty(&self) -> bool {
        self.first_live_from(self.head).is_none()
    }

    /// Border of the array part: the count of live keys 1, 2, 3, ... Cached.
    pub fn length(&self) -> usize {
        if let Some(n) = self.cached_length.get() {
            return n;
        }
        let mut n = 0;
        while self.array_slot_live(n + 1) {
            n += 1;
        }
        trace!(target: "lunara::table", length = n, "recomputed border");
        self.cached_length.set(Some(n));
        n
    }

    // ---- metatable ----

    pub fn metatable(&self) -> Option<&TableRef> {
        self.metatable.as_ref()
    }

    /// Attach or detach a metatable. Fails if the metatable belongs to another
    /// script or is mutably borrowed elsewhere.
    pub fn set_metatable(&mut self, metatable: Option<TableRef>) -> Result<(), ScriptError> {
        if let Some(mt) = metatable.as_ref().filter(|mt| !self.is_cell_of(mt)) {
            check_owner(self.owner, borrow_table(mt)?.owner_script())?;
        }
        self.metatable = metatable;
        Ok(())
    }

    // ---- key paths ----

    /// Walk every key but the last through nested tables. Returns the table
    /// holding the final key (`None` for `self`) and that key.
    fn resolve_path<'k>(
        &self,
        keys: &'k [Value],
    ) -> Result<Option<(Option<TableRef>, &'k Value)>, ScriptError> {
        let Some((last, prefix)) = keys.split_last() else {
            return Ok(None);
        };
        let mut current: Option<TableRef> = None;
        for key in prefix {
            let next = match &current {
                None => self.subtable(key)?,
                Some(t) => borrow_table(t)?.subtable(key)?,
            };
            current = Some(next);
        }
        Ok(Some((current, last)))
    }

    fn subtable(&self, key: &Value) -> Result<TableRef, ScriptError> {
        match self.raw_get(key) {
            None => Err(ScriptError::runtime(format!(
                "key '{}' did not point to anything",
                key.to_print_string()
            ))),
            Some(v) => v.as_table().cloned().ok_or_else(|| {
                ScriptError::runtime(format!(
                    "key '{}' did not point to a table",
                    key.to_print_string()
                ))
            }),
        }
    }

    /// Follow `keys` through nested tables and return the value at the last
    /// one, or nil.
    ///
    /// Every key but the last must lead to a table. An empty path gives nil.
    pub fn get_path(&self, keys: &[Value]) -> Result<Value, ScriptError> {
        Ok(self
            .raw_get_path(keys)?
            .unwrap_or_else(Value::read_only_nil))
    }

    /// Like [`Table::get_path`], with `None` for an absent final key.
    pub fn raw_get_path(&self, keys: &[Value]) -> Result<Option<Value>, ScriptError> {
        match self.resolve_path(keys)? {
            None => Ok(None),
            Some((None, key)) => Ok(self.raw_get(key)),
            Some((Some(t), key)) => Ok(borrow_table(&t)?.raw_get(key)),
        }
    }

    /// Store `value` at the end of a key path. The intermediate tables must
    /// already exist. An empty path is a nil key.
    pub fn set_path(&mut self, keys: &[Value], value: Value) -> Result<(), ScriptError> {
        match self.resolve_path(keys)? {
            None => Err(ScriptError::InvalidKey(InvalidKeyKind::Nil)),
            Some((None, key)) => self.set(key.clone(), value),
            Some((Some(t), key)) => borrow_table_mut(&t)?.set(key.clone(), value),
        }
    }

    /// Remove the entry at the end of a key path. Returns whether a live value
    /// was removed.
    pub fn remove_path(&mut self, keys: &[Value]) -> Result<bool, ScriptError> {
        match self.resolve_path(keys)? {
            None => Ok(false),
            Some((None, key)) => Ok(self.remove(key)),
            Some((Some(t), key)) => Ok(borrow_table_mut(&t)?.remove(key)),
        }
    }

    // ---- host-object keys ----

    /// Look up a key path given as host objects.
    pub fn host_get(&self, script: &Script, keys: &[&dyn Any]) -> Result<Value, ScriptError> {
        let keys = host_keys(script, keys)?;
        self.get_path(&keys)
    }

    /// Store a host object at a key path given as host objects. Both are
    /// converted through the script's interop layer first.
    pub fn host_set(
        &mut self,
        script: &Script,
        keys: &[&dyn Any],
        value: &dyn Any,
    ) -> Result<(), ScriptError> {
        let keys = host_keys(script, keys)?;
        let value = Value::from_host_object(script, value)?;
        self.set_path(&keys, value)
    }

    /// Remove the entry at a key path given as host objects.
    pub fn host_remove(&mut self, script: &Script, keys: &[&dyn Any]) -> Result<bool, ScriptError> {
        let keys = host_keys(script, keys)?;
        self.remove_path(&keys)
    }
}

fn host_keys(script: &Script, keys: &[&dyn Any]) -> Result<Vec<Value>, ScriptError> {
    keys.iter()
        .map(|k| Value::from_host_object(script, *k))
        .collect()
}

/// Shared borrow that reports reentrant mutation as a script error.
pub fn borrow_table(t: &TableRef) -> Result<Ref<'_, Table>, ScriptError> {
    t.try_borrow()
        .map_err(|_| ScriptError::runtime("table is being modified"))
}

/// Exclusive borrow that reports reentrant use as a script error.
pub fn borrow_table_mut(t: &TableRef) -> Result<RefMut<'_, Table>, ScriptError> {
    t.try_borrow_mut()
        .map_err(|_| ScriptError::runtime("table is already in use"))
}

/// Iterator over live pairs in insertion order.
pub struct Pairs<'a> {
    table: &'a Table,
    cursor: Option<EntryIdx>,
}

impl<'a> Iterator for Pairs<'a> {
    type Item = (&'a Value, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(idx) = self.cursor {
            let e = self.table.entry(idx)?;
            self.cursor = e.next;
            if e.value.is_not_nil() {
                return Some((&e.key, &e.value));
            }
        }
        None
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table(#{}, entries={}, len={})",
            self.ref_id,
            self.pairs().count(),
            self.length()
        )
    }
}
