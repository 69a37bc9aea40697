//! Engine instances: identity, options, reference ids and resource ownership.

use crate::callback::CallbackFunction;
use crate::coroutine::Coroutine;
use crate::error::ScriptError;
use crate::interop::{DefaultInterop, HostInterop};
use crate::object::Closure;
use crate::processor::Processor;
use crate::table::{Table, TableRef};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_SCRIPT_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of one engine instance. Tables, closures and coroutines remember
/// the script that created them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(u32);

impl ScriptId {
    fn fresh() -> Self {
        ScriptId(NEXT_SCRIPT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script#{}", self.0)
    }
}

/// Engine options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptOptions {
    /// Instructions a coroutine may run before it is force-suspended.
    /// Zero disables preemption.
    pub auto_yield_counter: u64,
    /// Initial capacity of the per-table indices.
    pub table_capacity_hint: usize,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        ScriptOptions {
            auto_yield_counter: 0,
            table_capacity_hint: 0,
        }
    }
}

/// Monotonic source of reference ids.
#[derive(Debug)]
pub struct RefIdCounter(Cell<u64>);

impl RefIdCounter {
    pub fn new() -> Self {
        RefIdCounter(Cell::new(1))
    }

    pub fn next(&self) -> u64 {
        let id = self.0.get();
        self.0.set(id + 1);
        id
    }
}

impl Default for RefIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static UNOWNED_REF_IDS: RefIdCounter = RefIdCounter::new();
}

/// Next id from the per-thread counter used by values and unowned objects.
pub fn next_unowned_ref_id() -> u64 {
    UNOWNED_REF_IDS.with(RefIdCounter::next)
}

/// Fail when two known owners differ. Unowned resources are compatible with
/// everything.
pub fn check_owner(expected: Option<ScriptId>, actual: Option<ScriptId>) -> Result<(), ScriptError> {
    match (expected, actual) {
        (Some(a), Some(b)) if a != b => Err(ScriptError::IllegalCrossScriptAccess),
        _ => Ok(()),
    }
}

/// An engine instance.
pub struct Script {
    id: ScriptId,
    options: ScriptOptions,
    ref_ids: RefIdCounter,
    interop: Rc<dyn HostInterop>,
    globals: RefCell<Option<TableRef>>,
}

impl Script {
    pub fn new() -> Self {
        Self::with_options(ScriptOptions::default())
    }

    pub fn with_options(options: ScriptOptions) -> Self {
        Self::with_interop(options, Rc::new(DefaultInterop))
    }

    pub fn with_interop(options: ScriptOptions, interop: Rc<dyn HostInterop>) -> Self {
        Script {
            id: ScriptId::fresh(),
            options,
            ref_ids: RefIdCounter::new(),
            interop,
            globals: RefCell::new(None),
        }
    }

    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn options(&self) -> &ScriptOptions {
        &self.options
    }

    pub fn next_ref_id(&self) -> u64 {
        self.ref_ids.next()
    }

    pub fn interop(&self) -> &Rc<dyn HostInterop> {
        &self.interop
    }

    /// The global table, created on first use. It backs the default environment.
    pub fn globals(&self) -> TableRef {
        self.globals
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(RefCell::new(Table::new(self))))
            .clone()
    }

    pub fn new_table(&self) -> TableRef {
        Rc::new(RefCell::new(Table::new(self)))
    }

    pub fn new_closure(&self, entry_point: u32, upvalues: Vec<Value>) -> Rc<Closure> {
        Rc::new(Closure::new(self, entry_point, upvalues))
    }

    /// Wrap a processor in a script coroutine owned by this engine. The
    /// engine's auto-yield budget is applied to the processor.
    pub fn create_coroutine(&self, processor: Rc<dyn Processor>) -> Result<Rc<Coroutine>, ScriptError> {
        check_owner(Some(self.id), processor.owner_script())?;
        if self.options.auto_yield_counter > 0 {
            processor.set_auto_yield_counter(self.options.auto_yield_counter);
        }
        Ok(Coroutine::with_processor(self.next_ref_id(), processor))
    }

    pub fn create_callback_coroutine(&self, callback: Rc<CallbackFunction>) -> Rc<Coroutine> {
        Coroutine::with_callback(self.next_ref_id(), Some(self.id), callback)
    }

    /// Check a resource that is about to be used by this engine.
    pub fn check_ownership(&self, owner: Option<ScriptId>) -> Result<(), ScriptError> {
        check_owner(Some(self.id), owner)
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish()
    }
}
