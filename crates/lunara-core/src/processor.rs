//! The seam between coroutines and the bytecode interpreter.
//!
//! A [`Processor`] owns one coroutine's execution stack. The core never runs
//! bytecode itself; it validates state transitions and delegates here.
//! Methods take `&self`: a processor is re-entered while it runs (a script
//! resuming another coroutine, a callback inspecting its caller), so
//! implementations keep their mutable state behind cells.

use crate::coroutine::{Coroutine, CoroutineState};
use crate::debug::{SourceRef, WatchItem};
use crate::error::ScriptError;
use crate::object::Closure;
use crate::script::ScriptId;
use crate::value::Value;
use std::rc::{Rc, Weak};

pub trait Processor {
    /// The script whose resources this processor runs on.
    fn owner_script(&self) -> Option<ScriptId>;

    fn state(&self) -> CoroutineState;

    fn associated_coroutine(&self) -> Option<Rc<Coroutine>>;

    fn set_associated_coroutine(&self, coroutine: Weak<Coroutine>);

    /// Run until the coroutine yields, returns or fails.
    ///
    /// A normal yield leaves the processor `Suspended` and returns the yielded
    /// values as a tuple. Exhausting the auto-yield budget leaves it
    /// `ForceSuspended` and returns a forced yield request. Returning or
    /// raising leaves it `Dead`.
    fn resume_coroutine(&self, args: &[Value]) -> Result<Value, ScriptError>;

    /// Rebind this dead coroutine's resources to run `closure`. Returns the
    /// new coroutine as a thread value.
    fn recycle_coroutine(
        &self,
        main: &dyn Processor,
        closure: Rc<Closure>,
    ) -> Result<Value, ScriptError>;

    /// Close the coroutine, running pending to-be-closed handlers.
    ///
    /// Returns `true`, or a `(false, error)` tuple when the coroutine died
    /// with an error or a handler failed.
    fn close_coroutine(&self) -> Result<Value, ScriptError>;

    /// Where a suspended coroutine stopped.
    fn suspended_location(&self) -> Option<SourceRef>;

    fn debugger_call_stack(&self, entry: Option<SourceRef>) -> Vec<WatchItem>;

    /// Instructions allowed before preemption; zero disables it.
    fn auto_yield_counter(&self) -> u64;

    fn set_auto_yield_counter(&self, counter: u64);

    #[doc(hidden)]
    fn force_state_for_tests(&self, state: CoroutineState);
}
