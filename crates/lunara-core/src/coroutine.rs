//! Coroutines: the lifecycle state machine over a [`Processor`].
//!
//! A coroutine is either a script coroutine backed by a processor, or a
//! native callback that can be resumed exactly once.

use crate::callback::{CallbackFunction, ExecutionContext};
use crate::debug::{SourceRef, WatchItem};
use crate::error::ScriptError;
use crate::object::Closure;
use crate::processor::Processor;
use crate::script::{check_owner, next_unowned_ref_id, Script, ScriptId};
use crate::value::Value;
use std::any::{Any, TypeId};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Lifecycle of a coroutine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoroutineState {
    /// The main processor; never resumable.
    Main,
    NotStarted,
    Suspended,
    /// Preempted by the auto-yield counter.
    ForceSuspended,
    Running,
    Dead,
}

impl CoroutineState {
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            CoroutineState::NotStarted | CoroutineState::Suspended | CoroutineState::ForceSuspended
        )
    }

    /// Legal edges of the lifecycle. Closing moves any idle coroutine to Dead.
    pub fn can_transition_to(self, next: CoroutineState) -> bool {
        use CoroutineState::*;
        matches!(
            (self, next),
            (NotStarted | Suspended | ForceSuspended, Running)
                | (Running, Suspended | ForceSuspended | Dead)
                | (NotStarted | Suspended | ForceSuspended, Dead)
        )
    }
}

impl fmt::Display for CoroutineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoroutineState::Main => "main",
            CoroutineState::NotStarted => "not started",
            CoroutineState::Suspended => "suspended",
            CoroutineState::ForceSuspended => "force-suspended",
            CoroutineState::Running => "running",
            CoroutineState::Dead => "dead",
        })
    }
}

/// What kind of body a coroutine has.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoroutineType {
    Coroutine,
    ClrCallback,
    /// A native callback that has already run.
    ClrCallbackDead,
    /// A script coroutine whose resources were handed to another.
    Recycled,
}

enum CoroutineBody {
    Script(Rc<dyn Processor>),
    NativeCallback {
        callback: Rc<CallbackFunction>,
        consumed: Cell<bool>,
    },
}

pub struct Coroutine {
    ref_id: u64,
    owner: Option<ScriptId>,
    body: CoroutineBody,
    recycled: Cell<bool>,
}

impl Coroutine {
    pub(crate) fn with_processor(ref_id: u64, processor: Rc<dyn Processor>) -> Rc<Coroutine> {
        let co = Rc::new(Coroutine {
            ref_id,
            owner: processor.owner_script(),
            body: CoroutineBody::Script(processor.clone()),
            recycled: Cell::new(false),
        });
        processor.set_associated_coroutine(Rc::downgrade(&co));
        co
    }

    pub(crate) fn with_callback(
        ref_id: u64,
        owner: Option<ScriptId>,
        callback: Rc<CallbackFunction>,
    ) -> Rc<Coroutine> {
        Rc::new(Coroutine {
            ref_id,
            owner,
            body: CoroutineBody::NativeCallback {
                callback,
                consumed: Cell::new(false),
            },
            recycled: Cell::new(false),
        })
    }

    /// Wrap a processor that was created outside any [`Script`] handle.
    pub fn from_processor(processor: Rc<dyn Processor>) -> Rc<Coroutine> {
        Self::with_processor(next_unowned_ref_id(), processor)
    }

    /// Wrap a native callback; it runs on the first resume with a context.
    pub fn from_callback(callback: Rc<CallbackFunction>) -> Rc<Coroutine> {
        Self::with_callback(next_unowned_ref_id(), None, callback)
    }

    pub fn ref_id(&self) -> u64 {
        self.ref_id
    }

    pub fn owner_script(&self) -> Option<ScriptId> {
        self.owner
    }

    pub fn kind(&self) -> CoroutineType {
        match &self.body {
            CoroutineBody::Script(_) if self.recycled.get() => CoroutineType::Recycled,
            CoroutineBody::Script(_) => CoroutineType::Coroutine,
            CoroutineBody::NativeCallback { consumed, .. } if consumed.get() => {
                CoroutineType::ClrCallbackDead
            }
            CoroutineBody::NativeCallback { .. } => CoroutineType::ClrCallback,
        }
    }

    pub fn state(&self) -> CoroutineState {
        match &self.body {
            CoroutineBody::Script(p) => p.state(),
            CoroutineBody::NativeCallback { consumed, .. } if consumed.get() => {
                CoroutineState::Dead
            }
            CoroutineBody::NativeCallback { .. } => CoroutineState::NotStarted,
        }
    }

    /// The backing processor of a script coroutine.
    pub fn processor(&self) -> Option<&Rc<dyn Processor>> {
        match &self.body {
            CoroutineBody::Script(p) => Some(p),
            CoroutineBody::NativeCallback { .. } => None,
        }
    }

    fn check_args(&self, args: &[Value]) -> Result<(), ScriptError> {
        for arg in args {
            check_owner(self.owner, arg.owner_script()?)?;
        }
        Ok(())
    }

    /// Resume a script coroutine. Native callbacks need
    /// [`resume_with_context`](Self::resume_with_context).
    pub fn resume(&self, args: &[Value]) -> Result<Value, ScriptError> {
        self.check_args(args)?;
        match &self.body {
            CoroutineBody::Script(p) => self.resume_processor(p.as_ref(), args),
            CoroutineBody::NativeCallback { .. } => Err(ScriptError::WrongResumeOverload),
        }
    }

    /// Resume from inside a running script. Native callbacks run once here.
    pub fn resume_with_context(
        &self,
        ctx: &mut ExecutionContext<'_>,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        check_owner(self.owner, Some(ctx.owner_script()))?;
        self.check_args(args)?;
        match &self.body {
            CoroutineBody::Script(p) => self.resume_processor(p.as_ref(), args),
            CoroutineBody::NativeCallback { callback, consumed } => {
                if consumed.replace(true) {
                    return Err(ScriptError::IllegalResume {
                        state: CoroutineState::Dead,
                    });
                }
                debug!(
                    target: "lunara::coroutine",
                    coroutine = self.ref_id,
                    callback = callback.name().unwrap_or("<anonymous>"),
                    "running callback coroutine"
                );
                callback.invoke(ctx, args, false)
            }
        }
    }

    /// Resume with arguments given as host objects.
    pub fn resume_host(&self, script: &Script, args: &[&dyn Any]) -> Result<Value, ScriptError> {
        script.check_ownership(self.owner)?;
        let args = args
            .iter()
            .map(|a| Value::from_host_object(script, *a))
            .collect::<Result<Vec<_>, _>>()?;
        self.resume(&args)
    }

    fn resume_processor(&self, p: &dyn Processor, args: &[Value]) -> Result<Value, ScriptError> {
        let from = p.state();
        if !from.is_resumable() {
            return Err(ScriptError::IllegalResume { state: from });
        }
        if from == CoroutineState::ForceSuspended && !args.is_empty() {
            return Err(ScriptError::runtime(
                "a force-suspended coroutine must be resumed without arguments",
            ));
        }
        debug!(
            target: "lunara::coroutine",
            coroutine = self.ref_id,
            from = %from,
            nargs = args.len(),
            "resume"
        );
        let result = p.resume_coroutine(args);
        let to = p.state();
        if !CoroutineState::Running.can_transition_to(to) {
            warn!(
                target: "lunara::coroutine",
                coroutine = self.ref_id,
                state = %to,
                "processor left the coroutine in an unexpected state"
            );
        }
        debug!(target: "lunara::coroutine", coroutine = self.ref_id, to = %to, "suspend");
        result
    }

    /// Close the coroutine. Native callbacks have nothing to unwind.
    pub fn close(&self) -> Result<Value, ScriptError> {
        match &self.body {
            CoroutineBody::Script(p) => {
                debug!(target: "lunara::coroutine", coroutine = self.ref_id, state = %p.state(), "close");
                p.close_coroutine()
            }
            CoroutineBody::NativeCallback { .. } => Ok(Value::boolean(true)),
        }
    }

    /// Hand this dead coroutine's resources to a new coroutine running `closure`.
    pub fn recycle(&self, main: &dyn Processor, closure: Rc<Closure>) -> Result<Value, ScriptError> {
        let CoroutineBody::Script(p) = &self.body else {
            return Err(ScriptError::Internal(
                "only script coroutines can be recycled".to_string(),
            ));
        };
        if self.recycled.get() {
            return Err(ScriptError::Internal(
                "coroutine was already recycled".to_string(),
            ));
        }
        let state = p.state();
        if state != CoroutineState::Dead {
            return Err(ScriptError::runtime(format!(
                "cannot recycle a {state} coroutine"
            )));
        }
        check_owner(self.owner, closure.owner_script())?;
        let fresh = p.recycle_coroutine(main, closure)?;
        self.recycled.set(true);
        debug!(target: "lunara::coroutine", coroutine = self.ref_id, "recycled");
        Ok(fresh)
    }

    /// Resume repeatedly with no arguments, yielding each result, until the
    /// coroutine stops being resumable.
    pub fn iter(&self) -> ResumeIter<'_> {
        ResumeIter {
            coroutine: self,
            finished: false,
        }
    }

    /// Like [`iter`](Self::iter), reducing each result to a scalar.
    pub fn iter_scalars(&self) -> impl Iterator<Item = Result<Value, ScriptError>> + '_ {
        self.iter().map(|r| r.map(|v| v.to_scalar()))
    }

    /// Like [`iter_scalars`](Self::iter_scalars), converting each scalar to
    /// the host type `T` through `script`'s interop layer. Iteration stops
    /// after the first failed conversion.
    ///
    /// Fails up front if the coroutine belongs to another script.
    pub fn iter_host<'a, T: 'static>(
        &'a self,
        script: &'a Script,
    ) -> Result<impl Iterator<Item = Result<T, ScriptError>> + 'a, ScriptError> {
        script.check_ownership(self.owner)?;
        let mut failed = false;
        Ok(self.iter_scalars().map_while(move |r| {
            if failed {
                return None;
            }
            let converted = r.and_then(|v| {
                v.to_host_object_of(script, TypeId::of::<T>())?
                    .downcast::<T>()
                    .map(|b| *b)
                    .map_err(|_| {
                        ScriptError::Internal(
                            "interop returned an object of the wrong type".to_string(),
                        )
                    })
            });
            failed = converted.is_err();
            Some(converted)
        }))
    }

    /// The coroutine's call stack, skipping the innermost `skip` frames.
    pub fn stack_trace(
        &self,
        skip: usize,
        entry: Option<SourceRef>,
    ) -> Result<Vec<WatchItem>, ScriptError> {
        let CoroutineBody::Script(p) = &self.body else {
            return Err(ScriptError::Internal(
                "native callback coroutines have no call stack".to_string(),
            ));
        };
        let entry = if p.state() == CoroutineState::Running {
            entry
        } else {
            p.suspended_location()
        };
        Ok(p.debugger_call_stack(entry).into_iter().skip(skip).collect())
    }

    /// `None` for native callback coroutines.
    pub fn auto_yield_counter(&self) -> Option<u64> {
        self.processor().map(|p| p.auto_yield_counter())
    }

    pub fn set_auto_yield_counter(&self, counter: u64) -> Result<(), ScriptError> {
        match self.processor() {
            Some(p) => {
                p.set_auto_yield_counter(counter);
                Ok(())
            }
            None => Err(ScriptError::Internal(
                "native callback coroutines cannot be preempted".to_string(),
            )),
        }
    }

    #[doc(hidden)]
    pub fn force_state_for_tests(&self, state: CoroutineState) {
        if let Some(p) = self.processor() {
            p.force_state_for_tests(state);
        }
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "coroutine(#{}, {:?}, {})",
            self.ref_id,
            self.kind(),
            self.state()
        )
    }
}

/// Iterator returned by [`Coroutine::iter`].
pub struct ResumeIter<'a> {
    coroutine: &'a Coroutine,
    finished: bool,
}

impl Iterator for ResumeIter<'_> {
    type Item = Result<Value, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.coroutine.kind() != CoroutineType::Coroutine {
            self.finished = true;
            return Some(Err(ScriptError::WrongResumeOverload));
        }
        if !self.coroutine.state().is_resumable() {
            self.finished = true;
            return None;
        }
        let result = self.coroutine.resume(&[]);
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }
}
