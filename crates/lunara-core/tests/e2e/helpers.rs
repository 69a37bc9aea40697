use lunara_core::coroutine::{Coroutine, CoroutineState};
use lunara_core::debug::{SourceRef, WatchItem};
use lunara_core::error::ScriptError;
use lunara_core::object::Closure;
use lunara_core::processor::Processor;
use lunara_core::script::{Script, ScriptId};
use lunara_core::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

/// One step of a scripted coroutine body.
#[derive(Clone, Debug)]
pub enum Step {
    Yield(Vec<Value>),
    Return(Vec<Value>),
    Fail(String),
}

/// A to-be-closed handler run when a suspended coroutine is closed.
pub type CloseHandler = Rc<dyn Fn() -> Result<(), String>>;

/// Bodies that `recycle_coroutine` can load, keyed by closure entry point.
pub type Programs = Rc<HashMap<u32, Vec<Step>>>;

/// A processor that replays a fixed list of steps instead of running bytecode.
/// Each step costs `cost_per_step` instructions against the auto-yield budget.
pub struct ScriptedProcessor {
    owner: Option<ScriptId>,
    state: Cell<CoroutineState>,
    coroutine: RefCell<Weak<Coroutine>>,
    steps: RefCell<VecDeque<Step>>,
    cost_per_step: u64,
    pending_cost: Cell<u64>,
    auto_yield: Cell<u64>,
    executed: Cell<u32>,
    received: RefCell<Vec<Vec<Value>>>,
    last_error: RefCell<Option<String>>,
    close_handlers: RefCell<Vec<CloseHandler>>,
    programs: Programs,
}

impl ScriptedProcessor {
    pub fn new(owner: Option<ScriptId>, steps: Vec<Step>) -> Self {
        ScriptedProcessor {
            owner,
            state: Cell::new(CoroutineState::NotStarted),
            coroutine: RefCell::new(Weak::new()),
            steps: RefCell::new(steps.into()),
            cost_per_step: 1,
            pending_cost: Cell::new(1),
            auto_yield: Cell::new(0),
            executed: Cell::new(0),
            received: RefCell::new(Vec::new()),
            last_error: RefCell::new(None),
            close_handlers: RefCell::new(Vec::new()),
            programs: Rc::new(HashMap::new()),
        }
    }

    /// The processor running the main chunk.
    pub fn main(owner: Option<ScriptId>) -> Self {
        let p = Self::new(owner, Vec::new());
        p.state.set(CoroutineState::Main);
        p
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost_per_step = cost;
        self.pending_cost.set(cost);
        self
    }

    pub fn with_close_handler(self, handler: impl Fn() -> Result<(), String> + 'static) -> Self {
        self.close_handlers.borrow_mut().push(Rc::new(handler));
        self
    }

    pub fn with_programs(mut self, programs: Programs) -> Self {
        self.programs = programs;
        self
    }

    /// Arguments of every resume so far.
    pub fn received(&self) -> Vec<Vec<Value>> {
        self.received.borrow().clone()
    }
}

impl Processor for ScriptedProcessor {
    fn owner_script(&self) -> Option<ScriptId> {
        self.owner
    }

    fn state(&self) -> CoroutineState {
        self.state.get()
    }

    fn associated_coroutine(&self) -> Option<Rc<Coroutine>> {
        self.coroutine.borrow().upgrade()
    }

    fn set_associated_coroutine(&self, coroutine: Weak<Coroutine>) {
        *self.coroutine.borrow_mut() = coroutine;
    }

    fn resume_coroutine(&self, args: &[Value]) -> Result<Value, ScriptError> {
        assert!(self.state.get().can_transition_to(CoroutineState::Running));
        self.received.borrow_mut().push(args.to_vec());
        self.state.set(CoroutineState::Running);

        let limit = self.auto_yield.get();
        let mut ticks = 0;
        while self.pending_cost.get() > 0 {
            if limit > 0 && ticks >= limit {
                self.state.set(CoroutineState::ForceSuspended);
                return Ok(Value::forced_yield_request());
            }
            self.pending_cost.set(self.pending_cost.get() - 1);
            ticks += 1;
        }
        self.pending_cost.set(self.cost_per_step);
        self.executed.set(self.executed.get() + 1);

        let step = self.steps.borrow_mut().pop_front();
        match step {
            Some(Step::Yield(values)) => {
                self.state.set(CoroutineState::Suspended);
                Ok(Value::tuple(values))
            }
            Some(Step::Return(values)) => {
                self.state.set(CoroutineState::Dead);
                Ok(Value::tuple(values))
            }
            None => {
                self.state.set(CoroutineState::Dead);
                Ok(Value::void())
            }
            Some(Step::Fail(msg)) => {
                self.state.set(CoroutineState::Dead);
                *self.last_error.borrow_mut() = Some(msg.clone());
                Err(ScriptError::Runtime(msg))
            }
        }
    }

    fn recycle_coroutine(
        &self,
        _main: &dyn Processor,
        closure: Rc<Closure>,
    ) -> Result<Value, ScriptError> {
        let steps = self
            .programs
            .get(&closure.entry_point())
            .cloned()
            .ok_or_else(|| ScriptError::runtime("no program at entry point"))?;
        let fresh = ScriptedProcessor::new(self.owner, steps)
            .with_cost(self.cost_per_step)
            .with_programs(self.programs.clone());
        fresh.auto_yield.set(self.auto_yield.get());
        // Hand over the argument log buffer.
        let mut buffer = std::mem::take(&mut *self.received.borrow_mut());
        buffer.clear();
        *fresh.received.borrow_mut() = buffer;
        self.steps.borrow_mut().clear();
        Ok(Value::coroutine(Coroutine::from_processor(Rc::new(fresh))))
    }

    fn close_coroutine(&self) -> Result<Value, ScriptError> {
        let state = self.state.get();
        match state {
            CoroutineState::Main | CoroutineState::Running => {
                Err(ScriptError::CannotClose { state })
            }
            CoroutineState::Dead => Ok(match self.last_error.borrow().as_ref() {
                Some(e) => Value::tuple(vec![Value::boolean(false), Value::string(e.as_str())]),
                None => Value::boolean(true),
            }),
            CoroutineState::NotStarted => {
                self.state.set(CoroutineState::Dead);
                Ok(Value::boolean(true))
            }
            CoroutineState::Suspended | CoroutineState::ForceSuspended => {
                self.state.set(CoroutineState::Dead);
                self.steps.borrow_mut().clear();
                let handlers = std::mem::take(&mut *self.close_handlers.borrow_mut());
                let mut first_error = None;
                for h in handlers.iter().rev() {
                    if let Err(e) = h() {
                        first_error.get_or_insert(e);
                    }
                }
                Ok(match first_error {
                    Some(e) => Value::tuple(vec![Value::boolean(false), Value::string(e)]),
                    None => Value::boolean(true),
                })
            }
        }
    }

    fn suspended_location(&self) -> Option<SourceRef> {
        let line = self.executed.get();
        Some(SourceRef::new(0, line, line))
    }

    fn debugger_call_stack(&self, entry: Option<SourceRef>) -> Vec<WatchItem> {
        vec![
            WatchItem::named("scripted", entry),
            WatchItem::named("main chunk", None),
        ]
    }

    fn auto_yield_counter(&self) -> u64 {
        self.auto_yield.get()
    }

    fn set_auto_yield_counter(&self, counter: u64) {
        self.auto_yield.set(counter);
    }

    fn force_state_for_tests(&self, state: CoroutineState) {
        self.state.set(state);
    }
}

/// Wrap a scripted processor in a coroutine owned by `script`.
pub fn spawn(script: &Script, processor: ScriptedProcessor) -> (Rc<ScriptedProcessor>, Rc<Coroutine>) {
    let p = Rc::new(processor);
    let co = script
        .create_coroutine(p.clone())
        .unwrap_or_else(|e| panic!("create_coroutine failed: {e}"));
    (p, co)
}

pub fn nums(values: &[f64]) -> Vec<Value> {
    values.iter().map(|&n| Value::number(n)).collect()
}

/// Check that `v` is the number `expected`.
pub fn assert_num(v: &Value, expected: f64) {
    let got = v
        .as_number()
        .unwrap_or_else(|| panic!("{v:?} is not a number, expected {expected}"));
    assert_eq!(got, expected, "got {got}, expected {expected}");
}

/// Check that `v` is a tuple of exactly these numbers.
pub fn assert_tuple_nums(v: &Value, expected: &[f64]) {
    let items = v
        .as_tuple()
        .unwrap_or_else(|| panic!("{v:?} is not a tuple"));
    let got: Vec<f64> = items.iter().filter_map(Value::as_number).collect();
    assert_eq!(got, expected);
    assert_eq!(items.len(), expected.len());
}
