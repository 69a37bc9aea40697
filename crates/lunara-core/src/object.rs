//! Heap object types and type name helpers.

use crate::script::{next_unowned_ref_id, Script, ScriptId};
use crate::value::Value;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// The type of a value. Discriminants are stable and feed the hash code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Nil = 0,
    Void = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    Function = 5,
    Table = 6,
    Tuple = 7,
    UserData = 8,
    Thread = 9,
    ClrFunction = 10,
    TailCallRequest = 11,
    YieldRequest = 12,
}

impl DataType {
    /// Name as reported by `type()` and in argument errors.
    pub fn lua_name(self) -> &'static str {
        match self {
            DataType::Nil => "nil",
            DataType::Void => "no value",
            DataType::Boolean => "boolean",
            DataType::Number => "number",
            DataType::String => "string",
            DataType::Function | DataType::ClrFunction => "function",
            DataType::Table => "table",
            DataType::Tuple => "tuple",
            DataType::UserData => "userdata",
            DataType::Thread => "thread",
            DataType::TailCallRequest | DataType::YieldRequest => "internal",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lua_name())
    }
}

/// A compiled function instance: entry point into the bytecode plus captured upvalues.
pub struct Closure {
    ref_id: u64,
    owner: Option<ScriptId>,
    entry_point: u32,
    upvalues: Vec<Rc<RefCell<Value>>>,
}

impl Closure {
    pub fn new(script: &Script, entry_point: u32, upvalues: Vec<Value>) -> Self {
        Closure {
            ref_id: script.next_ref_id(),
            owner: Some(script.id()),
            entry_point,
            upvalues: upvalues
                .into_iter()
                .map(|v| Rc::new(RefCell::new(v)))
                .collect(),
        }
    }

    pub fn ref_id(&self) -> u64 {
        self.ref_id
    }

    pub fn owner_script(&self) -> Option<ScriptId> {
        self.owner
    }

    pub fn entry_point(&self) -> u32 {
        self.entry_point
    }

    pub fn upvalue(&self, idx: usize) -> Option<Value> {
        self.upvalues.get(idx).map(|cell| cell.borrow().clone())
    }

    pub fn upvalue_count(&self) -> usize {
        self.upvalues.len()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "closure(#{}, entry={:08X}, upvals={})",
            self.ref_id,
            self.entry_point,
            self.upvalues.len()
        )
    }
}

/// Describes how a family of host objects behaves inside scripts.
pub trait UserDataDescriptor {
    fn name(&self) -> &str;

    /// Custom print form. `None` falls back to `userdata: XXXXXXXX`.
    fn as_string(&self, _object: Option<&dyn Any>) -> Option<String> {
        None
    }

    fn objects_equal(&self, a: &dyn Any, b: &dyn Any) -> bool {
        std::ptr::addr_eq(a as *const dyn Any, b as *const dyn Any)
    }
}

/// A host object exposed to scripts. `object == None` is a static
/// (type-level) userdata.
pub struct UserData {
    ref_id: u64,
    object: Option<Rc<dyn Any>>,
    descriptor: Rc<dyn UserDataDescriptor>,
}

impl UserData {
    pub fn new(object: Option<Rc<dyn Any>>, descriptor: Rc<dyn UserDataDescriptor>) -> Self {
        UserData {
            ref_id: next_unowned_ref_id(),
            object,
            descriptor,
        }
    }

    pub fn ref_id(&self) -> u64 {
        self.ref_id
    }

    pub fn object(&self) -> Option<&Rc<dyn Any>> {
        self.object.as_ref()
    }

    pub fn descriptor(&self) -> &Rc<dyn UserDataDescriptor> {
        &self.descriptor
    }

    pub fn same_descriptor(&self, other: &UserData) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.descriptor), Rc::as_ptr(&other.descriptor))
    }

    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        self.object.clone().and_then(|o| o.downcast::<T>().ok())
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata(#{}, {})", self.ref_id, self.descriptor.name())
    }
}

/// Instruction to the VM to replace the current frame with a call.
#[derive(Debug)]
pub struct TailCallData {
    pub function: Value,
    pub args: Vec<Value>,
}

/// Instruction to the VM to suspend the running coroutine. `forced` marks a
/// preemption by the auto-yield counter rather than an explicit yield.
#[derive(Debug)]
pub struct YieldRequest {
    pub return_values: Vec<Value>,
    pub forced: bool,
}
