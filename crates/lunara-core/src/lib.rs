//! Runtime core of the Lunara scripting engine: values, tables, variable
//! bindings and coroutines.
//!
//! The bytecode interpreter is not part of this crate. It plugs in through
//! the [`Processor`] trait, and host applications marshal their objects
//! through [`HostInterop`].

pub mod binding;
pub mod callback;
pub mod coerce;
pub mod coroutine;
pub mod debug;
pub mod error;
pub mod interop;
pub mod object;
pub mod processor;
pub mod script;
pub mod table;
pub mod value;

pub use binding::{Binding, BindingAttributes, BindingType};
pub use callback::{CallbackArguments, CallbackFunction, ExecutionContext};
pub use coroutine::{Coroutine, CoroutineState, CoroutineType};
pub use debug::{SourceRef, WatchItem};
pub use error::{InvalidKeyKind, ScriptError};
pub use interop::{DefaultInterop, HostInterop};
pub use object::{Closure, DataType, UserData, UserDataDescriptor};
pub use processor::Processor;
pub use script::{Script, ScriptId, ScriptOptions};
pub use table::{Table, TablePair, TableRef};
pub use value::{TypeValidationOptions, Value, ValueKind};
