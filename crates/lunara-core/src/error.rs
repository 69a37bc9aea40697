//! Runtime error types.

use crate::coroutine::CoroutineState;
use crate::value::Value;
use thiserror::Error;

/// Why a value was rejected as a table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidKeyKind {
    Nil,
    NaN,
    /// A `next_key` cursor that is no longer present in the table.
    NextKey,
}

/// Every failure the core surfaces to the VM or the embedding host.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ScriptError {
    /// Wrong or missing type at a type-checked boundary. `got == None` means
    /// no value was supplied at all.
    #[error(
        "bad argument{} to '{func}' ({expected} expected, got {})",
        position_suffix(*.position),
        .got.unwrap_or("no value")
    )]
    TypeMismatch {
        func: String,
        position: Option<usize>,
        expected: String,
        got: Option<&'static str>,
    },

    #[error("{}", invalid_key_message(*.0))]
    InvalidKey(InvalidKeyKind),

    /// Assignment through `assign`/`assign_number` on a frozen value.
    #[error("cannot assign to a read-only value")]
    IllegalMutation,

    #[error("{}", resume_message(*.state))]
    IllegalResume { state: CoroutineState },

    /// A native-callback coroutine resumed without an execution context.
    #[error("only script coroutines can be resumed without an execution context")]
    WrongResumeOverload,

    #[error("cannot close a {state} coroutine")]
    CannotClose { state: CoroutineState },

    #[error("attempt to access a resource owned by a script from another script")]
    IllegalCrossScriptAccess,

    #[error("corrupted binding table: {0}")]
    SerializationCorruption(String),

    #[error("{0}")]
    Runtime(String),

    /// A collaborator broke its contract with the core.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScriptError {
    pub fn runtime(msg: impl Into<String>) -> Self {
        ScriptError::Runtime(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        ScriptError::SerializationCorruption(msg.into())
    }

    /// Convert this error into a string value suitable for protected-call results.
    pub fn to_value(&self) -> Value {
        Value::string(self.to_string())
    }
}

fn position_suffix(position: Option<usize>) -> String {
    match position {
        Some(n) => format!(" #{n}"),
        None => String::new(),
    }
}

fn invalid_key_message(kind: InvalidKeyKind) -> &'static str {
    match kind {
        InvalidKeyKind::Nil => "table index is nil",
        InvalidKeyKind::NaN => "table index is NaN",
        InvalidKeyKind::NextKey => "invalid key to 'next'",
    }
}

fn resume_message(state: CoroutineState) -> String {
    match state {
        CoroutineState::Dead => "cannot resume dead coroutine".to_string(),
        other => format!("cannot resume non-suspended coroutine ({other})"),
    }
}
