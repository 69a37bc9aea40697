//! Debugger-facing descriptions of source locations and call-stack frames.

use crate::value::Value;
use std::fmt;

/// A span of source text inside a loaded chunk.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SourceRef {
    pub chunk_index: u32,
    pub from_line: u32,
    pub to_line: u32,
    pub from_char: u32,
    pub to_char: u32,
    /// True when the location is inside a native callback.
    pub is_native: bool,
}

impl SourceRef {
    pub fn new(chunk_index: u32, from_line: u32, to_line: u32) -> Self {
        SourceRef {
            chunk_index,
            from_line,
            to_line,
            ..Default::default()
        }
    }

    pub fn native() -> Self {
        SourceRef {
            is_native: true,
            ..Default::default()
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native {
            return write!(f, "[native]");
        }
        write!(
            f,
            "chunk {}:({},{}-{},{})",
            self.chunk_index, self.from_line, self.from_char, self.to_line, self.to_char
        )
    }
}

/// One frame of a coroutine's call stack as reported to debuggers.
#[derive(Clone, Debug, Default)]
pub struct WatchItem {
    pub address: i32,
    pub base_pointer: i32,
    pub return_address: i32,
    pub name: Option<String>,
    pub value: Option<Value>,
    pub location: Option<SourceRef>,
}

impl WatchItem {
    pub fn named(name: impl Into<String>, location: Option<SourceRef>) -> Self {
        WatchItem {
            name: Some(name.into()),
            location,
            ..Default::default()
        }
    }
}

impl fmt::Display for WatchItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.address,
            self.base_pointer,
            self.return_address,
            self.name.as_deref().unwrap_or("?")
        )?;
        if let Some(v) = &self.value {
            write!(f, " = {v}")?;
        }
        Ok(())
    }
}
