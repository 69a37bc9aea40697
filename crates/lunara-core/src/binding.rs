//! Variable bindings resolved by the compiler, and their binary form.
//!
//! A binding table is written as:
//!
//! ```text
//! u32 LE        record count
//! record*       [kind u8][index i32 LE][name: varint length + UTF-8][attributes i32 LE]
//! i32 LE*       environment: record index, or -1, one per record
//! ```
//!
//! Environments are written after all records so a global can point at any
//! record regardless of order; reading resolves them in a second pass.

use crate::error::ScriptError;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BindingType {
    Local = 0,
    Upvalue = 1,
    Global = 2,
    /// The implicit `_ENV` every chunk starts with.
    DefaultEnv = 3,
}

impl BindingType {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(BindingType::Local),
            1 => Some(BindingType::Upvalue),
            2 => Some(BindingType::Global),
            3 => Some(BindingType::DefaultEnv),
            _ => None,
        }
    }
}

/// Local variable attributes (`<const>`, `<close>`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct BindingAttributes(i32);

impl BindingAttributes {
    pub const NONE: Self = Self(0);
    pub const CONST: Self = Self(1);
    pub const TO_BE_CLOSED: Self = Self(2);

    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BindingAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A resolved reference to a variable.
#[derive(Debug, PartialEq)]
pub struct Binding {
    kind: BindingType,
    index: i32,
    name: String,
    attributes: BindingAttributes,
    environment: Option<Arc<Binding>>,
}

static DEFAULT_ENV: Lazy<Arc<Binding>> = Lazy::new(|| {
    Arc::new(Binding {
        kind: BindingType::DefaultEnv,
        index: 0,
        name: "_ENV".to_string(),
        attributes: BindingAttributes::NONE,
        environment: None,
    })
});

impl Binding {
    /// The process-wide default environment binding.
    pub fn default_env() -> Arc<Binding> {
        DEFAULT_ENV.clone()
    }

    /// A global looked up through `environment`.
    pub fn global(name: impl Into<String>, environment: Arc<Binding>) -> Arc<Binding> {
        Arc::new(Binding {
            kind: BindingType::Global,
            index: -1,
            name: name.into(),
            attributes: BindingAttributes::NONE,
            environment: Some(environment),
        })
    }

    pub fn local(
        name: impl Into<String>,
        index: i32,
        attributes: BindingAttributes,
    ) -> Arc<Binding> {
        Arc::new(Binding {
            kind: BindingType::Local,
            index,
            name: name.into(),
            attributes,
            environment: None,
        })
    }

    pub fn upvalue(name: impl Into<String>, index: i32) -> Arc<Binding> {
        Arc::new(Binding {
            kind: BindingType::Upvalue,
            index,
            name: name.into(),
            attributes: BindingAttributes::NONE,
            environment: None,
        })
    }

    pub fn kind(&self) -> BindingType {
        self.kind
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> BindingAttributes {
        self.attributes
    }

    pub fn environment(&self) -> Option<&Arc<Binding>> {
        self.environment.as_ref()
    }

    pub fn is_default_env(&self) -> bool {
        self.kind == BindingType::DefaultEnv
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BindingType::DefaultEnv => f.write_str("(default _ENV)"),
            BindingType::Global => match &self.environment {
                Some(env) => write!(f, "{} : Global / {}", self.name, env),
                None => write!(f, "{} : Global", self.name),
            },
            BindingType::Local => write!(f, "{} : Local[{}]", self.name, self.index),
            BindingType::Upvalue => write!(f, "{} : Upvalue[{}]", self.name, self.index),
        }
    }
}

// ---- writing ----

/// Serialize a binding table. Every environment a global points at must be
/// in `bindings` too.
pub fn write_table(bindings: &[Arc<Binding>]) -> Result<Vec<u8>, ScriptError> {
    let count = u32::try_from(bindings.len())
        .map_err(|_| ScriptError::corruption("too many bindings"))?;
    let positions: HashMap<*const Binding, i32> = bindings
        .iter()
        .enumerate()
        .map(|(i, b)| (Arc::as_ptr(b), i as i32))
        .collect();

    let mut out = Vec::new();
    out.extend_from_slice(&count.to_le_bytes());
    for b in bindings {
        out.push(b.kind as u8);
        write_int(&mut out, b.index);
        write_name(&mut out, &b.name);
        write_int(&mut out, b.attributes.bits());
    }
    for b in bindings {
        let env = match &b.environment {
            None => -1,
            Some(env) => *positions.get(&Arc::as_ptr(env)).ok_or_else(|| {
                ScriptError::corruption(format!(
                    "environment of '{}' is not part of the table",
                    b.name
                ))
            })?,
        };
        write_int(&mut out, env);
    }
    trace!(target: "lunara::binding", count, bytes = out.len(), "wrote binding table");
    Ok(out)
}

fn write_int(out: &mut Vec<u8>, n: i32) {
    out.extend_from_slice(&n.to_le_bytes());
}

/// Length-prefixed UTF-8; the length is a 7-bit varint, low group first.
fn write_name(out: &mut Vec<u8>, name: &str) {
    let mut n = name.len();
    while n >= 0x80 {
        out.push((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
    out.extend_from_slice(name.as_bytes());
}

// ---- reading ----

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_byte(&mut self) -> Result<u8, ScriptError> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| ScriptError::corruption("truncated binding table"))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ScriptError> {
        if n > self.remaining() {
            return Err(ScriptError::corruption("truncated binding table"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32_le(&mut self) -> Result<u32, ScriptError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_int(&mut self) -> Result<i32, ScriptError> {
        Ok(self.read_u32_le()? as i32)
    }

    fn read_name(&mut self) -> Result<String, ScriptError> {
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let b = self.read_byte()?;
            len |= ((b & 0x7f) as usize) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(ScriptError::corruption("name length is malformed"));
            }
        }
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ScriptError::corruption("name is not valid UTF-8"))
    }
}

/// A record as read in the first pass.
struct RawBinding {
    kind: BindingType,
    index: i32,
    name: String,
    attributes: BindingAttributes,
}

/// Smallest possible record: tag, index, empty name, attributes, environment.
const MIN_RECORD_SIZE: usize = 1 + 4 + 1 + 4 + 4;

/// Deserialize a binding table written by [`write_table`].
pub fn read_table(data: &[u8]) -> Result<Vec<Arc<Binding>>, ScriptError> {
    let mut reader = Reader::new(data);
    let count = reader.read_u32_le()? as usize;
    if count > reader.remaining() / MIN_RECORD_SIZE {
        return Err(ScriptError::corruption(format!(
            "record count {count} exceeds the data"
        )));
    }

    let mut raw = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = reader.read_byte()?;
        let kind = BindingType::from_tag(tag)
            .ok_or_else(|| ScriptError::corruption(format!("unknown binding kind {tag}")))?;
        let index = reader.read_int()?;
        let name = reader.read_name()?;
        let attributes = BindingAttributes::from_bits(reader.read_int()?);
        raw.push(RawBinding {
            kind,
            index,
            name,
            attributes,
        });
    }
    let mut envs = Vec::with_capacity(count);
    for _ in 0..count {
        envs.push(reader.read_int()?);
    }
    if reader.remaining() != 0 {
        return Err(ScriptError::corruption("trailing bytes after binding table"));
    }

    // Second pass: globals may only point at non-global records, so building
    // those first resolves every link without recursion or cycles.
    let mut built: Vec<Option<Arc<Binding>>> = vec![None; count];
    for (i, r) in raw.iter().enumerate() {
        if r.kind == BindingType::Global {
            continue;
        }
        if envs[i] != -1 {
            return Err(ScriptError::corruption(format!(
                "'{}' is not a global but has an environment",
                r.name
            )));
        }
        built[i] = Some(match r.kind {
            BindingType::DefaultEnv => Binding::default_env(),
            _ => Arc::new(Binding {
                kind: r.kind,
                index: r.index,
                name: r.name.clone(),
                attributes: r.attributes,
                environment: None,
            }),
        });
    }
    for (i, r) in raw.iter().enumerate() {
        if r.kind != BindingType::Global {
            continue;
        }
        let e = usize::try_from(envs[i])
            .ok()
            .filter(|&e| e < count)
            .ok_or_else(|| {
                ScriptError::corruption(format!(
                    "environment index {} of '{}' is out of range",
                    envs[i], r.name
                ))
            })?;
        if raw[e].kind == BindingType::Global {
            return Err(ScriptError::corruption(format!(
                "environment of '{}' is itself a global",
                r.name
            )));
        }
        let env = built[e]
            .clone()
            .ok_or_else(|| ScriptError::Internal("unresolved environment".to_string()))?;
        built[i] = Some(Arc::new(Binding {
            kind: BindingType::Global,
            index: r.index,
            name: r.name.clone(),
            attributes: r.attributes,
            environment: Some(env),
        }));
    }
    trace!(target: "lunara::binding", count, "read binding table");
    built
        .into_iter()
        .map(|b| b.ok_or_else(|| ScriptError::Internal("unresolved binding".to_string())))
        .collect()
}
