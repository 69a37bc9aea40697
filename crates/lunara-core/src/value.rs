//! Script values.
//!
//! A [`Value`] is a tagged union over every runtime type plus three bits of
//! per-instance state: a reference id, a read-only flag and a lazily computed
//! hash code. Cloning a `Value` copies the handle, so the clone keeps the
//! reference id; [`Value::clone_as`] makes a new instance with a new id.

use crate::callback::{CallbackFunction, ExecutionContext, CallbackArguments};
use crate::coerce::{format_number, parse_number, string_hash};
use crate::coroutine::Coroutine;
use crate::error::ScriptError;
use crate::object::{Closure, DataType, TailCallData, UserData, YieldRequest};
use crate::script::{next_unowned_ref_id, Script, ScriptId};
use crate::table::{borrow_table, TableRef};
use std::any::{Any, TypeId};
use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::BitOr;
use std::rc::Rc;

/// Hash code shared by userdata, threads and internal requests.
const OPAQUE_HASH: u32 = 999;

/// The payload of a value.
#[derive(Clone)]
pub enum ValueKind {
    Nil,
    /// Absence of a value, e.g. a missing argument. Equal to `Nil`.
    Void,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Function(Rc<Closure>),
    ClrFunction(Rc<CallbackFunction>),
    Table(TableRef),
    Tuple(Rc<[Value]>),
    UserData(Rc<UserData>),
    Thread(Rc<Coroutine>),
    TailCallRequest(Rc<TailCallData>),
    YieldRequest(Rc<YieldRequest>),
}

/// Options for [`Value::check_type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TypeValidationOptions(u8);

impl TypeValidationOptions {
    pub const NONE: Self = Self(0);
    pub const ALLOW_NIL: Self = Self(1);
    pub const AUTO_CONVERT: Self = Self(2);

    /// True if every flag in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TypeValidationOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

pub struct Value {
    kind: ValueKind,
    ref_id: u64,
    read_only: bool,
    hash: Cell<Option<u32>>,
}

struct Singletons {
    nil: Value,
    void: Value,
    yes: Value,
    no: Value,
}

thread_local! {
    static SINGLETONS: Singletons = Singletons {
        nil: Value::frozen(ValueKind::Nil),
        void: Value::frozen(ValueKind::Void),
        yes: Value::frozen(ValueKind::Boolean(true)),
        no: Value::frozen(ValueKind::Boolean(false)),
    };
}

impl Value {
    fn from_kind(kind: ValueKind) -> Value {
        Value {
            kind,
            ref_id: next_unowned_ref_id(),
            read_only: false,
            hash: Cell::new(None),
        }
    }

    fn frozen(kind: ValueKind) -> Value {
        Value {
            read_only: true,
            ..Value::from_kind(kind)
        }
    }

    // ---- constructors ----

    /// A writable nil.
    pub fn nil() -> Value {
        Value::from_kind(ValueKind::Nil)
    }

    /// A writable void: the absence of a value, e.g. a missing argument or an
    /// empty return.
    pub fn void() -> Value {
        Value::from_kind(ValueKind::Void)
    }

    /// A writable boolean. Use [`Value::read_only_boolean`] for a shared frozen one.
    pub fn boolean(b: bool) -> Value {
        Value::from_kind(ValueKind::Boolean(b))
    }

    /// A number. All Lua numbers are doubles here, integers included.
    pub fn number(n: f64) -> Value {
        Value::from_kind(ValueKind::Number(n))
    }

    /// A string value. The text is shared, so cloning the value is cheap.
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::from_kind(ValueKind::String(s.into()))
    }

    /// Wrap a table handle. The table is shared, not copied.
    pub fn table(t: TableRef) -> Value {
        Value::from_kind(ValueKind::Table(t))
    }

    /// A script function.
    pub fn closure(c: Rc<Closure>) -> Value {
        Value::from_kind(ValueKind::Function(c))
    }

    /// A native function already wrapped in a [`CallbackFunction`].
    pub fn callback(f: Rc<CallbackFunction>) -> Value {
        Value::from_kind(ValueKind::ClrFunction(f))
    }

    /// Wrap a native function as a callable value.
    pub fn native_callback<F>(name: Option<&str>, f: F) -> Value
    where
        F: Fn(&mut ExecutionContext<'_>, &CallbackArguments) -> Result<Value, ScriptError> + 'static,
    {
        Value::callback(Rc::new(CallbackFunction::new(name, f)))
    }

    /// A `thread` value wrapping a coroutine.
    pub fn coroutine(c: Rc<Coroutine>) -> Value {
        Value::from_kind(ValueKind::Thread(c))
    }

    /// Expose a host object. Equality and print form come from its descriptor.
    pub fn user_data(u: UserData) -> Value {
        Value::from_kind(ValueKind::UserData(Rc::new(u)))
    }

    /// Build a tuple. No values gives `Void`, one value gives that value.
    pub fn tuple(mut values: Vec<Value>) -> Value {
        match values.len() {
            0 => Value::void(),
            1 => values.pop().unwrap_or_else(Value::void),
            _ => Value::from_kind(ValueKind::Tuple(values.into())),
        }
    }

    /// Build a tuple, splicing the elements of any nested tuples in place.
    pub fn tuple_nested(values: Vec<Value>) -> Value {
        if !values.iter().any(Value::is_tuple) {
            return Value::tuple(values);
        }
        let mut flat = Vec::with_capacity(values.len());
        for v in values {
            flatten_into(v, &mut flat);
        }
        Value::tuple(flat)
    }

    /// Ask the VM to replace the current frame with a call to `function`.
    ///
    /// Requests compare by identity, never by content.
    pub fn tail_call_request(function: Value, args: Vec<Value>) -> Value {
        Value::from_kind(ValueKind::TailCallRequest(Rc::new(TailCallData { function, args })))
    }

    /// Ask the VM to suspend the running coroutine, yielding `return_values`.
    pub fn yield_request(return_values: Vec<Value>) -> Value {
        Value::from_kind(ValueKind::YieldRequest(Rc::new(YieldRequest {
            return_values,
            forced: false,
        })))
    }

    /// Yield request raised by preemption rather than by the script.
    pub fn forced_yield_request() -> Value {
        Value::from_kind(ValueKind::YieldRequest(Rc::new(YieldRequest {
            return_values: Vec::new(),
            forced: true,
        })))
    }

    /// Convert a host object through the script's interop layer.
    pub fn from_host_object(script: &Script, object: &dyn Any) -> Result<Value, ScriptError> {
        script.interop().value_from_host_object(script, object)
    }

    // ---- shared read-only singletons ----

    /// The shared frozen nil. Every call returns the same instance for this
    /// thread, so `assign` on it always fails.
    pub fn read_only_nil() -> Value {
        SINGLETONS.with(|s| s.nil.clone())
    }

    /// The shared frozen void.
    pub fn read_only_void() -> Value {
        SINGLETONS.with(|s| s.void.clone())
    }

    /// The shared frozen `true`.
    pub fn read_only_true() -> Value {
        SINGLETONS.with(|s| s.yes.clone())
    }

    /// The shared frozen `false`.
    pub fn read_only_false() -> Value {
        SINGLETONS.with(|s| s.no.clone())
    }

    /// One of the two shared frozen booleans.
    pub fn read_only_boolean(b: bool) -> Value {
        if b {
            Value::read_only_true()
        } else {
            Value::read_only_false()
        }
    }

    // ---- inspection ----

    /// The payload, for matching on every variant.
    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// The type tag. Script closures and native callbacks have distinct tags
    /// but share the Lua name `function`.
    pub fn data_type(&self) -> DataType {
        match &self.kind {
            ValueKind::Nil => DataType::Nil,
            ValueKind::Void => DataType::Void,
            ValueKind::Boolean(_) => DataType::Boolean,
            ValueKind::Number(_) => DataType::Number,
            ValueKind::String(_) => DataType::String,
            ValueKind::Function(_) => DataType::Function,
            ValueKind::ClrFunction(_) => DataType::ClrFunction,
            ValueKind::Table(_) => DataType::Table,
            ValueKind::Tuple(_) => DataType::Tuple,
            ValueKind::UserData(_) => DataType::UserData,
            ValueKind::Thread(_) => DataType::Thread,
            ValueKind::TailCallRequest(_) => DataType::TailCallRequest,
            ValueKind::YieldRequest(_) => DataType::YieldRequest,
        }
    }

    /// Lua name of the type, as returned by `type()`.
    pub fn type_name(&self) -> &'static str {
        self.data_type().lua_name()
    }

    /// Id of this instance. Clones keep it; [`Value::clone_as`] draws a new one.
    /// Diagnostic only.
    pub fn reference_id(&self) -> u64 {
        self.ref_id
    }

    /// True for frozen instances, such as stored table keys and the shared
    /// singletons.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Nil or Void.
    pub fn is_nil(&self) -> bool {
        matches!(self.kind, ValueKind::Nil | ValueKind::Void)
    }

    /// Neither nil nor void.
    pub fn is_not_nil(&self) -> bool {
        !self.is_nil()
    }

    /// Strictly void. Nil is not void even though the two compare equal.
    pub fn is_void(&self) -> bool {
        matches!(self.kind, ValueKind::Void)
    }

    pub fn is_not_void(&self) -> bool {
        !self.is_void()
    }

    /// Nil, void or a NaN number: the values that can never be table keys.
    pub fn is_nil_or_nan(&self) -> bool {
        match self.kind {
            ValueKind::Nil | ValueKind::Void => true,
            ValueKind::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self.kind, ValueKind::Tuple(_))
    }

    /// Script closures and native callbacks.
    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ValueKind::Function(_) | ValueKind::ClrFunction(_))
    }

    /// The boolean payload, without truthiness conversion. See
    /// [`Value::cast_to_bool`] for that.
    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ValueKind::Boolean(b) => Some(b),
            _ => None,
        }
    }

    /// The number payload. Strings are not parsed; see [`Value::cast_to_number`].
    pub fn as_number(&self) -> Option<f64> {
        match self.kind {
            ValueKind::Number(n) => Some(n),
            _ => None,
        }
    }

    /// The string payload. Numbers are not formatted; see [`Value::cast_to_string`].
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match &self.kind {
            ValueKind::Table(t) => Some(t),
            _ => None,
        }
    }

    /// The script function behind this value. Native callbacks give `None`.
    pub fn as_closure(&self) -> Option<&Rc<Closure>> {
        match &self.kind {
            ValueKind::Function(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Rc<CallbackFunction>> {
        match &self.kind {
            ValueKind::ClrFunction(f) => Some(f),
            _ => None,
        }
    }

    /// The elements of a tuple. A single value is not a one-element tuple.
    pub fn as_tuple(&self) -> Option<&[Value]> {
        match &self.kind {
            ValueKind::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_user_data(&self) -> Option<&Rc<UserData>> {
        match &self.kind {
            ValueKind::UserData(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_coroutine(&self) -> Option<&Rc<Coroutine>> {
        match &self.kind {
            ValueKind::Thread(c) => Some(c),
            _ => None,
        }
    }

    /// The yield request carried by this value, if the VM asked to suspend.
    pub fn as_yield_request(&self) -> Option<&Rc<YieldRequest>> {
        match &self.kind {
            ValueKind::YieldRequest(y) => Some(y),
            _ => None,
        }
    }

    /// The script that owns the object behind this value, if any.
    ///
    /// Fails when the value is a table that is mutably borrowed, since its
    /// owner cannot be read.
    pub fn owner_script(&self) -> Result<Option<ScriptId>, ScriptError> {
        Ok(match &self.kind {
            ValueKind::Table(t) => borrow_table(t)?.owner_script(),
            ValueKind::Function(c) => c.owner_script(),
            ValueKind::Thread(c) => c.owner_script(),
            _ => None,
        })
    }

    // ---- instance identity ----

    /// A new instance with a fresh reference id and the given read-only flag.
    pub fn clone_as(&self, read_only: bool) -> Value {
        Value {
            kind: self.kind.clone(),
            ref_id: next_unowned_ref_id(),
            read_only,
            hash: self.hash.clone(),
        }
    }

    /// A writable copy with a fresh reference id. The way to get a mutable
    /// value out of a frozen singleton or a stored key.
    pub fn clone_as_writable(&self) -> Value {
        self.clone_as(false)
    }

    /// This instance if it is already read-only, otherwise a frozen copy.
    pub fn as_read_only(&self) -> Value {
        if self.read_only {
            self.clone()
        } else {
            self.clone_as(true)
        }
    }

    /// Overwrite this instance in place.
    pub fn assign(&mut self, other: &Value) -> Result<(), ScriptError> {
        if self.read_only {
            return Err(ScriptError::IllegalMutation);
        }
        self.kind = other.kind.clone();
        self.hash.set(None);
        Ok(())
    }

    /// Overwrite the payload of a writable number in place.
    pub fn assign_number(&mut self, n: f64) -> Result<(), ScriptError> {
        if self.read_only {
            return Err(ScriptError::IllegalMutation);
        }
        match &mut self.kind {
            ValueKind::Number(slot) => {
                *slot = n;
                self.hash.set(None);
                Ok(())
            }
            _ => Err(ScriptError::Internal(format!(
                "cannot assign a number to a {} value",
                self.type_name()
            ))),
        }
    }

    // ---- conversions ----

    /// First element of a tuple (recursively), or the value itself. An empty
    /// tuple collapses to `Void`.
    pub fn to_scalar(&self) -> Value {
        match &self.kind {
            ValueKind::Tuple(t) => match t.first() {
                Some(first) => first.to_scalar(),
                None => Value::read_only_void(),
            },
            _ => self.clone(),
        }
    }

    /// Lua truthiness: only nil, void and false are false.
    pub fn cast_to_bool(&self) -> bool {
        match self.to_scalar().kind {
            ValueKind::Nil | ValueKind::Void => false,
            ValueKind::Boolean(b) => b,
            _ => true,
        }
    }

    /// Lua's string-to-number coercion on the scalar form.
    ///
    /// Numbers pass through. Strings are parsed as decimal or `0x` hex with
    /// surrounding whitespace allowed. Everything else gives `None`.
    pub fn cast_to_number(&self) -> Option<f64> {
        match self.to_scalar().kind {
            ValueKind::Number(n) => Some(n),
            ValueKind::String(ref s) => parse_number(s),
            _ => None,
        }
    }

    /// Lua's number-to-string coercion on the scalar form: numbers use the
    /// `%.14g` format, strings pass through, everything else gives `None`.
    pub fn cast_to_string(&self) -> Option<String> {
        match self.to_scalar().kind {
            ValueKind::Number(n) => Some(format_number(n)),
            ValueKind::String(ref s) => Some(s.to_string()),
            _ => None,
        }
    }

    /// Convert to the natural host type for this value's kind through the
    /// script's interop layer.
    pub fn to_host_object(&self, script: &Script) -> Result<Box<dyn Any>, ScriptError> {
        script.interop().value_to_host_object(self, None)
    }

    /// Convert to the host type identified by `desired` through the script's
    /// interop layer. Fails if the interop cannot produce that type.
    pub fn to_host_object_of(
        &self,
        script: &Script,
        desired: TypeId,
    ) -> Result<Box<dyn Any>, ScriptError> {
        script.interop().value_to_host_object(self, Some(desired))
    }

    /// The length operator for strings (bytes) and tables (border).
    pub fn get_length(&self) -> Result<Value, ScriptError> {
        match &self.kind {
            ValueKind::String(s) => Ok(Value::number(s.len() as f64)),
            ValueKind::Table(t) => {
                let t = t
                    .try_borrow()
                    .map_err(|_| ScriptError::runtime("table is being modified"))?;
                Ok(Value::number(t.length() as f64))
            }
            _ => Err(ScriptError::runtime(format!(
                "attempt to get length of a {} value",
                self.type_name()
            ))),
        }
    }

    /// Validate the type of an argument for a native function.
    ///
    /// `arg_num` is 1-based. With `AUTO_CONVERT`, numbers and strings convert
    /// into each other and anything converts to boolean.
    pub fn check_type(
        &self,
        func_name: &str,
        desired: DataType,
        arg_num: Option<usize>,
        options: TypeValidationOptions,
    ) -> Result<Value, ScriptError> {
        let actual = self.data_type();
        if actual == desired || (desired == DataType::Function && self.is_callable()) {
            return Ok(self.clone());
        }
        let allow_nil = options.contains(TypeValidationOptions::ALLOW_NIL);
        if allow_nil && self.is_nil() {
            return Ok(self.clone());
        }
        if options.contains(TypeValidationOptions::AUTO_CONVERT) {
            match desired {
                DataType::Boolean => return Ok(Value::boolean(self.cast_to_bool())),
                DataType::Number => {
                    if let Some(n) = self.cast_to_number() {
                        return Ok(Value::number(n));
                    }
                }
                DataType::String => {
                    if let Some(s) = self.cast_to_string() {
                        return Ok(Value::string(s));
                    }
                }
                _ => {}
            }
        }
        Err(self.type_mismatch(func_name, desired.lua_name(), arg_num, allow_nil))
    }

    /// Extract the host object behind a userdata argument.
    pub fn check_user_data_type<T: 'static>(
        &self,
        func_name: &str,
        arg_num: Option<usize>,
        options: TypeValidationOptions,
    ) -> Result<Option<Rc<T>>, ScriptError> {
        let allow_nil = options.contains(TypeValidationOptions::ALLOW_NIL);
        if allow_nil && self.is_nil() {
            return Ok(None);
        }
        if let ValueKind::UserData(u) = &self.kind {
            if u.object().is_none() {
                return Ok(None);
            }
            if let Some(obj) = u.downcast::<T>() {
                return Ok(Some(obj));
            }
        }
        Err(self.type_mismatch(func_name, short_type_name::<T>(), arg_num, allow_nil))
    }

    fn type_mismatch(
        &self,
        func_name: &str,
        expected: &str,
        arg_num: Option<usize>,
        allow_nil: bool,
    ) -> ScriptError {
        let expected = if allow_nil {
            format!("{expected} or nil")
        } else {
            expected.to_string()
        };
        ScriptError::TypeMismatch {
            func: func_name.to_string(),
            position: arg_num,
            expected,
            got: if self.is_void() {
                None
            } else {
                Some(self.type_name())
            },
        }
    }

    // ---- hashing ----

    /// Hash code consistent with `==`. Computed once per instance.
    pub fn hash_code(&self) -> u32 {
        if let Some(h) = self.hash.get() {
            return h;
        }
        let h = self.compute_hash();
        self.hash.set(Some(h));
        h
    }

    fn compute_hash(&self) -> u32 {
        let base = (self.data_type() as u32) << 27;
        match &self.kind {
            ValueKind::Nil | ValueKind::Void => 0,
            ValueKind::Boolean(true) => 1,
            ValueKind::Boolean(false) => 2,
            ValueKind::Number(n) => base ^ number_hash(*n),
            ValueKind::String(s) => base ^ string_hash(s.as_bytes()),
            ValueKind::Function(c) => base ^ address_hash(Rc::as_ptr(c)),
            ValueKind::ClrFunction(f) => base ^ address_hash(Rc::as_ptr(f)),
            ValueKind::Table(t) => base ^ address_hash(Rc::as_ptr(t)),
            ValueKind::Tuple(items) => items
                .iter()
                .fold(base, |h, v| h.rotate_left(5) ^ v.hash_code()),
            ValueKind::TailCallRequest(t) => base ^ address_hash(Rc::as_ptr(t)),
            ValueKind::UserData(_) | ValueKind::Thread(_) | ValueKind::YieldRequest(_) => {
                OPAQUE_HASH
            }
        }
    }

    // ---- formatting ----

    /// The form used by `print` and `tostring`.
    pub fn to_print_string(&self) -> String {
        match &self.kind {
            ValueKind::String(s) => s.to_string(),
            ValueKind::Tuple(items) => join(items, "\t", Value::to_print_string),
            ValueKind::TailCallRequest(_) => "(TailCallRequest -- INTERNAL!)".to_string(),
            ValueKind::YieldRequest(_) => "(YieldRequest -- INTERNAL!)".to_string(),
            _ => self
                .reference_print_string()
                .unwrap_or_else(|| self.to_string()),
        }
    }

    /// The form shown by debuggers: like the print form but strings stay quoted.
    pub fn to_debug_print_string(&self) -> String {
        match &self.kind {
            ValueKind::Tuple(items) => join(items, "\t", Value::to_print_string),
            ValueKind::TailCallRequest(_) => "(TailCallRequest)".to_string(),
            ValueKind::YieldRequest(_) => "(YieldRequest)".to_string(),
            _ => self
                .reference_print_string()
                .unwrap_or_else(|| self.to_string()),
        }
    }

    fn reference_print_string(&self) -> Option<String> {
        let ref_id = match &self.kind {
            ValueKind::Table(t) => t.try_borrow().map(|t| t.ref_id()).unwrap_or(0),
            ValueKind::Function(c) => c.ref_id(),
            ValueKind::ClrFunction(f) => f.ref_id(),
            ValueKind::Thread(c) => c.ref_id(),
            ValueKind::UserData(u) => {
                let custom = u
                    .descriptor()
                    .as_string(u.object().map(|o| o.as_ref() as &dyn Any));
                if custom.is_some() {
                    return custom;
                }
                u.ref_id()
            }
            _ => return None,
        };
        Some(format!("{}: {:08X}", self.type_name(), ref_id))
    }
}

fn flatten_into(v: Value, out: &mut Vec<Value>) {
    match &v.kind {
        ValueKind::Tuple(items) => {
            for item in items.iter() {
                flatten_into(item.clone(), out);
            }
        }
        _ => out.push(v),
    }
}

fn number_hash(n: f64) -> u32 {
    // 0.0 == -0.0, so both must hash alike.
    if n == 0.0 {
        return 0;
    }
    let bits = n.to_bits();
    (bits as u32) ^ ((bits >> 32) as u32)
}

fn address_hash<T: ?Sized>(ptr: *const T) -> u32 {
    let addr = ptr as *const () as usize as u64;
    (addr as u32) ^ ((addr >> 32) as u32)
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

fn join(items: &[Value], sep: &str, f: fn(&Value) -> String) -> String {
    items.iter().map(f).collect::<Vec<_>>().join(sep)
}

impl Clone for Value {
    fn clone(&self) -> Self {
        Value {
            kind: self.kind.clone(),
            ref_id: self.ref_id,
            read_only: self.read_only,
            hash: self.hash.clone(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::nil()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use ValueKind::*;
        match (&self.kind, &other.kind) {
            (Nil | Void, Nil | Void) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            (ClrFunction(a), ClrFunction(b)) => Rc::ptr_eq(a, b),
            (Table(a), Table(b)) => Rc::ptr_eq(a, b),
            (Tuple(a), Tuple(b)) => a == b,
            (Thread(a), Thread(b)) => Rc::ptr_eq(a, b),
            (TailCallRequest(a), TailCallRequest(b)) => Rc::ptr_eq(a, b),
            (YieldRequest(a), YieldRequest(b)) => Rc::ptr_eq(a, b),
            (UserData(a), UserData(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                if !a.same_descriptor(b) {
                    return false;
                }
                match (a.object(), b.object()) {
                    (None, None) => true,
                    (Some(x), Some(y)) => a.descriptor().objects_equal(x.as_ref(), y.as_ref()),
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

// NaN never reaches keyed storage, which is the only place Eq matters.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash_code());
    }
}

/// The diagnostic form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Void => f.write_str("void"),
            ValueKind::Nil => f.write_str("nil"),
            ValueKind::Boolean(b) => write!(f, "{b}"),
            ValueKind::Number(n) => f.write_str(&format_number(*n)),
            ValueKind::String(s) => write!(f, "\"{s}\""),
            ValueKind::Function(c) => write!(f, "(Function {:08X})", c.entry_point()),
            ValueKind::ClrFunction(_) => f.write_str("(Function CLR)"),
            ValueKind::Table(_) => f.write_str("(Table)"),
            ValueKind::Tuple(items) => f.write_str(&join(items, ", ", Value::to_string)),
            ValueKind::TailCallRequest(t) => {
                write!(f, "Tail:({})", join(&t.args, ", ", Value::to_string))
            }
            ValueKind::UserData(_) => f.write_str("(UserData)"),
            ValueKind::Thread(c) => write!(f, "(Coroutine {:08X})", c.ref_id()),
            ValueKind::YieldRequest(_) => f.write_str("(YieldRequest)"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self, self.ref_id)?;
        if self.read_only {
            f.write_str("(ro)")?;
        }
        Ok(())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::table(t)
    }
}
