//! Native functions callable from scripts.

use crate::coroutine::Coroutine;
use crate::error::ScriptError;
use crate::object::DataType;
use crate::script::{next_unowned_ref_id, Script, ScriptId};
use crate::value::{TypeValidationOptions, Value};
use std::fmt;
use std::rc::Rc;

/// Signature of a native function body.
pub type CallbackFn =
    dyn Fn(&mut ExecutionContext<'_>, &CallbackArguments) -> Result<Value, ScriptError>;

/// A named native function.
pub struct CallbackFunction {
    ref_id: u64,
    name: Option<String>,
    func: Box<CallbackFn>,
}

impl CallbackFunction {
    pub fn new<F>(name: Option<&str>, func: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>, &CallbackArguments) -> Result<Value, ScriptError> + 'static,
    {
        CallbackFunction {
            ref_id: next_unowned_ref_id(),
            name: name.map(str::to_string),
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn ref_id(&self) -> u64 {
        self.ref_id
    }

    /// Call the function. A trailing tuple argument is spread.
    pub fn invoke(
        &self,
        ctx: &mut ExecutionContext<'_>,
        args: &[Value],
        is_method_call: bool,
    ) -> Result<Value, ScriptError> {
        let args = CallbackArguments::new(args.to_vec(), is_method_call);
        (self.func)(ctx, &args)
    }
}

impl fmt::Debug for CallbackFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "native({})",
            self.name.as_deref().unwrap_or("<anonymous>")
        )
    }
}

/// What a native function can see of the running engine.
pub struct ExecutionContext<'a> {
    script: &'a Script,
    calling_coroutine: Option<Rc<Coroutine>>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(script: &'a Script) -> Self {
        ExecutionContext {
            script,
            calling_coroutine: None,
        }
    }

    pub fn with_coroutine(script: &'a Script, coroutine: Rc<Coroutine>) -> Self {
        ExecutionContext {
            script,
            calling_coroutine: Some(coroutine),
        }
    }

    pub fn script(&self) -> &'a Script {
        self.script
    }

    pub fn owner_script(&self) -> ScriptId {
        self.script.id()
    }

    pub fn calling_coroutine(&self) -> Option<&Rc<Coroutine>> {
        self.calling_coroutine.as_ref()
    }
}

/// Arguments passed to a native function. If the last argument is a tuple,
/// its elements count as individual arguments.
#[derive(Clone, Debug)]
pub struct CallbackArguments {
    args: Vec<Value>,
    is_method_call: bool,
}

impl CallbackArguments {
    pub fn new(mut args: Vec<Value>, is_method_call: bool) -> Self {
        if let Some(last) = args.last() {
            if let Some(items) = last.as_tuple() {
                let items = items.to_vec();
                args.pop();
                args.extend(items);
            }
        }
        CallbackArguments {
            args,
            is_method_call,
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn is_method_call(&self) -> bool {
        self.is_method_call
    }

    /// Argument `index` (0-based). Past the end gives `Void`.
    pub fn get(&self, index: usize) -> Value {
        self.raw_get(index, false)
            .unwrap_or_else(Value::read_only_void)
    }

    /// Argument `index`, or `None` past the end. With `translate_voids`, a
    /// `Void` argument reads as `Nil`.
    pub fn raw_get(&self, index: usize, translate_voids: bool) -> Option<Value> {
        let v = self.args.get(index)?;
        if translate_voids && v.is_void() {
            Some(Value::read_only_nil())
        } else {
            Some(v.clone())
        }
    }

    /// Arguments from `skip` on.
    pub fn to_vec(&self, skip: usize) -> Vec<Value> {
        self.args.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> + '_ {
        self.args.iter()
    }

    /// Argument `index`, converted to `desired` when possible.
    pub fn as_type(
        &self,
        index: usize,
        func_name: &str,
        desired: DataType,
        allow_nil: bool,
    ) -> Result<Value, ScriptError> {
        let mut options = TypeValidationOptions::AUTO_CONVERT;
        if allow_nil {
            options = options | TypeValidationOptions::ALLOW_NIL;
        }
        self.get(index)
            .check_type(func_name, desired, Some(self.position(index)), options)
    }

    pub fn as_int(&self, index: usize, func_name: &str) -> Result<i64, ScriptError> {
        let v = self.as_type(index, func_name, DataType::Number, false)?;
        Ok(v.as_number().unwrap_or_default() as i64)
    }

    pub fn as_str_arg(&self, index: usize, func_name: &str) -> Result<String, ScriptError> {
        let v = self.as_type(index, func_name, DataType::String, false)?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    /// The host object behind a userdata argument.
    pub fn as_user_data<T: 'static>(
        &self,
        index: usize,
        func_name: &str,
        allow_nil: bool,
    ) -> Result<Option<Rc<T>>, ScriptError> {
        let options = if allow_nil {
            TypeValidationOptions::ALLOW_NIL
        } else {
            TypeValidationOptions::NONE
        };
        self.get(index)
            .check_user_data_type::<T>(func_name, Some(self.position(index)), options)
    }

    /// 1-based position for error messages; the implicit `self` of a method
    /// call is not counted.
    fn position(&self, index: usize) -> usize {
        if self.is_method_call {
            index
        } else {
            index + 1
        }
    }
}
