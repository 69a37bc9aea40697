//! Conversions between host objects and script values.

use crate::error::ScriptError;
use crate::script::Script;
use crate::table::TableRef;
use crate::value::{Value, ValueKind};
use std::any::{Any, TypeId};

/// Marshals host objects into values and back.
pub trait HostInterop {
    fn value_from_host_object(&self, script: &Script, object: &dyn Any) -> Result<Value, ScriptError>;

    /// Convert `value` to a host object. `desired == None` picks the natural
    /// host type for the value's kind.
    fn value_to_host_object(
        &self,
        value: &Value,
        desired: Option<TypeId>,
    ) -> Result<Box<dyn Any>, ScriptError>;
}

/// Handles primitives, strings, tables and values themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultInterop;

impl HostInterop for DefaultInterop {
    fn value_from_host_object(&self, script: &Script, object: &dyn Any) -> Result<Value, ScriptError> {
        if let Some(v) = object.downcast_ref::<Value>() {
            script.check_ownership(v.owner_script()?)?;
            return Ok(v.clone());
        }
        if object.is::<()>() {
            return Ok(Value::nil());
        }
        if let Some(b) = object.downcast_ref::<bool>() {
            return Ok(Value::boolean(*b));
        }
        if let Some(n) = number_of(object) {
            return Ok(Value::number(n));
        }
        if let Some(s) = object.downcast_ref::<String>() {
            return Ok(Value::string(s.as_str()));
        }
        if let Some(s) = object.downcast_ref::<&'static str>() {
            return Ok(Value::string(*s));
        }
        if let Some(t) = object.downcast_ref::<TableRef>() {
            let v = Value::table(t.clone());
            script.check_ownership(v.owner_script()?)?;
            return Ok(v);
        }
        Err(ScriptError::runtime(
            "cannot convert a host object of unsupported type",
        ))
    }

    fn value_to_host_object(
        &self,
        value: &Value,
        desired: Option<TypeId>,
    ) -> Result<Box<dyn Any>, ScriptError> {
        let Some(ty) = desired else {
            return Ok(match value.to_scalar().kind() {
                ValueKind::Nil | ValueKind::Void => Box::new(()),
                ValueKind::Boolean(b) => Box::new(*b),
                ValueKind::Number(n) => Box::new(*n),
                ValueKind::String(s) => Box::new(s.to_string()),
                ValueKind::Table(t) => Box::new(t.clone()),
                _ => Box::new(value.clone()),
            });
        };
        let unsupported = || {
            ScriptError::runtime(format!(
                "cannot convert a {} value to the requested host type",
                value.type_name()
            ))
        };
        if ty == TypeId::of::<Value>() {
            Ok(Box::new(value.clone()))
        } else if ty == TypeId::of::<bool>() {
            Ok(Box::new(value.cast_to_bool()))
        } else if ty == TypeId::of::<f64>() {
            Ok(Box::new(value.cast_to_number().ok_or_else(unsupported)?))
        } else if ty == TypeId::of::<i64>() {
            Ok(Box::new(value.cast_to_number().ok_or_else(unsupported)? as i64))
        } else if ty == TypeId::of::<i32>() {
            Ok(Box::new(value.cast_to_number().ok_or_else(unsupported)? as i32))
        } else if ty == TypeId::of::<String>() {
            Ok(Box::new(value.cast_to_string().ok_or_else(unsupported)?))
        } else if ty == TypeId::of::<TableRef>() {
            Ok(Box::new(value.as_table().cloned().ok_or_else(unsupported)?))
        } else {
            Err(unsupported())
        }
    }
}

fn number_of(object: &dyn Any) -> Option<f64> {
    if let Some(n) = object.downcast_ref::<f64>() {
        Some(*n)
    } else if let Some(n) = object.downcast_ref::<f32>() {
        Some(*n as f64)
    } else if let Some(n) = object.downcast_ref::<i32>() {
        Some(*n as f64)
    } else if let Some(n) = object.downcast_ref::<i64>() {
        Some(*n as f64)
    } else if let Some(n) = object.downcast_ref::<u32>() {
        Some(*n as f64)
    } else {
        object.downcast_ref::<usize>().map(|n| *n as f64)
    }
}
