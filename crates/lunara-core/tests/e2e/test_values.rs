use lunara_core::callback::CallbackArguments;
use lunara_core::error::ScriptError;
use lunara_core::object::{DataType, UserData, UserDataDescriptor};
use lunara_core::script::Script;
use lunara_core::value::{TypeValidationOptions, Value};
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::rc::Rc;

#[derive(Debug)]
struct Point {
    x: i32,
    y: i32,
}

struct PointDescriptor;

impl UserDataDescriptor for PointDescriptor {
    fn name(&self) -> &str {
        "Point"
    }

    fn as_string(&self, object: Option<&dyn Any>) -> Option<String> {
        let p = object?.downcast_ref::<Point>()?;
        Some(format!("Point({}, {})", p.x, p.y))
    }

    fn objects_equal(&self, a: &dyn Any, b: &dyn Any) -> bool {
        match (a.downcast_ref::<Point>(), b.downcast_ref::<Point>()) {
            (Some(a), Some(b)) => a.x == b.x && a.y == b.y,
            _ => false,
        }
    }
}

struct Opaque;

impl UserDataDescriptor for Opaque {
    fn name(&self) -> &str {
        "Opaque"
    }
}

fn point(desc: &Rc<dyn UserDataDescriptor>, x: i32, y: i32) -> Value {
    Value::user_data(UserData::new(Some(Rc::new(Point { x, y })), desc.clone()))
}

// ---- equality and hashing ----

#[test]
fn test_equal_values_collapse_in_hash_set() {
    let script = Script::new();
    let t = script.new_table();
    let mut set = HashSet::new();
    set.insert(Value::number(1.0));
    set.insert(Value::number(1.0));
    set.insert(Value::string("a"));
    set.insert(Value::string("a"));
    set.insert(Value::nil());
    set.insert(Value::void());
    set.insert(Value::table(t.clone()));
    set.insert(Value::table(t));
    set.insert(Value::boolean(true));
    assert_eq!(set.len(), 5);
}

#[test]
fn test_number_and_string_never_equal() {
    assert_ne!(Value::number(1.0), Value::string("1"));
    assert_ne!(Value::boolean(false), Value::nil());
}

#[test]
fn test_functions_compare_by_identity() {
    let script = Script::new();
    let c = script.new_closure(1, vec![]);
    let a = Value::closure(c.clone());
    let b = Value::closure(c);
    let other = Value::closure(script.new_closure(1, vec![]));
    assert_eq!(a, b);
    assert_eq!(a.hash_code(), b.hash_code());
    assert_ne!(a, other);

    let f = Value::native_callback(Some("f"), |_, _| Ok(Value::nil()));
    assert_eq!(f, f.clone());
    assert_ne!(f, Value::native_callback(Some("f"), |_, _| Ok(Value::nil())));
}

#[test]
fn test_userdata_equality_uses_descriptor() {
    let desc: Rc<dyn UserDataDescriptor> = Rc::new(PointDescriptor);
    let a = point(&desc, 1, 2);
    let b = point(&desc, 1, 2);
    let c = point(&desc, 3, 4);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.hash_code(), 999);

    let other_desc: Rc<dyn UserDataDescriptor> = Rc::new(PointDescriptor);
    assert_ne!(a, point(&other_desc, 1, 2));

    let static_a = Value::user_data(UserData::new(None, desc.clone()));
    let static_b = Value::user_data(UserData::new(None, desc));
    assert_eq!(static_a, static_b);
    assert_ne!(static_a, a);
}

#[test]
fn test_tail_calls_compare_by_identity() {
    let t = Value::tail_call_request(Value::nil(), vec![]);
    let u = Value::tail_call_request(Value::nil(), vec![]);
    assert_eq!(t, t.clone());
    assert_ne!(t, u);
}

// ---- read-only instances ----

#[test]
fn test_read_only_singletons_reject_assignment() {
    for mut v in [
        Value::read_only_nil(),
        Value::read_only_void(),
        Value::read_only_true(),
        Value::read_only_false(),
    ] {
        assert!(v.is_read_only());
        assert_eq!(v.assign(&Value::number(1.0)), Err(ScriptError::IllegalMutation));
    }
    assert!(Value::read_only_boolean(true).cast_to_bool());
}

#[test]
fn test_writable_copy_of_singleton() {
    let mut v = Value::read_only_true().clone_as_writable();
    assert!(!v.is_read_only());
    v.assign(&Value::number(3.0)).unwrap();
    assert_eq!(v, Value::number(3.0));
    assert!(Value::read_only_true().cast_to_bool());
}

// ---- type checks ----

#[test]
fn test_check_type_messages() {
    let err = Value::boolean(true)
        .check_type("math.floor", DataType::Number, Some(1), TypeValidationOptions::AUTO_CONVERT)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "bad argument #1 to 'math.floor' (number expected, got boolean)"
    );

    let err = Value::boolean(true)
        .check_type("f", DataType::Table, Some(3), TypeValidationOptions::ALLOW_NIL)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "bad argument #3 to 'f' (table or nil expected, got boolean)"
    );
}

#[test]
fn test_check_type_function_accepts_native_callbacks() {
    let script = Script::new();
    let f = Value::native_callback(Some("f"), |_, _| Ok(Value::nil()));
    let c = Value::closure(script.new_closure(0, vec![]));
    for v in [&f, &c] {
        let got = v
            .check_type("pcall", DataType::Function, Some(1), TypeValidationOptions::NONE)
            .unwrap();
        assert_eq!(&got, v);
    }
    let err = Value::table(script.new_table())
        .check_type("pcall", DataType::Function, Some(1), TypeValidationOptions::AUTO_CONVERT)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "bad argument #1 to 'pcall' (function expected, got table)"
    );
}

#[test]
fn test_check_type_auto_converts_to_string_and_bool() {
    let s = Value::number(12.5)
        .check_type("f", DataType::String, Some(1), TypeValidationOptions::AUTO_CONVERT)
        .unwrap();
    assert_eq!(s.as_str(), Some("12.5"));
    let b = Value::nil()
        .check_type("f", DataType::Boolean, Some(1), TypeValidationOptions::AUTO_CONVERT)
        .unwrap();
    assert_eq!(b, Value::boolean(false));
}

#[test]
fn test_check_user_data_type() {
    let desc: Rc<dyn UserDataDescriptor> = Rc::new(PointDescriptor);
    let p = point(&desc, 5, 6);
    let got = p
        .check_user_data_type::<Point>("move", Some(1), TypeValidationOptions::NONE)
        .unwrap()
        .unwrap();
    assert_eq!((got.x, got.y), (5, 6));

    let err = Value::number(1.0)
        .check_user_data_type::<Point>("move", Some(1), TypeValidationOptions::NONE)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "bad argument #1 to 'move' (Point expected, got number)"
    );

    assert!(Value::nil()
        .check_user_data_type::<Point>("move", Some(1), TypeValidationOptions::ALLOW_NIL)
        .unwrap()
        .is_none());
    assert!(p
        .check_user_data_type::<String>("move", Some(1), TypeValidationOptions::NONE)
        .is_err());
}

#[test]
fn test_callback_arguments_user_data() {
    let desc: Rc<dyn UserDataDescriptor> = Rc::new(PointDescriptor);
    let args = CallbackArguments::new(vec![point(&desc, 1, 1)], false);
    assert!(args.as_user_data::<Point>(0, "f", false).unwrap().is_some());
    assert!(args.as_user_data::<Point>(1, "f", false).is_err());
    assert!(args.as_user_data::<Point>(1, "f", true).unwrap().is_none());
}

// ---- formatting ----

#[test]
fn test_userdata_print_strings() {
    let desc: Rc<dyn UserDataDescriptor> = Rc::new(PointDescriptor);
    assert_eq!(point(&desc, 1, 2).to_print_string(), "Point(1, 2)");
    let opaque = UserData::new(Some(Rc::new(7u8)), Rc::new(Opaque));
    let id = opaque.ref_id();
    let v = Value::user_data(opaque);
    assert_eq!(v.to_print_string(), format!("userdata: {id:08X}"));
    assert_eq!(v.to_string(), "(UserData)");
}

#[test]
fn test_function_formats() {
    let script = Script::new();
    let c = script.new_closure(0xAB, vec![]);
    let v = Value::closure(c.clone());
    assert_eq!(v.to_string(), "(Function 000000AB)");
    assert_eq!(v.to_print_string(), format!("function: {:08X}", c.ref_id()));
    let f = Value::native_callback(None, |_, _| Ok(Value::nil()));
    assert_eq!(f.to_string(), "(Function CLR)");
    assert!(f.to_print_string().starts_with("function: "));
}

#[test]
fn test_nested_tuple_prints_flat() {
    let t = Value::tuple_nested(vec![
        Value::string("a"),
        Value::tuple(vec![Value::number(1.0), Value::boolean(true)]),
    ]);
    assert_eq!(t.to_print_string(), "a\t1\ttrue");
    assert_eq!(t.to_debug_print_string(), "a\t1\ttrue");
    assert_eq!(t.to_string(), "\"a\", 1, true");
}

// ---- host objects ----

#[test]
fn test_host_object_conversion() {
    let script = Script::new();
    let v = Value::from_host_object(&script, &42i64).unwrap();
    assert_eq!(v, Value::number(42.0));
    let back = v.to_host_object(&script).unwrap();
    assert_eq!(back.downcast_ref::<f64>(), Some(&42.0));
    let as_int = v.to_host_object_of(&script, TypeId::of::<i32>()).unwrap();
    assert_eq!(as_int.downcast_ref::<i32>(), Some(&42));
    let same = Value::from_host_object(&script, &v).unwrap();
    assert_eq!(same.reference_id(), v.reference_id());
}

#[test]
fn test_owner_script() {
    let script = Script::new();
    assert_eq!(
        Value::table(script.new_table()).owner_script(),
        Ok(Some(script.id()))
    );
    assert_eq!(
        Value::closure(script.new_closure(0, vec![])).owner_script(),
        Ok(Some(script.id()))
    );
    assert_eq!(Value::number(1.0).owner_script(), Ok(None));

    let t = script.new_table();
    let _busy = t.borrow_mut();
    assert!(matches!(
        Value::table(t.clone()).owner_script(),
        Err(ScriptError::Runtime(_))
    ));
}

#[test]
fn test_error_to_value() {
    let err = ScriptError::IllegalMutation;
    assert_eq!(
        err.to_value().as_str(),
        Some("cannot assign to a read-only value")
    );
}
