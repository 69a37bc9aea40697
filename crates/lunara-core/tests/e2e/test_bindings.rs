use lunara_core::binding::{read_table, write_table, Binding, BindingAttributes, BindingType};
use lunara_core::error::ScriptError;
use proptest::prelude::*;
use std::sync::Arc;

/// A chunk's binding table: default env, a shadowing local `_ENV`, and
/// globals resolved through each.
fn sample_table() -> Vec<Arc<Binding>> {
    let default_env = Binding::default_env();
    let local_env = Binding::local("_ENV", 0, BindingAttributes::NONE);
    vec![
        Binding::global("print", default_env.clone()),
        default_env,
        Binding::local("count", 1, BindingAttributes::CONST),
        Binding::upvalue("acc", 2),
        Binding::global("sandboxed", local_env.clone()),
        local_env,
        Binding::local("file", 3, BindingAttributes::TO_BE_CLOSED),
    ]
}

fn same_shape(a: &Binding, b: &Binding) -> bool {
    a.kind() == b.kind()
        && a.index() == b.index()
        && a.name() == b.name()
        && a.attributes() == b.attributes()
}

#[test]
fn test_roundtrip_preserves_records() {
    let table = sample_table();
    let bytes = write_table(&table).unwrap();
    let back = read_table(&bytes).unwrap();
    assert_eq!(back.len(), table.len());
    for (a, b) in table.iter().zip(&back) {
        assert!(same_shape(a, b), "{a} != {b}");
    }
}

#[test]
fn test_roundtrip_preserves_environment_links() {
    let back = read_table(&write_table(&sample_table()).unwrap()).unwrap();
    assert!(Arc::ptr_eq(back[0].environment().unwrap(), &back[1]));
    assert!(Arc::ptr_eq(&back[1], &Binding::default_env()));
    assert!(Arc::ptr_eq(back[4].environment().unwrap(), &back[5]));
    assert_eq!(back[5].kind(), BindingType::Local);
    assert_eq!(back[4].to_string(), "sandboxed : Global / _ENV : Local[0]");
}

#[test]
fn test_rewrite_is_byte_identical() {
    let bytes = write_table(&sample_table()).unwrap();
    let again = write_table(&read_table(&bytes).unwrap()).unwrap();
    assert_eq!(bytes, again);
}

#[test]
fn test_attributes_survive() {
    let back = read_table(&write_table(&sample_table()).unwrap()).unwrap();
    assert!(back[2].attributes().contains(BindingAttributes::CONST));
    assert!(back[6].attributes().contains(BindingAttributes::TO_BE_CLOSED));
    assert!(!back[6].attributes().contains(BindingAttributes::CONST));
}

#[test]
fn test_corrupted_tables_fail_cleanly() {
    let bytes = write_table(&sample_table()).unwrap();
    for cut in 0..bytes.len() {
        let r = read_table(&bytes[..cut]);
        assert!(
            matches!(r, Err(ScriptError::SerializationCorruption(_))),
            "cut at {cut}: {r:?}"
        );
    }
}

proptest! {
    #[test]
    fn prop_random_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..256)) {
        match read_table(&data) {
            Ok(bindings) => {
                for b in &bindings {
                    if b.kind() == BindingType::Global {
                        prop_assert!(b.environment().is_some());
                    }
                }
            }
            Err(e) => prop_assert!(matches!(e, ScriptError::SerializationCorruption(_))),
        }
    }

    #[test]
    fn prop_locals_roundtrip(names in prop::collection::vec("[a-z_][a-z0-9_]{0,12}", 0..20)) {
        let table: Vec<Arc<Binding>> = names
            .iter()
            .enumerate()
            .map(|(i, name)| Binding::local(name.as_str(), i as i32, BindingAttributes::NONE))
            .collect();
        let back = read_table(&write_table(&table).unwrap()).unwrap();
        prop_assert_eq!(back.len(), table.len());
        for (a, b) in table.iter().zip(&back) {
            prop_assert!(same_shape(a, b));
        }
    }
}
