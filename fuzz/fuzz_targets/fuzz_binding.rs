#![no_main]

use libfuzzer_sys::fuzz_target;
use lunara_core::binding::{read_table, write_table};

fuzz_target!(|data: &[u8]| {
    // Corrupt input must surface as an error, never a panic.
    if let Ok(bindings) = read_table(data) {
        let bytes = write_table(&bindings).expect("a table that was read must write back");
        let again = read_table(&bytes).expect("a written table must read back");
        assert_eq!(again.len(), bindings.len());
    }
});
