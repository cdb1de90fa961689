//! Fuzz target for versioned row key encoding.
//!
//! `split_versioned_key` must never panic on arbitrary bytes, and
//! `versioned_key` must always round-trip.

#![no_main]

use libfuzzer_sys::fuzz_target;

use tidemark_store::keys::{split_versioned_key, versioned_key};
use tidemark_types::StateVersion;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must split without panicking.
    let _ = split_versioned_key(data);

    if data.len() < 8 {
        return;
    }
    let version = u64::from_le_bytes(data[..8].try_into().unwrap());
    let natural_key = &data[8..];

    let encoded = versioned_key(natural_key, StateVersion::new(version));
    let (decoded_key, decoded_version) =
        split_versioned_key(&encoded).expect("encoded key must split");
    assert_eq!(decoded_key, natural_key);
    assert_eq!(decoded_version, StateVersion::new(version));
});
