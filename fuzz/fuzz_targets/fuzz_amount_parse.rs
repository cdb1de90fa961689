//! Fuzz target for token amount parsing.
//!
//! Both parsers must never panic, and every successfully parsed finite
//! amount must survive a display/parse round-trip.

#![no_main]

use libfuzzer_sys::fuzz_target;

use tidemark_types::TokenAmount;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let _ = TokenAmount::from_subunits_str(input);

    if let Ok(amount) = input.parse::<TokenAmount>() {
        let rendered = amount.to_string();
        let reparsed = rendered.parse::<TokenAmount>().expect("rendered amount must parse");
        assert_eq!(reparsed, amount, "display/parse roundtrip mismatch");
    }
});
