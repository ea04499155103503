//! Fuzz target for header validation.
//!
//! Prepends the `TSRA` magic and a valid version so inputs get past the
//! first two checks and exercise field validation and plan replay.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_format::{TSRA_MAGIC, TSRA_VERSION};

fuzz_target!(|data: &[u8]| {
    let mut input = TSRA_MAGIC.to_vec();
    input.extend_from_slice(&TSRA_VERSION.to_le_bytes());
    input.extend_from_slice(data);

    // should never panic, only return errors
    let _ = tessera_format::deserialize(&input);
});
