//! Fuzz target for the container parser.
//!
//! Feeds arbitrary bytes to `deserialize` and, through a temp file, to
//! `CompressedContainer::load`. Parsing must never panic or over-allocate.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Write;
use tessera_format::CompressedContainer;

fuzz_target!(|data: &[u8]| {
    if let Ok(container) = tessera_format::deserialize(data) {
        // Anything accepted must serialize and parse again.
        let bytes = container.to_bytes().expect("accepted container must serialize");
        tessera_format::deserialize(&bytes).expect("re-serialized container must parse");
    }

    let mut tmpfile = match tempfile::NamedTempFile::new() {
        Ok(f) => f,
        Err(_) => return,
    };
    if tmpfile.write_all(data).is_err() || tmpfile.flush().is_err() {
        return;
    }
    let _ = CompressedContainer::load(tmpfile.path());
});
