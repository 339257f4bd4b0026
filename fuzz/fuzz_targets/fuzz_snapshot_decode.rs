#![no_main]

use libfuzzer_sys::fuzz_target;
use ochrance_core::snapshot::Snapshot;

fuzz_target!(|data: &[u8]| {
    if let Ok(snapshot) = Snapshot::from_payload(data.to_vec()) {
        // Decoding arbitrary payloads must fail cleanly, never panic or
        // overallocate past the payload length.
        let _ = snapshot.decode();
        let _ = snapshot.content_address();
    }
});
