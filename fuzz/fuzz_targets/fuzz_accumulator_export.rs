#![no_main]

use credo_registry::{publish, AccumulatorExport};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Binary form
    if let Ok(export) = AccumulatorExport::from_bytes(data) {
        let reserialized = export.to_bytes();
        assert_eq!(AccumulatorExport::from_bytes(&reserialized).unwrap(), export);

        // Digest check should not panic
        let _ = export.verify_digest();
    }

    // QR text form
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = publish::decode_from_qr(text);
    }
});
