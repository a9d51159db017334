//! Fuzz target for the built-in dissector chain.
//!
//! Arbitrary bytes are dissected as an Ethernet frame. Failures must be
//! recorded on the frame; dissection itself must never panic.

#![no_main]

use bytes::Bytes;
use capflow_core::{default_registry, CaptureRecord, SessionConfig, TokenRegistry, LINK_ETHERNET};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let tokens = TokenRegistry::new();
    let registry = default_registry(&tokens);
    let config = SessionConfig::new();
    let record = CaptureRecord::new(tokens.get(LINK_ETHERNET), Bytes::copy_from_slice(data), 0);

    let frame = registry.dissect(1, record, &tokens, &config);
    assert_eq!(frame.id(), 1);
    assert!(!frame.roots().is_empty());
});
