//! Fuzz target for the filter language.
//!
//! Compiles arbitrary expressions and evaluates the ones that compile
//! against a small fixed frame. Neither step may panic.

#![no_main]

use capflow_core::{compile, CaptureRecord, Frame, Layer, TokenRegistry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(expr) = std::str::from_utf8(data) else {
        return;
    };

    let tokens = TokenRegistry::new();
    let Ok(filter) = compile(expr, &tokens) else {
        return;
    };

    let mut frame = Frame::new(1, CaptureRecord::new(tokens.get("[eth]"), vec![0u8; 8], 0));
    let mut eth = Layer::new(tokens.get("eth")).with_tag(tokens.get("eth"));
    eth.add_child(
        Layer::new(tokens.get("tcp"))
            .with_tag(tokens.get("tcp"))
            .with_property(tokens.get(".dst"), 80u16)
            .with_property(tokens.get(".flags"), 0x18u8)
            .with_property(tokens.get(".note"), "text"),
    );
    frame.push_root(eth);

    let _ = filter.matches(&frame);
});
