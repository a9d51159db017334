//! Fuzz target for PCAP/PCAPNG capture file reading.
//!
//! Malformed magic bytes, headers and packet records must surface as errors.

#![no_main]

use std::io::Cursor;

use capflow::replay::{CaptureFormat, CaptureReader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(format) = CaptureFormat::detect(data) {
        if let Ok(mut reader) = CaptureReader::with_format(Cursor::new(data), format) {
            while let Ok(Some(_packet)) = reader.next_packet() {}
        }
    }
});
