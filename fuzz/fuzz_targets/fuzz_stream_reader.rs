//! Fuzz target for the stream reader.
//!
//! The first input byte picks a slice size; the rest is fed to the reader in
//! slices of that size. Every delimited unit must equal what a plain search
//! over the contiguous input finds.

#![no_main]

use bytes::Bytes;
use capflow_core::StreamReader;
use libfuzzer_sys::fuzz_target;

const DELIM: &[u8] = b"\r\n";

fuzz_target!(|data: &[u8]| {
    let Some((&size, stream)) = data.split_first() else {
        return;
    };
    let size = (size as usize % 16) + 1;

    let mut reader = StreamReader::new();
    let mut offset = 0;
    let mut units = Vec::new();
    for chunk in stream.chunks(size) {
        reader.add_payload(Bytes::copy_from_slice(chunk));
        let mut start = offset;
        while let Some(found) = reader.search(DELIM, &mut offset) {
            let unit = reader
                .read(found.start - start, start)
                .expect("unit is buffered");
            units.push(unit);
            start = offset;
            reader.discard(start);
        }
    }

    let expected: Vec<&[u8]> = {
        let mut parts: Vec<&[u8]> = Vec::new();
        let mut rest = stream;
        while let Some(pos) = rest.windows(DELIM.len()).position(|w| w == DELIM) {
            parts.push(&rest[..pos]);
            rest = &rest[pos + DELIM.len()..];
        }
        parts
    };
    assert_eq!(units.len(), expected.len());
    for (unit, expected) in units.iter().zip(expected) {
        assert_eq!(unit.as_ref(), expected);
    }
});
