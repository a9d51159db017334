//! Zero-copy byte stream over a sequence of payload slices.
//!
//! Offsets are absolute positions in the flow's byte stream. Slices fully
//! consumed by the caller can be released with [`StreamReader::discard`];
//! absolute offsets keep their meaning afterwards.

use std::collections::VecDeque;
use std::ops::Range;

use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;

use crate::error::StreamError;

#[derive(Debug, Default)]
pub struct StreamReader {
    slices: VecDeque<Bytes>,
    /// Absolute offset of the first buffered byte
    base: usize,
    /// Absolute offset one past the last buffered byte
    end: usize,
    /// Earliest position at which a match of `last_delim` can still start
    resume: usize,
    last_delim: SmallVec<[u8; 8]>,
}

impl StreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slice to the end of the stream. Empty slices are ignored.
    pub fn add_payload(&mut self, slice: Bytes) {
        if slice.is_empty() {
            return;
        }
        self.end += slice.len();
        self.slices.push_back(slice);
    }

    /// Total bytes ever added to the stream.
    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Bytes currently held.
    pub fn buffered(&self) -> usize {
        self.end - self.base
    }

    /// Find the first occurrence of `delim` at or after `*offset`.
    ///
    /// On a match, `*offset` moves to the end of the match and the matched
    /// range is returned. On a miss, `*offset` is left untouched and the
    /// reader remembers how far it scanned, so the next call only looks at
    /// bytes that could still begin a match.
    pub fn search(&mut self, delim: &[u8], offset: &mut usize) -> Option<Range<usize>> {
        if delim.is_empty() {
            return None;
        }
        if self.last_delim.as_slice() != delim {
            self.last_delim = SmallVec::from_slice(delim);
            self.resume = self.base;
        }

        let start = (*offset).max(self.resume).max(self.base);
        if start >= self.end {
            return None;
        }

        let failure = failure_table(delim);
        let mut matched = 0;
        let mut pos = start;
        let mut found = None;
        for byte in self.bytes_from(start) {
            while matched > 0 && byte != delim[matched] {
                matched = failure[matched - 1];
            }
            if byte == delim[matched] {
                matched += 1;
            }
            pos += 1;
            if matched == delim.len() {
                found = Some(pos - delim.len()..pos);
                break;
            }
        }

        match found {
            Some(found) => {
                *offset = found.end;
                self.resume = found.end;
                Some(found)
            }
            None => {
                // A partial match may be completed by bytes not yet received.
                self.resume = self.end - matched;
                None
            }
        }
    }

    /// Read `len` bytes starting at absolute offset `from`.
    ///
    /// Returns a view into the underlying slice when the range lies inside a
    /// single slice, otherwise a contiguous copy.
    pub fn read(&self, len: usize, from: usize) -> Result<Bytes, StreamError> {
        let out_of_range = || StreamError::OutOfRange {
            offset: from,
            length: len,
            base: self.base,
            end: self.end,
        };
        let until = from.checked_add(len).ok_or_else(out_of_range)?;
        if from < self.base || until > self.end {
            return Err(out_of_range());
        }
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut pos = self.base;
        for slice in &self.slices {
            let slice_end = pos + slice.len();
            if from < slice_end {
                if until <= slice_end {
                    return Ok(slice.slice(from - pos..until - pos));
                }
                break;
            }
            pos = slice_end;
        }

        let mut buf = BytesMut::with_capacity(len);
        let mut pos = self.base;
        for slice in &self.slices {
            let slice_end = pos + slice.len();
            if slice_end > from && pos < until {
                let lo = from.max(pos) - pos;
                let hi = until.min(slice_end) - pos;
                buf.extend_from_slice(&slice[lo..hi]);
            }
            if slice_end >= until {
                break;
            }
            pos = slice_end;
        }
        Ok(buf.freeze())
    }

    /// Release every slice that ends at or before absolute offset `upto`.
    pub fn discard(&mut self, upto: usize) {
        while let Some(front) = self.slices.front() {
            if self.base + front.len() > upto {
                break;
            }
            self.base += front.len();
            self.slices.pop_front();
        }
        self.resume = self.resume.max(self.base);
    }

    fn bytes_from(&self, start: usize) -> impl Iterator<Item = u8> + '_ {
        let mut skip = start - self.base;
        self.slices.iter().flat_map(move |slice| {
            let from = skip.min(slice.len());
            skip -= from;
            slice[from..].iter().copied()
        })
    }
}

/// KMP failure function: `table[i]` is the length of the longest proper
/// prefix of `pattern[..=i]` that is also a suffix of it.
fn failure_table(pattern: &[u8]) -> SmallVec<[usize; 8]> {
    let mut table = SmallVec::from_elem(0, pattern.len());
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = table[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        table[i] = k;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reader_of(parts: &[&'static [u8]]) -> StreamReader {
        let mut reader = StreamReader::new();
        for part in parts {
            reader.add_payload(Bytes::from_static(*part));
        }
        reader
    }

    #[test]
    fn test_search_across_slices() {
        let mut reader = reader_of(&[b"GET / HTTP/1.1\r", b"\nHost: x\r\n"]);
        let mut offset = 0;

        assert_eq!(reader.search(b"\r\n", &mut offset), Some(14..16));
        assert_eq!(offset, 16);
        assert_eq!(reader.search(b"\r\n", &mut offset), Some(23..25));
        assert_eq!(reader.search(b"\r\n", &mut offset), None);
        assert_eq!(offset, 25);
    }

    #[test]
    fn test_search_miss_then_more_data() {
        let mut reader = reader_of(&[b"GET /", b" HTTP/1.1\r"]);
        let mut offset = 0;

        assert_eq!(reader.search(b"\r\n", &mut offset), None);
        assert_eq!(offset, 0);

        reader.add_payload(Bytes::from_static(b"\n"));
        assert_eq!(reader.search(b"\r\n", &mut offset), Some(14..16));
    }

    #[test]
    fn test_search_overlapping_prefix() {
        // "aab" inside "aaab" needs the failure table to recover.
        let mut reader = reader_of(&[b"aa", b"ab"]);
        let mut offset = 0;
        assert_eq!(reader.search(b"aab", &mut offset), Some(1..4));
    }

    #[test]
    fn test_read_single_slice_is_zero_copy() {
        let data = Bytes::from_static(b"hello world");
        let mut reader = StreamReader::new();
        reader.add_payload(data.clone());

        let view = reader.read(5, 6).unwrap();
        assert_eq!(&view[..], b"world");
        assert_eq!(view.as_ptr(), data[6..].as_ptr());
    }

    #[test]
    fn test_read_across_slices() {
        let reader = reader_of(&[b"GET /", b" HTTP", b"/1.1"]);
        assert_eq!(&reader.read(14, 0).unwrap()[..], b"GET / HTTP/1.1");
        assert_eq!(&reader.read(6, 3).unwrap()[..], b" / HTT");
    }

    #[test]
    fn test_read_out_of_range() {
        let mut reader = reader_of(&[b"abc", b"def"]);
        assert!(matches!(
            reader.read(4, 3),
            Err(StreamError::OutOfRange { offset: 3, length: 4, .. })
        ));

        reader.discard(3);
        assert_eq!(reader.buffered(), 3);
        assert!(reader.read(1, 2).is_err());
        assert_eq!(&reader.read(3, 3).unwrap()[..], b"def");
    }

    #[test]
    fn test_discard_keeps_partial_slice() {
        let mut reader = reader_of(&[b"abc", b"def"]);
        reader.discard(4);
        assert_eq!(reader.buffered(), 3);
        assert_eq!(&reader.read(2, 4).unwrap()[..], b"ef");
    }

    #[test]
    fn test_empty_delimiter_never_matches() {
        let mut reader = reader_of(&[b"abc"]);
        let mut offset = 0;
        assert_eq!(reader.search(b"", &mut offset), None);
    }

    proptest! {
        /// The match reported is the first occurrence at or after the offset,
        /// no matter how the stream was split into slices.
        #[test]
        fn prop_search_finds_first_occurrence(
            data in proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(b'\r'), Just(b'\n')], 0..64),
            cuts in proptest::collection::vec(0usize..64, 0..6),
            delim in prop_oneof![Just(b"\r\n".to_vec()), Just(b"ab".to_vec()), Just(b"aba".to_vec())],
            start in 0usize..64,
        ) {
            let mut cuts: Vec<usize> = cuts.into_iter().filter(|c| *c <= data.len()).collect();
            cuts.push(0);
            cuts.push(data.len());
            cuts.sort_unstable();
            cuts.dedup();

            let mut reader = StreamReader::new();
            for pair in cuts.windows(2) {
                reader.add_payload(Bytes::copy_from_slice(&data[pair[0]..pair[1]]));
            }

            let start = start.min(data.len());
            let expected = data[start..]
                .windows(delim.len())
                .position(|w| w == delim.as_slice())
                .map(|i| start + i..start + i + delim.len());

            let mut offset = start;
            let found = reader.search(&delim, &mut offset);
            prop_assert_eq!(found.clone(), expected);
            match found {
                Some(range) => prop_assert_eq!(offset, range.end),
                None => prop_assert_eq!(offset, start),
            }
        }
    }
}
