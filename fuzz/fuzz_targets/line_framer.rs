//! Fuzz target for stream framing
//!
//! Framing must not depend on how the stream is split into reads.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_bridge::LineFramer;

fuzz_target!(|input: (u8, Vec<u8>)| {
    let (chunk, data) = input;
    let chunk = usize::from(chunk.max(1));

    let mut whole = LineFramer::with_max_line_len(64);
    let expected = whole.feed(&data);

    let mut split = LineFramer::with_max_line_len(64);
    let got: Vec<_> = data.chunks(chunk).flat_map(|c| split.feed(c)).collect();

    assert_eq!(got, expected);
    assert_eq!(split.dropped(), whole.dropped());
    for line in got {
        assert!(!line.is_empty() && line.len() <= 64);
        assert!(!line.contains(&b'\r') && !line.contains(&b'\n'));
    }
});
