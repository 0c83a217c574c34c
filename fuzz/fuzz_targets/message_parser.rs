//! Fuzz target for inbound line decoding and parsing
//!
//! Any byte sequence must decode to text and parse without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slirc_bridge::{decode_line, parse_line, ParsedLine};

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 {
        return;
    }
    let text = decode_line(data);
    let raw = parse_line(&text);
    // the command offset must index the trimmed input
    let trimmed = text.trim_end_matches(['\r', '\n']);
    assert!(raw.command_offset <= trimmed.len());

    let _ = ParsedLine::parse(&text);
});
