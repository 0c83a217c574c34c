//! Property-based tests for framing, parsing and the outbound writer.
//!
//! Run with: `cargo test --features proptest`

#![cfg(feature = "proptest")]

use proptest::prelude::*;
use slirc_bridge::{parse_line, redact, LineFramer, ParsedLine, SocketWriter};

// =============================================================================
// STRATEGIES
// =============================================================================

fn nickname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z\\[\\]\\\\^_`{|}][a-zA-Z0-9\\-\\[\\]\\\\^_`{|}]{0,8}")
        .expect("valid regex")
}

fn word_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9#&._-]{1,12}").expect("valid regex")
}

fn command_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("PRIVMSG".to_string()),
        Just("NOTICE".to_string()),
        Just("JOIN".to_string()),
        Just("MODE".to_string()),
        prop::string::string_regex("[0-9]{3}").expect("valid regex"),
    ]
}

/// Trailing text: anything printable, spaces and colons included.
fn trailing_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,40}").expect("valid regex")
}

/// Lines of arbitrary printable text joined by mixed terminators.
fn stream_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        (
            prop::string::string_regex("[ -~]{0,60}").expect("valid regex"),
            prop_oneof![Just("\r\n"), Just("\n"), Just("\r")],
        ),
        0..20,
    )
    .prop_map(|parts| {
        parts
            .into_iter()
            .flat_map(|(line, end)| format!("{}{}", line, end).into_bytes())
            .collect()
    })
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn parser_never_panics(input in "\\PC{0,200}") {
        let _ = parse_line(&input);
        let _ = ParsedLine::parse(&input);
    }

    #[test]
    fn composed_line_parses_back(
        nick in nickname_strategy(),
        user in word_strategy(),
        command in command_strategy(),
        middle in prop::collection::vec(word_strategy(), 0..4),
        trailing in trailing_strategy(),
    ) {
        let mut line = format!(":{}!{}@host.example {}", nick, user, command);
        for param in &middle {
            line.push(' ');
            line.push_str(param);
        }
        line.push_str(" :");
        line.push_str(&trailing);

        let parsed = ParsedLine::parse(&line);
        prop_assert_eq!(parsed.nick.as_deref(), Some(nick.as_str()));
        prop_assert_eq!(&parsed.command, &command);
        prop_assert_eq!(parsed.params.len(), middle.len() + 1);
        prop_assert_eq!(&parsed.params[..middle.len()], &middle[..]);
        prop_assert_eq!(parsed.trailing(), Some(trailing.as_str()));
    }

    #[test]
    fn framing_ignores_chunk_boundaries(
        stream in stream_strategy(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let mut whole = LineFramer::new();
        let expected = whole.feed(&stream);

        let mut points: Vec<usize> = cuts.iter().map(|c| c.index(stream.len() + 1)).collect();
        points.sort_unstable();
        let mut chunked = LineFramer::new();
        let mut got = Vec::new();
        let mut start = 0;
        for point in points.into_iter().chain(std::iter::once(stream.len())) {
            got.extend(chunked.feed(&stream[start..point]));
            start = point;
        }

        prop_assert_eq!(got, expected);
        prop_assert_eq!(chunked.partial_len(), 0);
    }

    #[test]
    fn framed_lines_hold_no_terminators(stream in stream_strategy()) {
        let mut framer = LineFramer::new();
        for line in framer.feed(&stream) {
            prop_assert!(!line.is_empty());
            prop_assert!(!line.contains(&b'\r') && !line.contains(&b'\n'));
        }
    }

    #[test]
    fn writer_never_passes_line_breaks(
        head in "[ -~]{1,30}",
        tail in "[ -~]{0,30}",
        bad in prop_oneof![Just('\r'), Just('\n'), Just('\0')],
    ) {
        let line = format!("{}{}{}", head, bad, tail);
        if !tail.is_empty() {
            prop_assert!(SocketWriter::default().prepare(line.as_bytes()).is_err());
        }
    }

    #[test]
    fn redact_hides_passwords(secret in "[0-9]{2}[a-zA-Z0-9]{4,18}") {
        let pass = format!("PASS {}", secret);
        let identify = format!("PRIVMSG NickServ :IDENTIFY {}", secret);
        prop_assert!(!redact(&pass).contains(secret.as_str()));
        prop_assert!(!redact(&identify).contains(secret.as_str()));
    }
}
