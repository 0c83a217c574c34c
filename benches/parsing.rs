//! Benchmarks for the inbound hot path: framing, decoding and parsing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slirc_bridge::{decode_line, parse_line, LineFramer, MessageCache, ParsedLine, Roster};

/// Simple PING message
const SIMPLE_MESSAGE: &str = "PING :irc.example.com";

/// Message with prefix
const PREFIX_MESSAGE: &str = ":nick!user@host PRIVMSG #channel :Hello, world!";

/// Message with IRCv3 tags, which are skipped
const TAGGED_MESSAGE: &str = "@time=2023-01-01T00:00:00.000Z;msgid=abc123;+example/tag=value :nick!user@host PRIVMSG #channel :Hello with tags!";

/// Numeric response
const NUMERIC_RESPONSE: &str = ":irc.server.net 353 nickname = #channel :@op +voice alice bob carol dave";

fn benchmark_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Line Parsing");

    let messages = [
        ("simple", SIMPLE_MESSAGE),
        ("prefix", PREFIX_MESSAGE),
        ("tagged", TAGGED_MESSAGE),
        ("numeric", NUMERIC_RESPONSE),
    ];
    for (name, line) in messages {
        group.bench_with_input(BenchmarkId::new("borrowed", name), line, |b, s| {
            b.iter(|| black_box(parse_line(black_box(s))))
        });
        group.bench_with_input(BenchmarkId::new("owned", name), line, |b, s| {
            b.iter(|| black_box(ParsedLine::parse(black_box(s))))
        });
    }

    group.finish();
}

fn benchmark_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("Decoding");

    let utf8 = PREFIX_MESSAGE.as_bytes();
    let latin = b":nick!user@host PRIVMSG #channel :caf\xe9 cr\xe8me br\xfbl\xe9e";

    group.bench_function("utf8", |b| b.iter(|| black_box(decode_line(black_box(utf8)))));
    group.bench_function("windows_1252_fallback", |b| {
        b.iter(|| black_box(decode_line(black_box(latin))))
    });

    group.finish();
}

fn benchmark_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Framing");

    let stream: Vec<u8> = (0..64)
        .flat_map(|i| format!(":nick{}!u@h PRIVMSG #channel :message number {}\r\n", i, i).into_bytes())
        .collect();

    group.bench_function("whole_buffer", |b| {
        b.iter(|| {
            let mut framer = LineFramer::new();
            black_box(framer.feed(black_box(&stream)))
        })
    });

    group.bench_function("small_reads", |b| {
        b.iter(|| {
            let mut framer = LineFramer::new();
            let mut count = 0;
            for chunk in stream.chunks(37) {
                count += framer.feed(black_box(chunk)).len();
            }
            black_box(count)
        })
    });

    group.finish();
}

fn benchmark_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("Replay Cache");

    let mut roster = Roster::new();
    for channel in ["#a", "#b", "#c"] {
        roster.on_join(channel, "me", "me");
        roster.on_names_reply(channel, "me @alice +bob carol");
    }

    group.bench_function("channel_message", |b| {
        let mut cache = MessageCache::new(100, 5);
        b.iter(|| cache.add_message(black_box(PREFIX_MESSAGE), &roster, "me"))
    });

    group.bench_function("quit_fan_out", |b| {
        let mut cache = MessageCache::new(100, 5);
        b.iter(|| cache.add_message(black_box(":alice!a@h QUIT :bye"), &roster, "me"))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_parsing,
    benchmark_decoding,
    benchmark_framing,
    benchmark_cache,
);

criterion_main!(benches);
