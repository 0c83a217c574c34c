//! Line framing for the upstream byte stream.
//!
//! [`LineFramer`] accumulates raw socket bytes and splits them on CR or LF,
//! holding an unterminated fragment across reads. With the `tokio` feature
//! it also serves as the [`tokio_util::codec`] codec for the socket halves.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tracing::warn;

/// Protocol maximum line length, terminator included.
pub const MAX_LINE_LEN: usize = 512;

/// Largest inbound line accepted before its terminator.
pub const MAX_INBOUND_LINE_LEN: usize = MAX_LINE_LEN;

/// Splits a byte stream into protocol lines.
///
/// Empty runs between terminators are skipped, so CRLF, LF and stray CRs
/// all frame the same way. Lines longer than the configured maximum are
/// dropped with a warning.
#[derive(Debug)]
pub struct LineFramer {
    partial: BytesMut,
    max_line_len: usize,
    discarding: bool,
    dropped: usize,
    pending: VecDeque<Bytes>,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Create a framer with the protocol line limit.
    pub fn new() -> Self {
        Self::with_max_line_len(MAX_INBOUND_LINE_LEN)
    }

    /// Create a framer with a custom maximum line length.
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            partial: BytesMut::with_capacity(max_line_len.min(4096)),
            max_line_len,
            discarding: false,
            dropped: 0,
            pending: VecDeque::new(),
        }
    }

    /// Feed newly read bytes and return every line they complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        let mut lines = Vec::new();
        let mut start = 0;

        for (i, &b) in data.iter().enumerate() {
            if b == b'\r' || b == b'\n' {
                self.absorb(&data[start..i]);
                self.finish_line(&mut lines);
                start = i + 1;
            }
        }
        self.absorb(&data[start..]);

        lines
    }

    /// Bytes held from an unterminated line.
    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }

    /// Number of oversized lines dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Forget any held fragment, e.g. when the socket is replaced.
    pub fn reset(&mut self) {
        self.partial.clear();
        self.pending.clear();
        self.discarding = false;
    }

    fn absorb(&mut self, segment: &[u8]) {
        if self.discarding || segment.is_empty() {
            return;
        }
        if self.partial.len() + segment.len() > self.max_line_len {
            warn!(
                limit = self.max_line_len,
                held = self.partial.len() + segment.len(),
                "dropping oversized inbound line"
            );
            self.partial.clear();
            self.discarding = true;
            self.dropped += 1;
            return;
        }
        self.partial.extend_from_slice(segment);
    }

    fn finish_line(&mut self, lines: &mut Vec<Bytes>) {
        if self.discarding {
            self.discarding = false;
        } else if !self.partial.is_empty() {
            lines.push(self.partial.split().freeze());
        }
    }
}

#[cfg(feature = "tokio")]
mod codec {
    use bytes::{BufMut, Bytes, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};
    use tracing::debug;

    use super::LineFramer;
    use crate::error::ProtocolError;

    impl Decoder for LineFramer {
        type Item = Bytes;
        type Error = ProtocolError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
            if !src.is_empty() {
                let data = src.split();
                let lines = self.feed(&data);
                self.pending.extend(lines);
            }
            Ok(self.pending.pop_front())
        }

        fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
            let line = self.decode(src)?;
            if line.is_none() && !self.partial.is_empty() {
                debug!(len = self.partial.len(), "discarding unterminated fragment at eof");
                self.partial.clear();
            }
            Ok(line)
        }
    }

    /// Writes an already validated line and its CRLF terminator.
    impl Encoder<Bytes> for LineFramer {
        type Error = ProtocolError;

        fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), ProtocolError> {
            dst.reserve(item.len() + 2);
            dst.put_slice(&item);
            dst.put_slice(b"\r\n");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(lines: Vec<Bytes>) -> Vec<String> {
        lines
            .into_iter()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_crlf_and_lf() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"PING :a\r\nPING :b\nPING :c\r");
        assert_eq!(strings(lines), vec!["PING :a", "PING :b", "PING :c"]);
        assert_eq!(framer.partial_len(), 0);
    }

    #[test]
    fn test_partial_is_held() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b":srv NOTICE * :hel").is_empty());
        assert_eq!(framer.partial_len(), 18);
        let lines = framer.feed(b"lo\r\n:srv 001 me :hi\r");
        assert_eq!(strings(lines), vec![":srv NOTICE * :hello", ":srv 001 me :hi"]);
        // the LF of that CRLF arrives on its own
        assert!(framer.feed(b"\n").is_empty());
    }

    #[test]
    fn test_zero_length_input() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"").is_empty());
        framer.feed(b"abc");
        assert!(framer.feed(b"").is_empty());
        assert_eq!(framer.partial_len(), 3);
    }

    #[test]
    fn test_oversized_line_dropped() {
        let mut framer = LineFramer::with_max_line_len(8);
        let lines = framer.feed(b"short\r\nthis is far too long\r\nok\r\n");
        assert_eq!(strings(lines), vec!["short", "ok"]);
        assert_eq!(framer.dropped(), 1);
    }

    #[test]
    fn test_oversized_across_reads() {
        let mut framer = LineFramer::with_max_line_len(8);
        assert!(framer.feed(b"123456").is_empty());
        assert!(framer.feed(b"789").is_empty());
        assert_eq!(framer.partial_len(), 0);
        let lines = framer.feed(b"0abc\r\nnext\r\n");
        assert_eq!(strings(lines), vec!["next"]);
    }

    #[test]
    fn test_line_at_limit_kept() {
        let mut framer = LineFramer::with_max_line_len(4);
        let lines = framer.feed(b"abcd\r\n");
        assert_eq!(strings(lines), vec!["abcd"]);
    }

    #[test]
    fn test_split_feeding_matches_whole() {
        let input: &[u8] = b":a!b@c PRIVMSG #x :one\r\n:a!b@c PRIVMSG #x :two\n\r\nPING :z\r\ntail";
        let mut whole = LineFramer::new();
        let expected = strings(whole.feed(input));

        for split in 0..input.len() {
            let mut framer = LineFramer::new();
            let mut got = strings(framer.feed(&input[..split]));
            got.extend(strings(framer.feed(&input[split..])));
            assert_eq!(got, expected, "split at {}", split);
            assert_eq!(framer.partial_len(), 4);
        }
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn test_decoder_drains_pending() {
        use tokio_util::codec::Decoder;

        let mut framer = LineFramer::new();
        let mut buf = BytesMut::from(&b"A\r\nB\r\nC"[..]);
        assert_eq!(framer.decode(&mut buf).unwrap().as_deref(), Some(&b"A"[..]));
        assert!(buf.is_empty());
        assert_eq!(framer.decode(&mut buf).unwrap().as_deref(), Some(&b"B"[..]));
        assert_eq!(framer.decode(&mut buf).unwrap(), None);
        assert_eq!(framer.decode_eof(&mut buf).unwrap(), None);
        assert_eq!(framer.partial_len(), 0);
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn test_encoder_appends_crlf() {
        use tokio_util::codec::Encoder;

        let mut framer = LineFramer::new();
        let mut dst = BytesMut::new();
        framer.encode(Bytes::from_static(b"NICK me"), &mut dst).unwrap();
        assert_eq!(&dst[..], b"NICK me\r\n");
    }
}
