/// Line framing over the raw byte stream.
///
/// Splits incoming bytes into discrete lines, decoded with the configured
/// encoding and replacement-on-invalid-byte semantics. Serializes outgoing
/// lines with `\r\n` termination and enforces the protocol's hard length
/// cap (RFC 1459 section 2.3) by truncating.
use bytes::{Buf, BufMut, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::Error;

/// Maximum wire line length in bytes, including the `\r\n` terminator.
pub const MAX_LINE_LENGTH: usize = 512;

/// Guard against unterminated garbage filling the read buffer. Generous
/// relative to the write cap — some servers exceed 512 bytes in practice.
const READ_BUFFER_LIMIT: usize = 8192;

/// Codec framing the connection's byte stream into text lines.
#[derive(Debug)]
pub struct LineCodec {
    encoding: &'static Encoding,
}

impl LineCodec {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self { encoding }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(UTF_8)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > READ_BUFFER_LIMIT {
                return Err(Error::LineTooLong);
            }
            return Ok(None);
        };

        // Take the line, drop the terminator. Frame on `\n` and strip an
        // optional preceding `\r` so bare-LF servers still parse.
        let mut line_bytes = src.split_to(pos);
        src.advance(1);
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.truncate(line_bytes.len() - 1);
        }

        // Lossy decode: malformed input becomes replacement characters
        // rather than an error.
        let (text, _, _) = self.encoding.decode(&line_bytes);
        Ok(Some(text.into_owned()))
    }
}

impl Encoder<String> for LineCodec {
    type Error = Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Error> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let (encoded, _, _) = self.encoding.encode(trimmed);
        let mut bytes = encoded.into_owned();

        // Naive CRLF stripping upstream can leave a stray LF before a CR
        // mid-message; collapse the pair to a single CR.
        while let Some(pos) = bytes.windows(2).position(|w| w == b"\n\r") {
            bytes.remove(pos);
        }

        if bytes.len() > MAX_LINE_LENGTH - 2 {
            warn!(
                len = bytes.len(),
                "outgoing line longer than {MAX_LINE_LENGTH} bytes, truncating"
            );
            bytes.truncate(MAX_LINE_LENGTH - 2);
        }

        dst.reserve(bytes.len() + 2);
        dst.put_slice(&bytes);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Decoder ──────────────────────────────────────────────────

    #[test]
    fn decode_complete_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("PING :token\r\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "PING :token");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_partial_line_then_complete() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("PING :to");

        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"ken\r\n");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "PING :token");
    }

    #[test]
    fn decode_two_lines_in_one_read() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("NICK wren\r\nUSER wren 8 * :wren IRC Bot\r\n");

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "NICK wren");
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            "USER wren 8 * :wren IRC Bot"
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_bare_lf_terminator() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("PING :token\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "PING :token");
    }

    #[test]
    fn decode_invalid_utf8_is_lossy() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&b"caf\xe9\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "caf\u{fffd}");
    }

    #[test]
    fn decode_empty_buffer() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_unterminated_overflow_errors() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(vec![b'A'; READ_BUFFER_LIMIT + 1].as_slice());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::LineTooLong)
        ));
    }

    // ── Encoder ──────────────────────────────────────────────────

    #[test]
    fn encode_appends_crlf() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        codec.encode("NICK wren".into(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"NICK wren\r\n");
    }

    #[test]
    fn encode_strips_existing_terminator() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        codec.encode("QUIT\r\n".into(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"QUIT\r\n");
    }

    #[test]
    fn encode_normalizes_stray_lf_cr() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        codec.encode("a\n\rb".into(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"a\rb\r\n");
    }

    #[test]
    fn encode_truncates_to_exactly_max_length() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        codec.encode("a".repeat(600), &mut buf).unwrap();
        assert_eq!(buf.len(), MAX_LINE_LENGTH);
        assert_eq!(&buf[buf.len() - 2..], b"\r\n");
    }

    // ── Round-trip ───────────────────────────────────────────────

    #[test]
    fn roundtrip_under_cap() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        let original = "PRIVMSG #pond :hello there";
        codec.encode(original.into(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
    }
}
