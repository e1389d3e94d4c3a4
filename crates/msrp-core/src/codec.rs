//! MSRP framing over a byte stream
//!
//! ```text
//! MSRP a786hjs2 SEND
//! To-Path: msrp://bob.example.com:8888/9di4eae923wzd;tcp
//! From-Path: msrp://alice.example.com:7777/iau39soe2843z;tcp
//! Message-ID: 87652491
//! Byte-Range: 1-25/25
//! Content-Type: text/plain
//!
//! Hey Bob, are you there?
//! -------a786hjs2$
//! ```

use bytes::{Buf, BytesMut};
use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::{char, not_line_ending, space0, space1},
    IResult,
};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::chunk::{ContinuationFlag, MsrpChunk, StartLine};
use crate::error::{MsrpError, Result};

/// Room for the start line, headers and end-line around a chunk body
pub const HEADER_ALLOWANCE: usize = 4096;

const END_LINE_DASHES: &[u8] = b"-------";

/// Decodes and encodes MSRP chunks
#[derive(Debug, Clone)]
pub struct MsrpCodec {
    max_frame_size: usize,
}

impl MsrpCodec {
    /// Codec accepting chunk bodies up to `max_chunk_size` bytes
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_frame_size: max_chunk_size.saturating_add(HEADER_ALLOWANCE),
        }
    }

    fn check_size(&self, buffered: usize) -> Result<()> {
        if buffered > self.max_frame_size {
            return Err(MsrpError::protocol(format!(
                "MSRP chunk exceeds {} bytes",
                self.max_frame_size
            )));
        }
        Ok(())
    }
}

impl Default for MsrpCodec {
    fn default() -> Self {
        Self::new(crate::session::DEFAULT_MAX_CHUNK_SIZE)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '%' | '=')
}

fn is_token_char(c: char) -> bool {
    !c.is_ascii_whitespace()
}

/// Parse `MSRP <transaction-id> <method|status [comment]>`
fn parse_start_line(input: &str) -> IResult<&str, (&str, StartLine)> {
    let (input, _) = tag("MSRP")(input)?;
    let (input, _) = space1(input)?;
    let (input, transaction_id) = take_while1(is_ident_char)(input)?;
    let (input, _) = space1(input)?;
    let (input, token) = take_while1(is_token_char)(input)?;
    let (input, _) = space0(input)?;
    let (input, rest) = not_line_ending(input)?;

    let start_line = match token.parse::<u16>() {
        Ok(status) if token.len() == 3 => StartLine::Response {
            status,
            comment: (!rest.trim().is_empty()).then(|| rest.trim().to_string()),
        },
        _ => StartLine::Request {
            method: token.to_string(),
        },
    };
    Ok((input, (transaction_id, start_line)))
}

fn parse_header_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, name) = take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-')(input)?;
    let (input, _) = char(':')(input)?;
    let (input, _) = space0(input)?;
    let (input, value) = not_line_ending(input)?;
    Ok((input, (name, value.trim())))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| idx + from)
}

impl Decoder for MsrpCodec {
    type Item = MsrpChunk;
    type Error = MsrpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<MsrpChunk>> {
        let stray = src.iter().take_while(|b| **b == b'\r' || **b == b'\n').count();
        if stray > 0 {
            src.advance(stray);
        }

        let line_end = match find(src, b"\r\n", 0) {
            Some(idx) => idx,
            None => {
                self.check_size(src.len())?;
                return Ok(None);
            }
        };

        let first_line = std::str::from_utf8(&src[..line_end])
            .map_err(|e| MsrpError::protocol(format!("invalid UTF-8 in start line: {}", e)))?;
        let (transaction_id, start_line) = parse_start_line(first_line)
            .map(|(_, parsed)| (parsed.0.to_string(), parsed.1))
            .map_err(|_| MsrpError::protocol(format!("invalid start line: {}", first_line)))?;

        let mut end_marker = Vec::with_capacity(2 + END_LINE_DASHES.len() + transaction_id.len());
        end_marker.extend_from_slice(b"\r\n");
        end_marker.extend_from_slice(END_LINE_DASHES);
        end_marker.extend_from_slice(transaction_id.as_bytes());

        let end_idx = match find(src, &end_marker, line_end) {
            Some(idx) => idx,
            None => {
                self.check_size(src.len())?;
                return Ok(None);
            }
        };

        let flag_pos = end_idx + end_marker.len();
        if src.len() < flag_pos + 3 {
            return Ok(None);
        }
        let flag = ContinuationFlag::from_byte(src[flag_pos])
            .ok_or_else(|| MsrpError::protocol("invalid continuation flag"))?;
        if &src[flag_pos + 1..flag_pos + 3] != b"\r\n" {
            return Err(MsrpError::protocol("malformed end-line"));
        }

        let frame = src.split_to(flag_pos + 3).freeze();
        let region = if end_idx > line_end + 2 {
            frame.slice(line_end + 2..end_idx)
        } else {
            frame.slice(0..0)
        };

        let (header_bytes, body) = match find(&region, b"\r\n\r\n", 0) {
            Some(idx) => (region.slice(..idx), region.slice(idx + 4..)),
            None => (region.clone(), region.slice(0..0)),
        };

        let header_text = std::str::from_utf8(&header_bytes)
            .map_err(|e| MsrpError::protocol(format!("invalid UTF-8 in headers: {}", e)))?;
        let mut headers = Vec::new();
        for line in header_text.split("\r\n").filter(|line| !line.is_empty()) {
            let (_, (name, value)) =
                parse_header_line(line).map_err(|_| MsrpError::protocol(format!("invalid header: {}", line)))?;
            headers.push((name.to_string(), value.to_string()));
        }

        trace!("Decoded MSRP chunk {} ({} body bytes)", transaction_id, body.len());
        Ok(Some(MsrpChunk {
            transaction_id,
            start_line,
            headers,
            body,
            flag,
        }))
    }
}

impl Encoder<MsrpChunk> for MsrpCodec {
    type Error = MsrpError;

    fn encode(&mut self, chunk: MsrpChunk, dst: &mut BytesMut) -> Result<()> {
        let start_line = match &chunk.start_line {
            StartLine::Request { method } => format!("MSRP {} {}\r\n", chunk.transaction_id, method),
            StartLine::Response { status, comment } => match comment {
                Some(comment) => format!("MSRP {} {:03} {}\r\n", chunk.transaction_id, status, comment),
                None => format!("MSRP {} {:03}\r\n", chunk.transaction_id, status),
            },
        };

        dst.reserve(start_line.len() + chunk.body.len() + 256);
        dst.extend_from_slice(start_line.as_bytes());
        for (name, value) in &chunk.headers {
            dst.extend_from_slice(name.as_bytes());
            dst.extend_from_slice(b": ");
            dst.extend_from_slice(value.as_bytes());
            dst.extend_from_slice(b"\r\n");
        }
        if !chunk.body.is_empty() || chunk.content_type().is_some() {
            dst.extend_from_slice(b"\r\n");
            dst.extend_from_slice(&chunk.body);
            dst.extend_from_slice(b"\r\n");
        }
        dst.extend_from_slice(END_LINE_DASHES);
        dst.extend_from_slice(chunk.transaction_id.as_bytes());
        dst.extend_from_slice(&[chunk.flag.as_char() as u8]);
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ByteRange;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    const SEND: &str = "MSRP a786hjs2 SEND\r\n\
        To-Path: msrp://bob.example.com:8888/9di4eae923wzd;tcp\r\n\
        From-Path: msrp://alice.example.com:7777/iau39soe2843z;tcp\r\n\
        Message-ID: 87652491\r\n\
        Byte-Range: 1-25/25\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        Hey Bob, are you there?\r\n\
        -------a786hjs2$\r\n";

    #[test]
    fn test_decode_send() {
        let mut codec = MsrpCodec::default();
        let mut buf = BytesMut::from(SEND);
        let chunk = codec.decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        assert_eq!(chunk.transaction_id, "a786hjs2");
        assert_eq!(chunk.method(), Some("SEND"));
        assert_eq!(chunk.message_id(), Some("87652491"));
        assert_eq!(chunk.byte_range(), Some(ByteRange::new(1, 25, 25)));
        assert_eq!(chunk.content_type(), Some("text/plain"));
        assert_eq!(&chunk.body[..], b"Hey Bob, are you there?");
        assert_eq!(chunk.flag, ContinuationFlag::Complete);
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let mut codec = MsrpCodec::default();
        let (head, tail) = SEND.split_at(60);
        let mut buf = BytesMut::from(head);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(tail.as_bytes());
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_decode_response_without_body() {
        let mut codec = MsrpCodec::default();
        let mut buf = BytesMut::from(
            "MSRP a786hjs2 200 OK\r\nTo-Path: msrp://a:1/x;tcp\r\nFrom-Path: msrp://b:2/y;tcp\r\n-------a786hjs2$\r\nMSRP",
        );
        let chunk = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(chunk.status(), Some(200));
        assert_eq!(chunk.headers.len(), 2);
        assert!(chunk.body.is_empty());
        assert_eq!(&buf[..], b"MSRP");
    }

    #[test]
    fn test_encode_then_decode_keeps_binary_body() {
        let mut codec = MsrpCodec::default();
        let body = Bytes::from_static(&[0u8, 13, 10, 255, 13, 10, 13, 10]);
        let chunk = MsrpChunk::send(
            "t1",
            "msrp://b:2/y;tcp",
            "msrp://a:1/x;tcp",
            "m1",
            ByteRange::new(1, 8, 16),
            Some("application/octet-stream"),
            body.clone(),
            ContinuationFlag::More,
        );
        let mut buf = BytesMut::new();
        codec.encode(chunk.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn test_encode_empty_chunk() {
        let mut codec = MsrpCodec::default();
        let chunk = MsrpChunk::send(
            "t2",
            "msrp://b:2/y;tcp",
            "msrp://a:1/x;tcp",
            "m2",
            ByteRange::new(1, 0, 0),
            None,
            Bytes::new(),
            ContinuationFlag::Complete,
        );
        let mut buf = BytesMut::new();
        codec.encode(chunk, &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            b"MSRP t2 SEND\r\nTo-Path: msrp://b:2/y;tcp\r\nFrom-Path: msrp://a:1/x;tcp\r\nMessage-ID: m2\r\nByte-Range: 1-0/0\r\n-------t2$\r\n"
        );
    }

    #[test]
    fn test_rejects_garbage_and_oversize() {
        let mut codec = MsrpCodec::new(16);
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\n\r\n");
        assert!(matches!(codec.decode(&mut buf), Err(MsrpError::Protocol { .. })));

        let mut buf = BytesMut::from("MSRP t3 SEND\r\n");
        buf.extend_from_slice(&vec![b'a'; HEADER_ALLOWANCE + 64]);
        assert!(matches!(codec.decode(&mut buf), Err(MsrpError::Protocol { .. })));
    }
}
