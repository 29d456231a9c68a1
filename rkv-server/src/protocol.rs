//! # RESP2 Framing
//!
//! Purpose: Pull complete command frames out of a growing read buffer and
//! encode replies, without blocking on partial input.
//!
//! ## Design Principles
//! 1. **Check Then Consume**: A frame is measured first and the buffer is only
//!    advanced once the whole frame is present.
//! 2. **Arrays And Inline**: Clients send `*n` arrays of bulk strings; plain
//!    text lines (as typed into telnet) are split on whitespace.
//! 3. **Typed Replies**: Handlers build `Reply` values; encoding lives here.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// Upper bound on a single bulk argument.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Upper bound on the argument count of one array frame.
pub const MAX_MULTIBULK_LEN: i64 = 1024 * 1024;

/// Upper bound on an inline command or a frame header line.
pub const MAX_INLINE_LEN: usize = 64 * 1024;

/// Arguments preallocated per frame; larger frames grow as they parse.
const ARGS_CAPACITY_HINT: usize = 64;

/// Framing failures. The connection is closed after replying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RespError {
    #[error("protocol error: {0}")]
    Protocol(&'static str),
}

/// Incremental request parser.
#[derive(Debug, Default)]
pub struct RespParser;

impl RespParser {
    pub fn new() -> Self {
        RespParser
    }

    /// Parses one command from `buffer`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; the buffer is left
    /// untouched in that case.
    pub fn parse(&mut self, buffer: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        if buffer.is_empty() {
            return Ok(None);
        }
        let parsed = if buffer[0] == b'*' {
            parse_array(&buffer[..])?
        } else {
            parse_inline(&buffer[..])?
        };
        match parsed {
            Some((args, consumed)) => {
                buffer.advance(consumed);
                Ok(Some(args))
            }
            None => Ok(None),
        }
    }
}

/// Returns the line starting at `pos` (without CRLF) and the offset after it.
///
/// An unterminated line longer than `MAX_INLINE_LEN` is an error.
fn line_at(buf: &[u8], pos: usize) -> Result<Option<(&[u8], usize)>, RespError> {
    let rest = match buf.get(pos..) {
        Some(rest) => rest,
        None => return Ok(None),
    };
    match rest.windows(2).position(|pair| pair == b"\r\n") {
        Some(end) => Ok(Some((&rest[..end], pos + end + 2))),
        None if rest.len() > MAX_INLINE_LEN => Err(RespError::Protocol("too big header line")),
        None => Ok(None),
    }
}

fn parse_len(line: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(RespError::Protocol("invalid length"))
}

fn parse_array(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, RespError> {
    let (header, mut pos) = match line_at(buf, 0)? {
        Some(found) => found,
        None => return Ok(None),
    };
    let count = parse_len(&header[1..])?;
    if count <= 0 {
        return Ok(Some((Vec::new(), pos)));
    }
    if count > MAX_MULTIBULK_LEN {
        return Err(RespError::Protocol("invalid multibulk length"));
    }

    let mut args = Vec::with_capacity((count as usize).min(ARGS_CAPACITY_HINT));
    for _ in 0..count {
        let (line, next) = match line_at(buf, pos)? {
            Some(found) => found,
            None => return Ok(None),
        };
        if line.first() != Some(&b'$') {
            return Err(RespError::Protocol("expected bulk string"));
        }
        let len = parse_len(&line[1..])?;
        if len < 0 || len as usize > MAX_BULK_LEN {
            return Err(RespError::Protocol("invalid bulk length"));
        }
        let len = len as usize;
        if buf.len() < next + len + 2 {
            return Ok(None);
        }
        if &buf[next + len..next + len + 2] != b"\r\n" {
            return Err(RespError::Protocol("missing CRLF after bulk string"));
        }
        args.push(buf[next..next + len].to_vec());
        pos = next + len + 2;
    }
    Ok(Some((args, pos)))
}

fn parse_inline(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, RespError> {
    let newline = match buf.iter().position(|&b| b == b'\n') {
        Some(newline) if newline <= MAX_INLINE_LEN => newline,
        None if buf.len() <= MAX_INLINE_LEN => return Ok(None),
        _ => return Err(RespError::Protocol("too big inline request")),
    };
    let line = buf[..newline].strip_suffix(b"\r").unwrap_or(&buf[..newline]);
    let args = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|word| !word.is_empty())
        .map(<[u8]>::to_vec)
        .collect();
    Ok(Some((args, newline + 1)))
}

/// A reply to one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Null,
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Simple("OK".to_string())
    }

    /// `-ERR <message>`.
    pub fn err(message: impl std::fmt::Display) -> Reply {
        Reply::Error(format!("ERR {}", message))
    }

    pub fn bulk(value: impl Into<Vec<u8>>) -> Reply {
        Reply::Bulk(value.into())
    }

    /// Array of bulk strings.
    pub fn strings<I, S>(items: I) -> Reply
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        Reply::Array(items.into_iter().map(Reply::bulk).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Appends the RESP2 encoding to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Reply::Simple(text) => {
                out.put_u8(b'+');
                out.put_slice(text.as_bytes());
                out.put_slice(b"\r\n");
            }
            Reply::Error(text) => {
                out.put_u8(b'-');
                out.put_slice(text.as_bytes());
                out.put_slice(b"\r\n");
            }
            Reply::Integer(value) => {
                out.put_u8(b':');
                out.put_slice(value.to_string().as_bytes());
                out.put_slice(b"\r\n");
            }
            Reply::Bulk(data) => {
                out.put_u8(b'$');
                out.put_slice(data.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                out.put_slice(data);
                out.put_slice(b"\r\n");
            }
            Reply::Null => out.put_slice(b"$-1\r\n"),
            Reply::Array(items) => {
                out.put_u8(b'*');
                out.put_slice(items.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(reply: Reply) -> Vec<u8> {
        let mut out = BytesMut::new();
        reply.encode(&mut out);
        out.to_vec()
    }

    #[test]
    fn parses_array_command() {
        let mut parser = RespParser::new();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n"[..]);
        let args = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![b"GET".to_vec(), b"key".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_partial_frames() {
        let mut parser = RespParser::new();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nke"[..]);
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 19);

        buf.extend_from_slice(b"y\r\n*1\r\n$4\r\nPING\r\n");
        let first = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(first[1], b"key".to_vec());
        let second = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(second, vec![b"PING".to_vec()]);
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
    }

    #[test]
    fn parses_inline_command() {
        let mut parser = RespParser::new();
        let mut buf = BytesMut::from(&b"SET  a b\r\n"[..]);
        let args = parser.parse(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![b"SET".to_vec(), b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn rejects_malformed_arrays() {
        let mut parser = RespParser::new();
        let mut buf = BytesMut::from(&b"*1\r\n+PING\r\n"[..]);
        assert!(parser.parse(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"*1\r\n$2\r\nabcd\r\n"[..]);
        assert!(parser.parse(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"*x\r\n"[..]);
        assert!(parser.parse(&mut buf).is_err());
    }

    #[test]
    fn rejects_oversized_multibulk_counts() {
        let mut parser = RespParser::new();
        let mut buf = BytesMut::from(&b"*9223372036854775807\r\n"[..]);
        assert_eq!(
            parser.parse(&mut buf),
            Err(RespError::Protocol("invalid multibulk length"))
        );

        let mut buf = BytesMut::from(&b"*1099511627776\r\n"[..]);
        assert!(parser.parse(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"*1\r\n$9223372036854775807\r\n"[..]);
        assert_eq!(
            parser.parse(&mut buf),
            Err(RespError::Protocol("invalid bulk length"))
        );
    }

    #[test]
    fn large_count_waits_for_arguments() {
        let mut parser = RespParser::new();
        let mut buf = BytesMut::from(&b"*1048576\r\n$4\r\nPING\r\n"[..]);
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
    }

    #[test]
    fn unterminated_lines_are_bounded() {
        let mut parser = RespParser::new();
        let mut buf = BytesMut::from(vec![b'a'; MAX_INLINE_LEN].as_slice());
        assert_eq!(parser.parse(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"aa");
        assert_eq!(
            parser.parse(&mut buf),
            Err(RespError::Protocol("too big inline request"))
        );

        let mut header = b"*1".to_vec();
        header.extend(std::iter::repeat(b'1').take(MAX_INLINE_LEN));
        let mut buf = BytesMut::from(header.as_slice());
        assert_eq!(
            parser.parse(&mut buf),
            Err(RespError::Protocol("too big header line"))
        );
    }

    #[test]
    fn encodes_replies() {
        assert_eq!(encoded(Reply::ok()), b"+OK\r\n");
        assert_eq!(encoded(Reply::err("bad")), b"-ERR bad\r\n");
        assert_eq!(encoded(Reply::Integer(-2)), b":-2\r\n");
        assert_eq!(encoded(Reply::Null), b"$-1\r\n");
        assert_eq!(
            encoded(Reply::strings(vec!["a", "bc"])),
            b"*2\r\n$1\r\na\r\n$2\r\nbc\r\n"
        );
    }
}
