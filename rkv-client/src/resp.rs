//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode client commands and decode server replies for the blocking
//! client, then narrow each reply into the shape a command expects.
//!
//! ## Design Principles
//! 1. **Top-Down Parsing**: Replies are read recursively from a `BufRead`.
//! 2. **Buffer Reuse**: Callers own the line and write buffers.
//! 3. **Binary-Safe**: Bulk strings stay raw bytes until a command narrows them.
//! 4. **Fail Fast**: Invalid framing returns `Protocol` immediately.

use std::collections::HashMap;
use std::io::{BufRead, Read};

use rkv_common::ScoredMember;

use crate::client::{ClientError, ClientResult};

/// Largest bulk reply accepted from a server.
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest array reply accepted from a server.
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Longest reply line (status, error, integer or header).
const MAX_LINE_LEN: u64 = 64 * 1024;

/// Elements preallocated per array reply.
const ARRAY_CAPACITY_HINT: usize = 64;

/// One RESP2 reply.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+OK`, `+PONG`, `+string`.
    Simple(String),
    /// `-ERR ...`, `-WRONGTYPE ...`.
    Error(String),
    /// `:123`.
    Integer(i64),
    /// `$n` bulk string, `None` for `$-1`.
    Bulk(Option<Vec<u8>>),
    /// `*n` array, `None` for `*-1`.
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Turns an error reply into `ClientError::Server`; passes others through.
    pub fn check(self) -> ClientResult<RespValue> {
        match self {
            RespValue::Error(message) => Err(ClientError::Server(message)),
            other => Ok(other),
        }
    }

    /// Accepts `+OK` style acknowledgements.
    pub fn into_status(self) -> ClientResult<String> {
        match self.check()? {
            RespValue::Simple(text) => Ok(text),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Narrows to a string; a null bulk is `ClientError::Nil`.
    pub fn into_string(self) -> ClientResult<String> {
        match self.check()? {
            RespValue::Simple(text) => Ok(text),
            RespValue::Bulk(Some(data)) => Ok(bytes_to_string(data)),
            RespValue::Bulk(None) => Err(ClientError::Nil),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub fn into_integer(self) -> ClientResult<i64> {
        match self.check()? {
            RespValue::Integer(value) => Ok(value),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// `:1` is true, anything else false.
    pub fn into_bool(self) -> ClientResult<bool> {
        Ok(self.into_integer()? == 1)
    }

    /// Parses a bulk float such as a `ZSCORE` reply.
    pub fn into_float(self) -> ClientResult<f64> {
        let text = self.into_string()?;
        parse_float(&text)
    }

    /// Narrows an array of bulk strings; a null array is empty.
    pub fn into_strings(self) -> ClientResult<Vec<String>> {
        match self.check()? {
            RespValue::Array(None) => Ok(Vec::new()),
            RespValue::Array(Some(items)) => {
                items.into_iter().map(RespValue::into_string).collect()
            }
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Narrows a flat `[field, value, ...]` array into a map.
    pub fn into_map(self) -> ClientResult<HashMap<String, String>> {
        let items = self.into_strings()?;
        if items.len() % 2 != 0 {
            return Err(ClientError::Protocol);
        }
        let mut map = HashMap::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            map.insert(field, value);
        }
        Ok(map)
    }

    /// Narrows a flat `[member, score, ...]` array from `WITHSCORES`.
    pub fn into_scored(self) -> ClientResult<Vec<ScoredMember>> {
        let items = self.into_strings()?;
        if items.len() % 2 != 0 {
            return Err(ClientError::Protocol);
        }
        items
            .chunks_exact(2)
            .map(|pair| Ok(ScoredMember::new(pair[0].clone(), parse_float(&pair[1])?)))
            .collect()
    }
}

/// Encodes a RESP2 array command into `out`.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one RESP value from the buffered reader.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<RespValue> {
    read_line(reader, line_buf)?;
    let (&prefix, rest) = line_buf.split_first().ok_or(ClientError::Protocol)?;

    match prefix {
        b'+' => Ok(RespValue::Simple(bytes_to_string(rest.to_vec()))),
        b'-' => Ok(RespValue::Error(bytes_to_string(rest.to_vec()))),
        b':' => Ok(RespValue::Integer(parse_i64(rest)?)),
        b'$' => {
            let len = parse_i64(rest)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(rest)?;
            read_array(reader, len, line_buf)
        }
        _ => Err(ClientError::Protocol),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> ClientResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    if len > MAX_BULK_LEN {
        return Err(ClientError::Protocol);
    }
    let mut data = vec![0u8; len as usize + 2];
    reader.read_exact(&mut data)?;
    if !data.ends_with(b"\r\n") {
        return Err(ClientError::Protocol);
    }
    data.truncate(len as usize);
    Ok(RespValue::Bulk(Some(data)))
}

fn read_array<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> ClientResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Array(None));
    }
    if len > MAX_ARRAY_LEN {
        return Err(ClientError::Protocol);
    }
    let mut items = Vec::with_capacity((len as usize).min(ARRAY_CAPACITY_HINT));
    for _ in 0..len {
        items.push(read_response(reader, line_buf)?);
    }
    Ok(RespValue::Array(Some(items)))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    if reader.by_ref().take(MAX_LINE_LEN).read_until(b'\n', buf)? == 0 {
        return Err(ClientError::Protocol);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(ClientError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(ClientError::Protocol)
}

fn parse_float(text: &str) -> ClientResult<f64> {
    match text {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => text.parse().map_err(|_| ClientError::Protocol),
    }
}

fn bytes_to_string(data: Vec<u8>) -> String {
    String::from_utf8(data).unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}
