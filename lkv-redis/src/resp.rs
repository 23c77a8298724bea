//! # RESP2 Wire Codec
//!
//! Purpose: Encode commands and incrementally parse server replies into the
//! owned reply model.
//!
//! ## Design Principles
//! 1. **Incremental Parsing**: A partial frame consumes nothing and yields
//!    `None`; callers retry once more bytes arrive.
//! 2. **Binary-Safe**: Bulk strings are raw bytes.
//! 3. **Fail Fast**: Unrecognized framing is a protocol error, treated as
//!    fatal by the connection layer.

use bytes::{Buf, BytesMut};

use crate::error::{RedisError, RedisResult};
use crate::reply::Reply;

/// Encodes a RESP2 array command into the provided buffer.
pub(crate) fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    out.push(b'*');
    push_usize(out, args.len());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        push_usize(out, arg.len());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Incremental reply parser over a growable read buffer.
pub(crate) struct RespParser;

impl RespParser {
    pub(crate) fn new() -> Self {
        RespParser
    }

    /// Parses at most one complete reply from the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves the buffer untouched when the frame is
    /// still incomplete.
    pub(crate) fn parse(&mut self, buf: &mut BytesMut) -> RedisResult<Option<Reply>> {
        let mut pos = 0usize;
        match parse_frame(&buf[..], &mut pos)? {
            Some(reply) => {
                buf.advance(pos);
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }
}

fn parse_frame(data: &[u8], pos: &mut usize) -> RedisResult<Option<Reply>> {
    let line = match read_line(data, pos)? {
        Some(line) => line,
        None => return Ok(None),
    };
    if line.is_empty() {
        return Err(protocol("empty frame header"));
    }

    let payload = &line[1..];
    match line[0] {
        b'+' => Ok(Some(Reply::Status(text_of(payload)))),
        b'-' => Ok(Some(Reply::Error(text_of(payload)))),
        b':' => Ok(Some(Reply::Integer(parse_i64(payload)?))),
        b'$' => parse_bulk(data, pos, parse_i64(payload)?),
        b'*' => parse_array(data, pos, parse_i64(payload)?),
        other => Err(protocol(&format!(
            "unrecognized reply type byte 0x{:02x}",
            other
        ))),
    }
}

fn parse_bulk(data: &[u8], pos: &mut usize, len: i64) -> RedisResult<Option<Reply>> {
    if len < 0 {
        return Ok(Some(Reply::Nil));
    }
    let len = len as usize;
    if data.len() - *pos < len + 2 {
        return Ok(None);
    }
    let payload = data[*pos..*pos + len].to_vec();
    if &data[*pos + len..*pos + len + 2] != b"\r\n" {
        return Err(protocol("bulk payload missing CRLF terminator"));
    }
    *pos += len + 2;
    Ok(Some(Reply::Bulk(payload)))
}

fn parse_array(data: &[u8], pos: &mut usize, len: i64) -> RedisResult<Option<Reply>> {
    if len < 0 {
        return Ok(Some(Reply::Nil));
    }
    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        match parse_frame(data, pos)? {
            Some(child) => items.push(child),
            None => return Ok(None),
        }
    }
    Ok(Some(Reply::Array(items)))
}

/// Reads one CRLF-terminated line starting at `pos`, excluding the CRLF.
fn read_line<'a>(data: &'a [u8], pos: &mut usize) -> RedisResult<Option<&'a [u8]>> {
    let rest = &data[*pos..];
    let newline = match rest.iter().position(|&b| b == b'\n') {
        Some(idx) => idx,
        None => return Ok(None),
    };
    if newline == 0 || rest[newline - 1] != b'\r' {
        return Err(protocol("line missing CR before LF"));
    }
    *pos += newline + 1;
    Ok(Some(&rest[..newline - 1]))
}

fn parse_i64(data: &[u8]) -> RedisResult<i64> {
    if data.is_empty() {
        return Err(protocol("empty integer field"));
    }
    let (negative, digits) = match data[0] {
        b'-' => (true, &data[1..]),
        _ => (false, data),
    };
    if digits.is_empty() {
        return Err(protocol("integer field with no digits"));
    }
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(protocol("non-digit in integer field"));
        }
        value = value
            .saturating_mul(10)
            .saturating_add((b - b'0') as i64);
    }
    Ok(if negative { -value } else { value })
}

fn text_of(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

fn protocol(message: &str) -> RedisError {
    RedisError::Protocol(message.to_string())
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}
