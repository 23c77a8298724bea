//! # Blocking Memcache Client
//!
//! Purpose: Speak the memcached text protocol synchronously over a single TCP
//! connection picked from the configured server list.
//!
//! ## Design Principles
//! 1. **One Command In Flight**: Every call writes a full request and reads a
//!    full response before returning.
//! 2. **Invalidate On IO Failure**: A read or write error drops the
//!    connection; the next call must reconnect.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::MemcacheConfig;
use crate::error::{MemcacheError, MemcacheResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const IO_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_KEY_LEN: usize = 250;

struct Conn {
    reader: BufReader<TcpStream>,
}

impl Conn {
    fn stream(&mut self) -> &mut TcpStream {
        self.reader.get_mut()
    }

    fn read_line(&mut self) -> MemcacheResult<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(MemcacheError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}

/// Blocking memcached client over one TCP connection.
pub struct MemcacheSyncClient {
    config: MemcacheConfig,
    conn: Option<Conn>,
}

impl MemcacheSyncClient {
    pub fn new(config: MemcacheConfig) -> Self {
        MemcacheSyncClient { config, conn: None }
    }

    pub fn config(&self) -> &MemcacheConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Connects to the first reachable configured server.
    pub fn connect(&mut self) -> MemcacheResult<()> {
        if self.conn.is_some() {
            return Err(MemcacheError::AlreadyConnected);
        }
        // Validates the server list before touching the network.
        let rendered = self.config.to_config_string()?;
        debug!(config = %rendered, "connecting");

        for server in self.config.servers() {
            match TcpStream::connect_timeout(server, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(Some(IO_TIMEOUT))?;
                    stream.set_write_timeout(Some(IO_TIMEOUT))?;
                    debug!(%server, "connected");
                    self.conn = Some(Conn {
                        reader: BufReader::new(stream),
                    });
                    return Ok(());
                }
                Err(err) => {
                    warn!(%server, %err, "server unreachable");
                }
            }
        }
        Err(MemcacheError::Connection(
            "no configured server accepted the connection".into(),
        ))
    }

    pub fn disconnect(&mut self) {
        self.conn = None;
    }

    /// Fetches a value; `None` when the key is absent.
    pub fn get(&mut self, key: &str) -> MemcacheResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let result = self.get_inner(key);
        if matches!(result, Err(MemcacheError::Io(_) | MemcacheError::Protocol(_))) {
            self.conn = None;
        }
        result
    }

    /// Stores a value with a relative expiry.
    pub fn set(&mut self, key: &str, value: &[u8], ttl: Duration) -> MemcacheResult<()> {
        validate_key(key)?;
        let result = self.set_inner(key, value, ttl);
        if matches!(result, Err(MemcacheError::Io(_) | MemcacheError::Protocol(_))) {
            self.conn = None;
        }
        result
    }

    fn get_inner(&mut self, key: &str) -> MemcacheResult<Option<Vec<u8>>> {
        let conn = self.require_conn()?;
        let request = format!("get {key}\r\n");
        conn.stream().write_all(request.as_bytes())?;

        let header = conn.read_line()?;
        if header == "END" {
            return Ok(None);
        }
        let len = parse_value_header(&header, key)?;

        let mut value = vec![0u8; len];
        conn.reader.read_exact(&mut value)?;
        expect_line(conn, "")?;
        expect_line(conn, "END")?;
        Ok(Some(value))
    }

    fn set_inner(&mut self, key: &str, value: &[u8], ttl: Duration) -> MemcacheResult<()> {
        let conn = self.require_conn()?;
        let request = format!("set {key} 0 {} {}\r\n", ttl.as_secs(), value.len());
        conn.stream().write_all(request.as_bytes())?;
        conn.stream().write_all(value)?;
        conn.stream().write_all(b"\r\n")?;

        let line = conn.read_line()?;
        if line == "STORED" {
            Ok(())
        } else {
            Err(MemcacheError::Protocol(format!(
                "set was not stored: {line}"
            )))
        }
    }

    fn require_conn(&mut self) -> MemcacheResult<&mut Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| MemcacheError::Connection("client is not connected".into()))
    }
}

/// Parses `VALUE <key> <flags> <len>` and returns the data length.
fn parse_value_header(header: &str, key: &str) -> MemcacheResult<usize> {
    let mut parts = header.split_whitespace();
    if parts.next() != Some("VALUE") {
        return Err(MemcacheError::Protocol(format!(
            "unexpected response line: {header}"
        )));
    }
    if parts.next() != Some(key) {
        return Err(MemcacheError::Protocol(format!(
            "response names a different key: {header}"
        )));
    }
    let _flags = parts
        .next()
        .ok_or_else(|| MemcacheError::Protocol(format!("truncated VALUE line: {header}")))?;
    parts
        .next()
        .and_then(|len| len.parse::<usize>().ok())
        .ok_or_else(|| MemcacheError::Protocol(format!("bad length in VALUE line: {header}")))
}

fn expect_line(conn: &mut Conn, want: &str) -> MemcacheResult<()> {
    let line = conn.read_line()?;
    if line == want {
        Ok(())
    } else {
        Err(MemcacheError::Protocol(format!(
            "expected {want:?}, got {line:?}"
        )))
    }
}

fn validate_key(key: &str) -> MemcacheResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(MemcacheError::Configuration(format!(
            "key length must be 1..={MAX_KEY_LEN} bytes"
        )));
    }
    if key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(MemcacheError::Configuration(
            "key must not contain whitespace or control bytes".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_header_parses_length() {
        assert_eq!(parse_value_header("VALUE foo 0 5", "foo").unwrap(), 5);
    }

    #[test]
    fn value_header_rejects_other_keys() {
        assert!(matches!(
            parse_value_header("VALUE bar 0 5", "foo"),
            Err(MemcacheError::Protocol(_))
        ));
    }

    #[test]
    fn keys_with_spaces_are_rejected() {
        assert!(validate_key("has space").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("ok_key").is_ok());
    }
}
