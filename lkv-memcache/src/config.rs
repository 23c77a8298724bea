//! # Server-List Configuration
//!
//! Purpose: Hold the ordered memcached server list and validate it before the
//! client opens any socket.

use std::fmt::Write;
use std::net::SocketAddr;

use crate::error::{MemcacheError, MemcacheResult};

/// Ordered list of memcached servers.
#[derive(Debug, Clone, Default)]
pub struct MemcacheConfig {
    servers: Vec<SocketAddr>,
}

impl MemcacheConfig {
    pub fn new() -> Self {
        MemcacheConfig::default()
    }

    pub fn with_servers(servers: impl IntoIterator<Item = SocketAddr>) -> Self {
        let mut config = MemcacheConfig::new();
        config.add_servers(servers);
        config
    }

    pub fn add_server(&mut self, server: SocketAddr) {
        self.servers.push(server);
    }

    pub fn add_servers(&mut self, servers: impl IntoIterator<Item = SocketAddr>) {
        self.servers.extend(servers);
    }

    pub fn servers(&self) -> &[SocketAddr] {
        &self.servers
    }

    pub fn has_any_servers(&self) -> bool {
        !self.servers.is_empty()
    }

    /// Renders the `--SERVER=host:port` configuration string, validating the
    /// list first.
    pub fn to_config_string(&self) -> MemcacheResult<String> {
        if self.servers.is_empty() {
            return Err(MemcacheError::Configuration(
                "no servers are configured".into(),
            ));
        }
        let mut out = String::new();
        for (idx, server) in self.servers.iter().enumerate() {
            if server.port() == 0 {
                return Err(MemcacheError::Configuration(format!(
                    "server {} has no port",
                    server.ip()
                )));
            }
            if idx > 0 {
                out.push(' ');
            }
            // SocketAddr renders "ip:port"; write! to a String cannot fail.
            let _ = write!(out, "--SERVER={}:{}", server.ip(), server.port());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> SocketAddr {
        text.parse().unwrap()
    }

    #[test]
    fn renders_server_list_in_order() {
        let config = MemcacheConfig::with_servers([
            addr("127.0.0.1:11211"),
            addr("10.0.0.2:11212"),
        ]);
        assert_eq!(
            config.to_config_string().unwrap(),
            "--SERVER=127.0.0.1:11211 --SERVER=10.0.0.2:11212"
        );
    }

    #[test]
    fn empty_list_is_configuration_error() {
        let config = MemcacheConfig::new();
        assert!(!config.has_any_servers());
        assert!(matches!(
            config.to_config_string(),
            Err(MemcacheError::Configuration(_))
        ));
    }

    #[test]
    fn zero_port_is_configuration_error() {
        let config = MemcacheConfig::with_servers([addr("127.0.0.1:0")]);
        assert!(matches!(
            config.to_config_string(),
            Err(MemcacheError::Configuration(_))
        ));
    }
}
