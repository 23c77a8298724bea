//! Exercises the blocking memcache client against a local memcached server.
//!
//! Run `memcached` on the default port first, then:
//! `cargo run --bin memcache-demo`

use std::time::Duration;

use anyhow::{Context, Result};
use lkv_memcache::{MemcacheConfig, MemcacheSyncClient};
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = MemcacheConfig::with_servers(["127.0.0.1:11211".parse()?]);
    info!(config = %config.to_config_string()?, "configured");

    let mut client = MemcacheSyncClient::new(config);
    client.connect().context("connecting to memcached")?;

    match client.get("foo")? {
        Some(value) => info!(value = %String::from_utf8_lossy(&value), "GET foo"),
        None => info!("GET foo: miss"),
    }

    client.set("foo", b"bar", Duration::from_secs(60))?;
    info!("SET foo = bar");

    match client.get("foo")? {
        Some(value) => info!(value = %String::from_utf8_lossy(&value), "GET foo"),
        None => info!("GET foo: miss"),
    }

    client.disconnect();
    Ok(())
}
