//! Exercises the async client against a local Redis server.
//!
//! Run `redis-server` on the default port first, then:
//! `cargo run --bin redis-demo`

use std::time::Duration;

use anyhow::{Context, Result};
use lkv_redis::{LoopThread, RedisClient, Subscription, SubscriptionHandler};
use tracing::info;

struct Printer;

impl SubscriptionHandler for Printer {
    fn on_started(&mut self) {
        info!("subscription started");
    }

    fn on_message(&mut self, message: lkv_redis::Reply) {
        info!(message = %message.pprint(), "pubsub message");
    }

    fn on_stopped(&mut self) {
        info!("subscription stopped");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let event_loop = LoopThread::spawn().context("starting event loop")?;
    let client = RedisClient::connect(&event_loop.handle(), "127.0.0.1", 6379)
        .wait()
        .context("connecting to redis")?;
    info!(host = client.host(), port = client.port(), "connected");

    let reply = client.set("demo:key", "hello").wait()?;
    info!(reply = %reply.pprint(), "SET demo:key");

    let reply = client.get("demo:key").wait()?;
    info!(reply = %reply.pprint(), "GET demo:key");

    client.del("demo:counter").wait()?;
    let reply = client.incr_by("demo:counter", 41).wait()?;
    info!(reply = %reply.pprint(), "INCRBY demo:counter 41");
    let reply = client.incr("demo:counter").wait()?;
    info!(reply = %reply.pprint(), "INCR demo:counter");

    client
        .mset([("demo:a", "1"), ("demo:b", "2")])
        .wait()?;
    let reply = client.mget(["demo:a", "demo:b", "demo:absent"]).wait()?;
    info!(reply = %reply.pprint(), "MGET");

    let subscription: Subscription = client.subscribe(Box::new(Printer), "demo:channel")?;
    info!(channel = subscription.channel(), "listening; PUBLISH something to it");
    std::thread::sleep(Duration::from_secs(5));
    subscription.stop()?;

    client.disconnect().wait()?;
    event_loop.stop()?;
    event_loop.join();
    Ok(())
}
