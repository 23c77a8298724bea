//! Integration tests for pub/sub subscriptions against a scripted server.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::Duration;

use lkv_redis::{
    LoopThread, RedisClient, RedisError, Reply, SubscriptionError, SubscriptionHandler,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    line
}

fn read_command(reader: &mut BufReader<TcpStream>) -> Vec<String> {
    let header = read_line(reader);
    assert!(header.starts_with('*'), "expected array header, got {header:?}");
    let count: usize = header[1..].parse().unwrap();
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let len_line = read_line(reader);
        let len: usize = len_line[1..].parse().unwrap();
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data).unwrap();
        data.truncate(len);
        args.push(String::from_utf8(data).unwrap());
    }
    args
}

/// Writes an array of bulk strings, with `:n` entries for `int:` prefixes.
fn write_push(reader: &mut BufReader<TcpStream>, items: &[&str]) {
    let mut out = format!("*{}\r\n", items.len());
    for item in items {
        if let Some(n) = item.strip_prefix("int:") {
            out.push_str(&format!(":{n}\r\n"));
        } else {
            out.push_str(&format!("${}\r\n{item}\r\n", item.len()));
        }
    }
    reader.get_mut().write_all(out.as_bytes()).unwrap();
}

/// Records lifecycle callbacks onto a channel the test can block on.
struct Recorder {
    events: Sender<String>,
}

impl SubscriptionHandler for Recorder {
    fn on_started(&mut self) {
        let _ = self.events.send("started".into());
    }

    fn on_message(&mut self, message: Reply) {
        let items = message.get_array().unwrap();
        let payload = String::from_utf8(items[2].get_string().unwrap().to_vec()).unwrap();
        let _ = self.events.send(format!("message:{payload}"));
    }

    fn on_stopped(&mut self) {
        let _ = self.events.send("stopped".into());
    }
}

fn recorder() -> (Box<Recorder>, Receiver<String>) {
    let (tx, rx) = channel();
    (Box::new(Recorder { events: tx }), rx)
}

fn expect_event(events: &Receiver<String>, want: &str) {
    assert_eq!(events.recv_timeout(EVENT_TIMEOUT).unwrap(), want);
}

#[test]
fn full_subscription_lifecycle() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    // The server holds the unsubscribe confirmation until released, so the
    // test can race stop() calls deterministically.
    let (release_tx, release_rx) = channel::<()>();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);

        assert_eq!(read_command(&mut reader), ["SUBSCRIBE", "news"]);
        write_push(&mut reader, &["subscribe", "news", "int:1"]);
        write_push(&mut reader, &["message", "news", "first"]);

        assert_eq!(read_command(&mut reader), ["UNSUBSCRIBE", "news"]);
        release_rx.recv().unwrap();
        // A message that raced the unsubscribe: must be suppressed.
        write_push(&mut reader, &["message", "news", "late"]);
        write_push(&mut reader, &["unsubscribe", "news", "int:0"]);

        let mut rest = Vec::new();
        let _ = reader.get_mut().read_to_end(&mut rest);
    });

    let event_loop = LoopThread::spawn().expect("loop");
    let client = RedisClient::connect(&event_loop.handle(), "127.0.0.1", port)
        .wait()
        .expect("connect");

    let (handler, events) = recorder();
    let subscription = client.subscribe(handler, "news").unwrap();
    assert_eq!(subscription.channel(), "news");
    expect_event(&events, "started");
    expect_event(&events, "message:first");
    assert!(subscription.is_alive());

    // Only one live subscription per connection.
    let (second, _events2) = recorder();
    assert!(matches!(
        client.subscribe(second, "other"),
        Err(RedisError::Subscription(SubscriptionError::AlreadySubscribed))
    ));

    // First stop wins; the confirmation has not arrived yet, so a second
    // stop observes the stopping state.
    subscription.stop().unwrap();
    assert!(matches!(
        subscription.stop(),
        Err(RedisError::Subscription(SubscriptionError::AlreadyStopping))
    ));
    release_tx.send(()).unwrap();

    // The late message is dropped; the next event is the stop itself.
    expect_event(&events, "stopped");
    assert!(!subscription.is_alive());
    assert!(matches!(
        subscription.stop(),
        Err(RedisError::Subscription(SubscriptionError::NotActive))
    ));

    client.disconnect().wait().unwrap();
    server.join().unwrap();
    event_loop.stop().unwrap();
    event_loop.join();
}

#[test]
fn teardown_finalizes_live_subscription() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        assert_eq!(read_command(&mut reader), ["SUBSCRIBE", "news"]);
        write_push(&mut reader, &["subscribe", "news", "int:1"]);
        let mut rest = Vec::new();
        let _ = reader.get_mut().read_to_end(&mut rest);
    });

    let event_loop = LoopThread::spawn().expect("loop");
    let client = RedisClient::connect(&event_loop.handle(), "127.0.0.1", port)
        .wait()
        .expect("connect");

    let (handler, events) = recorder();
    let subscription = client.subscribe(handler, "news").unwrap();
    expect_event(&events, "started");

    // Disconnecting without stopping releases the handler.
    client.disconnect().wait().unwrap();
    expect_event(&events, "stopped");
    assert!(!subscription.is_alive());

    server.join().unwrap();
    event_loop.stop().unwrap();
    event_loop.join();
}

#[test]
fn replacement_survives_late_unsubscribe_confirm() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    // The server withholds the first channel's unsubscribe confirmation
    // until after the replacement SUBSCRIBE has been read.
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);

        assert_eq!(read_command(&mut reader), ["SUBSCRIBE", "first"]);
        write_push(&mut reader, &["subscribe", "first", "int:1"]);
        assert_eq!(read_command(&mut reader), ["UNSUBSCRIBE", "first"]);
        assert_eq!(read_command(&mut reader), ["SUBSCRIBE", "second"]);

        write_push(&mut reader, &["unsubscribe", "first", "int:0"]);
        write_push(&mut reader, &["subscribe", "second", "int:1"]);
        write_push(&mut reader, &["message", "second", "fresh"]);
        let mut rest = Vec::new();
        let _ = reader.get_mut().read_to_end(&mut rest);
    });

    let event_loop = LoopThread::spawn().expect("loop");
    let client = RedisClient::connect(&event_loop.handle(), "127.0.0.1", port)
        .wait()
        .expect("connect");

    let (handler, first_events) = recorder();
    let first = client.subscribe(handler, "first").unwrap();
    expect_event(&first_events, "started");
    first.stop().unwrap();

    // Replace before the unsubscribe confirmation has arrived. The late
    // confirmation must finalize the old subscription, not this one.
    let (handler, second_events) = recorder();
    let second = client.subscribe(handler, "second").unwrap();

    expect_event(&first_events, "stopped");
    expect_event(&second_events, "started");
    expect_event(&second_events, "message:fresh");
    assert!(second.is_alive());
    assert!(!first.is_alive());

    client.disconnect().wait().unwrap();
    expect_event(&second_events, "stopped");
    server.join().unwrap();
    event_loop.stop().unwrap();
    event_loop.join();
}

#[test]
fn resubscribing_same_channel_before_confirm() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);

        assert_eq!(read_command(&mut reader), ["SUBSCRIBE", "news"]);
        write_push(&mut reader, &["subscribe", "news", "int:1"]);
        assert_eq!(read_command(&mut reader), ["UNSUBSCRIBE", "news"]);
        assert_eq!(read_command(&mut reader), ["SUBSCRIBE", "news"]);

        // Confirmations arrive in command order: the unsubscribe belongs to
        // the old subscription, the subscribe to its replacement.
        write_push(&mut reader, &["unsubscribe", "news", "int:0"]);
        write_push(&mut reader, &["subscribe", "news", "int:1"]);
        write_push(&mut reader, &["message", "news", "again"]);
        let mut rest = Vec::new();
        let _ = reader.get_mut().read_to_end(&mut rest);
    });

    let event_loop = LoopThread::spawn().expect("loop");
    let client = RedisClient::connect(&event_loop.handle(), "127.0.0.1", port)
        .wait()
        .expect("connect");

    let (handler, first_events) = recorder();
    let first = client.subscribe(handler, "news").unwrap();
    expect_event(&first_events, "started");
    first.stop().unwrap();

    let (handler, second_events) = recorder();
    let second = client.subscribe(handler, "news").unwrap();

    expect_event(&first_events, "stopped");
    expect_event(&second_events, "started");
    expect_event(&second_events, "message:again");
    assert!(second.is_alive());

    client.disconnect().wait().unwrap();
    expect_event(&second_events, "stopped");
    server.join().unwrap();
    event_loop.stop().unwrap();
    event_loop.join();
}

#[test]
fn replacing_a_stopped_subscription_is_allowed() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);

        assert_eq!(read_command(&mut reader), ["SUBSCRIBE", "first"]);
        write_push(&mut reader, &["subscribe", "first", "int:1"]);
        assert_eq!(read_command(&mut reader), ["UNSUBSCRIBE", "first"]);
        write_push(&mut reader, &["unsubscribe", "first", "int:0"]);

        assert_eq!(read_command(&mut reader), ["SUBSCRIBE", "second"]);
        write_push(&mut reader, &["subscribe", "second", "int:1"]);
        let mut rest = Vec::new();
        let _ = reader.get_mut().read_to_end(&mut rest);
    });

    let event_loop = LoopThread::spawn().expect("loop");
    let client = RedisClient::connect(&event_loop.handle(), "127.0.0.1", port)
        .wait()
        .expect("connect");

    let (handler, events) = recorder();
    let first = client.subscribe(handler, "first").unwrap();
    expect_event(&events, "started");
    first.stop().unwrap();
    expect_event(&events, "stopped");

    let (handler, events) = recorder();
    let second = client.subscribe(handler, "second").unwrap();
    expect_event(&events, "started");
    assert!(second.is_alive());

    client.disconnect().wait().unwrap();
    expect_event(&events, "stopped");
    server.join().unwrap();
    event_loop.stop().unwrap();
    event_loop.join();
}
