//! Drives both server variants end to end over real TCP sockets.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use wordsearch::config::Config;
use wordsearch::corpus::WordIndex;
use wordsearch::server::{self, Shared};

fn fixture_index() -> WordIndex {
    WordIndex::build(
        ["hello", "hallo", "world", "hell", "shell"]
            .into_iter()
            .map(String::from)
            .collect(),
    )
}

fn read_response(stream: &TcpStream) -> Vec<String> {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).expect("read response line");
        if n == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        let done = line == "END";
        lines.push(line);
        if done {
            break;
        }
    }
    lines
}

#[test]
fn basic_server_serves_find_and_rejects_mode_override() {
    let cfg = Config {
        port: 18181,
        ..Config::default()
    };
    let shared = Shared::new(fixture_index(), cfg, false, false);
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shared = Arc::clone(&shared);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            let _ = server::basic::run(shared, "127.0.0.1", 18181, None, shutdown);
        });
    }
    std::thread::sleep(Duration::from_millis(200));

    // The basic server serves exactly one request per connection, so each
    // request below opens its own socket.
    let mut stream = TcpStream::connect("127.0.0.1:18181").expect("connect to basic server");
    stream.write_all(b"FIND h?llo\n").unwrap();
    let lines = read_response(&stream);
    assert_eq!(lines[0], "200 OK 2");
    assert!(lines.contains(&"hello".to_string()));

    let mut stream = TcpStream::connect("127.0.0.1:18181").expect("connect to basic server");
    stream.write_all(b"FIND hello --mode partial\n").unwrap();
    let lines = read_response(&stream);
    assert_eq!(lines[0], "400 BAD-REQUEST mode not supported");

    let mut stream = TcpStream::connect("127.0.0.1:18181").expect("connect to basic server");
    stream.write_all(b"FIND hello --mode exact\n").unwrap();
    let lines = read_response(&stream);
    assert_eq!(lines[0], "200 OK 1");

    let mut stream = TcpStream::connect("127.0.0.1:18181").expect("connect to basic server");
    stream.write_all(b"QUIT\n").unwrap();
    let lines = read_response(&stream);
    assert_eq!(lines[0], "200 OK 0");

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
}

#[test]
fn threaded_server_serves_batch_and_mode_override() {
    let cfg = Config {
        port: 18182,
        max_workers: 4,
        ..Config::default()
    };
    let shared = Shared::new(fixture_index(), cfg, true, true);
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shared = Arc::clone(&shared);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            let _ = server::threaded::run(shared, "127.0.0.1", 18182, None, shutdown);
        });
    }
    std::thread::sleep(Duration::from_millis(200));

    let mut stream = TcpStream::connect("127.0.0.1:18182").expect("connect to threaded server");
    stream.write_all(b"BATCH [\"hello\",\"world\"]\n").unwrap();
    let lines = read_response(&stream);
    assert_eq!(lines[0], "200 OK 2");
    assert!(lines.contains(&"COUNT 0 1".to_string()));
    assert!(lines.contains(&"COUNT 1 1".to_string()));

    stream
        .write_all(b"FIND ell --mode partial\n")
        .unwrap();
    let lines = read_response(&stream);
    assert_eq!(lines[0], "200 OK 3");

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
}
