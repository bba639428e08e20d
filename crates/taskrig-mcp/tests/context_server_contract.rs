//! Spawns the `context-server` subcommand and speaks its newline-delimited
//! JSON protocol over the Unix socket, the way a sibling MCP process would.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

fn roundtrip(stream: &mut UnixStream, req: serde_json::Value) -> serde_json::Value {
    let mut line = req.to_string();
    line.push('\n');
    stream.write_all(line.as_bytes()).expect("write request");
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut resp = String::new();
    reader.read_line(&mut resp).expect("read response");
    serde_json::from_str(&resp).expect("parse response json")
}

#[test]
fn context_server_holds_state_across_connections() {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket = dir.path().join("ctx.sock");

    let bin = assert_cmd::cargo::cargo_bin!("taskrig");
    let mut child = std::process::Command::new(bin)
        .args(["context-server", "--socket"])
        .arg(&socket)
        .spawn()
        .expect("spawn context server");

    // Wait for the listener to come up.
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut stream = loop {
        match UnixStream::connect(&socket) {
            Ok(s) => break s,
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(50))
            }
            Err(e) => {
                let _ = child.kill();
                panic!("context server never came up: {e}");
            }
        }
    };

    let v = roundtrip(
        &mut stream,
        serde_json::json!({"op": "add_search", "query": "q1", "result_count": 4}),
    );
    assert_eq!(v["ok"].as_bool(), Some(true));
    let v = roundtrip(
        &mut stream,
        serde_json::json!({"op": "add_fetch", "url": "https://x.example/", "content_length": 120}),
    );
    assert_eq!(v["ok"].as_bool(), Some(true));
    drop(stream);

    // Fresh connection sees the same episode: the state lives in the server,
    // not in the connection.
    let mut stream = UnixStream::connect(&socket).expect("reconnect");
    let v = roundtrip(
        &mut stream,
        serde_json::json!({"op": "snapshot", "recent_limit": 10}),
    );
    assert_eq!(v["ok"].as_bool(), Some(true));
    let snap = &v["snapshot"];
    assert_eq!(snap["search_count"].as_u64(), Some(1));
    assert_eq!(snap["fetch_count"].as_u64(), Some(1));
    assert_eq!(snap["recent_searches"][0]["query"].as_str(), Some("q1"));

    let v = roundtrip(&mut stream, serde_json::json!({"op": "reset"}));
    assert_eq!(v["ok"].as_bool(), Some(true));
    let v = roundtrip(
        &mut stream,
        serde_json::json!({"op": "snapshot", "recent_limit": 10}),
    );
    assert_eq!(v["snapshot"]["search_count"].as_u64(), Some(0));

    let _ = child.kill();
    let _ = child.wait();
}
