//! Tests for streaming a captured log back over a real socket.

use std::net::TcpStream;
use std::time::Duration;

use serde_json::Value;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;
use tungstenite::stream::MaybeTlsStream;

use spyglass::{ReplayConfig, ReplayServer, SessionLog, read_log};

type Client = WebSocket<MaybeTlsStream<TcpStream>>;

fn connect(port: u16) -> Client {
    let (ws, _) = tungstenite::connect(format!("ws://127.0.0.1:{port}/")).unwrap();
    if let MaybeTlsStream::Plain(stream) = ws.get_ref() {
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
    }
    ws
}

fn next_json(ws: &mut Client) -> Value {
    loop {
        match ws.read().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

fn start_replay(frames: &[&str]) -> ReplayServer {
    let config = ReplayConfig {
        port: 0,
        interval: Duration::from_millis(30),
        ..ReplayConfig::default()
    };
    let frames = frames.iter().map(|f| f.as_bytes().to_vec()).collect();
    ReplayServer::start(frames, config).unwrap()
}

#[test]
fn test_replay_announces_itself_and_streams_in_order() {
    let server = start_replay(&[r#"{"seq":0}"#, r#"{"seq":1}"#, r#"{"seq":2}"#]);
    let mut client = connect(server.port());

    let init = next_json(&mut client);
    assert_eq!(init["type"], "init");
    assert_eq!(init["data"]["type"], "replay");
    assert!(init["data"]["version"].is_string());

    for expected in 0..3 {
        assert_eq!(next_json(&mut client)["seq"], expected);
    }

    // The final frame is held, neither looping nor closing
    assert_eq!(next_json(&mut client)["seq"], 2);
    assert_eq!(next_json(&mut client)["seq"], 2);
}

#[test]
fn test_replay_is_deterministic_across_connections() {
    let server = start_replay(&[r#"{"seq":0}"#, r#"{"seq":1}"#, r#"{"seq":2}"#]);

    let collect = |port| {
        let mut client = connect(port);
        let _init = next_json(&mut client);
        (0..3).map(|_| next_json(&mut client)).collect::<Vec<_>>()
    };

    let first = collect(server.port());
    let second = collect(server.port());
    assert_eq!(first, second);
}

#[test]
fn test_replay_pause_freezes_cursor() {
    // Enough frames that the pause always lands before the end of the log
    let frames: Vec<Vec<u8>> = (0..200)
        .map(|i| format!(r#"{{"seq":{i}}}"#).into_bytes())
        .collect();
    let server = ReplayServer::start(
        frames,
        ReplayConfig {
            port: 0,
            interval: Duration::from_millis(30),
            ..ReplayConfig::default()
        },
    )
    .unwrap();
    let mut client = connect(server.port());
    let _init = next_json(&mut client);
    assert_eq!(next_json(&mut client)["seq"], 0);

    client
        .send(Message::Text(
            r#"{"type":"replay-running","data":false}"#.into(),
        ))
        .unwrap();

    // Once the pause lands the stream settles on a single repeated frame
    let mut held = next_json(&mut client);
    let mut repeats = 0;
    for _ in 0..100 {
        let frame = next_json(&mut client);
        if frame == held {
            repeats += 1;
            if repeats >= 5 {
                break;
            }
        } else {
            held = frame;
            repeats = 0;
        }
    }
    assert!(repeats >= 5, "stream never settled after pause");
    assert!(held["seq"].as_i64().unwrap() < 199);

    client
        .send(Message::Text(
            r#"{"type":"replay-running","data":true}"#.into(),
        ))
        .unwrap();
    let resumed = loop {
        let frame = next_json(&mut client);
        if frame != held {
            break frame;
        }
    };
    assert!(resumed["seq"].as_i64().unwrap() > held["seq"].as_i64().unwrap());
}

#[test]
fn test_log_file_round_trips_through_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.log");

    let mut log = SessionLog::new(true);
    log.append(br#"{"seq":0}"#);
    log.append(br#"{"seq":1}"#);
    log.write_to(&path).unwrap();

    let frames = read_log(&path).unwrap();
    let server = ReplayServer::start(
        frames,
        ReplayConfig {
            port: 0,
            interval: Duration::from_millis(30),
            ..ReplayConfig::default()
        },
    )
    .unwrap();

    let mut client = connect(server.port());
    let _init = next_json(&mut client);
    assert_eq!(next_json(&mut client)["seq"], 0);
    assert_eq!(next_json(&mut client)["seq"], 1);
}
