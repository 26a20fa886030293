//! Replay Server
//!
//! Streams a previously captured session log to viewers, independent of
//! any live program. Each connection gets its own cursor: frames advance
//! at a fixed interval while the client-controlled `replay-running` flag
//! is set, and when the last frame is reached it is re-sent indefinitely
//! rather than stopping or looping back.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use crate::broadcast::message::{ClientMessage, ServerMessage};
use crate::broadcast::server::try_bind_port;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

// =============================================================================
// Configuration
// =============================================================================

/// Replay server settings
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub host: String,
    pub port: u16,
    /// Delay between frames
    pub interval: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8120,
            interval: Duration::from_millis(300),
        }
    }
}

// =============================================================================
// Per-Connection Cursor
// =============================================================================

/// Frame position of one replay connection
#[derive(Debug)]
struct ReplayCursor {
    idx: usize,
    running: bool,
}

impl ReplayCursor {
    fn new() -> Self {
        Self {
            idx: 0,
            running: true,
        }
    }

    fn current(&self) -> usize {
        self.idx
    }

    fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Step to the next frame if running, holding on the final frame
    /// forever once it is reached.
    fn advance(&mut self, frame_count: usize) {
        if self.running {
            self.idx += 1;
        }
        if self.idx >= frame_count {
            self.idx = frame_count.saturating_sub(1);
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Handle of a running replay server
pub struct ReplayServer {
    port: u16,
}

impl ReplayServer {
    /// Bind and start serving `frames` to every connecting viewer.
    ///
    /// Each connection runs on its own thread with independent cursor
    /// state, so two viewers can be paused at different positions.
    pub fn start(frames: Vec<Vec<u8>>, config: ReplayConfig) -> Result<Self> {
        let (listener, port) = try_bind_port(&config.host, config.port, MAX_PORT_RETRIES)?;
        let frames = Arc::new(frames);
        let interval = config.interval;

        std::thread::spawn(move || {
            loop {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        crate::debug!("replay"; "viewer connected: {}", addr);
                        let frames = Arc::clone(&frames);
                        std::thread::spawn(move || {
                            serve_client(stream, &frames, interval);
                        });
                    }
                    Err(e) => {
                        crate::log!("replay"; "accept error: {}", e);
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
        });

        crate::log!("replay"; "serving captured session at ws://{}:{}/", config.host, port);
        Ok(Self { port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Stream frames to one viewer until it disconnects
fn serve_client(stream: TcpStream, frames: &[Vec<u8>], interval: Duration) {
    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            crate::log!("replay"; "handshake failed: {}", e);
            return;
        }
    };

    if ws
        .send(Message::Text(ServerMessage::init_replay().to_json().into()))
        .is_err()
    {
        return;
    }
    let _ = ws.get_ref().set_nonblocking(true);

    let mut cursor = ReplayCursor::new();
    loop {
        if !frames.is_empty() {
            let frame = String::from_utf8_lossy(&frames[cursor.current()]).into_owned();
            if ws.send(Message::Text(frame.into())).is_err() {
                crate::debug!("replay"; "viewer disconnected");
                return;
            }
        }

        if !drain_input(&mut ws, &mut cursor) {
            return;
        }

        std::thread::sleep(interval);
        cursor.advance(frames.len());
    }
}

/// Process pending control messages; false means the connection is gone
fn drain_input(ws: &mut WebSocket<TcpStream>, cursor: &mut ReplayCursor) -> bool {
    loop {
        match ws.read() {
            Ok(Message::Text(text)) => match ClientMessage::from_json(&text) {
                Ok(ClientMessage::ReplayRunning { data }) => {
                    crate::debug!("replay"; "running = {}", data);
                    cursor.set_running(data);
                }
                Ok(_) => {}
                Err(e) => {
                    crate::log!("replay"; "bad client message ({}), closing", e);
                    let _ = ws.close(None);
                    return false;
                }
            },
            Ok(Message::Close(_)) => return false,
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return true;
            }
            Err(_) => return false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
