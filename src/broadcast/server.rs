//! WebSocket Listener
//!
//! Binds the viewer-facing TCP listener and hands accepted streams to the
//! broadcast actor via channel. The accept thread never touches shared
//! state; the actor performs the WebSocket handshake.

use std::net::TcpListener;

use anyhow::Result;

use crate::broadcast::actor::ConnMsg;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Start the accept loop, forwarding raw streams to the actor.
///
/// Returns the actually bound port (the requested port may be taken, in
/// which case the next free one within the retry window is used).
pub fn start_listener(
    host: &str,
    base_port: u16,
    conn_tx: tokio::sync::mpsc::Sender<ConnMsg>,
) -> Result<u16> {
    let (listener, actual_port) = try_bind_port(host, base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;

    std::thread::spawn(move || {
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    crate::debug!("server"; "viewer connected: {}", addr);

                    // Handshake runs blocking inside the actor
                    let _ = stream.set_nonblocking(false);

                    if conn_tx.blocking_send(ConnMsg::Accept(stream)).is_err() {
                        crate::debug!("server"; "actor gone, stopping accept loop");
                        break;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                Err(e) => {
                    crate::log!("server"; "accept error: {}", e);
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
        }
    });

    Ok(actual_port)
}

/// Try binding to a port, retrying with incremented ports while in use
pub(crate) fn try_bind_port(
    host: &str,
    base_port: u16,
    max_retries: u16,
) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(format!("{host}:{port}")) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind listener after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}
