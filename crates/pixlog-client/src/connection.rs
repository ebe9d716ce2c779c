//! Framed duplex connection to the viewer server.
//!
//! A [`Connection`] owns the write half of a TCP stream directly and runs a
//! background task that decodes inbound frames from the read half. The only
//! frames a server sends are the `Version` handshake and the `Close`
//! acknowledgement, so the read task is small; its real job is driving the
//! two-way close drain: [`Connection::close`] sends a `Close` frame and then
//! waits for the peer's matching `Close` before the socket is released, so
//! frames still in flight are never lost.

use std::sync::{Arc, Mutex as StdMutex};

use pixlog_core::{
    decode_payload, encode_message, FrameKind, LogMessage, HEADER_SIZE, PROTOCOL_VERSION,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, warn};

use crate::error::SendError;

/// Logical state of a connection. Transitions are driven by frame exchange:
/// `Open -> Closing` when we send `Close`, `Closing -> Closed` when the peer's
/// `Close` arrives. A stream that ends or errors jumps straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Producer side of one viewer-server connection.
pub struct Connection {
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    state: Arc<StdMutex<ConnectionState>>,
    closed: Arc<Notify>,
}

impl Connection {
    /// Wraps an established TCP stream and starts the inbound decode task.
    pub fn establish(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(Mutex::new(Some(write_half)));
        let state = Arc::new(StdMutex::new(ConnectionState::Open));
        let closed = Arc::new(Notify::new());

        tokio::spawn(read_loop(
            read_half,
            Arc::clone(&writer),
            Arc::clone(&state),
            Arc::clone(&closed),
        ));

        Self {
            writer,
            state,
            closed,
        }
    }

    /// Current logical connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Encodes and sends one message, preserving send order.
    pub async fn send(&self, msg: &LogMessage) -> Result<(), SendError> {
        let bytes = encode_message(msg)?;
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(w) => {
                w.write_all(&bytes).await?;
                Ok(())
            }
            None => Err(SendError::Closed),
        }
    }

    /// Sends a `Close` frame and waits for the peer's matching `Close`.
    ///
    /// Safe to call more than once; later calls just wait for (or observe)
    /// the already-completed close.
    pub async fn close(&self) {
        let should_send = {
            let mut st = self.state.lock().unwrap();
            match *st {
                ConnectionState::Open => {
                    *st = ConnectionState::Closing;
                    true
                }
                ConnectionState::Closing => false,
                ConnectionState::Closed => return,
            }
        };

        if should_send {
            if let Err(e) = self.send(&LogMessage::Close).await {
                warn!("could not send close frame: {e}");
            }
        }
        self.wait_closed().await;
    }

    /// Waits until the connection reaches [`ConnectionState::Closed`], either
    /// through the close handshake or because the peer went away.
    pub async fn wait_closed(&self) {
        loop {
            let notified = self.closed.notified();
            if self.state() == ConnectionState::Closed {
                return;
            }
            notified.await;
        }
    }
}

/// Decodes inbound frames until the peer closes or the stream dies, then
/// releases the write half and flips the state to `Closed`.
async fn read_loop(
    mut reader: OwnedReadHalf,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    state: Arc<StdMutex<ConnectionState>>,
    closed: Arc<Notify>,
) {
    loop {
        let mut header = [0u8; HEADER_SIZE];
        if let Err(e) = reader.read_exact(&mut header).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                error!("read error on viewer connection: {e}");
            }
            break;
        }

        let kind_raw = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let payload_len = u64::from_le_bytes(header[4..12].try_into().unwrap());
        let Ok(kind) = FrameKind::try_from(kind_raw) else {
            error!("unknown frame kind {kind_raw} from server, dropping connection");
            break;
        };

        let mut payload = vec![0u8; payload_len as usize];
        if let Err(e) = reader.read_exact(&mut payload).await {
            error!("truncated {kind:?} frame from server: {e}");
            break;
        }

        match decode_payload(kind, &payload) {
            Ok(LogMessage::Version(version)) => {
                if version == PROTOCOL_VERSION {
                    debug!("server protocol version {version}");
                } else {
                    warn!(
                        "server speaks protocol version {version}, client supports {PROTOCOL_VERSION}"
                    );
                }
            }
            Ok(LogMessage::Close) => {
                debug!("peer acknowledged close");
                break;
            }
            Ok(other) => {
                warn!("unexpected {:?} frame from server", other.kind());
            }
            Err(e) => {
                error!("malformed frame from server: {e}");
                break;
            }
        }
    }

    // Dropping the write half releases the socket once both directions are done.
    writer.lock().await.take();
    *state.lock().unwrap() = ConnectionState::Closed;
    closed.notify_waiters();
}
