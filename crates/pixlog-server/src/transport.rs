//! Per-connection transport task.
//!
//! Turns one accepted duplex byte stream into an ordered sequence of inbound
//! [`LogMessage`]s for the dispatcher. Immediately after accept the transport
//! sends the `Version` handshake frame, then decodes inbound frames until
//! either a `Close` frame arrives (answered with our own `Close` before the
//! socket is released, so no in-flight frame is lost) or the stream ends,
//! which closes without a reply. A framing error is fatal to the connection,
//! never to the process.

use pixlog_core::{
    decode_payload, encode_message, FrameKind, LogMessage, HEADER_SIZE, PROTOCOL_VERSION,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Connection lifecycle, driven by frame exchange only. An abrupt stream end
/// jumps straight to `Closed`; it is an error path, not a normal shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Serves one producer connection until it closes.
///
/// `peer` is used only for logging. Decoded messages are forwarded to the
/// dispatcher channel in arrival order.
pub async fn run_connection<S>(stream: S, peer: String, tx: mpsc::Sender<LogMessage>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn_id = Uuid::new_v4();
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut state = ConnectionState::Open;
    info!("connection {conn_id} from {peer} open");

    // Handshake: the version frame goes out before anything is decoded.
    match encode_message(&LogMessage::Version(PROTOCOL_VERSION)) {
        Ok(bytes) => {
            if let Err(e) = writer.write_all(&bytes).await {
                error!("connection {conn_id}: could not send version handshake: {e}");
                return;
            }
        }
        Err(e) => {
            error!("connection {conn_id}: could not encode version handshake: {e}");
            return;
        }
    }

    while state == ConnectionState::Open {
        let mut header = [0u8; HEADER_SIZE];
        if let Err(e) = reader.read_exact(&mut header).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                debug!("connection {conn_id}: stream ended");
            } else {
                error!("connection {conn_id}: read error: {e}");
            }
            state = ConnectionState::Closed;
            continue;
        }

        let kind_raw = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let payload_len = u64::from_le_bytes(header[4..12].try_into().unwrap());
        let Ok(kind) = FrameKind::try_from(kind_raw) else {
            error!("connection {conn_id}: unknown frame kind {kind_raw}, dropping connection");
            state = ConnectionState::Closed;
            continue;
        };

        let mut payload = vec![0u8; payload_len as usize];
        if let Err(e) = reader.read_exact(&mut payload).await {
            error!("connection {conn_id}: truncated {kind:?} frame: {e}");
            state = ConnectionState::Closed;
            continue;
        }

        match decode_payload(kind, &payload) {
            Ok(LogMessage::Close) => {
                state = ConnectionState::Closing;
            }
            Ok(LogMessage::Version(version)) => {
                // Tolerated for older producers that announce themselves.
                debug!("connection {conn_id}: peer announced protocol version {version}");
            }
            Ok(other) => {
                if tx.send(other).await.is_err() {
                    debug!("connection {conn_id}: dispatcher is gone");
                    state = ConnectionState::Closed;
                }
            }
            Err(e) => {
                error!("connection {conn_id}: {e}, dropping connection");
                state = ConnectionState::Closed;
            }
        }
    }

    // Two-way drain: a received `Close` is acknowledged with our own `Close`
    // before the socket is released.
    if state == ConnectionState::Closing {
        match encode_message(&LogMessage::Close) {
            Ok(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    warn!("connection {conn_id}: could not acknowledge close: {e}");
                } else if let Err(e) = writer.shutdown().await {
                    debug!("connection {conn_id}: shutdown after close: {e}");
                }
            }
            Err(e) => warn!("connection {conn_id}: could not encode close reply: {e}"),
        }
        state = ConnectionState::Closed;
    }

    info!("connection {conn_id} from {peer} ended in state {state:?}");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
