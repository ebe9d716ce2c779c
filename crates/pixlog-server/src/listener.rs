//! Listening socket setup and the accept loop.
//!
//! The server does not get its port from the user alone: when the producer
//! launches it automatically, several servers may race for the same base
//! port. Binding therefore probes upward from the requested port until a
//! bind succeeds, within a fixed attempt ceiling. Exhausting the ceiling is
//! the one error that kills the process.

use std::net::SocketAddr;

use pixlog_core::LogMessage;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::transport;

/// How many consecutive ports are tried before giving up.
pub const MAX_PORT_PROBE_ATTEMPTS: u16 = 16;

/// Errors from listening socket setup.
#[derive(Debug, Error)]
pub enum BindError {
    /// Every port in the probe window failed to bind.
    #[error("no free port on {interface} after {attempts} attempts starting at {base}: {source}")]
    Exhausted {
        interface: String,
        base: u16,
        attempts: u16,
        #[source]
        source: std::io::Error,
    },

    /// The interface/port pair did not form a valid socket address.
    #[error("invalid listen address {interface}:{base}: {source}")]
    InvalidAddress {
        interface: String,
        base: u16,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// Binds the first free port at or above `base` on `interface`.
///
/// Probing happens in-process: a failed bind moves to the next port without
/// restarting anything. Returns the listener; the caller reads the actual
/// port from its local address.
pub async fn bind_with_probe(interface: &str, base: u16) -> Result<TcpListener, BindError> {
    let mut last_error = None;
    for offset in 0..MAX_PORT_PROBE_ATTEMPTS {
        let port = base.saturating_add(offset);
        let addr: SocketAddr = format!("{interface}:{port}")
            .parse()
            .map_err(|source| BindError::InvalidAddress {
                interface: interface.to_string(),
                base,
                source,
            })?;
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                info!("listening on {interface}:{port}");
                return Ok(listener);
            }
            Err(e) => {
                debug!("port {port} unavailable: {e}");
                last_error = Some(e);
            }
        }
    }
    Err(BindError::Exhausted {
        interface: interface.to_string(),
        base,
        attempts: MAX_PORT_PROBE_ATTEMPTS,
        source: last_error
            .unwrap_or_else(|| std::io::Error::other("no bind attempted")),
    })
}

/// Accepts producer connections until the dispatcher goes away, spawning one
/// transport task per connection. All connections feed the same dispatcher
/// channel.
pub async fn run_listener(listener: TcpListener, tx: mpsc::Sender<LogMessage>) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    tokio::spawn(transport::run_connection(
                        stream,
                        peer.to_string(),
                        tx.clone(),
                    ));
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                }
            },
            _ = tx.closed() => {
                debug!("dispatcher is gone, stopping accept loop");
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Binds an ephemeral port and returns a base the test can probe from.
    /// Using an OS-assigned port keeps parallel test runs from colliding.
    async fn ephemeral_base() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_bind_free_port_uses_the_base() {
        let (holder, base) = ephemeral_base().await;
        drop(holder);

        let listener = bind_with_probe("127.0.0.1", base).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), base);
    }

    #[tokio::test]
    async fn test_occupied_ports_are_skipped_to_first_free() {
        // Occupy base and base+1; the probe must land exactly on base+2.
        let (_hold_base, base) = ephemeral_base().await;
        let second = TcpListener::bind(("127.0.0.1", base + 1)).await;
        // The neighbouring port may itself be taken by another process; only
        // assert the probe outcome when the fixture actually holds it.
        if second.is_err() {
            return;
        }
        let _hold_next = second.unwrap();

        let listener = bind_with_probe("127.0.0.1", base).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), base + 2);
    }

    #[tokio::test]
    async fn test_invalid_interface_is_rejected() {
        let result = bind_with_probe("not-an-interface", 42007).await;
        assert!(matches!(result, Err(BindError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_probe_exhaustion_reports_the_range() {
        // Hold the whole probe window so every attempt fails.
        let (_holder, base) = ephemeral_base().await;
        let mut holders = Vec::new();
        for offset in 1..MAX_PORT_PROBE_ATTEMPTS {
            match TcpListener::bind(("127.0.0.1", base + offset)).await {
                Ok(l) => holders.push(l),
                // Another process owns the port, which serves just as well.
                Err(_) => {}
            }
        }

        let result = bind_with_probe("127.0.0.1", base).await;
        match result {
            Err(BindError::Exhausted {
                base: b, attempts, ..
            }) => {
                assert_eq!(b, base);
                assert_eq!(attempts, MAX_PORT_PROBE_ATTEMPTS);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }
}
