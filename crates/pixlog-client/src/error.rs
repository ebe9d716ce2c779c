//! Error types for the producer-side client.

use thiserror::Error;

/// Errors that can occur while establishing a connection to the viewer server.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// A socket-level connect attempt failed. Retried with backoff unless the
    /// configured attempt limit is reached.
    #[error("failed to connect to {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The caller-configured attempt limit was reached without a successful
    /// connect.
    #[error("gave up connecting to {addr} after {attempts} attempt(s)")]
    RetriesExhausted { addr: String, attempts: u32 },
}

/// Errors that can occur while launching a local viewer server process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The server binary could not be spawned.
    #[error("failed to spawn viewer server process '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The child's stdout back-channel closed before a port was reported.
    /// This usually means the child exited because it could not bind a port.
    #[error("server back-channel closed before reporting a bound port")]
    BackChannelClosed,

    /// The child wrote something other than the expected port report line.
    #[error("malformed port report line from server: {0:?}")]
    MalformedPortLine(String),

    /// I/O failure reading the back-channel.
    #[error("I/O error on server back-channel: {0}")]
    BackChannel(#[source] std::io::Error),
}

/// Errors from a best-effort send on an established connection. The client
/// facade logs these and carries on; they never reach the producer.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection has already been closed.
    #[error("connection is closed")]
    Closed,

    /// The message could not be encoded into a frame.
    #[error("encode failed: {0}")]
    Encode(#[from] pixlog_core::FramingError),

    /// The socket write failed.
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type returned by [`crate::Client`] operations that can fail.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}
