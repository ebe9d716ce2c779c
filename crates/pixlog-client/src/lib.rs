//! # pixlog-client
//!
//! Producer-side library for pixlog: stream image buffers and control
//! commands to a viewer-hosting process without ever blocking on rendering.
//!
//! The client either connects to a viewer server that is already running
//! (`address` set in [`ClientConfig`]) or launches one itself: it spawns the
//! `pixlog-server` binary, reads the bound port from a one-shot stdout
//! back-channel, and connects to `127.0.0.1:<port>`. Connects retry with a
//! capped exponential backoff (1s, 2s, 4s, 4s, ...).
//!
//! Image and figure sends are fire-and-forget. A logging call that cannot be
//! delivered is logged locally and dropped; it never propagates an error into
//! the host application.
//!
//! ```no_run
//! use pixlog_client::{Client, ClientConfig};
//! use pixlog_core::{ImageMessage, SampleType};
//!
//! # async fn demo() -> Result<(), pixlog_client::ClientError> {
//! let mut client = Client::new(ClientConfig::default());
//! client.connect().await?; // launches pixlog-server locally
//!
//! client.send_image(ImageMessage {
//!     name: "noise".to_string(),
//!     group: "default".to_string(),
//!     width: 256,
//!     height: 256,
//!     channels: 3,
//!     sample_type: SampleType::U8,
//!     replace: true,
//!     pixels: vec![0; 256 * 256 * 3],
//! }).await;
//!
//! // Keep the viewer alive until the user closes every window.
//! client.wait_until_windows_closed().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod connection;
pub mod error;
pub mod launcher;

pub use client::{Client, ClientConfig};
pub use connection::{Connection, ConnectionState};
pub use error::{ClientError, ConnectError, LaunchError, SendError};
pub use launcher::{ServerHandle, ServerLauncher, DEFAULT_BASE_PORT, DEFAULT_SERVER_BINARY};
