//! # pixlog-server
//!
//! The viewer-hosting half of pixlog. Producers stream framed `Image` and
//! control messages over local TCP; this crate accepts those connections,
//! decodes the frames, routes images to per-group viewer instances created
//! on demand, and drives rendering from a fixed-rate cooperative loop.
//!
//! Module layout:
//!
//! - [`config`]: TOML config schema plus loading.
//! - [`listener`]: port probing bind and the accept loop.
//! - [`transport`]: per-connection handshake, frame decoding, close drain.
//! - [`dispatcher`]: the 30 Hz tick loop and termination rules.
//! - [`registry`]: live viewer groups, created lazily and dropped on exit.
//! - [`viewer`]: the capability boundary: `Viewer`, `ViewerFactory`, and
//!   the optional `FigureSink`, with a headless default and test mocks.
//!
//! The binary entry point in `main.rs` wires these together; integration
//! tests in `tests/` drive the same modules over real sockets.

pub mod config;
pub mod dispatcher;
pub mod listener;
pub mod registry;
pub mod transport;
pub mod viewer;

pub use config::{ConfigError, ServerConfig};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use listener::{bind_with_probe, run_listener, BindError, MAX_PORT_PROBE_ATTEMPTS};
pub use registry::{ViewerGroup, ViewerGroupRegistry};
pub use transport::run_connection;
pub use viewer::{
    check_displayable, FigureSink, HeadlessViewer, HeadlessViewerFactory, Viewer, ViewerError,
    ViewerFactory,
};
