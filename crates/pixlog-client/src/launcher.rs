//! Launches a local viewer server process on demand.
//!
//! When the producer names no explicit endpoint, the client spawns the
//! `pixlog-server` binary itself. The child probes ports upward from the
//! candidate base until it can bind, then reports the chosen port exactly
//! once as a single line on its stdout. That stdout pipe is the private
//! back-channel: the protocol socket is only opened after the parent has
//! read the port line. Server log output goes to stderr and never mixes
//! with the back-channel.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::LaunchError;

/// First port the launched server tries to bind.
pub const DEFAULT_BASE_PORT: u16 = 42007;

/// Name of the viewer server binary, resolved through `PATH`.
pub const DEFAULT_SERVER_BINARY: &str = "pixlog-server";

/// Prefix of the single back-channel line the server prints once bound.
pub const PORT_LINE_PREFIX: &str = "PIXLOG_PORT=";

/// Spawns and tracks one viewer server child process.
#[derive(Debug, Clone)]
pub struct ServerLauncher {
    binary: String,
    base_port: u16,
}

impl ServerLauncher {
    pub fn new(binary: impl Into<String>, base_port: u16) -> Self {
        Self {
            binary: binary.into(),
            base_port,
        }
    }

    /// Starts the server child and blocks until it reports its bound port.
    ///
    /// # Errors
    ///
    /// Fails when the binary cannot be spawned, when the child exits without
    /// reporting a port (its stdout closes), or when the first line on the
    /// back-channel is not a port report.
    pub async fn launch(&self) -> Result<ServerHandle, LaunchError> {
        let mut child = Command::new(&self.binary)
            .arg("--port")
            .arg(self.base_port.to_string())
            .arg("--interface")
            .arg("127.0.0.1")
            .arg("--require-server")
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        // The child keeps stdout open for its whole life, so only the one
        // port line is ever read here.
        let stdout = child.stdout.take().ok_or(LaunchError::BackChannelClosed)?;
        let mut lines = BufReader::new(stdout).lines();
        let line = lines
            .next_line()
            .await
            .map_err(LaunchError::BackChannel)?
            .ok_or(LaunchError::BackChannelClosed)?;
        let port =
            parse_port_line(&line).ok_or_else(|| LaunchError::MalformedPortLine(line.clone()))?;

        info!("launched viewer server '{}' on port {port}", self.binary);
        Ok(ServerHandle { child, port })
    }
}

impl Default for ServerLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_BINARY, DEFAULT_BASE_PORT)
    }
}

/// Parses the back-channel port report line.
fn parse_port_line(line: &str) -> Option<u16> {
    line.trim()
        .strip_prefix(PORT_LINE_PREFIX)?
        .parse::<u16>()
        .ok()
}

/// A running viewer server child plus the port it bound.
///
/// The child is killed when the handle is dropped without having been joined;
/// the graceful path is to ask it to drain (`StopWhenAllWindowsClosed` or
/// `StopProcess` over the protocol socket) and then call [`ServerHandle::join`].
#[derive(Debug)]
pub struct ServerHandle {
    child: Child,
    port: u16,
}

impl ServerHandle {
    /// The port the child bound, reported once over the back-channel.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the child to exit.
    pub async fn join(&mut self) {
        match self.child.wait().await {
            Ok(status) => debug!("viewer server exited with {status}"),
            Err(e) => debug!("viewer server join failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_line_accepts_report() {
        assert_eq!(parse_port_line("PIXLOG_PORT=42007"), Some(42007));
        assert_eq!(parse_port_line("PIXLOG_PORT=42009\n"), Some(42009));
    }

    #[test]
    fn test_parse_port_line_rejects_noise() {
        assert_eq!(parse_port_line(""), None);
        assert_eq!(parse_port_line("PIXLOG_PORT="), None);
        assert_eq!(parse_port_line("PIXLOG_PORT=yes"), None);
        assert_eq!(parse_port_line("PIXLOG_PORT=70000"), None);
        assert_eq!(parse_port_line("listening on 42007"), None);
    }

    #[test]
    fn test_default_launcher_targets_base_port() {
        let launcher = ServerLauncher::default();
        assert_eq!(launcher.base_port, DEFAULT_BASE_PORT);
        assert_eq!(launcher.binary, DEFAULT_SERVER_BINARY);
    }
}
