//! The producer-facing client facade.
//!
//! A [`Client`] either connects to an already-running viewer server or
//! launches one locally, then streams `Image` and `Figure` frames to it.
//! Sends are fire-and-forget: a failed send is logged and swallowed, never
//! surfaced to the producer, so instrumenting an application with image
//! logging can never crash it.

use std::time::Duration;

use pixlog_core::{FigureMessage, ImageMessage, LogMessage};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{error, info, warn};

use crate::backoff::Backoff;
use crate::connection::{Connection, ConnectionState};
use crate::error::{ClientError, ConnectError};
use crate::launcher::{ServerHandle, ServerLauncher, DEFAULT_BASE_PORT, DEFAULT_SERVER_BINARY};

/// Configuration for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address of an existing viewer server. `None` launches a local one.
    pub address: Option<String>,
    /// Port to connect to (direct connect) or to start probing from
    /// (launched server).
    pub port: u16,
    /// Maximum connect attempts; `None` retries until success.
    pub connect_attempts: Option<u32>,
    /// First retry delay.
    pub backoff_initial: Duration,
    /// Retry delay ceiling.
    pub backoff_cap: Duration,
    /// Viewer server binary used when `address` is `None`.
    pub server_binary: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: DEFAULT_BASE_PORT,
            connect_attempts: None,
            backoff_initial: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(4),
            server_binary: DEFAULT_SERVER_BINARY.to_string(),
        }
    }
}

/// Producer-side handle to a viewer server.
pub struct Client {
    config: ClientConfig,
    connection: Option<Connection>,
    server: Option<ServerHandle>,
    enabled: bool,
}

impl Client {
    /// Creates a disconnected, disabled client.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connection: None,
            server: None,
            enabled: false,
        }
    }

    /// Whether image sends are currently forwarded. Disabled clients drop
    /// them silently, so call sites can stay in place unconditionally.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.state() == ConnectionState::Open)
    }

    /// Connects to the configured endpoint, launching a local server first
    /// when no address was given. Enables the client on success.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }

        let stream = match self.config.address.clone() {
            Some(address) => {
                let addr = format!("{address}:{}", self.config.port);
                connect_with_retry(&addr, &self.config).await?
            }
            None => {
                let launcher =
                    ServerLauncher::new(self.config.server_binary.clone(), self.config.port);
                let handle = launcher.launch().await?;
                let addr = format!("127.0.0.1:{}", handle.port());
                let stream = connect_with_retry(&addr, &self.config).await?;
                self.server = Some(handle);
                stream
            }
        };

        self.connection = Some(Connection::establish(stream));
        self.enabled = true;
        Ok(())
    }

    /// Sends one image, fire-and-forget. No-op while disabled or disconnected.
    pub async fn send_image(&self, image: ImageMessage) {
        self.send_best_effort(LogMessage::Image(image)).await;
    }

    /// Sends one figure handle, fire-and-forget.
    pub async fn send_figure(&self, figure: FigureMessage) {
        self.send_best_effort(LogMessage::Figure(figure)).await;
    }

    async fn send_best_effort(&self, msg: LogMessage) {
        if !self.enabled {
            return;
        }
        let Some(conn) = &self.connection else {
            warn!("{:?} dropped: client is not connected", msg.kind());
            return;
        };
        if let Err(e) = conn.send(&msg).await {
            error!("{e}: {:?} not sent", msg.kind());
        }
    }

    /// Closes the connection with the two-way `Close` drain. Calling this
    /// when already disconnected is a no-op.
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close().await;
            info!("disconnected from viewer server");
        }
    }

    /// Asks the server to stay alive until the user has closed every window,
    /// then blocks until it has fully shut down. Joins the launched child so
    /// no viewer process is left orphaned.
    pub async fn wait_until_windows_closed(&mut self) {
        if let Some(conn) = self.connection.take() {
            if let Err(e) = conn.send(&LogMessage::StopWhenAllWindowsClosed).await {
                warn!("could not request drain: {e}");
            }
            conn.wait_closed().await;
        }
        if let Some(mut server) = self.server.take() {
            server.join().await;
        }
    }

    /// Tells the server to shut down immediately, regardless of open windows.
    pub async fn shutdown(&mut self) {
        if let Some(conn) = self.connection.take() {
            if let Err(e) = conn.send(&LogMessage::StopProcess).await {
                warn!("could not request shutdown: {e}");
            }
            conn.wait_closed().await;
        }
        if let Some(mut server) = self.server.take() {
            server.join().await;
        }
    }
}

/// Socket connect with capped exponential backoff. Every failure is logged
/// with its reason before the retry sleep.
async fn connect_with_retry(addr: &str, config: &ClientConfig) -> Result<TcpStream, ConnectError> {
    let mut backoff = Backoff::new(config.backoff_initial, config.backoff_cap);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                info!("connected to viewer server at {addr}");
                return Ok(stream);
            }
            Err(e) => {
                if let Some(max) = config.connect_attempts {
                    if attempt >= max {
                        error!("cannot connect to {addr} ({e}), giving up after {attempt} attempt(s)");
                        return Err(ConnectError::RetriesExhausted {
                            addr: addr.to_string(),
                            attempts: attempt,
                        });
                    }
                }
                let delay = backoff.next_delay();
                warn!("cannot connect to {addr} ({e}), retrying in {delay:?}");
                time::sleep(delay).await;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pixlog_core::SampleType;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn test_image() -> ImageMessage {
        ImageMessage {
            name: "t".to_string(),
            group: "default".to_string(),
            width: 2,
            height: 2,
            channels: 1,
            sample_type: SampleType::U8,
            replace: true,
            pixels: vec![0; 4],
        }
    }

    #[test]
    fn test_default_config_targets_local_launch() {
        let cfg = ClientConfig::default();
        assert!(cfg.address.is_none());
        assert_eq!(cfg.port, DEFAULT_BASE_PORT);
        assert!(cfg.connect_attempts.is_none());
        assert_eq!(cfg.backoff_initial, Duration::from_secs(1));
        assert_eq!(cfg.backoff_cap, Duration::from_secs(4));
    }

    #[test]
    fn test_new_client_is_disconnected_and_disabled() {
        let client = Client::new(ClientConfig::default());
        assert!(!client.is_connected());
        assert!(!client.is_enabled());
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_is_noop() {
        let mut client = Client::new(ClientConfig::default());
        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_send_image_while_disabled_is_silent() {
        let client = Client::new(ClientConfig::default());
        // Must not panic or error even though there is no connection.
        client.send_image(test_image()).await;
    }

    #[tokio::test]
    async fn test_connect_to_existing_listener_succeeds_first_try() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = Client::new(ClientConfig {
            address: Some("127.0.0.1".to_string()),
            port,
            connect_attempts: Some(1),
            ..Default::default()
        });

        client.connect().await.expect("connect must succeed");
        assert!(client.is_connected());
        assert!(client.is_enabled());

        // The server side must see the connection arrive.
        let (_stream, _) = listener.accept().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_attempt_limit() {
        let mut client = Client::new(ClientConfig {
            // Port 1 is never listening on a test host.
            address: Some("127.0.0.1".to_string()),
            port: 1,
            connect_attempts: Some(2),
            backoff_initial: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(2),
            ..Default::default()
        });

        let result = client.connect().await;
        assert!(matches!(
            result,
            Err(ClientError::Connect(ConnectError::RetriesExhausted { attempts: 2, .. }))
        ));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_send_image_reaches_the_wire() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = Client::new(ClientConfig {
            address: Some("127.0.0.1".to_string()),
            port,
            connect_attempts: Some(1),
            ..Default::default()
        });
        client.connect().await.unwrap();

        let (mut server_side, _) = listener.accept().await.unwrap();
        client.send_image(test_image()).await;

        let expected = pixlog_core::encode_message(&LogMessage::Image(test_image())).unwrap();
        let mut received = vec![0u8; expected.len()];
        server_side.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);
    }
}
