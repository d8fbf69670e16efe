//! Mock FLARM data port over real localhost TCP.
//!
//! [`MockTcpServer`] listens on a random local port and, once a client
//! connects, writes a scripted sentence feed to it. Use it to test the
//! adaptor end to end through `TcpTransport`.
//!
//! # Example
//!
//! ```
//! use flarmlink_test_harness::MockTcpServer;
//! use std::time::Duration;
//!
//! # async fn example() -> flarmlink_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.send_line("$PFLAV,A,7.0,7.20,ALPS_2024*6B");
//! server.pause(Duration::from_millis(100));
//! server.start();
//!
//! // Point a TcpTransport or the adaptor at this address.
//! let addr = server.addr().to_string();
//! # Ok(())
//! # }
//! ```

use flarmlink_core::error::{Error, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One step of the server's script.
#[derive(Debug, Clone)]
enum Action {
    Write(Vec<u8>),
    Sleep(Duration),
}

/// A mock FLARM device serving a scripted feed on localhost.
///
/// The server accepts a single connection. After the script has been
/// written it either keeps the connection open until the client closes it
/// (the default) or closes it immediately, see
/// [`close_when_done`](MockTcpServer::close_when_done).
pub struct MockTcpServer {
    /// The address the server is listening on (e.g., "127.0.0.1:54321").
    addr: String,
    /// The bound listener, moved into the server task by `start()`.
    listener: Option<TcpListener>,
    /// Ordered script.
    actions: VecDeque<Action>,
    /// Whether to close the connection after the script.
    close_when_done: bool,
    /// Handle to the server task once started.
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Create a new mock server listening on a random port.
    ///
    /// The listener is bound immediately, so a client may connect before
    /// [`start`](MockTcpServer::start); the connection is served once the
    /// server starts.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            actions: VecDeque::new(),
            close_when_done: false,
            server_handle: None,
        })
    }

    /// Queue one sentence, written with a `\r\n` terminator.
    pub fn send_line(&mut self, sentence: &str) {
        self.send_raw(format!("{}\r\n", sentence).as_bytes());
    }

    /// Queue raw bytes, written in one go.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.actions.push_back(Action::Write(bytes.to_vec()));
    }

    /// Queue a pause between writes.
    pub fn pause(&mut self, duration: Duration) {
        self.actions.push_back(Action::Sleep(duration));
    }

    /// Close the connection as soon as the script is done.
    pub fn close_when_done(&mut self) {
        self.close_when_done = true;
    }

    /// The address the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start serving the script to the first client that connects.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let actions: Vec<Action> = self.actions.drain(..).collect();
        let close_when_done = self.close_when_done;

        let handle = tokio::spawn(async move {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;
            tracing::debug!(%peer, "mock FLARM server accepted connection");

            for (i, action) in actions.iter().enumerate() {
                match action {
                    Action::Write(bytes) => {
                        stream
                            .write_all(bytes)
                            .await
                            .map_err(|e| format!("action {}: write error: {}", i, e))?;
                        stream
                            .flush()
                            .await
                            .map_err(|e| format!("action {}: flush error: {}", i, e))?;
                    }
                    Action::Sleep(duration) => tokio::time::sleep(*duration).await,
                }
            }

            if !close_when_done {
                // Hold the socket until the client goes away.
                let mut sink = [0u8; 64];
                loop {
                    match stream.read(&mut sink).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            }
            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to complete and return any errors.
    pub async fn wait(mut self) -> std::result::Result<(), String> {
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?
        } else {
            Ok(())
        }
    }
}

impl Drop for MockTcpServer {
    fn drop(&mut self) {
        if let Some(handle) = &self.server_handle {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}
