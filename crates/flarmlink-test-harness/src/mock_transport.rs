//! Scripted transport for deterministic testing of the connection manager.
//!
//! [`MockTransport`] plays back a script of data chunks, pauses and
//! disconnects through [`Transport::receive`]. Pauses run on the tokio clock,
//! so tests using `#[tokio::test(start_paused = true)]` replay a script of
//! any length instantly and deterministically.
//!
//! # Example
//!
//! ```
//! use flarmlink_test_harness::MockTransport;
//! use std::time::Duration;
//!
//! let mock = MockTransport::new()
//!     .line("$PFLAV,A,7.0,7.20,ALPS_2024*6B")
//!     .pause(Duration::from_secs(6))
//!     .disconnect();
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use flarmlink_core::error::{Error, Result};
use flarmlink_core::transport::Transport;

/// One step of a [`MockTransport`] script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Bytes returned by the next `receive()` calls.
    Data(Vec<u8>),
    /// Nothing arrives for this long.
    Pause(Duration),
    /// The peer closes the connection.
    Disconnect,
}

/// A scripted [`Transport`].
///
/// Once the script is exhausted the device goes silent: every `receive()`
/// waits for its full timeout and returns [`Error::Timeout`].
#[derive(Debug)]
pub struct MockTransport {
    /// Remaining script.
    steps: VecDeque<Step>,
    /// End of the pause at the head of the script, once it has started.
    pause_until: Option<Instant>,
    /// Whether the transport is "connected".
    connected: bool,
    /// Log of all bytes sent through this transport.
    sent_log: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockTransport {
    /// Create a connected transport with an empty script.
    pub fn new() -> Self {
        MockTransport {
            steps: VecDeque::new(),
            pause_until: None,
            connected: true,
            sent_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a raw step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push_back(step);
        self
    }

    /// Append raw bytes, delivered in one read.
    pub fn data(self, bytes: &[u8]) -> Self {
        self.step(Step::Data(bytes.to_vec()))
    }

    /// Append one sentence terminated with `\r\n`.
    pub fn line(self, sentence: &str) -> Self {
        self.data(format!("{}\r\n", sentence).as_bytes())
    }

    /// Append a period of silence.
    pub fn pause(self, duration: Duration) -> Self {
        self.step(Step::Pause(duration))
    }

    /// Append a peer disconnect.
    pub fn disconnect(self) -> Self {
        self.step(Step::Disconnect)
    }

    /// Number of script steps not yet played.
    pub fn remaining_steps(&self) -> usize {
        self.steps.len()
    }

    /// Shared handle to the log of sent data.
    ///
    /// The transport is usually moved into the adaptor; keep this handle to
    /// inspect what was sent afterwards.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.sent_log)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.sent_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.steps.front_mut() {
                None => {
                    tokio::time::sleep_until(deadline).await;
                    return Err(Error::Timeout);
                }
                Some(Step::Pause(duration)) => {
                    let duration = *duration;
                    let until = *self
                        .pause_until
                        .get_or_insert_with(|| Instant::now() + duration);
                    if until > deadline {
                        tokio::time::sleep_until(deadline).await;
                        return Err(Error::Timeout);
                    }
                    tokio::time::sleep_until(until).await;
                    self.pause_until = None;
                    self.steps.pop_front();
                }
                Some(Step::Data(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n == data.len() {
                        self.steps.pop_front();
                    } else {
                        data.drain(..n);
                    }
                    tracing::trace!(bytes = n, "mock transport delivering data");
                    return Ok(n);
                }
                Some(Step::Disconnect) => {
                    self.steps.pop_front();
                    self.connected = false;
                    tracing::trace!("mock transport disconnecting");
                    return Err(Error::ConnectionLost);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
