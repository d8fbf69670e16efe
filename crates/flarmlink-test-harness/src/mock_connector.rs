//! Scripted [`Connector`] for testing reconnect behaviour.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use flarmlink_core::error::{Error, Result};
use flarmlink_core::transport::{Connector, Transport};

use crate::mock_transport::MockTransport;

/// Outcome of one connection attempt.
#[derive(Debug)]
pub enum ConnectOutcome {
    /// The attempt succeeds with this transport.
    Connect(MockTransport),
    /// The attempt fails as if the device refused the connection.
    Refuse,
}

#[derive(Debug)]
struct Inner {
    outcomes: Mutex<VecDeque<ConnectOutcome>>,
    attempts: AtomicUsize,
}

/// A [`Connector`] that plays back a queue of [`ConnectOutcome`]s.
///
/// Attempts beyond the end of the queue are refused. Clones share the queue
/// and the attempt counter, so a test can keep one clone to inspect after
/// moving the other into the adaptor.
#[derive(Debug, Clone)]
pub struct MockConnector {
    inner: Arc<Inner>,
}

impl MockConnector {
    /// Create a connector with an empty queue.
    pub fn new() -> Self {
        MockConnector {
            inner: Arc::new(Inner {
                outcomes: Mutex::new(VecDeque::new()),
                attempts: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue a successful attempt that yields `transport`.
    pub fn accept(self, transport: MockTransport) -> Self {
        self.push(ConnectOutcome::Connect(transport));
        self
    }

    /// Queue a refused attempt.
    pub fn refuse(self) -> Self {
        self.push(ConnectOutcome::Refuse);
        self
    }

    /// Queue an outcome.
    pub fn push(&self, outcome: ConnectOutcome) {
        self.outcomes().push_back(outcome);
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    fn outcomes(&self) -> std::sync::MutexGuard<'_, VecDeque<ConnectOutcome>> {
        self.inner
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self.outcomes().pop_front();
        match outcome {
            Some(ConnectOutcome::Connect(transport)) => {
                tracing::trace!(attempt, "mock connector accepting");
                Ok(Box::new(transport))
            }
            Some(ConnectOutcome::Refuse) | None => {
                tracing::trace!(attempt, "mock connector refusing");
                Err(Error::Transport(format!(
                    "connection refused: {}",
                    self.endpoint()
                )))
            }
        }
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }
}
