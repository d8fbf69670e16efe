//! The engine task.
//!
//! One tokio task owns everything that changes over time: the transport and
//! its line buffer, the reconnect backoff, the replay timer, the heartbeat
//! deadline and the [`Pipeline`]. It waits in a single biased `select!` on,
//! in priority order:
//!
//! 1. Cancellation (adaptor dropped or shut down)
//! 2. Control requests from the [`FlarmAdaptor`](crate::FlarmAdaptor) handle
//! 3. The heartbeat deadline
//! 4. The active feed: connect future, backoff timer, transport read or
//!    replay timer
//!
//! Timers are plain state of this task, so once `stop()` has been answered
//! nothing armed before it can fire.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use flarmlink_core::error::{Error, Result};
use flarmlink_core::transport::{Connector, Transport};
use flarmlink_nmea::LineBuffer;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::pipeline::Pipeline;
use crate::replay::{CaptureWriter, SimulatorCursor, SimulatorLog};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Size of a single transport read.
const READ_CHUNK: usize = 1024;

/// Configuration for the engine task.
pub(crate) struct EngineConfig {
    /// Opens a fresh transport for every connection attempt.
    pub connector: Arc<dyn Connector>,
    /// Delay before a new attempt after a failure or loss.
    pub reconnect_interval: Duration,
    /// Timeout for a single transport read.
    pub read_timeout: Duration,
    /// Replay this log instead of connecting, if set.
    pub simulator_file: Option<PathBuf>,
    /// Record live sentences to this file, if set.
    pub capture_file: Option<PathBuf>,
}

/// A request from the adaptor handle to the engine task.
pub(crate) enum Request {
    /// Start the configured feed. Idempotent.
    Start { reply: oneshot::Sender<Result<()>> },
    /// Stop the feed and go `Disconnected`. Idempotent.
    Stop { reply: oneshot::Sender<()> },
    /// Switch between simulator and live mode.
    UseSimulatorFile {
        path: Option<PathBuf>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to the engine task. Stored inside [`FlarmAdaptor`](crate::FlarmAdaptor).
pub(crate) struct EngineHandle {
    pub req_tx: mpsc::Sender<Request>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

impl EngineHandle {
    pub async fn start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Start { reply }).await?;
        rx.await.map_err(|_| Error::AdaptorClosed)?
    }

    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Stop { reply }).await?;
        rx.await.map_err(|_| Error::AdaptorClosed)
    }

    pub async fn use_simulator_file(&self, path: Option<PathBuf>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::UseSimulatorFile { path, reply }).await?;
        rx.await.map_err(|_| Error::AdaptorClosed)?
    }

    /// Cancel the task and wait for it to clean up.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.req_tx
            .send(request)
            .await
            .map_err(|_| Error::AdaptorClosed)
    }
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Transport>>> + Send>>;

/// What the engine is currently feeding the pipeline from.
enum Feed {
    /// Stopped.
    Idle,
    /// A connection attempt is in flight.
    Connecting { attempt: u32, connect: ConnectFuture },
    /// Waiting to retry.
    Backoff { until: Instant, attempt: u32 },
    /// Reading from a connected transport.
    Live {
        transport: Box<dyn Transport>,
        lines: LineBuffer,
    },
    /// Replaying a simulator log.
    Replay {
        log: SimulatorLog,
        cursor: SimulatorCursor,
        next_at: Instant,
    },
}

impl Feed {
    fn is_idle(&self) -> bool {
        matches!(self, Feed::Idle)
    }
}

/// Something the active feed has to report.
enum FeedEvent {
    Connected(Result<Box<dyn Transport>>),
    BackoffElapsed,
    Received(Result<usize>),
    ReplayDue,
}

/// Why the select loop woke up.
enum Wake {
    Request(Request),
    Heartbeat,
    Feed(FeedEvent),
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the engine task. Returns the handle for sending requests.
pub(crate) fn spawn_engine(config: EngineConfig, pipeline: Pipeline) -> EngineHandle {
    let (req_tx, req_rx) = mpsc::channel::<Request>(16);
    let cancel = CancellationToken::new();

    let engine = Engine {
        simulator_file: config.simulator_file.clone(),
        config,
        pipeline,
        feed: Feed::Idle,
        capture: None,
        read_buf: vec![0u8; READ_CHUNK],
        req_rx,
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(engine.run());

    EngineHandle {
        req_tx,
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Engine {
    config: EngineConfig,
    /// Current mode: replay this file, or live when `None`.
    simulator_file: Option<PathBuf>,
    pipeline: Pipeline,
    feed: Feed,
    capture: Option<CaptureWriter>,
    read_buf: Vec<u8>,
    req_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
}

impl Engine {
    async fn run(mut self) {
        loop {
            let heartbeat = self.pipeline.heartbeat_deadline();

            let wake = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("engine task cancelled");
                    break;
                }

                req = self.req_rx.recv() => match req {
                    Some(req) => Wake::Request(req),
                    None => {
                        debug!("request channel closed, exiting engine task");
                        break;
                    }
                },

                _ = sleep_until_deadline(heartbeat) => Wake::Heartbeat,

                event = next_feed_event(
                    &mut self.feed,
                    &mut self.read_buf,
                    self.config.read_timeout,
                ) => Wake::Feed(event),
            };

            match wake {
                Wake::Request(req) => self.handle_request(req).await,
                Wake::Heartbeat => self.pipeline.heartbeat_expired(Instant::now()),
                Wake::Feed(event) => self.handle_feed_event(event).await,
            }
        }

        self.stop_feed().await;
        debug!("engine task exited");
    }

    async fn handle_request(&mut self, req: Request) {
        match req {
            Request::Start { reply } => {
                let result = self.start_feed().await;
                let _ = reply.send(result);
            }
            Request::Stop { reply } => {
                self.stop_feed().await;
                let _ = reply.send(());
            }
            Request::UseSimulatorFile { path, reply } => {
                let path = path.filter(|p| !p.as_os_str().is_empty());
                debug!(path = ?path, "switching simulator file");

                let running = !self.feed.is_idle();
                self.simulator_file = path;
                let result = if running {
                    self.stop_feed().await;
                    self.start_feed().await
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Feed lifecycle
    // -----------------------------------------------------------------------

    async fn start_feed(&mut self) -> Result<()> {
        if !self.feed.is_idle() {
            debug!("start requested while running, ignoring");
            return Ok(());
        }

        match self.simulator_file.clone() {
            Some(path) => {
                let log = match SimulatorLog::load(&path).await {
                    Ok(log) => log,
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "cannot replay simulator log"
                        );
                        self.pipeline.runtime_error(e.to_string());
                        return Err(e);
                    }
                };

                tracing::info!(
                    path = %path.display(),
                    records = log.len(),
                    "starting replay"
                );
                let now = Instant::now();
                self.pipeline.feed_started(now);
                let cursor = SimulatorCursor::new();
                let first_delay = cursor.peek(&log).map(|r| r.delay).unwrap_or_default();
                self.feed = Feed::Replay {
                    log,
                    cursor,
                    next_at: now + first_delay,
                };
            }
            None => {
                self.open_capture().await;
                debug!(endpoint = %self.config.connector.endpoint(), "starting live feed");
                self.feed = self.connecting(0);
            }
        }
        Ok(())
    }

    async fn stop_feed(&mut self) {
        if let Feed::Live { mut transport, .. } = std::mem::replace(&mut self.feed, Feed::Idle) {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "error closing transport");
            }
        }
        self.close_capture().await;
        self.pipeline.disconnected();
    }

    fn connecting(&self, attempt: u32) -> Feed {
        let connector = Arc::clone(&self.config.connector);
        Feed::Connecting {
            attempt,
            connect: Box::pin(async move { connector.connect().await }),
        }
    }

    fn backoff(&self, attempt: u32) -> Feed {
        debug!(
            attempt,
            delay_ms = self.config.reconnect_interval.as_millis(),
            "scheduling reconnect"
        );
        Feed::Backoff {
            until: Instant::now() + self.config.reconnect_interval,
            attempt,
        }
    }

    // -----------------------------------------------------------------------
    // Feed events
    // -----------------------------------------------------------------------

    async fn handle_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Connected(Ok(transport)) => {
                tracing::info!(
                    endpoint = %self.config.connector.endpoint(),
                    "FLARM feed connected"
                );
                self.feed = Feed::Live {
                    transport,
                    lines: LineBuffer::new(),
                };
                self.pipeline.feed_started(Instant::now());
            }
            FeedEvent::Connected(Err(e)) => {
                let attempt = match &self.feed {
                    Feed::Connecting { attempt, .. } => *attempt,
                    _ => 0,
                };
                debug!(error = %e, attempt, "connection attempt failed");
                self.feed = self.backoff(attempt + 1);
            }
            FeedEvent::BackoffElapsed => {
                let attempt = match &self.feed {
                    Feed::Backoff { attempt, .. } => *attempt,
                    _ => 1,
                };
                self.pipeline.reconnecting(attempt);
                self.feed = self.connecting(attempt);
            }
            FeedEvent::Received(Ok(n)) => self.handle_data(n).await,
            FeedEvent::Received(Err(Error::Timeout)) => {}
            FeedEvent::Received(Err(e)) => {
                tracing::warn!(error = %e, "FLARM connection lost");
                if let Feed::Live { mut transport, .. } =
                    std::mem::replace(&mut self.feed, Feed::Idle)
                {
                    let _ = transport.close().await;
                }
                self.pipeline.disconnected();
                self.feed = self.backoff(1);
            }
            FeedEvent::ReplayDue => self.replay_next(),
        }
    }

    async fn handle_data(&mut self, n: usize) {
        let mut received = Vec::new();
        if let Feed::Live { lines, .. } = &mut self.feed {
            lines.push(&self.read_buf[..n]);
            while let Some(line) = lines.next_line() {
                received.push(line);
            }
        }

        let now = Instant::now();
        for line in received {
            self.capture_line(&line, now).await;
            self.pipeline.process_line(&line, now);
        }
    }

    fn replay_next(&mut self) {
        let Feed::Replay {
            log,
            cursor,
            next_at,
        } = &mut self.feed
        else {
            return;
        };

        let line = cursor.advance(log).map(|r| r.sentence.clone());
        let next_delay = cursor.peek(log).map(|r| r.delay);
        let due = *next_at;
        if let Some(delay) = next_delay {
            // Next deadline counts from this one, not from now.
            *next_at = due + delay;
        }

        if let Some(line) = line {
            self.pipeline.process_line(&line, due);
        }

        if next_delay.is_none() {
            tracing::info!("replay finished");
            self.feed = Feed::Idle;
            self.pipeline.disconnected();
        }
    }

    // -----------------------------------------------------------------------
    // Capture
    // -----------------------------------------------------------------------

    async fn open_capture(&mut self) {
        if self.capture.is_some() {
            return;
        }
        let Some(path) = self.config.capture_file.clone() else {
            return;
        };
        match CaptureWriter::create(&path).await {
            Ok(writer) => self.capture = Some(writer),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot open capture file");
                self.pipeline
                    .runtime_error(format!("cannot open capture file: {}", e));
            }
        }
    }

    async fn capture_line(&mut self, line: &str, now: Instant) {
        let Some(capture) = self.capture.as_mut() else {
            return;
        };
        if let Err(e) = capture.record(line, now).await {
            tracing::warn!(error = %e, "capture write failed, capture stopped");
            self.pipeline
                .runtime_error(format!("capture write failed: {}", e));
            self.capture = None;
        }
    }

    async fn close_capture(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.flush().await {
                tracing::warn!(
                    path = %capture.path().display(),
                    error = %e,
                    "capture flush failed"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Wait for the next thing the active feed has to report.
///
/// Cancel-safe: the connect future lives in `feed` and survives being
/// dropped here, and `Transport::receive` is cancel-safe by contract.
async fn next_feed_event(feed: &mut Feed, buf: &mut [u8], read_timeout: Duration) -> FeedEvent {
    match feed {
        Feed::Idle => std::future::pending().await,
        Feed::Connecting { connect, .. } => FeedEvent::Connected(connect.await),
        Feed::Backoff { until, .. } => {
            tokio::time::sleep_until(*until).await;
            FeedEvent::BackoffElapsed
        }
        Feed::Live { transport, .. } => {
            FeedEvent::Received(transport.receive(buf, read_timeout).await)
        }
        Feed::Replay { next_at, .. } => {
            tokio::time::sleep_until(*next_at).await;
            FeedEvent::ReplayDue
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FlarmAdaptor, FlarmAdaptorBuilder};
    use flarmlink_core::events::AdaptorEvent;
    use flarmlink_core::types::ConnectionStatus;
    use flarmlink_nmea::SELF_TEST_OK;
    use flarmlink_test_harness::{MockConnector, MockTransport};
    use std::path::Path;
    use tokio::sync::broadcast;

    const IDENTITY: &str = "$PFLAV,A,7.0,7.20,ALPS_2024*6B";
    const FIX: &str = "$GPGGA,120000,4800.000,N,00748.000,E,1,08,0.9,300.0,M,47.0,M,,*47";
    const TRAFFIC: &str = "$PFLAU,0,1,2,1,0,,0,,*60";
    const SELF_TEST: &str = "$PFLAE,A,0,0*33";

    fn write_log(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn replay_log() -> String {
        format!("0 {IDENTITY}\n1000 {FIX}\n\n1000 {TRAFFIC}\n7000 {SELF_TEST}\n")
    }

    async fn simulator(path: &Path) -> FlarmAdaptor {
        FlarmAdaptorBuilder::new()
            .simulator_file(path)
            .build_with_connector(Box::new(MockConnector::new()))
            .await
            .unwrap()
    }

    /// Run a replay to its end, returning each event with its offset in ms.
    async fn record_replay(path: &Path) -> Vec<(u128, AdaptorEvent)> {
        let adaptor = simulator(path).await;
        let mut events = adaptor.subscribe();
        let origin = Instant::now();
        adaptor.start().await.unwrap();

        let mut out = Vec::new();
        loop {
            let event = events.recv().await.unwrap();
            let done = event
                == AdaptorEvent::StatusChanged {
                    status: ConnectionStatus::Disconnected,
                };
            out.push((origin.elapsed().as_millis(), event));
            if done {
                break;
            }
        }
        while let Ok(event) = events.try_recv() {
            out.push((origin.elapsed().as_millis(), event));
        }
        adaptor.shutdown().await;
        out
    }

    fn drain(rx: &mut broadcast::Receiver<AdaptorEvent>) -> Vec<AdaptorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn replay_paces_records_and_ends_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "flight.log", &replay_log());

        let recorded = record_replay(&path).await;
        let status = |status| AdaptorEvent::StatusChanged { status };
        let expected: Vec<(u128, AdaptorEvent)> = vec![
            (0, status(ConnectionStatus::WaitingForData)),
            (0, status(ConnectionStatus::Connected)),
            (0, AdaptorEvent::HardwareVersionChanged { version: Some("7.0".into()) }),
            (0, AdaptorEvent::SoftwareVersionChanged { version: Some("7.20".into()) }),
            (
                0,
                AdaptorEvent::ObstacleDatabaseVersionChanged {
                    version: Some("ALPS_2024".into()),
                },
            ),
        ];
        assert_eq!(recorded[..5], expected[..]);

        assert_eq!(recorded[5].0, 1000);
        assert!(matches!(recorded[5].1, AdaptorEvent::LastFixChanged { fix: Some(_) }));

        // Last sentence at 2 s, heartbeat of 5 s.
        assert_eq!(recorded[6], (7000, status(ConnectionStatus::WaitingForData)));
        assert_eq!(recorded[7], (9000, status(ConnectionStatus::Connected)));
        assert_eq!(
            recorded[8],
            (
                9000,
                AdaptorEvent::SelfTestResultChanged {
                    result: Some(SELF_TEST_OK.into())
                }
            )
        );
        assert_eq!(recorded[9], (9000, status(ConnectionStatus::Disconnected)));
        assert_eq!(
            recorded.last(),
            Some(&(9000, AdaptorEvent::LastFixChanged { fix: None }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn replay_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "flight.log", &replay_log());

        let first = record_replay(&path).await;
        let second = record_replay(&path).await;
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_log_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let adaptor = simulator(&dir.path().join("missing.log")).await;
        let mut events = adaptor.subscribe();

        let result = adaptor.start().await;
        assert!(matches!(result, Err(Error::SimulatorLog { line: 0, .. })));
        assert_eq!(adaptor.status(), ConnectionStatus::Disconnected);
        assert!(matches!(
            drain(&mut events).as_slice(),
            [AdaptorEvent::RuntimeError { .. }]
        ));

        adaptor.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_log_fails_start_with_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "bad.log", &format!("0 {IDENTITY}\nx {FIX}\n"));
        let adaptor = simulator(&path).await;

        match adaptor.start().await {
            Err(Error::SimulatorLog { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected SimulatorLog error, got {other:?}"),
        }
        assert_eq!(adaptor.status(), ConnectionStatus::Disconnected);

        adaptor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn switching_between_live_and_simulator() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "flight.log", &format!("1000 {IDENTITY}\n"));

        let connector = MockConnector::new().accept(MockTransport::new().line(IDENTITY));
        let adaptor = FlarmAdaptorBuilder::new()
            .build_with_connector(Box::new(connector.clone()))
            .await
            .unwrap();
        let mut events = adaptor.subscribe();

        adaptor.start().await.unwrap();
        loop {
            let event = events.recv().await.unwrap();
            if matches!(event, AdaptorEvent::HardwareVersionChanged { .. }) {
                break;
            }
        }
        assert_eq!(adaptor.status(), ConnectionStatus::Connected);

        // Live -> simulator: the live session ends, the replay starts waiting.
        adaptor.use_simulator_file(Some(path)).await.unwrap();
        assert_eq!(adaptor.status(), ConnectionStatus::WaitingForData);
        assert!(adaptor.hardware_version().is_none());

        // Simulator -> live via an empty path.
        adaptor
            .use_simulator_file(Some(PathBuf::new()))
            .await
            .unwrap();
        assert_eq!(adaptor.status(), ConnectionStatus::Disconnected);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(connector.attempts(), 2);

        adaptor.shutdown().await;
    }

    #[tokio::test]
    async fn use_simulator_file_while_stopped_only_switches_mode() {
        let dir = tempfile::tempdir().unwrap();
        let adaptor = FlarmAdaptorBuilder::new()
            .build_with_connector(Box::new(MockConnector::new()))
            .await
            .unwrap();

        // Not running: no load happens yet, even for a missing file.
        adaptor
            .use_simulator_file(Some(dir.path().join("missing.log")))
            .await
            .unwrap();
        assert_eq!(adaptor.status(), ConnectionStatus::Disconnected);
        assert!(adaptor.start().await.is_err());

        adaptor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn capture_records_live_session() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.log");

        let transport = MockTransport::new()
            .line(IDENTITY)
            .pause(Duration::from_millis(1500))
            .line(FIX);
        let adaptor = FlarmAdaptorBuilder::new()
            .capture_file(&capture)
            .build_with_connector(Box::new(MockConnector::new().accept(transport)))
            .await
            .unwrap();
        let mut events = adaptor.subscribe();

        adaptor.start().await.unwrap();
        loop {
            let event = events.recv().await.unwrap();
            if matches!(event, AdaptorEvent::LastFixChanged { .. }) {
                break;
            }
        }
        adaptor.stop().await.unwrap();

        let log = SimulatorLog::load(&capture).await.unwrap();
        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sentence, IDENTITY);
        assert_eq!(records[0].delay, Duration::ZERO);
        assert_eq!(records[1].sentence, FIX);
        assert_eq!(records[1].delay, Duration::from_millis(1500));

        adaptor.shutdown().await;
    }
}
