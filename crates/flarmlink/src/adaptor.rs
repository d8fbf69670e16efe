//! The [`FlarmAdaptor`] handle.

use std::path::PathBuf;

use flarmlink_core::error::Result;
use flarmlink_core::events::AdaptorEvent;
use flarmlink_core::types::{AdaptorState, ConnectionStatus, LastFix};
use tokio::sync::{broadcast, watch};

use crate::io::EngineHandle;

/// Live telemetry adaptor for one FLARM device.
///
/// Created by [`FlarmAdaptorBuilder`](crate::FlarmAdaptorBuilder). The
/// adaptor starts stopped and `Disconnected`; [`start`](Self::start) opens
/// the live feed, or the simulator replay if a simulator file is set.
///
/// Observers read the current values through the accessors or
/// [`watch`](Self::watch), and react to changes through
/// [`subscribe`](Self::subscribe). Dropping the adaptor stops its engine
/// task; [`shutdown`](Self::shutdown) additionally waits for it.
pub struct FlarmAdaptor {
    engine: Option<EngineHandle>,
    event_tx: broadcast::Sender<AdaptorEvent>,
    state_rx: watch::Receiver<AdaptorState>,
}

impl FlarmAdaptor {
    pub(crate) fn new(
        engine: EngineHandle,
        event_tx: broadcast::Sender<AdaptorEvent>,
        state_rx: watch::Receiver<AdaptorState>,
    ) -> Self {
        Self {
            engine: Some(engine),
            event_tx,
            state_rx,
        }
    }

    fn engine(&self) -> Result<&EngineHandle> {
        self.engine
            .as_ref()
            .ok_or(flarmlink_core::Error::AdaptorClosed)
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Start the feed. Does nothing if it is already running.
    ///
    /// In simulator mode this fails if the log cannot be loaded; the status
    /// stays `Disconnected` and a `RuntimeError` event is emitted. In live
    /// mode connection failures are not errors: the adaptor keeps retrying
    /// in the background.
    pub async fn start(&self) -> Result<()> {
        self.engine()?.start().await
    }

    /// Stop the feed, close the connection and go `Disconnected`.
    ///
    /// Idempotent. When this returns, no timer armed before the call can
    /// fire any more.
    pub async fn stop(&self) -> Result<()> {
        self.engine()?.stop().await
    }

    /// Switch to replaying `path`, or back to live mode with `None` (or an
    /// empty path).
    ///
    /// A running feed is stopped and restarted in the new mode.
    pub async fn use_simulator_file(&self, path: Option<PathBuf>) -> Result<()> {
        self.engine()?.use_simulator_file(path).await
    }

    /// Stop the engine task and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Current connectivity status.
    pub fn status(&self) -> ConnectionStatus {
        self.state_rx.borrow().status
    }

    /// Hardware version reported by `PFLAV`.
    pub fn hardware_version(&self) -> Option<String> {
        self.state_rx.borrow().device_info.hardware_version.clone()
    }

    /// Firmware version reported by `PFLAV`.
    pub fn software_version(&self) -> Option<String> {
        self.state_rx.borrow().device_info.software_version.clone()
    }

    /// Installed obstacle database, if any.
    pub fn obstacle_database_version(&self) -> Option<String> {
        self.state_rx
            .borrow()
            .device_info
            .obstacle_database_version
            .clone()
    }

    /// Self-test text from the latest `PFLAE`; `OK` when healthy.
    pub fn self_test_result(&self) -> Option<String> {
        self.state_rx.borrow().device_info.self_test_result.clone()
    }

    /// Altitude and time of the most recent fix on this connection.
    pub fn last_fix(&self) -> Option<LastFix> {
        self.state_rx.borrow().last_fix
    }

    /// Full consistent snapshot.
    pub fn state(&self) -> AdaptorState {
        self.state_rx.borrow().clone()
    }

    /// A receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<AdaptorState> {
        self.state_rx.clone()
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<AdaptorEvent> {
        self.event_tx.subscribe()
    }
}

impl Drop for FlarmAdaptor {
    fn drop(&mut self) {
        if let Some(engine) = &self.engine {
            engine.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlarmAdaptorBuilder;
    use chrono::NaiveTime;
    use flarmlink_core::Error;
    use flarmlink_test_harness::{MockConnector, MockTcpServer, MockTransport};
    use std::time::Duration;

    const IDENTITY: &str = "$PFLAV,A,7.0,7.20,ALPS_2024*6B";
    const FIX: &str = "$GPGGA,120000,4800.000,N,00748.000,E,1,08,0.9,300.0,M,47.0,M,,*47";
    const SECOND: Duration = Duration::from_secs(1);

    async fn build(connector: &MockConnector) -> FlarmAdaptor {
        FlarmAdaptorBuilder::new()
            .reconnect_interval(Duration::from_secs(5))
            .heartbeat_timeout(Duration::from_secs(5))
            .build_with_connector(Box::new(connector.clone()))
            .await
            .unwrap()
    }

    /// Collect events until `pred` matches one (inclusive).
    async fn events_until(
        rx: &mut broadcast::Receiver<AdaptorEvent>,
        pred: impl Fn(&AdaptorEvent) -> bool,
    ) -> Vec<AdaptorEvent> {
        let mut out = Vec::new();
        loop {
            let event = rx.recv().await.unwrap();
            let done = pred(&event);
            out.push(event);
            if done {
                return out;
            }
        }
    }

    fn is_status(status: ConnectionStatus) -> impl Fn(&AdaptorEvent) -> bool {
        move |e| *e == AdaptorEvent::StatusChanged { status }
    }

    #[tokio::test(start_paused = true)]
    async fn identity_fix_silence_disconnect() {
        let transport = MockTransport::new()
            .line(IDENTITY)
            .line(FIX)
            .pause(Duration::from_secs(8))
            .disconnect();
        let connector = MockConnector::new().accept(transport);
        let adaptor = build(&connector).await;
        let mut events = adaptor.subscribe();

        adaptor.start().await.unwrap();

        events_until(&mut events, |e| matches!(e, AdaptorEvent::LastFixChanged { .. })).await;
        assert_eq!(adaptor.status(), ConnectionStatus::Connected);
        assert_eq!(adaptor.hardware_version().as_deref(), Some("7.0"));
        assert_eq!(adaptor.software_version().as_deref(), Some("7.20"));
        assert_eq!(adaptor.obstacle_database_version().as_deref(), Some("ALPS_2024"));
        let fix = adaptor.last_fix().unwrap();
        assert!((fix.altitude_m - 300.0).abs() < 1e-9);
        assert_eq!(fix.time, NaiveTime::from_hms_opt(12, 0, 0).unwrap());

        let connected_at = tokio::time::Instant::now();
        events_until(&mut events, is_status(ConnectionStatus::WaitingForData)).await;
        assert_eq!(
            tokio::time::Instant::now() - connected_at,
            Duration::from_secs(5)
        );
        assert_eq!(adaptor.hardware_version().as_deref(), Some("7.0"));
        assert!(adaptor.last_fix().is_some());

        events_until(&mut events, is_status(ConnectionStatus::Disconnected)).await;
        let state = adaptor.state();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.device_info.is_empty());
        assert!(state.last_fix.is_none());
        assert!(adaptor.hardware_version().is_none());

        adaptor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn accessors_mirror_snapshot() {
        let transport = MockTransport::new()
            .line(IDENTITY)
            .line("$PFLAE,A,0,0*33")
            .line(FIX)
            .pause(Duration::from_secs(60));
        let connector = MockConnector::new().accept(transport);
        let adaptor = build(&connector).await;
        let mut events = adaptor.subscribe();

        adaptor.start().await.unwrap();
        events_until(&mut events, |e| matches!(e, AdaptorEvent::LastFixChanged { .. })).await;

        let state = adaptor.state();
        let info = &state.device_info;
        assert_eq!(adaptor.status(), state.status);
        assert_eq!(adaptor.hardware_version(), info.hardware_version);
        assert_eq!(adaptor.software_version(), info.software_version);
        assert_eq!(adaptor.obstacle_database_version(), info.obstacle_database_version);
        assert_eq!(adaptor.self_test_result(), info.self_test_result);
        assert_eq!(adaptor.self_test_result().as_deref(), Some("OK"));
        assert_eq!(adaptor.last_fix(), state.last_fix);

        adaptor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_refusal() {
        let connector = MockConnector::new()
            .refuse()
            .refuse()
            .accept(MockTransport::new().line(IDENTITY));
        let adaptor = build(&connector).await;
        let mut events = adaptor.subscribe();

        let started = tokio::time::Instant::now();
        adaptor.start().await.unwrap();

        let seen = events_until(&mut events, is_status(ConnectionStatus::Connected)).await;
        let reconnects: Vec<u32> = seen
            .iter()
            .filter_map(|e| match e {
                AdaptorEvent::Reconnecting { attempt } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(reconnects, vec![1, 2]);
        assert_eq!(connector.attempts(), 3);
        assert_eq!(
            tokio::time::Instant::now() - started,
            Duration::from_secs(10)
        );

        adaptor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_connection_loss() {
        let connector = MockConnector::new()
            .accept(MockTransport::new().line(IDENTITY).disconnect())
            .accept(MockTransport::new().line(IDENTITY));
        let adaptor = build(&connector).await;
        let mut events = adaptor.subscribe();
        adaptor.start().await.unwrap();

        events_until(&mut events, is_status(ConnectionStatus::Disconnected)).await;
        let seen = events_until(&mut events, is_status(ConnectionStatus::Connected)).await;
        assert!(seen.contains(&AdaptorEvent::Reconnecting { attempt: 1 }));
        assert_eq!(adaptor.hardware_version().as_deref(), Some("7.0"));

        adaptor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fragmented_sentences_are_reassembled() {
        let transport = MockTransport::new()
            .data(b"$PFLAV,A,7.0,7.")
            .pause(SECOND)
            .data(b"20,ALPS_2024*6B\r\n");
        let connector = MockConnector::new().accept(transport);
        let adaptor = build(&connector).await;
        let mut events = adaptor.subscribe();
        adaptor.start().await.unwrap();

        events_until(&mut events, |e| {
            matches!(e, AdaptorEvent::HardwareVersionChanged { .. })
        })
        .await;
        assert_eq!(adaptor.software_version().as_deref(), Some("7.20"));

        adaptor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_silences_timers() {
        let connector = MockConnector::new().accept(MockTransport::new().line(IDENTITY));
        let adaptor = build(&connector).await;
        let mut events = adaptor.subscribe();
        adaptor.start().await.unwrap();
        events_until(&mut events, is_status(ConnectionStatus::Connected)).await;

        adaptor.stop().await.unwrap();
        adaptor.stop().await.unwrap();
        assert_eq!(adaptor.status(), ConnectionStatus::Disconnected);
        assert!(adaptor.hardware_version().is_none());

        let seen = events_until(&mut events, |e| {
            matches!(e, AdaptorEvent::HardwareVersionChanged { version: None })
        })
        .await;
        let disconnected = seen
            .iter()
            .position(|e| *e == AdaptorEvent::StatusChanged {
                status: ConnectionStatus::Disconnected,
            });
        assert_eq!(disconnected, Some(seen.len() - 2));

        // Well past the heartbeat and any reconnect: nothing else happens.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let mut rest = Vec::new();
        while let Ok(event) = events.try_recv() {
            rest.push(event);
        }
        assert!(
            !rest.iter().any(|e| matches!(e, AdaptorEvent::StatusChanged { .. })),
            "unexpected events after stop: {rest:?}"
        );
        assert_eq!(connector.attempts(), 1);

        adaptor.shutdown().await;
    }

    #[tokio::test]
    async fn live_feed_over_tcp() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.send_line(IDENTITY);
        server.send_raw(b"$PFLAU,0,1,2,1,0,,0,,*60\r\n$GPGGA,120000,4800.000,");
        server.pause(Duration::from_millis(20));
        server.send_raw(b"N,00748.000,E,1,08,0.9,300.0,M,47.0,M,,*47\r\n");
        server.start();

        let (host, port) = server.addr().rsplit_once(':').unwrap();
        let adaptor = FlarmAdaptorBuilder::new()
            .host(host)
            .port(port.parse().unwrap())
            .build()
            .await
            .unwrap();
        let mut events = adaptor.subscribe();
        adaptor.start().await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            events_until(&mut events, |e| matches!(e, AdaptorEvent::LastFixChanged { .. })),
        )
        .await
        .unwrap();
        assert_eq!(adaptor.status(), ConnectionStatus::Connected);
        assert_eq!(adaptor.obstacle_database_version().as_deref(), Some("ALPS_2024"));

        adaptor.shutdown().await;
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn watch_closes_after_shutdown() {
        let adaptor = build(&MockConnector::new()).await;
        let watch = adaptor.watch();
        adaptor.shutdown().await;
        assert!(watch.has_changed().is_err());
    }

    #[tokio::test]
    async fn closed_engine_reports_adaptor_closed() {
        let adaptor = build(&MockConnector::new()).await;
        if let Some(engine) = &adaptor.engine {
            engine.cancel.cancel();
        }
        // Give the engine task a chance to exit.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(adaptor.start().await, Err(Error::AdaptorClosed)));
    }
}
