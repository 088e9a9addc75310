// ── Tower bridge ──
//
// Feeds the control plane from two directions at once: the push stream
// (snapshots as they change) and a periodic snapshot poll that runs
// regardless of stream health, keeping correlation alive across stream
// outages. Both paths land in the same place: snapshot store, delta
// emitter, bus.
//
// A stream (re)connect resets the delta memory so no events are emitted
// for state that predates the new connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use cellgrid_api::{FleetSnapshot, StreamMessage};

use crate::bus::IncidentBus;
use crate::config::CoreConfig;
use crate::delta::DeltaEmitter;
use crate::device::TowerDevice;
use crate::logring::LogRing;
use crate::model::{iso_now, BusEvent, EventSource};
use crate::store::SnapshotStore;

/// Cadence of the quiet-stream watchdog.
const WATCHDOG_TICK: Duration = Duration::from_secs(5);

pub struct TowerBridge {
    device: Arc<dyn TowerDevice>,
    store: Arc<SnapshotStore>,
    bus: Arc<IncidentBus>,
    log: Arc<LogRing>,
    delta: Mutex<DeltaEmitter>,
    stream_connected: AtomicBool,
    last_stream_message: Mutex<Instant>,
    poll_interval: Duration,
    quiet_after: Duration,
}

impl TowerBridge {
    pub fn new(
        device: Arc<dyn TowerDevice>,
        store: Arc<SnapshotStore>,
        bus: Arc<IncidentBus>,
        log: Arc<LogRing>,
        config: &CoreConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            device,
            store,
            bus,
            log,
            delta: Mutex::new(DeltaEmitter::new(config.bootstrap_emit)),
            stream_connected: AtomicBool::new(false),
            last_stream_message: Mutex::new(Instant::now()),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            quiet_after: Duration::from_secs(config.quiet_after_secs.max(1)),
        })
    }

    /// Spawn the three bridge loops: stream ingest, periodic poll, and
    /// the quiet-stream watchdog.
    pub fn spawn(
        self: Arc<Self>,
        stream_rx: broadcast::Receiver<StreamMessage>,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(&self).ingest_loop(stream_rx, cancel.clone())),
            tokio::spawn(Arc::clone(&self).poll_loop(cancel.clone())),
            tokio::spawn(self.watchdog_loop(cancel)),
        ]
    }

    /// Apply one snapshot: cache it, emit its deltas, republish the full
    /// state for live views.
    pub fn apply_snapshot(&self, snapshot: &FleetSnapshot, source: EventSource) {
        self.store.apply(snapshot);
        let events = self
            .delta
            .lock()
            .expect("delta emitter poisoned")
            .ingest(snapshot, source);
        for event in events {
            self.bus.publish(event);
        }
        self.bus
            .publish(BusEvent::state_update(snapshot.clone(), iso_now()));
    }

    // ── Loops ────────────────────────────────────────────────────────

    async fn ingest_loop(
        self: Arc<Self>,
        mut stream_rx: broadcast::Receiver<StreamMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = stream_rx.recv() => match message {
                    Ok(StreamMessage::Connected) => {
                        self.stream_connected.store(true, Ordering::SeqCst);
                        self.touch();
                        self.delta.lock().expect("delta emitter poisoned").reset();
                        self.log.push("stream connected");
                        self.bus.publish(BusEvent::BusReconnected { ts: iso_now() });
                    }
                    Ok(StreamMessage::Disconnected) => {
                        self.stream_connected.store(false, Ordering::SeqCst);
                        self.log.push("stream disconnected");
                        self.bus.publish(BusEvent::BusDisconnected { ts: iso_now() });
                    }
                    Ok(StreamMessage::Snapshot(snapshot)) => {
                        self.touch();
                        self.apply_snapshot(&snapshot, EventSource::Stream);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(dropped = n, "bridge lagged behind the stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Fetch a snapshot every tick, stream or no stream. Failures are
    /// already retried by the client; here they only make a log line.
    async fn poll_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.device.fetch_state().await {
                        Ok(snapshot) => self.apply_snapshot(&snapshot, EventSource::Poll),
                        Err(e) => {
                            warn!(error = %e, "periodic snapshot poll failed");
                            self.log.push(format!("poll failed: {e}"));
                        }
                    }
                }
            }
        }
    }

    /// Warn when the stream claims to be connected but has been silent
    /// for longer than the quiet threshold.
    async fn watchdog_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(WATCHDOG_TICK);
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if self.stream_connected.load(Ordering::SeqCst) {
                        let silent_for = self
                            .last_stream_message
                            .lock()
                            .expect("bridge watchdog poisoned")
                            .elapsed();
                        if silent_for > self.quiet_after {
                            self.log.push(format!(
                                "stream quiet for {}s while connected",
                                silent_for.as_secs()
                            ));
                        }
                    }
                }
            }
        }
    }

    fn touch(&self) {
        *self
            .last_stream_message
            .lock()
            .expect("bridge watchdog poisoned") = Instant::now();
    }
}
