//! Outbound relay: drains every player's queue, applies admission, writes
//! 25-byte frames to the downstream consumer.
//!
//! A single thread owns the socket. Events are taken from each player lane in
//! turn, at most `LANE_BATCH` at a time so one busy player cannot starve the
//! other. When every lane is empty the thread parks on the queues' receivers
//! with a short timeout.
//!
//! # Session handling
//!
//! A failed write ends the session: the socket is dropped, the connector is
//! retried with backoff, and every lane is reset (queue drained, gate closed)
//! before anything else is sent. The new session then starts with a connect
//! frame for each player whose nodes are all connected.

use super::aggregator::PlayerAggregator;
use super::encoder::encode;
use super::gate::AdmissionGate;
use crate::core::backoff::Backoff;
use crate::core::types::{PlayerId, RelayEvent};
use crate::error::{Error, Result};
use crossbeam_channel::Select;
use std::collections::VecDeque;
use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Events taken from one lane before moving to the next
const LANE_BATCH: usize = 32;

/// Longest the relay parks when every queue is empty
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Interval between debug-level counter dumps
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Open byte stream to the downstream consumer
pub trait RelaySink: Send {
    /// Write every byte or fail with `Error::TransportFault`
    fn send_all(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Factory for fresh downstream sessions
pub trait Connector: Send {
    type Sink: RelaySink;

    /// Blocking connect. Fails with `Error::TransportFault`.
    fn connect(&mut self) -> Result<Self::Sink>;
}

impl RelaySink for TcpStream {
    fn send_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)
            .and_then(|_| self.flush())
            .map_err(|e| Error::TransportFault(format!("send: {}", e)))
    }
}

/// Connects to the local end of the downstream tunnel
pub struct TcpConnector {
    address: String,
    write_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            write_timeout: None,
        }
    }

    /// Treat a write blocked longer than `timeout` as a broken session
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}

impl Connector for TcpConnector {
    type Sink = TcpStream;

    fn connect(&mut self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.address)
            .map_err(|e| Error::TransportFault(format!("connect {}: {}", self.address, e)))?;
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY on {}: {}", self.address, e);
        }
        stream
            .set_write_timeout(self.write_timeout)
            .map_err(|e| Error::TransportFault(format!("configure {}: {}", self.address, e)))?;
        log::info!("Relay connected to {}", self.address);
        Ok(stream)
    }
}

/// Admission and reconnect settings for the relay thread
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub magnitude_threshold: f32,
    pub window_size: u32,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            magnitude_threshold: super::gate::DEFAULT_MAGNITUDE_THRESHOLD,
            window_size: super::gate::DEFAULT_WINDOW_SIZE,
            reconnect_initial: Duration::from_millis(250),
            reconnect_max: Duration::from_secs(5),
        }
    }
}

/// Relay counters, logged when the thread exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Readings written downstream
    pub forwarded: u64,
    /// Connect/disconnect frames written downstream (resync included)
    pub lifecycle_sent: u64,
    /// Motion readings dropped by the admission gate
    pub gated_out: u64,
    /// Readings dropped because the player was not fully connected
    pub not_ready: u64,
    /// Readings discarded by disconnect drains and session resets
    pub stale_drained: u64,
    pub transport_reconnects: u64,
}

/// Per-player relay state: queue, gate, and lifecycle events recovered from a drain
struct Lane {
    aggregator: Arc<PlayerAggregator>,
    gate: AdmissionGate,
    pending: VecDeque<RelayEvent>,
}

impl Lane {
    fn next_event(&mut self) -> Option<RelayEvent> {
        self.pending
            .pop_front()
            .or_else(|| self.aggregator.try_dequeue())
    }

    /// Drop everything queued and close the gate. Returns readings discarded.
    fn reset(&mut self) -> usize {
        self.gate.reset();
        let dropped = self
            .pending
            .drain(..)
            .filter(|e| !e.is_lifecycle())
            .count();
        let drained = self.aggregator.drain();
        dropped + drained.readings
    }
}

/// The relay thread body
pub struct RelayTransport<C: Connector> {
    connector: C,
    sink: Option<C::Sink>,
    lanes: Vec<Lane>,
    running: Arc<AtomicBool>,
    backoff: Backoff,
    stats: RelayStats,
    last_stats_log: Instant,
}

impl<C: Connector> RelayTransport<C> {
    pub fn new(
        connector: C,
        aggregators: Vec<Arc<PlayerAggregator>>,
        settings: &RelaySettings,
        running: Arc<AtomicBool>,
    ) -> Self {
        let lanes = aggregators
            .into_iter()
            .map(|aggregator| Lane {
                aggregator,
                gate: AdmissionGate::new(settings.magnitude_threshold, settings.window_size),
                pending: VecDeque::new(),
            })
            .collect();

        Self {
            connector,
            sink: None,
            lanes,
            running,
            backoff: Backoff::new(settings.reconnect_initial, settings.reconnect_max),
            stats: RelayStats::default(),
            last_stats_log: Instant::now(),
        }
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    /// Gate state of a player, if it has a lane
    pub fn gate(&self, player: PlayerId) -> Option<&AdmissionGate> {
        self.lane_index(player).map(|i| &self.lanes[i].gate)
    }

    /// Thread body: run until shutdown
    pub fn run(mut self) -> RelayStats {
        if self.establish() {
            while self.running.load(Ordering::Relaxed) {
                match self.pump() {
                    Ok(0) => self.wait_for_events(),
                    Ok(_) => {}
                    Err(e) => {
                        if !self.recover(&e) {
                            break;
                        }
                    }
                }
                self.log_stats_periodically();
            }
        }

        self.sink = None;
        log::info!("Relay stopped ({:?})", self.stats);
        self.stats
    }

    /// Run [`run`](Self::run) on a named thread
    pub fn spawn(self) -> Result<JoinHandle<RelayStats>>
    where
        C: 'static,
    {
        thread::Builder::new()
            .name("relay".to_string())
            .spawn(move || self.run())
            .map_err(|e| Error::Other(format!("Failed to spawn relay thread: {}", e)))
    }

    /// Open a session, reset every lane, announce connected players.
    ///
    /// Retries with backoff until it works. Returns false if shutdown was
    /// requested first.
    pub fn establish(&mut self) -> bool {
        self.sink = None;
        self.backoff.reset();
        loop {
            if !self.running.load(Ordering::Relaxed) {
                return false;
            }

            match self.connector.connect() {
                Ok(sink) => {
                    self.sink = Some(sink);
                    self.reset_all();
                    match self.resync() {
                        Ok(()) => return true,
                        Err(e) => {
                            log::warn!("Relay resync failed: {}", e);
                            self.sink = None;
                        }
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Relay connect failed (attempt {}): {}",
                        self.backoff.attempts() + 1,
                        e
                    );
                }
            }

            if !self.backoff.wait(&self.running) {
                return false;
            }
        }
    }

    /// Handle a transport fault. Returns false if shutdown interrupted the reconnect.
    pub fn recover(&mut self, fault: &Error) -> bool {
        log::warn!("Relay session lost: {}", fault);
        self.stats.transport_reconnects += 1;
        self.establish()
    }

    /// Drain every lane and close every gate
    pub fn reset_all(&mut self) {
        let mut dropped = 0;
        for lane in &mut self.lanes {
            dropped += lane.reset();
        }
        self.stats.stale_drained += dropped as u64;
        if dropped > 0 {
            log::info!("Relay reset: discarded {} stale readings", dropped);
        }
    }

    /// Announce every fully connected player to a fresh session
    fn resync(&mut self) -> Result<()> {
        let ready: Vec<PlayerId> = self
            .lanes
            .iter()
            .filter(|lane| lane.aggregator.can_forward())
            .map(|lane| lane.aggregator.player())
            .collect();
        for player in ready {
            log::debug!("Relay resync: {} connected", player);
            self.send(&RelayEvent::Connected { player })?;
            self.stats.lifecycle_sent += 1;
        }
        Ok(())
    }

    /// Process up to one batch per lane. Returns the number of events taken.
    pub fn pump(&mut self) -> Result<usize> {
        let mut handled = 0;
        for index in 0..self.lanes.len() {
            for _ in 0..LANE_BATCH {
                let Some(event) = self.lanes[index].next_event() else {
                    break;
                };
                handled += 1;
                self.process(index, event)?;
            }
        }
        Ok(handled)
    }

    fn process(&mut self, index: usize, event: RelayEvent) -> Result<()> {
        match event {
            RelayEvent::Disconnected { player, role } => {
                self.send(&event)?;
                self.stats.lifecycle_sent += 1;

                let lane = &mut self.lanes[index];
                lane.gate.reset();
                let drained = lane.aggregator.drain();
                // Lifecycle events found in the drain still go out, in order
                lane.pending.extend(drained.lifecycle);
                self.stats.stale_drained += drained.readings as u64;
                log::info!(
                    "{} {} disconnected: gate reset, {} stale readings dropped",
                    player,
                    role,
                    drained.readings
                );
            }
            RelayEvent::Connected { player } => {
                self.send(&event)?;
                self.stats.lifecycle_sent += 1;
                log::info!("{} connected: forwarding enabled", player);
            }
            RelayEvent::Reading(record) => {
                let lane = &mut self.lanes[index];
                if !lane.aggregator.can_forward() {
                    self.stats.not_ready += 1;
                } else if lane.gate.admit(&record) {
                    self.send(&event)?;
                    self.stats.forwarded += 1;
                } else {
                    self.stats.gated_out += 1;
                }
            }
        }
        Ok(())
    }

    fn send(&mut self, event: &RelayEvent) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::TransportFault("no relay session".to_string()))?;
        let frame = encode(event);
        if let Err(e) = sink.send_all(&frame) {
            self.sink = None;
            return Err(e);
        }
        Ok(())
    }

    /// Park until any queue has something, or a short timeout
    fn wait_for_events(&self) {
        if self.lanes.iter().any(|lane| !lane.pending.is_empty()) {
            return;
        }
        let mut select = Select::new();
        for lane in &self.lanes {
            select.recv(lane.aggregator.receiver());
        }
        // Timing out is the normal idle path
        let _ = select.ready_timeout(IDLE_WAIT);
    }

    fn lane_index(&self, player: PlayerId) -> Option<usize> {
        self.lanes
            .iter()
            .position(|lane| lane.aggregator.player() == player)
    }

    fn log_stats_periodically(&mut self) {
        if self.last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
            self.last_stats_log = Instant::now();
            log::debug!("Relay stats: {:?}", self.stats);
        }
    }
}
