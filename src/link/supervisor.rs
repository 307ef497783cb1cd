//! Per-node supervision loop
//!
//! One supervisor runs on its own OS thread per sensor node and exclusively
//! owns that node's link, reassembler and state machine.
//!
//! # Loop
//!
//! 1. Connect (blocking, backoff-paced retries) and send HANDSHAKE
//! 2. Poll for one notification with a bounded wait
//! 3. Reassemble, run each frame through the state machine, write replies,
//!    queue DATA records with the player's aggregator
//! 4. Liveness: silence before the handshake completes re-sends HANDSHAKE;
//!    silence after it (if enabled) is raised as a link fault
//!
//! # Faults
//!
//! On any link fault the session is reset (buffer, ack bit, handshake flag),
//! the node is uncounted and a disconnect event is queued if it had been
//! counted, then the link is re-established. The node counts as connected
//! again once its handshake completes; if that completes the player's set a
//! connect event is queued.

use super::state_machine::{FrameOutcome, LinkStateMachine};
use super::NodeLink;
use crate::core::backoff::Backoff;
use crate::core::types::{NodeId, RelayEvent};
use crate::error::{Error, Result};
use crate::protocol::constants::MAX_NOTIFICATION_SIZE;
use crate::protocol::reassembler::Reassembler;
use crate::relay::aggregator::PlayerAggregator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Interval between debug-level counter dumps
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Timing and protocol knobs for one supervisor
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Bounded wait per notification poll
    pub poll_timeout: Duration,
    /// Silence before an unanswered HANDSHAKE is re-sent
    pub handshake_timeout: Duration,
    /// Silence after the handshake that counts as a dropped link
    pub silence_fault: Option<Duration>,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// Answer corrupt frames with NACK (early firmware)
    pub nack_on_invalid: bool,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(1500),
            handshake_timeout: Duration::from_millis(2000),
            silence_fault: Some(Duration::from_secs(10)),
            reconnect_initial: Duration::from_millis(250),
            reconnect_max: Duration::from_secs(5),
            nack_on_invalid: false,
        }
    }
}

/// Per-node counters, logged when the thread exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames: u64,
    pub corrupt_frames: u64,
    pub ignored_frames: u64,
    pub records: u64,
    pub handshakes_sent: u64,
    pub nacks_sent: u64,
    pub reconnects: u64,
}

/// Owns one node link and keeps it alive
pub struct LinkSupervisor<L: NodeLink> {
    link: L,
    label: String,
    machine: LinkStateMachine,
    reassembler: Reassembler,
    aggregator: Arc<PlayerAggregator>,
    settings: SupervisorSettings,
    running: Arc<AtomicBool>,
    backoff: Backoff,
    last_rx: Instant,
    last_handshake: Instant,
    /// Node is included in the player's connected count
    counted: bool,
    stats: LinkStats,
    last_stats_log: Instant,
    rx_buf: [u8; MAX_NOTIFICATION_SIZE],
    outcomes: Vec<FrameOutcome>,
}

impl<L: NodeLink> LinkSupervisor<L> {
    pub fn new(
        link: L,
        node: NodeId,
        label: &str,
        aggregator: Arc<PlayerAggregator>,
        settings: SupervisorSettings,
        running: Arc<AtomicBool>,
    ) -> Self {
        let now = Instant::now();
        Self {
            link,
            label: label.to_string(),
            machine: LinkStateMachine::new(node, settings.nack_on_invalid),
            reassembler: Reassembler::new(),
            aggregator,
            backoff: Backoff::new(settings.reconnect_initial, settings.reconnect_max),
            settings,
            running,
            last_rx: now,
            last_handshake: now,
            counted: false,
            stats: LinkStats::default(),
            last_stats_log: now,
            rx_buf: [0u8; MAX_NOTIFICATION_SIZE],
            outcomes: Vec::with_capacity(MAX_NOTIFICATION_SIZE / crate::protocol::FRAME_SIZE + 1),
        }
    }

    pub fn node(&self) -> NodeId {
        self.machine.node()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn machine(&self) -> &LinkStateMachine {
        &self.machine
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Whether this node currently counts toward the player's connected set
    pub fn is_counted(&self) -> bool {
        self.counted
    }

    /// Thread body: run until shutdown, then release the link
    pub fn run(mut self) -> LinkStats {
        log::info!("{}: connecting", self.label);

        if self.establish() {
            while self.running.load(Ordering::Relaxed) {
                if let Err(e) = self.poll_once() {
                    if !self.recover(&e) {
                        break;
                    }
                }
                if self.last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
                    self.last_stats_log = Instant::now();
                    log::debug!("{}: {:?}", self.label, self.stats);
                }
            }
        }

        self.shutdown();
        self.stats
    }

    /// Run [`run`](Self::run) on a named thread
    pub fn spawn(self) -> Result<JoinHandle<LinkStats>>
    where
        L: 'static,
    {
        let node = self.node();
        let name = format!("node-p{}-{}", node.player.bit() + 1, node.role).to_lowercase();
        thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .map_err(|e| Error::Other(format!("Failed to spawn node thread: {}", e)))
    }

    /// Connect and send the first HANDSHAKE, retrying until it works.
    ///
    /// Returns false if shutdown was requested first.
    pub fn establish(&mut self) -> bool {
        self.backoff.reset();
        loop {
            if !self.running.load(Ordering::Relaxed) {
                return false;
            }

            match self.link.connect() {
                Ok(()) => {
                    self.reset_session();
                    match self.send_handshake() {
                        Ok(()) => {
                            log::info!("{}: connected, handshake sent", self.label);
                            return true;
                        }
                        Err(e) => {
                            log::warn!("{}: handshake send failed: {}", self.label, e);
                            self.link.disconnect();
                        }
                    }
                }
                Err(e) => {
                    log::warn!(
                        "{}: connect failed (attempt {}): {}",
                        self.label,
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

    /// One poll iteration: receive, reassemble, dispatch, check liveness
    pub fn poll_once(&mut self) -> Result<()> {
        let n = self.link.poll(&mut self.rx_buf, self.settings.poll_timeout)?;
        let now = Instant::now();

        if n > 0 {
            let mut outcomes = std::mem::take(&mut self.outcomes);
            let machine = &mut self.machine;
            let frames = self
                .reassembler
                .push(&self.rx_buf[..n], |frame| outcomes.push(machine.on_frame(frame)));

            if frames > 0 {
                // Any complete frame proves the node is alive, valid or not
                self.last_rx = now;
                self.stats.frames += frames as u64;
            }

            let result = outcomes
                .drain(..)
                .try_for_each(|outcome| self.apply(outcome));
            self.outcomes = outcomes;
            result?;
        }

        self.check_liveness(now)
    }

    fn apply(&mut self, outcome: FrameOutcome) -> Result<()> {
        match outcome {
            FrameOutcome::Corrupt { error, nack } => {
                self.stats.corrupt_frames += 1;
                log::debug!("{}: dropped corrupt frame: {}", self.label, error);
                if let Some(nack) = nack {
                    self.link.write(&nack)?;
                    self.stats.nacks_sent += 1;
                }
            }
            FrameOutcome::HandshakeComplete { reply } => {
                self.link.write(&reply)?;
                log::info!("{}: handshake complete", self.label);
                self.mark_connected();
            }
            FrameOutcome::Data(record) => {
                self.stats.records += 1;
                log::trace!("{}: data {:?}", self.label, record);
                self.aggregator.enqueue(RelayEvent::Reading(record));
            }
            FrameOutcome::Ignored(packet_type) => {
                self.stats.ignored_frames += 1;
                log::trace!(
                    "{}: ignored {:?} in {:?}",
                    self.label,
                    packet_type,
                    self.machine.state()
                );
            }
        }
        Ok(())
    }

    fn check_liveness(&mut self, now: Instant) -> Result<()> {
        if !self.machine.handshake_complete() {
            let quiet_since = self.last_rx.max(self.last_handshake);
            if now.duration_since(quiet_since) >= self.settings.handshake_timeout {
                log::debug!("{}: no handshake reply, re-sending", self.label);
                self.send_handshake()?;
            }
        } else if let Some(limit) = self.settings.silence_fault {
            let silence = now.duration_since(self.last_rx);
            if silence > limit {
                return Err(Error::LinkFault(format!(
                    "no frames for {} ms",
                    silence.as_millis()
                )));
            }
        }
        Ok(())
    }

    /// Handle a fault: reset, account, announce, reconnect.
    ///
    /// Returns false if shutdown interrupted the reconnect.
    fn recover(&mut self, fault: &Error) -> bool {
        log::warn!("{}: link fault: {}", self.label, fault);
        self.link.disconnect();
        self.reset_session();

        if self.counted {
            self.counted = false;
            self.aggregator.node_disconnected();
            let node = self.node();
            self.aggregator.enqueue(RelayEvent::Disconnected {
                player: node.player,
                role: node.role,
            });
            log::info!(
                "{}: disconnected ({} of {} nodes connected)",
                self.label,
                self.aggregator.connected_nodes(),
                self.aggregator.expected_nodes()
            );
        }

        self.stats.reconnects += 1;
        log::info!("{}: reconnecting", self.label);
        self.establish()
    }

    fn mark_connected(&mut self) {
        if self.counted {
            return;
        }
        self.counted = true;
        let complete = self.aggregator.node_connected();
        log::info!(
            "{}: ready ({} of {} nodes connected)",
            self.label,
            self.aggregator.connected_nodes(),
            self.aggregator.expected_nodes()
        );
        if complete {
            let player = self.node().player;
            log::info!("{}: all nodes connected", player);
            self.aggregator.enqueue(RelayEvent::Connected { player });
        }
    }

    fn send_handshake(&mut self) -> Result<()> {
        let frame = self.machine.handshake_frame();
        self.link.write(&frame)?;
        self.last_handshake = Instant::now();
        self.stats.handshakes_sent += 1;
        Ok(())
    }

    /// Fresh session state after (re)connecting
    fn reset_session(&mut self) {
        self.reassembler.reset();
        self.machine.reset();
        let now = Instant::now();
        self.last_rx = now;
        self.last_handshake = now;
    }

    fn shutdown(&mut self) {
        self.link.disconnect();
        if self.counted {
            self.counted = false;
            self.aggregator.node_disconnected();
        }
        log::info!("{}: stopped ({:?})", self.label, self.stats);
    }
}
