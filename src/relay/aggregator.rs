//! Per-player record queue and connected-node accounting
//!
//! Every node thread of a player pushes into the same unbounded crossbeam
//! channel; the relay thread is the only consumer. Order is arrival order:
//! per-node order is preserved, interleaving across nodes is whatever the
//! threads produced. Nothing is dropped here; admission happens in the relay.
//!
//! The connected-node count is a plain atomic. It is only read to decide
//! whether readings may be forwarded, so a momentarily stale value is fine.

use crate::core::types::{PlayerId, RelayEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// What [`PlayerAggregator::drain`] removed from the queue
#[derive(Debug, Default)]
pub struct Drained {
    /// Readings discarded
    pub readings: usize,
    /// Connect/disconnect events found in the queue, in order
    pub lifecycle: Vec<RelayEvent>,
}

/// Multiple-producer / single-consumer queue for one player
pub struct PlayerAggregator {
    player: PlayerId,
    expected_nodes: usize,
    connected: AtomicUsize,
    can_forward: AtomicBool,
    tx: Sender<RelayEvent>,
    rx: Receiver<RelayEvent>,
}

impl PlayerAggregator {
    pub fn new(player: PlayerId, expected_nodes: usize) -> Self {
        let (tx, rx) = unbounded();
        Self {
            player,
            expected_nodes,
            connected: AtomicUsize::new(0),
            can_forward: AtomicBool::new(false),
            tx,
            rx,
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn expected_nodes(&self) -> usize {
        self.expected_nodes
    }

    /// Append an event. Safe to call from any node thread.
    pub fn enqueue(&self, event: RelayEvent) {
        debug_assert_eq!(event.player(), self.player, "event queued for wrong player");
        // We own a receiver, so the channel cannot be disconnected
        let _ = self.tx.send(event);
    }

    /// Non-blocking pop
    pub fn try_dequeue(&self) -> Option<RelayEvent> {
        self.rx.try_recv().ok()
    }

    /// Receiver for blocking/select based consumers
    pub fn receiver(&self) -> &Receiver<RelayEvent> {
        &self.rx
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Count a node as connected. Returns true when this completed the set.
    pub fn node_connected(&self) -> bool {
        let now = self.connected.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(now <= self.expected_nodes, "more nodes connected than configured");
        self.set_can_forward(now);
        now == self.expected_nodes
    }

    /// Count a node as gone
    pub fn node_disconnected(&self) {
        let previous = self
            .connected
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        debug_assert!(previous > 0, "disconnect without matching connect");
        self.set_can_forward(previous.saturating_sub(1));
    }

    pub fn connected_nodes(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    /// Readings are only forwarded while every node of the player is connected
    #[inline]
    pub fn can_forward(&self) -> bool {
        self.can_forward.load(Ordering::Acquire)
    }

    fn set_can_forward(&self, connected: usize) {
        self.can_forward
            .store(connected >= self.expected_nodes, Ordering::Release);
    }

    /// Empty the queue: readings are discarded, lifecycle events are returned
    pub fn drain(&self) -> Drained {
        let mut drained = Drained::default();
        while let Ok(event) = self.rx.try_recv() {
            if event.is_lifecycle() {
                drained.lifecycle.push(event);
            } else {
                drained.readings += 1;
            }
        }
        drained
    }

    /// Empty the queue entirely. Returns the number of events dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}
