//! Process orchestration
//!
//! One thread per configured node, one relay thread, all sharing a running
//! flag. Threads are started together and joined on shutdown.

use crate::config::{AppConfig, NodeConfig};
use crate::core::types::PlayerId;
use crate::error::{Error, Result};
use crate::link::{LinkStats, LinkSupervisor, NodeLink, SerialLink};
use crate::relay::{Connector, PlayerAggregator, RelayStats, RelayTransport, TcpConnector};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Counters collected from every thread at shutdown
#[derive(Debug, Default)]
pub struct RunSummary {
    pub links: Vec<(String, LinkStats)>,
    pub relay: RelayStats,
}

/// Handles of a started relay
pub struct Running {
    aggregators: Vec<Arc<PlayerAggregator>>,
    nodes: Vec<(String, JoinHandle<LinkStats>)>,
    relay: JoinHandle<RelayStats>,
}

impl Running {
    /// Per-player queues, in player order
    pub fn aggregators(&self) -> &[Arc<PlayerAggregator>] {
        &self.aggregators
    }

    pub fn aggregator(&self, player: PlayerId) -> Option<&Arc<PlayerAggregator>> {
        self.aggregators.iter().find(|a| a.player() == player)
    }

    /// Wait for every thread to exit (after the running flag is cleared)
    pub fn join(self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut panicked = false;

        for (label, handle) in self.nodes {
            match handle.join() {
                Ok(stats) => summary.links.push((label, stats)),
                Err(_) => {
                    log::error!("{}: thread panicked", label);
                    panicked = true;
                }
            }
        }

        match self.relay.join() {
            Ok(stats) => summary.relay = stats,
            Err(_) => {
                log::error!("Relay thread panicked");
                panicked = true;
            }
        }

        if panicked {
            return Err(Error::ThreadPanic);
        }
        Ok(summary)
    }
}

/// Start every thread using serial node links and the TCP downstream
pub fn start(config: &AppConfig, running: Arc<AtomicBool>) -> Result<Running> {
    let baud_rate = config.link.baud_rate;
    let mut connector = TcpConnector::new(&config.relay.address);
    if let Some(timeout) = config.relay_write_timeout() {
        connector = connector.with_write_timeout(timeout);
    }
    start_with(
        config,
        |node| SerialLink::new(&node.port, baud_rate),
        connector,
        running,
    )
}

/// Start every thread with caller-supplied links and downstream
pub fn start_with<L, F, C>(
    config: &AppConfig,
    mut make_link: F,
    connector: C,
    running: Arc<AtomicBool>,
) -> Result<Running>
where
    L: NodeLink + 'static,
    F: FnMut(&NodeConfig) -> L,
    C: Connector + 'static,
{
    config.validate()?;

    let aggregators: Vec<Arc<PlayerAggregator>> = config
        .players()
        .into_iter()
        .map(|player| Arc::new(PlayerAggregator::new(player, config.relay.nodes_per_player)))
        .collect();

    let relay = RelayTransport::new(
        connector,
        aggregators.clone(),
        &config.relay_settings(),
        Arc::clone(&running),
    )
    .spawn()?;
    log::info!(
        "Relay thread started ({} players, downstream {})",
        aggregators.len(),
        config.relay.address
    );

    let settings = config.supervisor_settings();
    let mut nodes = Vec::with_capacity(config.nodes.len());
    for node in &config.nodes {
        let aggregator = aggregators
            .iter()
            .find(|a| a.player() == node.player)
            .cloned()
            .ok_or_else(|| Error::Other(format!("no queue for {}", node.player)))?;
        let label = node.label();
        let handle = LinkSupervisor::new(
            make_link(node),
            node.node_id(),
            &label,
            aggregator,
            settings.clone(),
            Arc::clone(&running),
        )
        .spawn()?;
        log::info!("{}: thread started on {}", label, node.port);
        nodes.push((label, handle));
    }

    Ok(Running {
        aggregators,
        nodes,
        relay,
    })
}
