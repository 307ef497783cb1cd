//! Configuration for the Setu relay
//!
//! Loaded from a TOML file. Every section except `[[nodes]]` has defaults, so a
//! minimal file only lists the nodes.

use crate::core::types::{DeviceRole, NodeId, PlayerId};
use crate::error::{Error, Result};
use crate::link::SupervisorSettings;
use crate::relay::RelaySettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub link: LinkConfig,
    pub relay: RelayConfig,
    pub gate: GateConfig,
    pub nodes: Vec<NodeConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter (trace, debug, info, warn, error); `RUST_LOG` wins
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Configured level as a filter
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        self.level
            .trim()
            .parse()
            .map_err(|_| invalid(&format!("logging.level '{}' is not a log level", self.level)))
    }
}

/// Node link timing, shared by every node
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    pub baud_rate: u32,
    /// Bounded wait per notification poll
    pub poll_timeout_ms: u64,
    /// Silence before an unanswered HANDSHAKE is re-sent
    pub handshake_timeout_ms: u64,
    /// Silence after the handshake that counts as a link fault (0 = off)
    pub silence_fault_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// Answer corrupt frames with NACK (early firmware)
    pub nack_on_invalid: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            poll_timeout_ms: 1500,
            handshake_timeout_ms: 2000,
            silence_fault_ms: 10000,
            reconnect_initial_ms: 250,
            reconnect_max_ms: 5000,
            nack_on_invalid: false,
        }
    }
}

/// Downstream connection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Local end of the externally managed tunnel
    ///
    /// Examples:
    /// - `127.0.0.1:8000` - tunnel forwarded on localhost
    pub address: String,
    /// Nodes that must be connected before a player's readings are forwarded
    pub nodes_per_player: usize,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// A write blocked this long ends the session (0 = wait forever)
    pub write_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8000".to_string(),
            nodes_per_player: 3,
            reconnect_initial_ms: 250,
            reconnect_max_ms: 5000,
            write_timeout_ms: 2000,
        }
    }
}

/// Motion admission tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Acceleration magnitude that opens a window
    pub magnitude_threshold: f32,
    /// Motion samples forwarded per window
    pub window_size: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            magnitude_threshold: crate::relay::gate::DEFAULT_MAGNITUDE_THRESHOLD,
            window_size: crate::relay::gate::DEFAULT_WINDOW_SIZE,
        }
    }
}

/// One sensor node
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// 0 or 1
    pub player: PlayerId,
    pub role: DeviceRole,
    /// Serial endpoint carrying the node's notifications (e.g. `/dev/rfcomm0`)
    pub port: String,
    /// Name used in log lines; defaults to "Player N ROLE"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl NodeConfig {
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.player, self.role)
    }

    pub fn label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.node_id().to_string())
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use setu::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("setu.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Two players, three nodes each, on consecutive rfcomm devices
    pub fn two_player_defaults() -> Self {
        let nodes = PlayerId::ALL
            .into_iter()
            .flat_map(|player| DeviceRole::ALL.into_iter().map(move |role| (player, role)))
            .enumerate()
            .map(|(i, (player, role))| NodeConfig {
                player,
                role,
                port: format!("/dev/rfcomm{}", i),
                label: None,
            })
            .collect();
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Reject configurations the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        self.logging.level_filter()?;
        if self.nodes.is_empty() {
            return Err(invalid("no [[nodes]] configured"));
        }
        if self.relay.address.is_empty() {
            return Err(invalid("relay.address is empty"));
        }
        if self.relay.nodes_per_player == 0 {
            return Err(invalid("relay.nodes_per_player must be at least 1"));
        }
        if self.gate.window_size == 0 {
            return Err(invalid("gate.window_size must be at least 1"));
        }
        if !(self.gate.magnitude_threshold.is_finite() && self.gate.magnitude_threshold >= 0.0) {
            return Err(invalid("gate.magnitude_threshold must be a non-negative number"));
        }
        if self.link.baud_rate == 0 {
            return Err(invalid("link.baud_rate must be positive"));
        }
        if self.link.poll_timeout_ms == 0 {
            return Err(invalid("link.poll_timeout_ms must be positive"));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.port.is_empty() {
                return Err(invalid(&format!("{} has no port", node.label())));
            }
            if !seen.insert(node.node_id()) {
                return Err(invalid(&format!("{} configured twice", node.node_id())));
            }
        }

        for player in self.players() {
            let count = self.nodes_for(player).count();
            if count != self.relay.nodes_per_player {
                return Err(invalid(&format!(
                    "{} has {} nodes, relay.nodes_per_player is {}",
                    player, count, self.relay.nodes_per_player
                )));
            }
        }
        Ok(())
    }

    /// Players that have at least one node, in id order
    pub fn players(&self) -> Vec<PlayerId> {
        PlayerId::ALL
            .into_iter()
            .filter(|&p| self.nodes_for(p).next().is_some())
            .collect()
    }

    pub fn nodes_for(&self, player: PlayerId) -> impl Iterator<Item = &NodeConfig> {
        self.nodes.iter().filter(move |n| n.player == player)
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        let link = &self.link;
        SupervisorSettings {
            poll_timeout: Duration::from_millis(link.poll_timeout_ms),
            handshake_timeout: Duration::from_millis(link.handshake_timeout_ms),
            silence_fault: (link.silence_fault_ms > 0)
                .then(|| Duration::from_millis(link.silence_fault_ms)),
            reconnect_initial: Duration::from_millis(link.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(link.reconnect_max_ms),
            nack_on_invalid: link.nack_on_invalid,
        }
    }

    /// Downstream write timeout, `None` when disabled
    pub fn relay_write_timeout(&self) -> Option<Duration> {
        (self.relay.write_timeout_ms > 0).then(|| Duration::from_millis(self.relay.write_timeout_ms))
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            magnitude_threshold: self.gate.magnitude_threshold,
            window_size: self.gate.window_size,
            reconnect_initial: Duration::from_millis(self.relay.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(self.relay.reconnect_max_ms),
        }
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidParameter(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::two_player_defaults();
        assert_eq!(config.nodes.len(), 6);
        assert_eq!(config.nodes[3].port, "/dev/rfcomm3");
        assert_eq!(config.nodes[3].player, PlayerId::Two);
        assert_eq!(config.nodes[3].role, DeviceRole::Motion);
        assert_eq!(config.relay.address, "127.0.0.1:8000");
        assert_eq!(config.relay_write_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.gate.magnitude_threshold, 1.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[logging]
level = "debug"

[link]
handshake_timeout_ms = 500
silence_fault_ms = 0
nack_on_invalid = true

[relay]
address = "10.0.0.2:9000"
nodes_per_player = 2
write_timeout_ms = 0

[gate]
window_size = 75

[[nodes]]
player = 0
role = "motion"
port = "/dev/rfcomm0"
label = "Left IMU"

[[nodes]]
player = 0
role = "emitter"
port = "/dev/rfcomm1"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.link.baud_rate, 115200);
        assert_eq!(config.relay.nodes_per_player, 2);
        assert_eq!(config.gate.window_size, 75);
        assert_eq!(config.gate.magnitude_threshold, 1.5);
        assert_eq!(config.relay_write_timeout(), None);
        assert_eq!(config.nodes[0].label(), "Left IMU");
        assert_eq!(config.nodes[1].label(), "Player 1 Emitter");
        assert_eq!(config.players(), vec![PlayerId::One]);
        assert!(config.validate().is_ok());

        let settings = config.supervisor_settings();
        assert_eq!(settings.handshake_timeout, Duration::from_millis(500));
        assert_eq!(settings.silence_fault, None);
        assert!(settings.nack_on_invalid);
    }

    #[test]
    fn test_bad_values_rejected() {
        let bad_player = "[[nodes]]\nplayer = 2\nrole = \"motion\"\nport = \"/dev/x\"\n";
        assert!(toml::from_str::<AppConfig>(bad_player).is_err());

        let bad_role = "[[nodes]]\nplayer = 0\nrole = \"camera\"\nport = \"/dev/x\"\n";
        assert!(toml::from_str::<AppConfig>(bad_role).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(AppConfig::default().validate().is_err());

        let mut config = AppConfig::two_player_defaults();
        config.nodes[1].role = DeviceRole::Motion;
        assert!(config.validate().is_err());

        let mut config = AppConfig::two_player_defaults();
        config.nodes.pop();
        assert!(config.validate().is_err());

        let mut config = AppConfig::two_player_defaults();
        config.gate.window_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logging_level() {
        let mut config = AppConfig::two_player_defaults();
        assert_eq!(config.logging.level_filter().unwrap(), log::LevelFilter::Info);

        config.logging.level = "DEBUG".to_string();
        assert_eq!(config.logging.level_filter().unwrap(), log::LevelFilter::Debug);
        assert!(config.validate().is_ok());

        config.logging.level = "loud".to_string();
        assert!(matches!(
            config.logging.level_filter(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setu.toml");
        let mut config = AppConfig::two_player_defaults();
        config.nodes[0].label = Some("P1 glove".to_string());
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.nodes.len(), 6);
        assert_eq!(loaded.nodes[0].label(), "P1 glove");
        assert_eq!(loaded.nodes[5].role, DeviceRole::Receiver);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(AppConfig::from_file("/nonexistent/setu.toml").is_err());
    }
}
