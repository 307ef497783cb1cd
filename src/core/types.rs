//! Core data types shared by the link and relay sides.
//!
//! Key types:
//! - [`NodeId`]: identity of one sensor node (player + role)
//! - [`SensorRecord`]: validated reading decoded from a DATA frame
//! - [`RelayEvent`]: what node threads push into a player's queue

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Player a node belongs to (one bit on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PlayerId {
    One,
    Two,
}

impl PlayerId {
    pub const ALL: [PlayerId; 2] = [PlayerId::One, PlayerId::Two];

    /// Wire bit value (0 or 1)
    #[inline]
    pub fn bit(self) -> u8 {
        match self {
            PlayerId::One => 0,
            PlayerId::Two => 1,
        }
    }

    /// Decode from a single wire bit
    #[inline]
    pub fn from_bit(bit: u8) -> Self {
        if bit & 1 == 0 {
            PlayerId::One
        } else {
            PlayerId::Two
        }
    }

    /// Array index for per-player tables
    #[inline]
    pub fn index(self) -> usize {
        self.bit() as usize
    }
}

impl TryFrom<u8> for PlayerId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PlayerId::One),
            1 => Ok(PlayerId::Two),
            other => Err(Error::InvalidParameter(format!(
                "player id must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

impl From<PlayerId> for u8 {
    fn from(player: PlayerId) -> u8 {
        player.bit()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}", self.bit() + 1)
    }
}

/// Fixed role of a sensor node (two bits on the wire, 0 is unused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// IMU streaming gyro + accel
    Motion,
    /// Shot emitter (gun)
    Emitter,
    /// Shot receiver (vest)
    Receiver,
}

impl DeviceRole {
    pub const ALL: [DeviceRole; 3] = [DeviceRole::Motion, DeviceRole::Emitter, DeviceRole::Receiver];

    /// Wire value
    #[inline]
    pub fn bits(self) -> u8 {
        match self {
            DeviceRole::Motion => 1,
            DeviceRole::Emitter => 2,
            DeviceRole::Receiver => 3,
        }
    }

    /// Decode the two-bit role field; 0 is not a valid role
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            1 => Ok(DeviceRole::Motion),
            2 => Ok(DeviceRole::Emitter),
            3 => Ok(DeviceRole::Receiver),
            other => Err(Error::InvalidPacket(format!("unknown device role {}", other))),
        }
    }

    /// True for the roles that carry shot events
    #[inline]
    pub fn is_shot_device(self) -> bool {
        matches!(self, DeviceRole::Emitter | DeviceRole::Receiver)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceRole::Motion => "IMU",
            DeviceRole::Emitter => "Emitter",
            DeviceRole::Receiver => "Receiver",
        };
        f.write_str(name)
    }
}

/// Packet type carried in the top two bits of the control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Handshake,
    Ack,
    Nack,
    Data,
}

impl PacketType {
    #[inline]
    pub fn bits(self) -> u8 {
        match self {
            PacketType::Handshake => 0,
            PacketType::Ack => 1,
            PacketType::Nack => 2,
            PacketType::Data => 3,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketType::Handshake),
            1 => Ok(PacketType::Ack),
            2 => Ok(PacketType::Nack),
            3 => Ok(PacketType::Data),
            other => Err(Error::InvalidPacket(format!("unknown packet type {}", other))),
        }
    }
}

/// Identity of one sensor node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub player: PlayerId,
    pub role: DeviceRole,
}

impl NodeId {
    pub const fn new(player: PlayerId, role: DeviceRole) -> Self {
        Self { player, role }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.player, self.role)
    }
}

/// Validated reading from a DATA frame. Never mutated once queued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRecord {
    pub player: PlayerId,
    pub role: DeviceRole,
    pub seq_bit: bool,
    pub shot_sent: bool,
    pub shot_received: bool,
    /// Raw angular rate samples
    pub gyro: [i16; 3],
    /// Acceleration, already in physical units
    pub accel: [f32; 3],
}

impl SensorRecord {
    /// Euclidean norm of the acceleration triple
    #[inline]
    pub fn accel_magnitude(&self) -> f32 {
        let [x, y, z] = self.accel;
        (x * x + y * y + z * z).sqrt()
    }
}

/// Entry in a player's relay queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelayEvent {
    /// Sensor reading from a node in DATA_READY
    Reading(SensorRecord),
    /// All of the player's nodes are connected
    Connected { player: PlayerId },
    /// One of the player's nodes dropped its link
    Disconnected { player: PlayerId, role: DeviceRole },
}

impl RelayEvent {
    pub fn player(&self) -> PlayerId {
        match self {
            RelayEvent::Reading(record) => record.player,
            RelayEvent::Connected { player } => *player,
            RelayEvent::Disconnected { player, .. } => *player,
        }
    }

    /// Connect/disconnect events bypass admission control
    #[inline]
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, RelayEvent::Reading(_))
    }
}
