//! Core types and helpers shared by the link and relay sides

pub mod backoff;
pub mod types;

pub use backoff::Backoff;
pub use types::{DeviceRole, NodeId, PacketType, PlayerId, RelayEvent, SensorRecord};
