//! Relay side: per-player queues, admission, downstream encoding and transport
//!
//! ```text
//! node threads ──enqueue──▶ PlayerAggregator (per player)
//!                                 │
//!                           relay thread: AdmissionGate ─▶ encode ─▶ RelaySink
//! ```

pub mod aggregator;
pub mod encoder;
pub mod gate;
pub mod mock;
pub mod transport;

pub use aggregator::{Drained, PlayerAggregator};
pub use encoder::{encode, RelayFrame};
pub use gate::AdmissionGate;
pub use mock::MockConnector;
pub use transport::{Connector, RelaySettings, RelaySink, RelayStats, RelayTransport, TcpConnector};
