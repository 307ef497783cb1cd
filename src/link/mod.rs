//! Node links: the radio-side collaborator and the per-node protocol on top of it
//!
//! - [`NodeLink`]: byte-level link to one node (connect, write, poll for notifications)
//! - [`LinkStateMachine`]: handshake / data state for one node, link-agnostic
//! - [`LinkSupervisor`]: the per-node thread body (liveness, reconnect, queueing)

use crate::error::Result;
use std::time::Duration;

pub mod mock;
mod serial;
pub mod state_machine;
pub mod supervisor;

pub use mock::MockLink;
pub use serial::SerialLink;
pub use state_machine::{FrameOutcome, LinkState, LinkStateMachine};
pub use supervisor::{LinkStats, LinkSupervisor, SupervisorSettings};

/// Link to one sensor node
///
/// Connection establishment and service discovery are the implementation's
/// business; the protocol only sees opaque notification chunks.
pub trait NodeLink: Send {
    /// Establish the physical connection. Fails with `Error::LinkFault`.
    fn connect(&mut self) -> Result<()>;

    /// Tear down the connection (best-effort, never fails)
    fn disconnect(&mut self);

    /// Write a whole frame to the node
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for one notification and copy it into `buffer`.
    ///
    /// Returns the number of bytes received, 0 if nothing arrived in time.
    /// A dropped connection is reported as an error.
    fn poll(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize>;
}
