//! Setu - relay between wireless sensor nodes and a downstream classifier
//!
//! Each player wears three nodes (motion, shot emitter, shot receiver). Every
//! node streams fixed 20-byte frames over its own link. Setu validates and
//! reassembles them, runs a small handshake per node, queues records per
//! player, admits motion samples in gesture-triggered bursts and forwards the
//! result to one downstream socket as 25-byte frames.
//!
//! ## Modules
//!
//! - [`protocol`]: node frame codec and reassembly
//! - [`link`]: node links, per-node state machine and supervisor thread
//! - [`relay`]: per-player queues, admission gate, relay encoding and transport
//! - [`app`]: thread orchestration
//! - [`config`]: TOML configuration

pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod link;
pub mod protocol;
pub mod relay;

pub use error::{Error, Result};
