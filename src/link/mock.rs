//! Mock node link for testing
//!
//! Clones share state, so a test keeps one handle to inject notifications and
//! faults while the supervisor owns the other.

use super::NodeLink;
use crate::core::types::PacketType;
use crate::error::{Error, Result};
use crate::protocol::constants::FRAME_SIZE;
use crate::protocol::frame::{control_frame, Control};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Longest a poll on an empty mock sleeps, so threaded tests do not spin
const IDLE_POLL_SLEEP: Duration = Duration::from_millis(1);

/// Scripted in-memory node
#[derive(Clone, Default)]
pub struct MockLink {
    inner: Arc<Mutex<MockLinkInner>>,
}

#[derive(Default)]
struct MockLinkInner {
    connected: bool,
    notifications: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    connect_attempts: usize,
    failing_connects: usize,
    pending_fault: bool,
    ack_handshakes: bool,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that answers every HANDSHAKE with an ACK, like real firmware
    pub fn responsive() -> Self {
        let link = Self::new();
        link.inner.lock().ack_handshakes = true;
        link
    }

    /// Queue one notification chunk
    pub fn inject_notification(&self, chunk: &[u8]) {
        self.inner.lock().notifications.push_back(chunk.to_vec());
    }

    /// Make the next poll report a dropped connection
    pub fn inject_fault(&self) {
        self.inner.lock().pending_fault = true;
    }

    /// Make the next `count` connect attempts fail
    pub fn fail_next_connects(&self, count: usize) {
        self.inner.lock().failing_connects = count;
    }

    /// All frames written so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner.lock().written.clone()
    }

    /// Packet types of the frames written so far
    pub fn written_types(&self) -> Vec<PacketType> {
        self.inner
            .lock()
            .written
            .iter()
            .filter_map(|frame| frame.first())
            .filter_map(|&byte| Control::from_byte(byte).ok())
            .map(|control| control.packet_type)
            .collect()
    }

    pub fn clear_written(&self) {
        self.inner.lock().written.clear();
    }

    pub fn connect_attempts(&self) -> usize {
        self.inner.lock().connect_attempts
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }
}

impl NodeLink for MockLink {
    fn connect(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.connect_attempts += 1;
        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(Error::LinkFault("mock connect refused".to_string()));
        }
        inner.connected = true;
        inner.pending_fault = false;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.inner.lock().connected = false;
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.connected {
            return Err(Error::LinkFault("mock not connected".to_string()));
        }
        inner.written.push(bytes.to_vec());

        if inner.ack_handshakes && bytes.len() == FRAME_SIZE {
            if let Ok(control) = Control::from_byte(bytes[0]) {
                if control.packet_type == PacketType::Handshake {
                    let ack = control_frame(
                        PacketType::Ack,
                        control.seq_bit,
                        control.player,
                        control.role,
                    );
                    inner.notifications.push_back(ack.to_vec());
                }
            }
        }
        Ok(())
    }

    fn poll(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        {
            let mut inner = self.inner.lock();
            if inner.pending_fault {
                inner.pending_fault = false;
                inner.connected = false;
                return Err(Error::LinkFault("mock link dropped".to_string()));
            }
            if !inner.connected {
                return Err(Error::LinkFault("mock not connected".to_string()));
            }
            if let Some(mut chunk) = inner.notifications.pop_front() {
                let n = chunk.len().min(buffer.len());
                buffer[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    inner.notifications.push_front(chunk.split_off(n));
                }
                return Ok(n);
            }
        }

        thread::sleep(timeout.min(IDLE_POLL_SLEEP));
        Ok(0)
    }
}
