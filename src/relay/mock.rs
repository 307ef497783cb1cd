//! In-memory downstream for testing
//!
//! Every successful connect opens a new session; bytes written through a sink
//! are recorded against the session it was opened for.

use super::encoder::RelayFrame;
use super::transport::{Connector, RelaySink};
use crate::error::{Error, Result};
use crate::protocol::constants::RELAY_FRAME_SIZE;
use parking_lot::Mutex;
use std::sync::Arc;

/// Scripted connector shared between a test and the relay under test
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<MockConnectorInner>>,
}

#[derive(Debug, Default)]
struct MockConnectorInner {
    sessions: Vec<Vec<u8>>,
    connect_attempts: usize,
    failing_connects: usize,
    fail_next_send: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect attempts fail
    pub fn fail_next_connects(&self, count: usize) {
        self.inner.lock().failing_connects = count;
    }

    /// Make the next write on any sink fail
    pub fn fail_next_send(&self) {
        self.inner.lock().fail_next_send = true;
    }

    pub fn connect_attempts(&self) -> usize {
        self.inner.lock().connect_attempts
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Frames written in one session
    pub fn session_frames(&self, session: usize) -> Vec<RelayFrame> {
        self.inner
            .lock()
            .sessions
            .get(session)
            .map(|bytes| parse_frames(bytes))
            .unwrap_or_default()
    }

    /// Frames written across all sessions, in order
    pub fn frames(&self) -> Vec<RelayFrame> {
        let inner = self.inner.lock();
        inner
            .sessions
            .iter()
            .flat_map(|bytes| parse_frames(bytes))
            .collect()
    }

    /// Raw bytes written across all sessions
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().sessions.concat()
    }

    /// Forget everything written so far (sessions stay open)
    pub fn clear(&self) {
        for session in self.inner.lock().sessions.iter_mut() {
            session.clear();
        }
    }
}

fn parse_frames(bytes: &[u8]) -> Vec<RelayFrame> {
    bytes
        .chunks_exact(RELAY_FRAME_SIZE)
        .filter_map(|chunk| <&[u8; RELAY_FRAME_SIZE]>::try_from(chunk).ok())
        .map(RelayFrame::decode)
        .collect()
}

/// Sink for one mock session
#[derive(Debug)]
pub struct MockSink {
    inner: Arc<Mutex<MockConnectorInner>>,
    session: usize,
}

impl RelaySink for MockSink {
    fn send_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_next_send {
            inner.fail_next_send = false;
            return Err(Error::TransportFault("mock peer closed".to_string()));
        }
        inner.sessions[self.session].extend_from_slice(bytes);
        Ok(())
    }
}

impl Connector for MockConnector {
    type Sink = MockSink;

    fn connect(&mut self) -> Result<MockSink> {
        let mut inner = self.inner.lock();
        inner.connect_attempts += 1;
        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(Error::TransportFault("mock connect refused".to_string()));
        }
        inner.sessions.push(Vec::new());
        Ok(MockSink {
            inner: Arc::clone(&self.inner),
            session: inner.sessions.len() - 1,
        })
    }
}
