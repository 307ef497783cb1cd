//! Per-node handshake / data state machine
//!
//! ```text
//! ┌─────────────────────────┐  valid ACK   ┌────────────┐
//! │ AwaitingHandshakeAck    │ ───────────▶ │ DataReady  │
//! │ (HANDSHAKE sent)        │  (reply ACK) │            │
//! └─────────────────────────┘              └────────────┘
//!            ▲                                   │
//!            └──────── reset() on reconnect ─────┘
//! ```
//!
//! The machine never touches the link. It produces the bytes to write and the
//! records to queue; the supervisor does the I/O. Sequencing is a single
//! alternating bit: the link below already keeps per-node byte order, so only
//! duplicate handshakes need suppressing.

use crate::core::types::{NodeId, PacketType, SensorRecord};
use crate::error::Error;
use crate::protocol::constants::FRAME_SIZE;
use crate::protocol::frame::{control_frame, WireFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    AwaitingHandshakeAck,
    DataReady,
}

/// Result of feeding one reassembled frame to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Checksum or field validation failed. `nack` is set when the legacy
    /// NACK-on-invalid behaviour is enabled.
    Corrupt {
        error: String,
        nack: Option<[u8; FRAME_SIZE]>,
    },
    /// Handshake acknowledged; `reply` is the ACK to send back
    HandshakeComplete { reply: [u8; FRAME_SIZE] },
    /// Valid DATA in DataReady
    Data(SensorRecord),
    /// Valid frame that does not fit the current state (stale or duplicate)
    Ignored(PacketType),
}

/// Handshake and sequencing state for one node
#[derive(Debug, Clone)]
pub struct LinkStateMachine {
    node: NodeId,
    state: LinkState,
    ack_bit: bool,
    nack_on_invalid: bool,
}

impl LinkStateMachine {
    pub fn new(node: NodeId, nack_on_invalid: bool) -> Self {
        Self {
            node,
            state: LinkState::AwaitingHandshakeAck,
            ack_bit: false,
            nack_on_invalid,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn ack_bit(&self) -> bool {
        self.ack_bit
    }

    #[inline]
    pub fn handshake_complete(&self) -> bool {
        self.state == LinkState::DataReady
    }

    /// Build the HANDSHAKE frame to send.
    ///
    /// Only moves the machine back to `AwaitingHandshakeAck` when the
    /// handshake has not completed; re-sends during the wait are harmless.
    pub fn handshake_frame(&mut self) -> [u8; FRAME_SIZE] {
        if self.state != LinkState::DataReady {
            self.state = LinkState::AwaitingHandshakeAck;
        }
        control_frame(
            PacketType::Handshake,
            self.ack_bit,
            self.node.player,
            self.node.role,
        )
    }

    /// Feed one reassembled frame
    pub fn on_frame(&mut self, bytes: &[u8; FRAME_SIZE]) -> FrameOutcome {
        let frame = match WireFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(e) => return self.corrupt(e),
        };

        // A frame must carry this node's own identity
        let (player, role) = (frame.control.player, frame.control.role);
        if player != self.node.player || role != self.node.role {
            return self.corrupt(Error::InvalidPacket(format!(
                "frame from {} {} on {} link",
                player, role, self.node
            )));
        }

        match (frame.control.packet_type, self.state) {
            (PacketType::Ack, LinkState::AwaitingHandshakeAck) => {
                self.state = LinkState::DataReady;
                FrameOutcome::HandshakeComplete {
                    reply: control_frame(
                        PacketType::Ack,
                        self.ack_bit,
                        self.node.player,
                        self.node.role,
                    ),
                }
            }
            (PacketType::Data, LinkState::DataReady) => {
                self.ack_bit = frame.control.seq_bit;
                FrameOutcome::Data(frame.to_record())
            }
            (packet_type, _) => FrameOutcome::Ignored(packet_type),
        }
    }

    /// Back to the freshly-connected state
    pub fn reset(&mut self) {
        self.state = LinkState::AwaitingHandshakeAck;
        self.ack_bit = false;
    }

    fn corrupt(&self, error: Error) -> FrameOutcome {
        let nack = self.nack_on_invalid.then(|| {
            control_frame(
                PacketType::Nack,
                self.ack_bit,
                self.node.player,
                self.node.role,
            )
        });
        FrameOutcome::Corrupt {
            error: error.to_string(),
            nack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DeviceRole, PlayerId};
    use crate::protocol::constants::CHECKSUM_POS;
    use crate::protocol::frame::{build_frame, decode_control, Control};

    const NODE: NodeId = NodeId::new(PlayerId::One, DeviceRole::Motion);

    fn ack() -> [u8; FRAME_SIZE] {
        control_frame(PacketType::Ack, false, NODE.player, NODE.role)
    }

    fn data(seq: bool, accel: [f32; 3]) -> [u8; FRAME_SIZE] {
        let control = Control::new(PacketType::Data, seq, NODE.player, NODE.role);
        build_frame(control.to_byte(), &[100, -200, 300], &accel)
    }

    fn ready_machine() -> LinkStateMachine {
        let mut sm = LinkStateMachine::new(NODE, false);
        sm.handshake_frame();
        assert!(matches!(
            sm.on_frame(&ack()),
            FrameOutcome::HandshakeComplete { .. }
        ));
        sm
    }

    #[test]
    fn test_handshake_frame_fields() {
        let mut sm = LinkStateMachine::new(NODE, false);
        let frame = sm.handshake_frame();
        assert_eq!(
            decode_control(frame[0]).unwrap(),
            (PacketType::Handshake, false, PlayerId::One, DeviceRole::Motion)
        );
        assert_eq!(sm.state(), LinkState::AwaitingHandshakeAck);
    }

    #[test]
    fn test_ack_completes_handshake_and_replies_ack() {
        let mut sm = LinkStateMachine::new(NODE, false);
        sm.handshake_frame();
        match sm.on_frame(&ack()) {
            FrameOutcome::HandshakeComplete { reply } => {
                assert_eq!(decode_control(reply[0]).unwrap().0, PacketType::Ack);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(sm.handshake_complete());
    }

    #[test]
    fn test_data_before_handshake_is_ignored() {
        let mut sm = LinkStateMachine::new(NODE, false);
        sm.handshake_frame();
        assert_eq!(
            sm.on_frame(&data(true, [0.0; 3])),
            FrameOutcome::Ignored(PacketType::Data)
        );
        assert_eq!(sm.state(), LinkState::AwaitingHandshakeAck);
        assert!(!sm.ack_bit());
    }

    #[test]
    fn test_data_produces_record_and_tracks_seq() {
        let mut sm = ready_machine();
        match sm.on_frame(&data(true, [0.2, 0.3, 0.1])) {
            FrameOutcome::Data(record) => {
                assert_eq!(record.gyro, [100, -200, 300]);
                assert_eq!(record.accel, [0.2, 0.3, 0.1]);
                assert!(record.seq_bit);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(sm.ack_bit());
        assert!(matches!(
            sm.on_frame(&data(false, [0.0; 3])),
            FrameOutcome::Data(_)
        ));
        assert!(!sm.ack_bit());
    }

    #[test]
    fn test_repeated_handshake_and_ack_in_data_ready_are_idempotent() {
        let mut sm = ready_machine();
        let handshake = control_frame(PacketType::Handshake, false, NODE.player, NODE.role);
        for _ in 0..3 {
            assert_eq!(
                sm.on_frame(&handshake),
                FrameOutcome::Ignored(PacketType::Handshake)
            );
            assert_eq!(sm.on_frame(&ack()), FrameOutcome::Ignored(PacketType::Ack));
        }
        assert!(sm.handshake_complete());

        // Re-sending our own handshake does not leave DataReady either
        sm.handshake_frame();
        assert!(sm.handshake_complete());
    }

    #[test]
    fn test_corrupt_frame_silently_dropped() {
        let mut sm = ready_machine();
        let mut bad = data(true, [1.0; 3]);
        bad[CHECKSUM_POS] ^= 0xFF;
        match sm.on_frame(&bad) {
            FrameOutcome::Corrupt { nack, .. } => assert!(nack.is_none()),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(sm.handshake_complete());
        assert!(!sm.ack_bit());
    }

    #[test]
    fn test_corrupt_frame_nack_when_enabled() {
        let mut sm = LinkStateMachine::new(NODE, true);
        let mut bad = ack();
        bad[3] ^= 0x01;
        match sm.on_frame(&bad) {
            FrameOutcome::Corrupt {
                nack: Some(nack), ..
            } => {
                assert_eq!(decode_control(nack[0]).unwrap().0, PacketType::Nack);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(sm.state(), LinkState::AwaitingHandshakeAck);
    }

    #[test]
    fn test_unknown_role_is_corrupt() {
        let mut sm = ready_machine();
        // DATA with role bits 00
        let bad = build_frame(0b1100_0000, &[0; 3], &[0.0; 3]);
        assert!(matches!(sm.on_frame(&bad), FrameOutcome::Corrupt { .. }));
    }

    #[test]
    fn test_foreign_identity_is_corrupt() {
        let mut sm = ready_machine();
        let other_player = Control::new(PacketType::Data, true, PlayerId::Two, DeviceRole::Motion);
        let other_role = Control::new(PacketType::Data, true, PlayerId::One, DeviceRole::Emitter);
        for control in [other_player, other_role] {
            let frame = build_frame(control.to_byte(), &[0; 3], &[2.0; 3]);
            assert!(matches!(sm.on_frame(&frame), FrameOutcome::Corrupt { .. }));
        }
        assert!(sm.handshake_complete());
        assert!(!sm.ack_bit());

        // A foreign ACK does not complete our handshake
        let mut sm = LinkStateMachine::new(NODE, false);
        sm.handshake_frame();
        let foreign_ack = control_frame(PacketType::Ack, false, PlayerId::Two, NODE.role);
        assert!(matches!(sm.on_frame(&foreign_ack), FrameOutcome::Corrupt { .. }));
        assert_eq!(sm.state(), LinkState::AwaitingHandshakeAck);
    }

    #[test]
    fn test_reset() {
        let mut sm = ready_machine();
        sm.on_frame(&data(true, [0.0; 3]));
        sm.reset();
        assert_eq!(sm.state(), LinkState::AwaitingHandshakeAck);
        assert!(!sm.ack_bit());
    }
}
