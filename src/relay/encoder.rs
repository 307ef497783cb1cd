//! Relay frame encoding
//!
//! Layout (25 bytes, big-endian):
//! ```text
//! [0]      details: player(7) shot_sent(6) shot_received(5) disconnect(4) connect(3)
//! [1..13)  accel x/y/z f32
//! [13..25) gyro x/y/z f32, raw counts / GYRO_SENSITIVITY
//! ```
//!
//! Only MOTION readings fill the float fields. Shot readings carry just their
//! own shot bit, lifecycle frames carry zeros.

use crate::core::types::{DeviceRole, PlayerId, RelayEvent, SensorRecord};
use crate::protocol::constants::{
    GYRO_SENSITIVITY, RELAY_CONNECT_SHIFT, RELAY_DISCONNECT_SHIFT, RELAY_FRAME_SIZE,
    RELAY_OFFSET_ACCEL, RELAY_OFFSET_GYRO, RELAY_PLAYER_SHIFT, RELAY_SHOT_RECEIVED_SHIFT,
    RELAY_SHOT_SENT_SHIFT,
};

/// One consolidated frame for the downstream consumer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RelayFrame {
    pub player_bit: bool,
    pub shot_sent: bool,
    pub shot_received: bool,
    pub disconnect: bool,
    pub connect: bool,
    pub accel: [f32; 3],
    /// Physical units
    pub gyro: [f32; 3],
}

impl RelayFrame {
    pub fn from_event(event: &RelayEvent) -> Self {
        match event {
            RelayEvent::Reading(record) => Self::from_record(record),
            RelayEvent::Connected { player } => Self {
                player_bit: player_bit(*player),
                connect: true,
                ..Self::default()
            },
            RelayEvent::Disconnected { player, .. } => Self {
                player_bit: player_bit(*player),
                disconnect: true,
                ..Self::default()
            },
        }
    }

    fn from_record(record: &SensorRecord) -> Self {
        let mut frame = Self {
            player_bit: player_bit(record.player),
            ..Self::default()
        };
        match record.role {
            DeviceRole::Motion => {
                frame.accel = record.accel;
                frame.gyro = record.gyro.map(|g| f32::from(g) / GYRO_SENSITIVITY);
            }
            DeviceRole::Emitter => frame.shot_sent = record.shot_sent,
            DeviceRole::Receiver => frame.shot_received = record.shot_received,
        }
        frame
    }

    pub fn player(&self) -> PlayerId {
        PlayerId::from_bit(self.player_bit as u8)
    }

    pub fn details(&self) -> u8 {
        (u8::from(self.player_bit) << RELAY_PLAYER_SHIFT)
            | (u8::from(self.shot_sent) << RELAY_SHOT_SENT_SHIFT)
            | (u8::from(self.shot_received) << RELAY_SHOT_RECEIVED_SHIFT)
            | (u8::from(self.disconnect) << RELAY_DISCONNECT_SHIFT)
            | (u8::from(self.connect) << RELAY_CONNECT_SHIFT)
    }

    pub fn encode(&self) -> [u8; RELAY_FRAME_SIZE] {
        let mut bytes = [0u8; RELAY_FRAME_SIZE];
        bytes[0] = self.details();
        write_f32s(&mut bytes[RELAY_OFFSET_ACCEL..RELAY_OFFSET_GYRO], &self.accel);
        write_f32s(&mut bytes[RELAY_OFFSET_GYRO..], &self.gyro);
        bytes
    }

    /// Parse a frame (used by downstream tooling and tests)
    pub fn decode(bytes: &[u8; RELAY_FRAME_SIZE]) -> Self {
        let details = bytes[0];
        let bit = |shift: u8| details & (1 << shift) != 0;
        Self {
            player_bit: bit(RELAY_PLAYER_SHIFT),
            shot_sent: bit(RELAY_SHOT_SENT_SHIFT),
            shot_received: bit(RELAY_SHOT_RECEIVED_SHIFT),
            disconnect: bit(RELAY_DISCONNECT_SHIFT),
            connect: bit(RELAY_CONNECT_SHIFT),
            accel: read_f32s(&bytes[RELAY_OFFSET_ACCEL..RELAY_OFFSET_GYRO]),
            gyro: read_f32s(&bytes[RELAY_OFFSET_GYRO..]),
        }
    }
}

#[inline]
fn player_bit(player: PlayerId) -> bool {
    player.bit() == 1
}

fn write_f32s(out: &mut [u8], values: &[f32; 3]) {
    for (chunk, v) in out.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&v.to_be_bytes());
    }
}

fn read_f32s(bytes: &[u8]) -> [f32; 3] {
    let mut values = [0f32; 3];
    for (v, chunk) in values.iter_mut().zip(bytes.chunks_exact(4)) {
        *v = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    values
}

/// Encode one queued event for the downstream socket
pub fn encode(event: &RelayEvent) -> [u8; RELAY_FRAME_SIZE] {
    RelayFrame::from_event(event).encode()
}
