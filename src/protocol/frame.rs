//! Fixed-size node frame codec
//!
//! Frame format (20 bytes, little-endian numeric fields):
//!
//! ```text
//! ┌─────────┬──────────────┬───────────────┬──────────┐
//! │ Control │ Gyro 3 x i16 │ Accel 3 x f32 │ Checksum │
//! │ [0]     │ [1..7)       │ [7..19)       │ [19]     │
//! └─────────┴──────────────┴───────────────┴──────────┘
//! ```
//!
//! Control byte: `type:2 | seq:1 | player:1 | device:2 | shot_sent:1 | shot_received:1`.
//! Checksum is the XOR of bytes 0..19.
//!
//! Everything here is pure: no I/O, no allocation.

use super::constants::*;
use crate::core::types::{DeviceRole, PacketType, PlayerId, SensorRecord};
use crate::error::{Error, Result};

/// XOR of all bytes
#[inline]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Recompute the XOR over all-but-last byte and compare with the last byte
#[inline]
pub fn verify_checksum(bytes: &[u8]) -> bool {
    match bytes.split_last() {
        Some((&received, body)) => checksum(body) == received,
        None => false,
    }
}

/// Decoded control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub packet_type: PacketType,
    pub seq_bit: bool,
    pub player: PlayerId,
    pub role: DeviceRole,
    pub shot_sent: bool,
    pub shot_received: bool,
}

impl Control {
    /// Control-only header (HANDSHAKE/ACK/NACK): shot bits clear
    pub fn new(packet_type: PacketType, seq_bit: bool, player: PlayerId, role: DeviceRole) -> Self {
        Self {
            packet_type,
            seq_bit,
            player,
            role,
            shot_sent: false,
            shot_received: false,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self.packet_type.bits() << PACKET_TYPE_SHIFT)
            | ((self.seq_bit as u8) << SEQ_SHIFT)
            | (self.player.bit() << PLAYER_SHIFT)
            | (self.role.bits() << DEVICE_SHIFT)
            | ((self.shot_sent as u8) << SHOT_SENT_SHIFT)
            | ((self.shot_received as u8) << SHOT_RECEIVED_SHIFT)
    }

    /// Fails for an unknown device role; every two-bit type value is defined
    pub fn from_byte(byte: u8) -> Result<Self> {
        let packet_type = PacketType::try_from((byte & PACKET_TYPE_MASK) >> PACKET_TYPE_SHIFT)?;
        let role = DeviceRole::from_bits((byte & DEVICE_MASK) >> DEVICE_SHIFT)?;
        Ok(Self {
            packet_type,
            seq_bit: byte & SEQ_MASK != 0,
            player: PlayerId::from_bit((byte & PLAYER_MASK) >> PLAYER_SHIFT),
            role,
            shot_sent: byte & SHOT_SENT_MASK != 0,
            shot_received: byte & SHOT_RECEIVED_MASK != 0,
        })
    }
}

/// Pack the handshake-level control fields into one byte
#[inline]
pub fn encode_control(
    packet_type: PacketType,
    ack_bit: bool,
    player: PlayerId,
    role: DeviceRole,
) -> u8 {
    Control::new(packet_type, ack_bit, player, role).to_byte()
}

/// Inverse of [`encode_control`]; shot bits are ignored
pub fn decode_control(byte: u8) -> Result<(PacketType, bool, PlayerId, DeviceRole)> {
    let control = Control::from_byte(byte)?;
    Ok((control.packet_type, control.seq_bit, control.player, control.role))
}

/// Lay out a frame at fixed offsets and seal it with the checksum
pub fn build_frame(control: u8, gyro: &[i16; 3], accel: &[f32; 3]) -> [u8; FRAME_SIZE] {
    let mut frame = [0u8; FRAME_SIZE];
    frame[OFFSET_CONTROL] = control;
    for (i, g) in gyro.iter().enumerate() {
        let at = OFFSET_GYRO + i * 2;
        frame[at..at + 2].copy_from_slice(&g.to_le_bytes());
    }
    for (i, a) in accel.iter().enumerate() {
        let at = OFFSET_ACCEL + i * 4;
        frame[at..at + 4].copy_from_slice(&a.to_le_bytes());
    }
    frame[CHECKSUM_POS] = checksum(&frame[..CHECKSUM_POS]);
    frame
}

/// HANDSHAKE / ACK / NACK frame with an all-zero payload
pub fn control_frame(
    packet_type: PacketType,
    ack_bit: bool,
    player: PlayerId,
    role: DeviceRole,
) -> [u8; FRAME_SIZE] {
    build_frame(
        encode_control(packet_type, ack_bit, player, role),
        &[0; 3],
        &[0.0; 3],
    )
}

/// Fully decoded node frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireFrame {
    pub control: Control,
    pub gyro: [i16; 3],
    pub accel: [f32; 3],
}

impl WireFrame {
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        build_frame(self.control.to_byte(), &self.gyro, &self.accel)
    }

    /// Validate checksum, then decode the control byte and payload
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Result<Self> {
        let expected = checksum(&bytes[..CHECKSUM_POS]);
        let actual = bytes[CHECKSUM_POS];
        if expected != actual {
            return Err(Error::ChecksumError { expected, actual });
        }

        let control = Control::from_byte(bytes[OFFSET_CONTROL])?;

        let mut gyro = [0i16; 3];
        for (i, g) in gyro.iter_mut().enumerate() {
            let at = OFFSET_GYRO + i * 2;
            *g = i16::from_le_bytes([bytes[at], bytes[at + 1]]);
        }

        let mut accel = [0f32; 3];
        for (i, a) in accel.iter_mut().enumerate() {
            let at = OFFSET_ACCEL + i * 4;
            *a = f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        }

        Ok(Self {
            control,
            gyro,
            accel,
        })
    }

    /// Application record for a DATA frame
    pub fn to_record(&self) -> SensorRecord {
        SensorRecord {
            player: self.control.player,
            role: self.control.role,
            seq_bit: self.control.seq_bit,
            shot_sent: self.control.shot_sent,
            shot_received: self.control.shot_received,
            gyro: self.gyro,
            accel: self.accel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_frame() -> WireFrame {
        WireFrame {
            control: Control {
                packet_type: PacketType::Data,
                seq_bit: true,
                player: PlayerId::Two,
                role: DeviceRole::Motion,
                shot_sent: false,
                shot_received: false,
            },
            gyro: [32441, -1245, 14531],
            accel: [4.3, -13.0, 124.5],
        }
    }

    #[test]
    fn test_control_layout() {
        // DATA(3) << 6 | seq << 5 | player 1 << 4 | emitter(2) << 2 | shot_sent << 1
        let control = Control {
            packet_type: PacketType::Data,
            seq_bit: true,
            player: PlayerId::Two,
            role: DeviceRole::Emitter,
            shot_sent: true,
            shot_received: false,
        };
        assert_eq!(control.to_byte(), 0b1111_1010);
        assert_eq!(Control::from_byte(0b1111_1010).unwrap(), control);
    }

    #[test]
    fn test_encode_decode_control() {
        for packet_type in [
            PacketType::Handshake,
            PacketType::Ack,
            PacketType::Nack,
            PacketType::Data,
        ] {
            for ack in [false, true] {
                for player in PlayerId::ALL {
                    for role in DeviceRole::ALL {
                        let byte = encode_control(packet_type, ack, player, role);
                        assert_eq!(
                            decode_control(byte).unwrap(),
                            (packet_type, ack, player, role)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_unknown_role_is_decode_failure() {
        // type=DATA, role bits = 0
        let err = decode_control(0b1100_0000).unwrap_err();
        assert!(err.is_corrupt_frame());
    }

    #[test]
    fn test_frame_round_trip() {
        let frame = data_frame();
        let bytes = frame.encode();
        assert_eq!(bytes.len(), FRAME_SIZE);
        assert!(verify_checksum(&bytes));
        assert_eq!(WireFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_field_offsets() {
        let bytes = data_frame().encode();
        assert_eq!(i16::from_le_bytes([bytes[1], bytes[2]]), 32441);
        assert_eq!(
            f32::from_le_bytes([bytes[15], bytes[16], bytes[17], bytes[18]]),
            124.5
        );
        assert_eq!(bytes[CHECKSUM_POS], checksum(&bytes[..CHECKSUM_POS]));
    }

    #[test]
    fn test_any_single_bit_flip_fails_checksum() {
        let bytes = data_frame().encode();
        for byte in 0..CHECKSUM_POS {
            for bit in 0..8 {
                let mut corrupted = bytes;
                corrupted[byte] ^= 1 << bit;
                assert!(!verify_checksum(&corrupted), "byte {} bit {}", byte, bit);
                assert!(matches!(
                    WireFrame::decode(&corrupted),
                    Err(Error::ChecksumError { .. })
                ));
            }
        }
    }

    #[test]
    fn test_control_frame_has_zero_payload() {
        let bytes = control_frame(PacketType::Handshake, false, PlayerId::One, DeviceRole::Receiver);
        assert_eq!(bytes[0], 0b0000_1100);
        assert!(bytes[1..CHECKSUM_POS].iter().all(|&b| b == 0));
        assert_eq!(bytes[CHECKSUM_POS], 0b0000_1100);
    }

    #[test]
    fn test_verify_checksum_empty() {
        assert!(!verify_checksum(&[]));
    }

    #[test]
    fn test_to_record() {
        let record = data_frame().to_record();
        assert_eq!(record.player, PlayerId::Two);
        assert_eq!(record.role, DeviceRole::Motion);
        assert!(record.seq_bit);
        assert_eq!(record.gyro, [32441, -1245, 14531]);
    }
}
