//! Constants for the node wire protocol and the relay frame

// Frame sizes
pub const FRAME_SIZE: usize = 20; // control(1) + gyro(6) + accel(12) + checksum(1)
pub const CHECKSUM_POS: usize = FRAME_SIZE - 1;
pub const RELAY_FRAME_SIZE: usize = 25; // details(1) + accel(12) + gyro(12)

// Node frame field offsets
pub const OFFSET_CONTROL: usize = 0;
pub const OFFSET_GYRO: usize = 1; // 3 x i16 LE
pub const OFFSET_ACCEL: usize = 7; // 3 x f32 LE

// Control byte layout: type:2 | seq:1 | player:1 | device:2 | shot_sent:1 | shot_received:1
pub const PACKET_TYPE_SHIFT: u8 = 6;
pub const SEQ_SHIFT: u8 = 5;
pub const PLAYER_SHIFT: u8 = 4;
pub const DEVICE_SHIFT: u8 = 2;
pub const SHOT_SENT_SHIFT: u8 = 1;
pub const SHOT_RECEIVED_SHIFT: u8 = 0;

pub const PACKET_TYPE_MASK: u8 = 0b11 << PACKET_TYPE_SHIFT;
pub const SEQ_MASK: u8 = 1 << SEQ_SHIFT;
pub const PLAYER_MASK: u8 = 1 << PLAYER_SHIFT;
pub const DEVICE_MASK: u8 = 0b11 << DEVICE_SHIFT;
pub const SHOT_SENT_MASK: u8 = 1 << SHOT_SENT_SHIFT;
pub const SHOT_RECEIVED_MASK: u8 = 1 << SHOT_RECEIVED_SHIFT;

// Relay details byte: player:1 | shot_sent:1 | shot_received:1 | disconnect:1 | connect:1 | unused:3
pub const RELAY_PLAYER_SHIFT: u8 = 7;
pub const RELAY_SHOT_SENT_SHIFT: u8 = 6;
pub const RELAY_SHOT_RECEIVED_SHIFT: u8 = 5;
pub const RELAY_DISCONNECT_SHIFT: u8 = 4;
pub const RELAY_CONNECT_SHIFT: u8 = 3;

// Relay frame field offsets
pub const RELAY_OFFSET_ACCEL: usize = 1; // 3 x f32 BE
pub const RELAY_OFFSET_GYRO: usize = 13; // 3 x f32 BE

/// Raw gyro counts per physical unit
pub const GYRO_SENSITIVITY: f32 = 16384.0;

/// Largest notification chunk read from a link in one poll
pub const MAX_NOTIFICATION_SIZE: usize = 256;
