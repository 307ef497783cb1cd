//! Node wire protocol
//!
//! Frame format: `[CONTROL] [GYRO x3 i16] [ACCEL x3 f32] [XOR]`, 20 bytes.
//!
//! This module provides:
//! - `frame`: pure encode/decode and checksum of node frames
//! - `Reassembler`: turns notification chunks into whole frames
//!
//! The handshake/data state machine built on top lives in `link`.

pub mod constants;
pub mod frame;
pub mod reassembler;

pub use constants::{FRAME_SIZE, RELAY_FRAME_SIZE};
pub use frame::{
    build_frame, checksum, control_frame, decode_control, encode_control, verify_checksum,
    Control, WireFrame,
};
pub use reassembler::Reassembler;
