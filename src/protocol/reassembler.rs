//! Notification stream reassembly
//!
//! Nodes deliver bytes in notifications of arbitrary size: less than a frame,
//! exactly a frame, several frames plus a remainder, or the tail of a frame
//! started in an earlier notification. The reassembler turns that stream into
//! exact `FRAME_SIZE` frames.
//!
//! Between deliveries at most `FRAME_SIZE - 1` bytes are held, in a fixed
//! array, so there is no allocation and no overflow path. Every complete frame
//! in a delivery is emitted before `push` returns; nothing is skipped to catch
//! up. Validation is not done here.

use super::constants::FRAME_SIZE;

/// Per-node frame accumulator
pub struct Reassembler {
    partial: [u8; FRAME_SIZE],
    len: usize,
}

impl Reassembler {
    pub const fn new() -> Self {
        Self {
            partial: [0u8; FRAME_SIZE],
            len: 0,
        }
    }

    /// Append a delivery and emit every completed frame, in order.
    ///
    /// Returns the number of frames emitted.
    pub fn push<F>(&mut self, mut chunk: &[u8], mut on_frame: F) -> usize
    where
        F: FnMut(&[u8; FRAME_SIZE]),
    {
        let mut emitted = 0;

        // Finish the carried-over frame first
        if self.len > 0 {
            let deficit = FRAME_SIZE - self.len;
            let take = deficit.min(chunk.len());
            self.partial[self.len..self.len + take].copy_from_slice(&chunk[..take]);
            self.len += take;
            chunk = &chunk[take..];

            if self.len < FRAME_SIZE {
                return emitted;
            }
            on_frame(&self.partial);
            self.len = 0;
            emitted += 1;
        }

        // Whole frames straight from the delivery
        let mut frames = chunk.chunks_exact(FRAME_SIZE);
        for frame in frames.by_ref() {
            if let Ok(frame) = <&[u8; FRAME_SIZE]>::try_from(frame) {
                on_frame(frame);
                emitted += 1;
            }
        }

        let rest = frames.remainder();
        debug_assert!(rest.len() < FRAME_SIZE);
        self.partial[..rest.len()].copy_from_slice(rest);
        self.len = rest.len();

        emitted
    }

    /// Bytes of an incomplete frame currently held
    #[inline]
    pub fn pending(&self) -> usize {
        self.len
    }

    /// Drop any partial frame (used when the link is re-established)
    #[inline]
    pub fn reset(&mut self) {
        self.len = 0;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
