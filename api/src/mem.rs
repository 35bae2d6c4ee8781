// Licensed under the Apache-2.0 license

//! Device-visible memory seam.

/// A pinned buffer shared between host and device.
///
/// Implementations must treat every access as a direct, ordered access to
/// the underlying memory (volatile on real hardware): by the time a write
/// call returns, the bytes are observable by the device, in call order.
/// Nothing may be cached or reordered, since the mailbox protocol's only
/// ordering contract is that request fields land before the doorbell CSR is
/// rung.
///
/// Offsets are bounds-checked against `len()`; going past the end is a
/// caller bug and panics.
pub trait DmaBuffer {
    /// Address the device uses to reach this buffer.
    fn device_addr(&self) -> u64;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]);

    fn read_bytes(&self, offset: usize, out: &mut [u8]);

    fn write_u64_le(&mut self, offset: usize, val: u64) {
        self.write_bytes(offset, &val.to_le_bytes());
    }

    fn read_u64_le(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        self.read_bytes(offset, &mut bytes);
        u64::from_le_bytes(bytes)
    }
}
