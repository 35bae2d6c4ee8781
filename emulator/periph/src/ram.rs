// Licensed under the Apache-2.0 license

//! Byte-addressed backing store for the emulated card's memory window.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    #[error("load of {len} bytes at offset {offset:#x} exceeds the {size}-byte window")]
    LoadAccessFault {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("store of {len} bytes at offset {offset:#x} exceeds the {size}-byte window")]
    StoreAccessFault {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("no device register at CSR address {0:#x}")]
    UnmappedCsr(u64),
}

/// Plain RAM. Accessors fault instead of panicking so the peripherals can
/// turn a bad device-side address into an error status rather than tearing
/// down the emulation.
pub struct Ram {
    data: Vec<u8>,
}

impl Ram {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), (usize, usize, usize)> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err((offset, len, self.data.len())),
        }
    }

    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) -> Result<(), BusFault> {
        self.check(offset, out.len())
            .map_err(|(offset, len, size)| BusFault::LoadAccessFault { offset, len, size })?;
        out.copy_from_slice(&self.data[offset..offset + out.len()]);
        Ok(())
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), BusFault> {
        self.check(offset, bytes.len())
            .map_err(|(offset, len, size)| BusFault::StoreAccessFault { offset, len, size })?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_u64_le(&self, offset: usize) -> Result<u64, BusFault> {
        let mut bytes = [0u8; 8];
        self.read_bytes(offset, &mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn write_u64_le(&mut self, offset: usize, val: u64) -> Result<(), BusFault> {
        self.write_bytes(offset, &val.to_le_bytes())
    }

    /// Copies `len` bytes inside the window. Source and destination may
    /// overlap; the copy behaves as if staged through a scratch buffer, which
    /// is what the hardware's store-and-forward engine does.
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) -> Result<(), BusFault> {
        self.check(src, len)
            .map_err(|(offset, len, size)| BusFault::LoadAccessFault { offset, len, size })?;
        self.check(dst, len)
            .map_err(|(offset, len, size)| BusFault::StoreAccessFault { offset, len, size })?;
        self.data.copy_within(src..src + len, dst);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_read_write_roundtrip() {
        let mut ram = Ram::new(vec![0; 64]);
        ram.write_bytes(3, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        ram.read_bytes(3, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_u64_accessors_little_endian() {
        let mut ram = Ram::new(vec![0; 64]);
        ram.write_u64_le(8, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(ram.data()[8], 0x08);
        assert_eq!(ram.data()[15], 0x01);
        assert_eq!(ram.read_u64_le(8).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_out_of_range_faults() {
        let mut ram = Ram::new(vec![0; 16]);
        assert_eq!(
            ram.read_u64_le(12),
            Err(BusFault::LoadAccessFault {
                offset: 12,
                len: 8,
                size: 16
            })
        );
        assert_eq!(
            ram.write_bytes(16, &[0]),
            Err(BusFault::StoreAccessFault {
                offset: 16,
                len: 1,
                size: 16
            })
        );
        // Offset overflow must fault, not wrap.
        let mut big = [0u8; 8];
        assert!(ram.read_bytes(usize::MAX, &mut big).is_err());
    }

    #[test]
    fn test_copy_within_overlapping() {
        let mut ram = Ram::new((0u8..32).collect());
        ram.copy_within(0, 4, 16).unwrap();
        assert_eq!(&ram.data()[4..20], &(0u8..16).collect::<Vec<_>>()[..]);
    }
}
