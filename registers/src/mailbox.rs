// Licensed under the Apache-2.0 license

//! Mailbox wire format, layout version 1.
//!
//! The region carries one request and one response at fixed byte offsets:
//!
//! | offset | size | field                                    |
//! |--------|------|------------------------------------------|
//! | 16     | 8    | response data (valid after read completes) |
//! | 24     | 1    | opcode (0 = read, 1 = write)             |
//! | 25     | 8    | target register address                  |
//! | 33     | 8    | length (unused for register access)      |
//! | 41     | 8    | write data payload                       |
//!
//! All multi-byte fields are little-endian regardless of host layout. This
//! module is the only place offsets appear; everything else goes through
//! [`ProxyRequest`] and the named constants.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const LAYOUT_VERSION: u32 = 1;

/// Offset of the 8-byte response field.
pub const RESPONSE_OFFSET: usize = 16;
/// Offset where the request image starts.
pub const REQUEST_OFFSET: usize = 24;
/// Full request image: opcode, address, length, data.
pub const REQUEST_SPAN: usize = 25;
/// Read requests stop after the length field, leaving the data field stale.
pub const READ_REQUEST_SPAN: usize = 17;
/// Smallest region the protocol accepts; the request image ends at byte 49,
/// rounded up to a cache line.
pub const MIN_REGION_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ProxyOpcode {
    Read = 0,
    Write = 1,
}

/// One proxied register request as it appears in the region at
/// [`REQUEST_OFFSET`]. Fields are stored little-endian; use the accessors.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
pub struct ProxyRequest {
    opcode: u8,
    addr: u64,
    len: u64,
    data: u64,
}

const _: () = assert!(core::mem::size_of::<ProxyRequest>() == REQUEST_SPAN);

impl ProxyRequest {
    pub fn read(addr: u64) -> Self {
        Self {
            opcode: ProxyOpcode::Read.into(),
            addr: addr.to_le(),
            len: 0,
            data: 0,
        }
    }

    pub fn write(addr: u64, data: u64) -> Self {
        Self {
            opcode: ProxyOpcode::Write.into(),
            addr: addr.to_le(),
            len: 0,
            data: data.to_le(),
        }
    }

    pub fn opcode(&self) -> Result<ProxyOpcode, u8> {
        ProxyOpcode::try_from(self.opcode).map_err(|_| self.opcode)
    }

    pub fn addr(&self) -> u64 {
        u64::from_le(self.addr)
    }

    pub fn data(&self) -> u64 {
        u64::from_le(self.data)
    }
}
