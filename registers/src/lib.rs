// Licensed under the Apache-2.0 license

//! Register definitions for the axidma vFPGA.
//!
//! The DMA engine is exposed in two bitstream variants. The direct variant
//! puts the engine registers straight on the CSR interface; the mailbox
//! variant hides them behind a host-control shim and they are only reachable
//! through proxied mailbox requests. Each variant gets its own typed map so
//! the rest of the stack never touches a raw offset.

use thiserror::Error;

pub mod dma_engine;
pub mod host_ctrl;
pub mod mailbox;

pub use dma_engine::{DmaReg, DmaRegisterMap, DIRECT_MAP, MAILBOX_MAP};
pub use host_ctrl::{HostCtrlReg, HOST_CTRL_MAP};

/// Access width of a CSR as seen by the register primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessWidth {
    Qword,
}

/// One named register in a device map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegDef {
    pub name: &'static str,
    pub addr: u64,
    pub width: AccessWidth,
}

impl RegDef {
    pub const fn qword(name: &'static str, addr: u64) -> Self {
        Self {
            name,
            addr,
            width: AccessWidth::Qword,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("register map {map}: {first} and {second} share address {addr:#x}")]
    DuplicateAddress {
        map: &'static str,
        first: &'static str,
        second: &'static str,
        addr: u64,
    },
}

/// Checks that every entry of a map occupies a distinct address. Maps are
/// hand-maintained constants, so this runs once when a channel is built, not
/// at every access.
pub(crate) fn check_distinct(map: &'static str, entries: &[&RegDef]) -> Result<(), MapError> {
    for (i, a) in entries.iter().enumerate() {
        for b in entries.iter().skip(i + 1) {
            if a.addr == b.addr {
                return Err(MapError::DuplicateAddress {
                    map,
                    first: a.name,
                    second: b.name,
                    addr: a.addr,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_distinct_addresses_pass() {
        let a = RegDef::qword("a", 0);
        let b = RegDef::qword("b", 8);
        assert_eq!(check_distinct("t", &[&a, &b]), Ok(()));
    }

    #[test]
    fn test_duplicate_addresses_rejected() {
        let a = RegDef::qword("a", 8);
        let b = RegDef::qword("b", 8);
        assert_eq!(
            check_distinct("t", &[&a, &b]),
            Err(MapError::DuplicateAddress {
                map: "t",
                first: "a",
                second: "b",
                addr: 8,
            })
        );
    }
}
