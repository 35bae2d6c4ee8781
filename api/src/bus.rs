// Licensed under the Apache-2.0 license

//! Raw CSR access seam.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CsrError {
    #[error("no register mapped at CSR address {0:#x}")]
    Unmapped(u64),
}

/// The register read/write primitive supplied by the hardware model.
///
/// Each call is atomic with respect to the device: the access has fully
/// reached the hardware (or the emulated card) by the time it returns.
/// Implementations are exclusive channels; callers serialize externally if
/// one device is shared.
pub trait CsrBus {
    fn read_csr(&mut self, addr: u64) -> Result<u64, CsrError>;
    fn write_csr(&mut self, addr: u64, val: u64) -> Result<(), CsrError>;
}
