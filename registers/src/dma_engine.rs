// Licensed under the Apache-2.0 license

//! DMA engine register block.
//!
//! Direct-variant addresses are register indices on the CSR interface;
//! mailbox-variant addresses are byte offsets inside the engine's AXI window
//! and are only reachable through proxied requests. Same logical registers,
//! different numbering.

use crate::{check_distinct, MapError, RegDef};

/// Logical names for the engine registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaReg {
    Command,
    SrcAddr,
    DstAddr,
    Len,
    Status,
    TxLen,
}

/// Typed register map for one engine variant.
///
/// `owner_id` is present only where the variant keeps the owning-process
/// identifier inside the engine block; the mailbox variant publishes it
/// through the host-control block instead.
#[derive(Debug, Clone, Copy)]
pub struct DmaRegisterMap {
    pub variant: &'static str,
    pub command: RegDef,
    pub src_addr: RegDef,
    pub dst_addr: RegDef,
    pub len: RegDef,
    pub status: RegDef,
    pub tx_len: RegDef,
    pub owner_id: Option<RegDef>,
}

impl DmaRegisterMap {
    pub fn reg(&self, reg: DmaReg) -> &RegDef {
        match reg {
            DmaReg::Command => &self.command,
            DmaReg::SrcAddr => &self.src_addr,
            DmaReg::DstAddr => &self.dst_addr,
            DmaReg::Len => &self.len,
            DmaReg::Status => &self.status,
            DmaReg::TxLen => &self.tx_len,
        }
    }

    /// Resolves an address back to its logical register. The emulated device
    /// uses this for CSR dispatch; unknown addresses are the caller's fault
    /// to report.
    pub fn reg_at(&self, addr: u64) -> Option<DmaReg> {
        [
            DmaReg::Command,
            DmaReg::SrcAddr,
            DmaReg::DstAddr,
            DmaReg::Len,
            DmaReg::Status,
            DmaReg::TxLen,
        ]
        .into_iter()
        .find(|&r| self.reg(r).addr == addr)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        let mut entries = vec![
            &self.command,
            &self.src_addr,
            &self.dst_addr,
            &self.len,
            &self.status,
            &self.tx_len,
        ];
        if let Some(owner) = &self.owner_id {
            entries.push(owner);
        }
        check_distinct(self.variant, &entries)
    }
}

/// Engine block as exposed by the direct-variant bitstream.
pub const DIRECT_MAP: DmaRegisterMap = DmaRegisterMap {
    variant: "direct",
    command: RegDef::qword("dma_cmd", 0),
    src_addr: RegDef::qword("dma_src_addr", 1),
    dst_addr: RegDef::qword("dma_dst_addr", 2),
    len: RegDef::qword("dma_len", 3),
    status: RegDef::qword("dma_status", 4),
    tx_len: RegDef::qword("dma_tx_len", 8),
    owner_id: Some(RegDef::qword("owner_id", 7)),
};

/// Engine block behind the host-control shim, addressed by AXI byte offset.
pub const MAILBOX_MAP: DmaRegisterMap = DmaRegisterMap {
    variant: "mailbox",
    command: RegDef::qword("dma_cmd", 0x00),
    src_addr: RegDef::qword("dma_src_addr", 0x08),
    dst_addr: RegDef::qword("dma_dst_addr", 0x10),
    len: RegDef::qword("dma_len", 0x18),
    status: RegDef::qword("dma_status", 0x20),
    tx_len: RegDef::qword("dma_tx_len", 0x38),
    owner_id: None,
};

pub mod bits {
    //! Bit assignments for the command and status registers.
    use tock_registers::register_bitfields;

    register_bitfields! {
        u64,

        /// Command register. Writing Start begins a transfer; Direction
        /// selects which way data moves. The two bits are independent: the
        /// direct bitstream has been driven with both set (0x3), the mailbox
        /// bitstream with Start alone (0x1).
        pub Command [
            Start OFFSET(0) NUMBITS(1) [],
            Direction OFFSET(1) NUMBITS(1) [
                CardToHost = 0,
                HostToCard = 1,
            ],
        ],

        /// Status register. Done is sticky and must be cleared by the host;
        /// bits above Error are device-defined and must be tolerated.
        pub Status [
            Done OFFSET(0) NUMBITS(1) [],
            Error OFFSET(1) NUMBITS(1) [],
        ],
    }
}
