// Licensed under the Apache-2.0 license

//! Host-control register block (mailbox variant only).
//!
//! These registers sit directly on the CSR interface even in the mailbox
//! variant; they are how the host hands the shim its region address and
//! rings the doorbell.

use crate::{check_distinct, MapError, RegDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCtrlReg {
    /// Device-visible address of the mailbox region. Published once before
    /// the first proxied request.
    MailboxVaddr,
    /// Doorbell. Writing 1 tells the shim a request is staged in the region.
    MailboxCtrl,
    /// Completion status for proxied writes. Sticky.
    WriteStatus,
    /// Completion status for proxied reads. Sticky.
    ReadStatus,
    /// Owning-process identifier used for DMA credentials.
    OwnerId,
}

#[derive(Debug, Clone, Copy)]
pub struct HostCtrlMap {
    pub mailbox_vaddr: RegDef,
    pub mailbox_ctrl: RegDef,
    pub write_status: RegDef,
    pub read_status: RegDef,
    pub owner_id: RegDef,
}

impl HostCtrlMap {
    pub fn reg(&self, reg: HostCtrlReg) -> &RegDef {
        match reg {
            HostCtrlReg::MailboxVaddr => &self.mailbox_vaddr,
            HostCtrlReg::MailboxCtrl => &self.mailbox_ctrl,
            HostCtrlReg::WriteStatus => &self.write_status,
            HostCtrlReg::ReadStatus => &self.read_status,
            HostCtrlReg::OwnerId => &self.owner_id,
        }
    }

    pub fn reg_at(&self, addr: u64) -> Option<HostCtrlReg> {
        [
            HostCtrlReg::MailboxVaddr,
            HostCtrlReg::MailboxCtrl,
            HostCtrlReg::WriteStatus,
            HostCtrlReg::ReadStatus,
            HostCtrlReg::OwnerId,
        ]
        .into_iter()
        .find(|&r| self.reg(r).addr == addr)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        check_distinct(
            "host_ctrl",
            &[
                &self.mailbox_vaddr,
                &self.mailbox_ctrl,
                &self.write_status,
                &self.read_status,
                &self.owner_id,
            ],
        )
    }
}

pub const HOST_CTRL_MAP: HostCtrlMap = HostCtrlMap {
    mailbox_vaddr: RegDef::qword("mmio_vaddr", 0),
    mailbox_ctrl: RegDef::qword("mmio_ctrl", 1),
    write_status: RegDef::qword("mmio_write_status", 2),
    read_status: RegDef::qword("mmio_read_status", 3),
    owner_id: RegDef::qword("owner_id", 4),
};
