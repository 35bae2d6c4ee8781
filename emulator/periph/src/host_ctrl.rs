// Licensed under the Apache-2.0 license

//! Emulated host-control shim.
//!
//! The shim owns the host-control register block and services one proxied
//! register request at a time: the host stages a request image in the mailbox
//! region, rings the doorbell, and a fixed number of steps later the shim
//! decodes the image, executes it against the engine, and raises the
//! completion status for that path.

use axidma_registers::mailbox::{
    ProxyOpcode, ProxyRequest, REQUEST_OFFSET, REQUEST_SPAN, RESPONSE_OFFSET,
};
use axidma_registers::{HostCtrlReg, MAILBOX_MAP};
use zerocopy::FromBytes;

use crate::dma_engine::DmaEngine;
use crate::ram::Ram;

/// Steps between the doorbell write and request execution.
pub const ACK_DELAY: u64 = 4;

pub struct HostCtrlShim {
    vaddr: u64,
    write_status: u64,
    read_status: u64,
    owner_id: u64,
    ack_delay: u64,
    pending: Option<u64>,
    stalled: bool,
}

impl HostCtrlShim {
    pub fn new(ack_delay: u64) -> Self {
        Self {
            vaddr: 0,
            write_status: 0,
            read_status: 0,
            owner_id: 0,
            ack_delay,
            pending: None,
            stalled: false,
        }
    }

    /// A stalled shim swallows doorbell rings without ever completing; used
    /// to emulate a dead device for timeout coverage.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn read(&self, reg: HostCtrlReg) -> u64 {
        match reg {
            HostCtrlReg::MailboxVaddr => self.vaddr,
            HostCtrlReg::MailboxCtrl => 0,
            HostCtrlReg::WriteStatus => self.write_status,
            HostCtrlReg::ReadStatus => self.read_status,
            HostCtrlReg::OwnerId => self.owner_id,
        }
    }

    pub fn write(&mut self, reg: HostCtrlReg, val: u64) {
        match reg {
            HostCtrlReg::MailboxVaddr => self.vaddr = val,
            HostCtrlReg::MailboxCtrl => {
                if val == 1 && !self.stalled {
                    self.pending = Some(self.ack_delay);
                }
            }
            HostCtrlReg::WriteStatus => self.write_status = val,
            HostCtrlReg::ReadStatus => self.read_status = val,
            HostCtrlReg::OwnerId => self.owner_id = val,
        }
    }

    /// Advances one unit of device time, executing the staged request once
    /// its delay expires.
    pub fn step(&mut self, window: &mut Ram, window_base: u64, engine: &mut DmaEngine) {
        match self.pending {
            Some(n) if n > 1 => self.pending = Some(n - 1),
            Some(_) => {
                self.pending = None;
                self.execute(window, window_base, engine);
            }
            None => {}
        }
    }

    /// Decodes and runs the request staged in the region. Malformed requests
    /// and unmapped register addresses still complete the handshake (reads
    /// return 0, writes are dropped): a host bug must not wedge the protocol.
    fn execute(&mut self, window: &mut Ram, window_base: u64, engine: &mut DmaEngine) {
        let Some(region) = self.vaddr.checked_sub(window_base) else {
            self.write_status = 1;
            self.read_status = 1;
            return;
        };
        let mut image = [0u8; REQUEST_SPAN];
        if window
            .read_bytes(region as usize + REQUEST_OFFSET, &mut image)
            .is_err()
        {
            self.write_status = 1;
            self.read_status = 1;
            return;
        }
        // The image is exactly REQUEST_SPAN bytes; this cannot fail.
        let req = ProxyRequest::read_from_bytes(&image[..]).unwrap();

        match req.opcode() {
            Ok(ProxyOpcode::Read) => {
                let val = match MAILBOX_MAP.reg_at(req.addr()) {
                    Some(reg) => engine.read(reg),
                    None => 0,
                };
                let _ = window.write_u64_le(region as usize + RESPONSE_OFFSET, val);
                self.read_status = 1;
            }
            Ok(ProxyOpcode::Write) => {
                if let Some(reg) = MAILBOX_MAP.reg_at(req.addr()) {
                    engine.write(reg, req.data());
                }
                self.write_status = 1;
            }
            Err(_) => {
                self.write_status = 1;
                self.read_status = 1;
            }
        }
    }
}
