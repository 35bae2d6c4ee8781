// Licensed under the Apache-2.0 license

//! Emulated accelerator card.
//!
//! The card is the root of the device double: it owns the DMA engine, the
//! host-control shim (mailbox variant only), and the memory window standing
//! in for pinned host memory. CSR traffic is dispatched per variant, and
//! [`Card::step`] advances every peripheral by one unit of device time so a
//! host polling loop that steps the card sees deterministic latencies.

use std::cell::RefCell;
use std::rc::Rc;

use axidma_registers::{HostCtrlReg, DIRECT_MAP, HOST_CTRL_MAP};

use crate::dma_engine::{self, DmaEngine};
use crate::host_ctrl::{self, HostCtrlShim};
use crate::ram::{BusFault, Ram};

/// Which bitstream the card emulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardVariant {
    /// Engine registers sit directly on the CSR interface.
    Direct,
    /// Engine registers are only reachable through the host-control shim.
    Mailbox,
}

pub struct CardArgs {
    pub variant: CardVariant,
    pub window_len: usize,
    pub window_base: u64,
    /// Steps from doorbell to proxied-request completion.
    pub csr_ack_delay: u64,
    /// Steps from command write to data movement.
    pub dma_start_delay: u64,
    /// Emulate a short transfer by capping the moved length.
    pub truncate_at: Option<u64>,
    /// Emulate a dead shim that never acknowledges.
    pub stall_shim: bool,
}

impl Default for CardArgs {
    fn default() -> Self {
        Self {
            variant: CardVariant::Direct,
            window_len: 4 * 1024 * 1024,
            window_base: 0x7000_0000,
            csr_ack_delay: host_ctrl::ACK_DELAY,
            dma_start_delay: dma_engine::DMA_START_DELAY,
            truncate_at: None,
            stall_shim: false,
        }
    }
}

enum Frontend {
    Direct,
    Mailbox(HostCtrlShim),
}

pub struct Card {
    frontend: Frontend,
    engine: DmaEngine,
    window: Rc<RefCell<Ram>>,
    window_base: u64,
}

impl Card {
    pub fn new(args: CardArgs) -> Self {
        let mut engine = DmaEngine::new(args.dma_start_delay);
        engine.set_truncate_at(args.truncate_at);
        let frontend = match args.variant {
            CardVariant::Direct => Frontend::Direct,
            CardVariant::Mailbox => {
                let mut shim = HostCtrlShim::new(args.csr_ack_delay);
                shim.set_stalled(args.stall_shim);
                Frontend::Mailbox(shim)
            }
        };
        Self {
            frontend,
            engine,
            window: Rc::new(RefCell::new(Ram::new(vec![0; args.window_len]))),
            window_base: args.window_base,
        }
    }

    /// The memory window shared with the host side of the emulation.
    pub fn window(&self) -> Rc<RefCell<Ram>> {
        self.window.clone()
    }

    pub fn window_base(&self) -> u64 {
        self.window_base
    }

    pub fn window_len(&self) -> usize {
        self.window.borrow().len()
    }

    /// Advances every peripheral by one unit of device time.
    pub fn step(&mut self) {
        let mut window = self.window.borrow_mut();
        if let Frontend::Mailbox(shim) = &mut self.frontend {
            shim.step(&mut window, self.window_base, &mut self.engine);
        }
        self.engine.step(&mut window, self.window_base);
    }

    pub fn csr_read(&mut self, addr: u64) -> Result<u64, BusFault> {
        match &mut self.frontend {
            Frontend::Direct => {
                if let Some(reg) = DIRECT_MAP.reg_at(addr) {
                    return Ok(self.engine.read(reg));
                }
                if DIRECT_MAP.owner_id.map(|o| o.addr) == Some(addr) {
                    return Ok(self.engine.owner().unwrap_or(0));
                }
                Err(BusFault::UnmappedCsr(addr))
            }
            Frontend::Mailbox(shim) => match HOST_CTRL_MAP.reg_at(addr) {
                Some(reg) => Ok(shim.read(reg)),
                None => Err(BusFault::UnmappedCsr(addr)),
            },
        }
    }

    pub fn csr_write(&mut self, addr: u64, val: u64) -> Result<(), BusFault> {
        match &mut self.frontend {
            Frontend::Direct => {
                if let Some(reg) = DIRECT_MAP.reg_at(addr) {
                    self.engine.write(reg, val);
                    return Ok(());
                }
                if DIRECT_MAP.owner_id.map(|o| o.addr) == Some(addr) {
                    self.engine.set_owner(val);
                    return Ok(());
                }
                Err(BusFault::UnmappedCsr(addr))
            }
            Frontend::Mailbox(shim) => {
                let Some(reg) = HOST_CTRL_MAP.reg_at(addr) else {
                    return Err(BusFault::UnmappedCsr(addr));
                };
                shim.write(reg, val);
                // The shim routes DMA credentials on to the engine.
                if reg == HostCtrlReg::OwnerId {
                    self.engine.set_owner(val);
                }
                Ok(())
            }
        }
    }
}
