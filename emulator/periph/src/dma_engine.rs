// Licensed under the Apache-2.0 license

//! Emulated DMA engine.
//!
//! The engine exposes the logical register file from `axidma-registers` and
//! moves bytes inside the card's memory window. A started operation completes
//! a fixed number of [`DmaEngine::step`] calls after the command write, so
//! host-side poll counts are reproducible run to run.

use axidma_registers::dma_engine::bits::{Command, Status};
use axidma_registers::DmaReg;
use tock_registers::LocalRegisterCopy;

use crate::ram::{BusFault, Ram};

/// Steps between the command write and the data movement, mirroring the
/// issue-to-completion delay of the real engine.
pub const DMA_START_DELAY: u64 = 200;

pub struct DmaEngine {
    command: LocalRegisterCopy<u64, Command::Register>,
    src_addr: u64,
    dst_addr: u64,
    len: u64,
    status: LocalRegisterCopy<u64, Status::Register>,
    tx_len: u64,
    owner: Option<u64>,
    start_delay: u64,
    pending: Option<u64>,
    truncate_at: Option<u64>,
}

impl DmaEngine {
    pub fn new(start_delay: u64) -> Self {
        Self {
            command: LocalRegisterCopy::new(0),
            src_addr: 0,
            dst_addr: 0,
            len: 0,
            status: LocalRegisterCopy::new(0),
            tx_len: 0,
            owner: None,
            start_delay,
            pending: None,
            truncate_at: None,
        }
    }

    /// Completed transfers report at most this many bytes moved; used to
    /// emulate a short transfer.
    pub fn set_truncate_at(&mut self, limit: Option<u64>) {
        self.truncate_at = limit;
    }

    /// Identity of the thread the engine will move data for. The real device
    /// uses it to route completions; the double only demands it exists.
    pub fn set_owner(&mut self, id: u64) {
        self.owner = Some(id);
    }

    pub fn owner(&self) -> Option<u64> {
        self.owner
    }

    pub fn busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn read(&self, reg: DmaReg) -> u64 {
        match reg {
            DmaReg::Command => self.command.get(),
            DmaReg::SrcAddr => self.src_addr,
            DmaReg::DstAddr => self.dst_addr,
            DmaReg::Len => self.len,
            DmaReg::Status => self.status.get(),
            DmaReg::TxLen => self.tx_len,
        }
    }

    pub fn write(&mut self, reg: DmaReg, val: u64) {
        match reg {
            DmaReg::Command => {
                self.command.set(val);
                if self.command.is_set(Command::Start) && !self.busy() {
                    self.pending = Some(self.start_delay);
                }
            }
            DmaReg::SrcAddr => self.src_addr = val,
            DmaReg::DstAddr => self.dst_addr = val,
            DmaReg::Len => self.len = val,
            // Sticky status: only the host writes it, to clear.
            DmaReg::Status => self.status.set(val),
            DmaReg::TxLen => self.tx_len = val,
        }
    }

    /// Advances one unit of device time. `window` is the memory the engine
    /// can reach, mapped at `window_base` in the device address space.
    pub fn step(&mut self, window: &mut Ram, window_base: u64) {
        match self.pending {
            Some(n) if n > 1 => self.pending = Some(n - 1),
            Some(_) => {
                self.pending = None;
                self.process_io(window, window_base);
            }
            None => {}
        }
    }

    fn process_io(&mut self, window: &mut Ram, window_base: u64) {
        // Done is sticky. An operation arriving while the previous one has
        // not been acknowledged is dropped, which is exactly the state leak
        // the second-run probe looks for.
        if self.status.is_set(Status::Done) {
            return;
        }
        match self.start(window, window_base) {
            Ok(moved) => {
                self.tx_len = moved;
                self.status.modify(Status::Done::SET);
            }
            Err(_) => {
                self.status.modify(Status::Error::SET);
            }
        }
    }

    fn start(&mut self, window: &mut Ram, window_base: u64) -> Result<u64, BusFault> {
        if self.owner.is_none() {
            // No credentials published; the real engine cannot issue bus
            // traffic on behalf of nobody.
            return Err(BusFault::UnmappedCsr(0));
        }
        let len = match self.truncate_at {
            Some(limit) => self.len.min(limit),
            None => self.len,
        };
        let src = self.window_offset(window, window_base, self.src_addr)?;
        let dst = self.window_offset(window, window_base, self.dst_addr)?;
        window.copy_within(src, dst, len as usize)?;
        Ok(len)
    }

    fn window_offset(&self, window: &Ram, window_base: u64, addr: u64) -> Result<usize, BusFault> {
        let end = window_base + window.len() as u64;
        if addr < window_base || addr >= end {
            return Err(BusFault::LoadAccessFault {
                offset: addr as usize,
                len: 0,
                size: window.len(),
            });
        }
        Ok((addr - window_base) as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const BASE: u64 = 0x7000_0000;

    fn engine() -> (DmaEngine, Ram) {
        let mut engine = DmaEngine::new(4);
        engine.set_owner(42);
        (engine, Ram::new(vec![0; 16 * 1024]))
    }

    fn configure(engine: &mut DmaEngine, src: u64, dst: u64, len: u64) {
        engine.write(DmaReg::SrcAddr, BASE + src);
        engine.write(DmaReg::DstAddr, BASE + dst);
        engine.write(DmaReg::Len, len);
    }

    fn step_until_done(engine: &mut DmaEngine, window: &mut Ram, max_steps: u64) -> u64 {
        for steps in 1..=max_steps {
            engine.step(window, BASE);
            if engine.read(DmaReg::Status) & 0x1 == 1 {
                return steps;
            }
        }
        panic!("engine never finished");
    }

    #[test]
    fn test_copy_completes_after_fixed_delay() {
        let (mut engine, mut window) = engine();
        window.data_mut()[..4096].fill(0x55);

        configure(&mut engine, 0, 4096, 4096);
        engine.write(DmaReg::Command, 0x3);
        assert!(engine.busy());
        assert_eq!(engine.read(DmaReg::Status), 0);

        let steps = step_until_done(&mut engine, &mut window, 10);
        assert_eq!(steps, 4);
        assert_eq!(engine.read(DmaReg::TxLen), 4096);
        assert_eq!(&window.data()[4096..8192], &[0x55; 4096][..]);
        assert!(!engine.busy());
    }

    #[test]
    fn test_start_ignored_while_busy() {
        let (mut engine, mut window) = engine();
        configure(&mut engine, 0, 4096, 64);
        engine.write(DmaReg::Command, 0x3);
        engine.step(&mut window, BASE);

        // Re-issuing the command must not restart the countdown.
        engine.write(DmaReg::Command, 0x3);
        let steps = step_until_done(&mut engine, &mut window, 10);
        assert_eq!(steps, 3);
    }

    #[test]
    fn test_unacknowledged_done_drops_next_operation() {
        let (mut engine, mut window) = engine();
        window.data_mut()[..64].fill(0xaa);
        configure(&mut engine, 0, 4096, 64);
        engine.write(DmaReg::Command, 0x3);
        step_until_done(&mut engine, &mut window, 10);

        // Change the source pattern, trigger again without clearing Done.
        window.data_mut()[..64].fill(0xbb);
        engine.write(DmaReg::Command, 0x3);
        for _ in 0..10 {
            engine.step(&mut window, BASE);
        }
        assert_eq!(&window.data()[4096..4160], &[0xaa; 64][..]);

        // After the host clears the sticky status the engine runs again.
        engine.write(DmaReg::Status, 0);
        engine.write(DmaReg::Command, 0x3);
        step_until_done(&mut engine, &mut window, 10);
        assert_eq!(&window.data()[4096..4160], &[0xbb; 64][..]);
    }

    #[test]
    fn test_missing_owner_raises_error_bit() {
        let mut engine = DmaEngine::new(2);
        let mut window = Ram::new(vec![0; 4096]);
        engine.write(DmaReg::SrcAddr, BASE);
        engine.write(DmaReg::DstAddr, BASE);
        engine.write(DmaReg::Len, 64);
        engine.write(DmaReg::Command, 0x3);
        for _ in 0..4 {
            engine.step(&mut window, BASE);
        }
        assert_eq!(engine.read(DmaReg::Status), 0x2);
    }

    #[test]
    fn test_unmappable_address_raises_error_bit() {
        let (mut engine, mut window) = engine();
        engine.write(DmaReg::SrcAddr, 0x1234);
        engine.write(DmaReg::DstAddr, BASE);
        engine.write(DmaReg::Len, 64);
        engine.write(DmaReg::Command, 0x3);
        for _ in 0..10 {
            engine.step(&mut window, BASE);
        }
        assert_eq!(engine.read(DmaReg::Status), 0x2);
        assert_eq!(engine.read(DmaReg::TxLen), 0);
    }

    #[test]
    fn test_truncation_shortens_reported_length() {
        let (mut engine, mut window) = engine();
        engine.set_truncate_at(Some(2048));
        window.data_mut()[..4096].fill(0x11);

        configure(&mut engine, 0, 4096, 4096);
        engine.write(DmaReg::Command, 0x3);
        step_until_done(&mut engine, &mut window, 10);

        assert_eq!(engine.read(DmaReg::TxLen), 2048);
        assert_eq!(&window.data()[4096..6144], &[0x11; 2048][..]);
        assert_eq!(&window.data()[6144..8192], &[0; 2048][..]);
    }
}
