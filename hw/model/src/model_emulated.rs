// Licensed under the Apache-2.0 license

//! Model backed by the in-process emulated card.
//!
//! The card only advances when stepped, so the bus steps it exactly once per
//! CSR access. Latencies configured in [`InitParams`] therefore turn into
//! exact poll counts, which the device-behavior tests rely on.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use axidma_api::{CsrBus, CsrError, DmaBuffer};
use axidma_registers::mailbox::MIN_REGION_LEN;
use emulator_periph::{Card, CardArgs, Ram};

use crate::{AllocClass, HwModel, InitParams, ModelError};

pub struct ModelEmulated {
    card: Rc<RefCell<Card>>,
    window: Rc<RefCell<Ram>>,
    window_base: u64,
    cursor: usize,
    identity: u64,
}

impl HwModel for ModelEmulated {
    type TBus<'a> = EmulatedBus;
    type Buffer = EmulatedBuffer;

    fn new(params: InitParams) -> Result<Self>
    where
        Self: Sized,
    {
        let card = Card::new(CardArgs {
            variant: params.variant,
            window_len: params.window_len,
            window_base: params.window_base,
            csr_ack_delay: params.csr_ack_latency,
            dma_start_delay: params.dma_latency,
            truncate_at: params.truncate_at,
            stall_shim: params.stall_shim,
        });
        let window = card.window();
        let window_base = card.window_base();
        Ok(Self {
            card: Rc::new(RefCell::new(card)),
            window,
            window_base,
            cursor: 0,
            identity: u64::from(std::process::id()),
        })
    }

    fn type_name(&self) -> &'static str {
        "ModelEmulated"
    }

    fn csr_bus(&mut self) -> EmulatedBus {
        EmulatedBus {
            card: self.card.clone(),
        }
    }

    // The window has no page granularity; both classes carve from the same
    // bump cursor.
    fn alloc_buffer(&mut self, len: usize, _class: AllocClass) -> Result<EmulatedBuffer, ModelError> {
        if len == 0 {
            return Err(ModelError::EmptyAlloc);
        }
        let free = self.window.borrow().len().saturating_sub(self.cursor);
        if len > free {
            return Err(ModelError::AllocFailed { need: len, free });
        }
        let offset = self.cursor;
        // Keep allocations cache-line separated, like the pinned allocator on
        // real hardware.
        self.cursor = offset + len.next_multiple_of(MIN_REGION_LEN);
        Ok(EmulatedBuffer {
            ram: self.window.clone(),
            offset,
            len,
            device_addr: self.window_base + offset as u64,
        })
    }

    fn thread_id(&self) -> u64 {
        self.identity
    }
}

/// CSR handle onto the emulated card. Clones share the card, but accesses
/// are serialized through the `RefCell` either way.
pub struct EmulatedBus {
    card: Rc<RefCell<Card>>,
}

impl CsrBus for EmulatedBus {
    fn read_csr(&mut self, addr: u64) -> Result<u64, CsrError> {
        let mut card = self.card.borrow_mut();
        card.step();
        card.csr_read(addr).map_err(|_| CsrError::Unmapped(addr))
    }

    fn write_csr(&mut self, addr: u64, val: u64) -> Result<(), CsrError> {
        let mut card = self.card.borrow_mut();
        card.step();
        card.csr_write(addr, val).map_err(|_| CsrError::Unmapped(addr))
    }
}

/// A slice of the card's memory window, bump-allocated and never freed.
pub struct EmulatedBuffer {
    ram: Rc<RefCell<Ram>>,
    offset: usize,
    len: usize,
    device_addr: u64,
}

impl DmaBuffer for EmulatedBuffer {
    fn device_addr(&self) -> u64 {
        self.device_addr
    }

    fn len(&self) -> usize {
        self.len
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= self.len,
            "write of {} bytes at offset {offset} overruns {}-byte buffer",
            bytes.len(),
            self.len
        );
        self.ram
            .borrow_mut()
            .write_bytes(self.offset + offset, bytes)
            .expect("allocation stays inside the window");
    }

    fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        assert!(
            offset + out.len() <= self.len,
            "read of {} bytes at offset {offset} overruns {}-byte buffer",
            out.len(),
            self.len
        );
        self.ram
            .borrow()
            .read_bytes(self.offset + offset, out)
            .expect("allocation stays inside the window");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use emulator_periph::CardVariant;

    fn model(variant: CardVariant) -> ModelEmulated {
        ModelEmulated::new(InitParams {
            variant,
            window_len: 4096,
            csr_ack_latency: 4,
            ..InitParams::default()
        })
        .unwrap()
    }

    #[test]
    fn test_alloc_is_cache_line_separated() {
        let mut hw = model(CardVariant::Direct);
        let a = hw.alloc_buffer(100, AllocClass::Regular).unwrap();
        let b = hw.alloc_buffer(64, AllocClass::HugePage).unwrap();
        assert_eq!(a.device_addr(), hw.window_base);
        assert_eq!(b.device_addr(), hw.window_base + 128);
        assert_eq!(a.len(), 100);
    }

    #[test]
    fn test_alloc_exhaustion_and_empty() {
        let mut hw = model(CardVariant::Direct);
        assert!(matches!(
            hw.alloc_buffer(0, AllocClass::Regular),
            Err(ModelError::EmptyAlloc)
        ));
        hw.alloc_buffer(4096, AllocClass::Regular).unwrap();
        match hw.alloc_buffer(1, AllocClass::Regular).err() {
            Some(ModelError::AllocFailed { need: 1, free: 0 }) => {}
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_buffer_io_reaches_the_window() {
        let mut hw = model(CardVariant::Direct);
        let mut buf = hw.alloc_buffer(128, AllocClass::Regular).unwrap();
        buf.write_u64_le(8, 0x1122_3344_5566_7788);

        let window = hw.window.borrow();
        assert_eq!(window.read_u64_le(8).unwrap(), 0x1122_3344_5566_7788);
        drop(window);
        assert_eq!(buf.read_u64_le(8), 0x1122_3344_5566_7788);
    }

    #[test]
    #[should_panic(expected = "overruns")]
    fn test_buffer_overrun_panics() {
        let mut hw = model(CardVariant::Direct);
        let mut buf = hw.alloc_buffer(64, AllocClass::Regular).unwrap();
        buf.write_bytes(60, &[0; 8]);
    }

    #[test]
    fn test_bus_steps_card_once_per_access() {
        use axidma_registers::host_ctrl::HOST_CTRL_MAP;
        use axidma_registers::mailbox::{ProxyRequest, REQUEST_OFFSET};
        use zerocopy::IntoBytes;

        let mut hw = model(CardVariant::Mailbox);
        let mut region = hw.alloc_buffer(64, AllocClass::Regular).unwrap();
        let mut bus = hw.csr_bus();
        bus.write_csr(HOST_CTRL_MAP.mailbox_vaddr.addr, region.device_addr())
            .unwrap();

        region.write_bytes(REQUEST_OFFSET, ProxyRequest::write(0x18, 4096).as_bytes());
        bus.write_csr(HOST_CTRL_MAP.write_status.addr, 0).unwrap();
        bus.write_csr(HOST_CTRL_MAP.mailbox_ctrl.addr, 1).unwrap();

        // One step per read: the ack latency of 4 turns into exactly 4 polls.
        for _ in 0..3 {
            assert_eq!(bus.read_csr(HOST_CTRL_MAP.write_status.addr).unwrap(), 0);
        }
        assert_eq!(bus.read_csr(HOST_CTRL_MAP.write_status.addr).unwrap(), 1);
    }

    #[test]
    fn test_unmapped_csr_is_reported() {
        let mut hw = model(CardVariant::Direct);
        let mut bus = hw.csr_bus();
        assert_eq!(bus.read_csr(0x40), Err(CsrError::Unmapped(0x40)));
    }
}
