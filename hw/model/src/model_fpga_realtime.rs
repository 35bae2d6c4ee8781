// Licensed under the Apache-2.0 license

//! Model backed by the real vFPGA bitstream.
//!
//! The CSR block is reached through the UIO mapping of the device's register
//! BAR. Buffers come from anonymous huge-page mappings; the shell translates
//! host virtual addresses, so the pointer itself is what gets programmed
//! into the engine.

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use axidma_api::{CsrBus, CsrError, DmaBuffer};
use log::debug;
use uio::{UioDevice, UioError};

use crate::{AllocClass, HwModel, InitParams, ModelError};

/// Qwords exposed by the register BAR. Accesses past this never reach the
/// device.
const CSR_BAR_QWORDS: u64 = 16;

const PAGE_LEN: usize = 4096;
const HUGE_PAGE_LEN: usize = 2 * 1024 * 1024;

fn fmt_uio_error(err: UioError) -> String {
    format!("{err:?}")
}

pub struct ModelFpgaRealtime {
    csr: *mut u64,
    identity: u64,
}

impl HwModel for ModelFpgaRealtime {
    type TBus<'a> = FpgaRealtimeBus<'a>;
    type Buffer = FpgaBuffer;

    fn new(params: InitParams) -> Result<Self>
    where
        Self: Sized,
    {
        let uio_num = match env::var("AXIDMA_UIO_NUM") {
            Ok(s) => usize::from_str(&s).context("AXIDMA_UIO_NUM must be a uio device number")?,
            Err(_) => params.uio_num,
        };
        let dev = UioDevice::new(uio_num)
            .map_err(|e| anyhow!("opening uio{uio_num} failed: {}", fmt_uio_error(e)))?;
        let csr = dev
            .map_mapping(0)
            .map_err(|e| anyhow!("mapping uio{uio_num} register BAR failed: {}", fmt_uio_error(e)))?
            as *mut u64;
        debug!("uio{uio_num} register BAR mapped at {csr:p}");

        // The engine checks the submitting thread's id, not the process id.
        let identity = unsafe { libc::syscall(libc::SYS_gettid) } as u64;

        Ok(Self { csr, identity })
    }

    fn type_name(&self) -> &'static str {
        "ModelFpgaRealtime"
    }

    fn csr_bus(&mut self) -> FpgaRealtimeBus<'_> {
        FpgaRealtimeBus { m: self }
    }

    fn alloc_buffer(&mut self, len: usize, class: AllocClass) -> Result<FpgaBuffer, ModelError> {
        if len == 0 {
            return Err(ModelError::EmptyAlloc);
        }
        let (map_len, flags) = match class {
            AllocClass::Regular => (
                len.div_ceil(PAGE_LEN) * PAGE_LEN,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            ),
            AllocClass::HugePage => (
                len.div_ceil(HUGE_PAGE_LEN) * HUGE_PAGE_LEN,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB,
            ),
        };
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ModelError::MmapFailed(std::io::Error::last_os_error()));
        }
        debug!("pinned {map_len} bytes ({class:?}) at {ptr:p}");
        Ok(FpgaBuffer {
            ptr: ptr.cast(),
            len,
            map_len,
        })
    }

    fn thread_id(&self) -> u64 {
        self.identity
    }
}

pub struct FpgaRealtimeBus<'a> {
    m: &'a mut ModelFpgaRealtime,
}

impl FpgaRealtimeBus<'_> {
    fn ptr_for_addr(&mut self, addr: u64) -> Option<*mut u64> {
        (addr < CSR_BAR_QWORDS).then(|| unsafe { self.m.csr.add(addr as usize) })
    }
}

impl CsrBus for FpgaRealtimeBus<'_> {
    fn read_csr(&mut self, addr: u64) -> Result<u64, CsrError> {
        let ptr = self.ptr_for_addr(addr).ok_or(CsrError::Unmapped(addr))?;
        Ok(unsafe { ptr.read_volatile() })
    }

    fn write_csr(&mut self, addr: u64, val: u64) -> Result<(), CsrError> {
        let ptr = self.ptr_for_addr(addr).ok_or(CsrError::Unmapped(addr))?;
        unsafe { ptr.write_volatile(val) };
        Ok(())
    }
}

/// Huge-page-backed pinned buffer. Every access is volatile; the device can
/// observe the memory at any time.
pub struct FpgaBuffer {
    ptr: *mut u8,
    len: usize,
    map_len: usize,
}

impl DmaBuffer for FpgaBuffer {
    fn device_addr(&self) -> u64 {
        self.ptr as u64
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
        for (i, b) in bytes.iter().enumerate() {
            unsafe { self.ptr.add(offset + i).write_volatile(*b) };
        }
    }

    fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        assert!(
            offset + out.len() <= self.len,
            "read of {} bytes at offset {offset} overruns {}-byte buffer",
            out.len(),
            self.len
        );
        for (i, b) in out.iter_mut().enumerate() {
            *b = unsafe { self.ptr.add(offset + i).read_volatile() };
        }
    }
}

impl Drop for FpgaBuffer {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr.cast(), self.map_len) };
    }
}
