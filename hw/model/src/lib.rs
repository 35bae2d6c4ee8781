// Licensed under the Apache-2.0 license

//! Hardware models for the axidma vFPGA.
//!
//! A model owns the two resources the control stack is built on: the CSR
//! interface ([`CsrBus`]) and pinned device-visible memory ([`DmaBuffer`]).
//! [`ModelEmulated`] backs them with the in-process emulated card and is the
//! default; `ModelFpgaRealtime` drives the real bitstream through a UIO
//! mapping and huge-page buffers when built with `--features fpga_realtime`.

use anyhow::Result;
use axidma_api::{CsrBus, DmaBuffer};
pub use emulator_periph::CardVariant;
use log::info;
use thiserror::Error;

mod model_emulated;
#[cfg(feature = "fpga_realtime")]
mod model_fpga_realtime;

pub use model_emulated::{EmulatedBuffer, EmulatedBus, ModelEmulated};
#[cfg(feature = "fpga_realtime")]
pub use model_fpga_realtime::{FpgaBuffer, FpgaRealtimeBus, ModelFpgaRealtime};

/// Ideally, general-purpose functions would return `impl HwModel` instead of
/// `DefaultHwModel` to prevent users from calling functions that aren't
/// available on all HwModel implementations.
///
/// Unfortunately, rust-analyzer (used by IDEs) can't fully resolve associated
/// types from `impl Trait`, so such functions should use `DefaultHwModel`.
/// Users should treat `DefaultHwModel` as if it were `impl HwModel`.
#[cfg(not(feature = "fpga_realtime"))]
pub type DefaultHwModel = ModelEmulated;

#[cfg(feature = "fpga_realtime")]
pub type DefaultHwModel = ModelFpgaRealtime;

/// Constructs a model based on the cargo features and environment variables.
pub fn new(params: InitParams) -> Result<DefaultHwModel> {
    DefaultHwModel::new(params).inspect(|hw| info!("using hardware model {}", hw.type_name()))
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("zero-length buffer allocation")]
    EmptyAlloc,
    #[error("buffer of {need} bytes does not fit in the remaining {free} bytes of the DMA window")]
    AllocFailed { need: usize, free: usize },
    #[error("pinned buffer mapping failed: {0}")]
    MmapFailed(#[from] std::io::Error),
}

/// Backing-page class for a buffer allocation. The FPGA model maps huge-page
/// allocations from the 2 MiB pool; the emulated card's window has no page
/// granularity, so there the class only affects accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocClass {
    Regular,
    HugePage,
}

pub struct InitParams {
    /// Which bitstream the device exposes.
    pub variant: CardVariant,

    /// Size of the emulated card's memory window, which backs every buffer
    /// allocation of that model.
    pub window_len: usize,

    /// Device-visible base address of the emulated window.
    pub window_base: u64,

    /// Emulated card: steps from doorbell to proxied-request completion.
    pub csr_ack_latency: u64,

    /// Emulated card: steps from command write to data movement.
    pub dma_latency: u64,

    /// Emulated card: cap the moved length to fake a short transfer.
    pub truncate_at: Option<u64>,

    /// Emulated card: shim never acknowledges, for timeout testing.
    pub stall_shim: bool,

    /// UIO device number of the vFPGA region. The `AXIDMA_UIO_NUM`
    /// environment variable overrides this.
    pub uio_num: usize,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            variant: CardVariant::Direct,
            window_len: 4 * 1024 * 1024,
            window_base: 0x7000_0000,
            csr_ack_latency: emulator_periph::ACK_DELAY,
            dma_latency: emulator_periph::DMA_START_DELAY,
            truncate_at: None,
            stall_shim: false,
            uio_num: 0,
        }
    }
}

/// A device the control stack can run against. Test cases should normally go
/// through [`crate::new()`] so the model follows the cargo features.
pub trait HwModel {
    type TBus<'a>: CsrBus
    where
        Self: 'a;
    type Buffer: DmaBuffer;

    /// Create a model. Most callers should use [`crate::new()`] instead.
    fn new(params: InitParams) -> Result<Self>
    where
        Self: Sized;

    /// The type name of this model.
    fn type_name(&self) -> &'static str;

    /// Exclusive handle to the device's CSR interface.
    fn csr_bus(&mut self) -> Self::TBus<'_>;

    /// Carves a pinned buffer out of the DMA window. Allocations live until
    /// the model (or, on real hardware, the buffer) is dropped; there is no
    /// free list.
    fn alloc_buffer(&mut self, len: usize, class: AllocClass) -> Result<Self::Buffer, ModelError>;

    /// Identity published to the device as DMA credentials.
    fn thread_id(&self) -> u64;
}
