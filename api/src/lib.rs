// Licensed under the Apache-2.0 license

//! Host-side control of the axidma vFPGA DMA engine.
//!
//! The engine's registers are reached through a [`RegisterChannel`]. The
//! direct variant forwards each access to the raw CSR primitive; the mailbox
//! variant stages a request in a shared memory region, rings a doorbell
//! register, and polls a completion status before the access is considered
//! done. [`DmaController`] drives a transfer end to end against either
//! channel: configure addresses and length, issue the command word, poll for
//! completion, then verify the transferred length.
//!
//! The CSR primitive and the pinned memory the region lives in come from the
//! hardware model crate through the [`CsrBus`] and [`DmaBuffer`] traits.

pub mod bus;
pub mod channel;
pub mod dma;
pub mod mailbox;
pub mod mem;

pub use bus::{CsrBus, CsrError};
pub use channel::{ChannelError, DirectChannel, MailboxChannel, RegisterChannel, SetupError};
pub use dma::{
    DmaController, DmaError, DmaState, TransferDescriptor, TransferDirection, TransferOutcome,
};
pub use mem::DmaBuffer;
