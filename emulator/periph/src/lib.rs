// Licensed under the Apache-2.0 license

//! Emulated peripherals for the axidma stack.
//!
//! Every peripheral here is a deterministic device double: state only
//! advances when the card is stepped, so tests control device time and can
//! count host polls exactly.

mod card;
mod dma_engine;
mod host_ctrl;
mod ram;

pub use card::{Card, CardArgs, CardVariant};
pub use dma_engine::{DmaEngine, DMA_START_DELAY};
pub use host_ctrl::{HostCtrlShim, ACK_DELAY};
pub use ram::{BusFault, Ram};
