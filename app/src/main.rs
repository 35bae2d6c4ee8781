// Licensed under the Apache-2.0 license

//! Host-side DMA transfer exerciser for the axidma vFPGA.
//!
//! Fills a pinned buffer with a run-specific pattern, moves it through the
//! DMA engine over the selected register channel, and verifies the copy.
//! Runs the same transfer more than once by default; a second run flushes
//! out state the device leaked from the first.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use axidma_api::{
    DirectChannel, DmaBuffer, DmaController, MailboxChannel, RegisterChannel, TransferDescriptor,
    TransferDirection,
};
use axidma_hw_model::{AllocClass, CardVariant, HwModel, InitParams};
use axidma_registers::DmaReg;
use clap::{Parser, ValueEnum};
use clap_num::maybe_hex;
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;

#[derive(Copy, Clone, ValueEnum, Debug)]
enum Channel {
    /// Engine registers sit directly on the CSR interface.
    Direct,
    /// Engine registers are proxied through the mailbox shim.
    Mailbox,
}

#[derive(Copy, Clone, ValueEnum, Debug, PartialEq)]
enum IoDevice {
    /// Payload lives in pinned host memory.
    Host,
    /// Payload lives in card memory.
    Card,
}

#[derive(Parser, Debug)]
#[command(version, about, name = "axidma")]
struct Args {
    /// Transfer size in bytes.
    #[arg(short, long, value_parser = maybe_hex::<u64>, default_value_t = 32768)]
    size: u64,

    /// Mailbox region size in bytes.
    #[arg(long, value_parser = maybe_hex::<usize>, default_value_t = 16384)]
    region_size: usize,

    /// How many times to run the transfer. Reruns probe for state leaking
    /// across runs.
    #[arg(long, default_value_t = 2)]
    runs: u32,

    /// Which register transport to use.
    #[arg(long, value_enum, default_value_t = Channel::Direct)]
    channel: Channel,

    /// Which side the payload lives on.
    #[arg(long, value_enum, default_value_t = IoDevice::Host)]
    iodev: IoDevice,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _ = SimpleLogger::new().with_level(args.log_level).init();

    if args.iodev == IoDevice::Card {
        bail!("card-side payloads are not wired up on this bitstream");
    }
    if args.size == 0 {
        bail!("transfer size must be non-zero");
    }
    let size = usize::try_from(args.size).context("transfer size does not fit in memory")?;
    let span = size.checked_mul(2).context("transfer size too large")?;

    let variant = match args.channel {
        Channel::Direct => CardVariant::Direct,
        Channel::Mailbox => CardVariant::Mailbox,
    };
    let mut hw = axidma_hw_model::new(InitParams {
        variant,
        ..InitParams::default()
    })?;

    let identity = hw.thread_id();
    // Source in the first half, destination in the second.
    let mut payload = hw.alloc_buffer(span, AllocClass::HugePage)?;

    match args.channel {
        Channel::Direct => {
            let channel = DirectChannel::new(hw.csr_bus())?;
            run_session(DmaController::new(channel, identity), &mut payload, &args)
        }
        Channel::Mailbox => {
            let region = hw.alloc_buffer(args.region_size, AllocClass::Regular)?;
            let channel = MailboxChannel::new(hw.csr_bus(), region)?;
            run_session(DmaController::new(channel, identity), &mut payload, &args)
        }
    }
}

fn run_session<C: RegisterChannel>(
    mut ctl: DmaController<C>,
    payload: &mut impl DmaBuffer,
    args: &Args,
) -> Result<()> {
    let desc = TransferDescriptor {
        src_addr: payload.device_addr(),
        dst_addr: payload.device_addr() + args.size,
        len: args.size,
        direction: TransferDirection::HostToCard,
    };
    dump_engine_registers(ctl.channel_mut())?;

    let mut clean = true;
    for run in 1..=args.runs {
        info!("=== run {run} of {} ===", args.runs);
        clean &= run_once(&mut ctl, payload, &desc, run)?;
    }
    if clean {
        info!("all {} runs verified", args.runs);
    } else {
        warn!("payload verification failed; see hexdumps above");
    }
    Ok(())
}

fn run_once<C: RegisterChannel>(
    ctl: &mut DmaController<C>,
    payload: &mut impl DmaBuffer,
    desc: &TransferDescriptor,
    run: u32,
) -> Result<bool> {
    let size = desc.len as usize;
    let pattern = fill_pattern(run, size);
    payload.write_bytes(0, &pattern);

    let started = Instant::now();
    let outcome = ctl.transfer(desc)?;
    let elapsed = started.elapsed();
    info!(
        "moved {} bytes in {elapsed:?} ({:.1} MB/s)",
        outcome.transferred,
        outcome.transferred as f64 / elapsed.as_secs_f64() / 1e6,
    );

    let mut moved = vec![0u8; size];
    payload.read_bytes(size, &mut moved);
    if moved == pattern {
        info!("payload verified ({size} bytes)");
        return Ok(true);
    }
    warn!("payload mismatch on run {run}");
    hexdump("expected", &pattern[..pattern.len().min(64)]);
    hexdump("got", &moved[..moved.len().min(64)]);
    Ok(false)
}

/// A different byte pattern per run, so a stale payload left over from the
/// previous run cannot pass verification.
fn fill_pattern(run: u32, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(167).wrapping_add(run as u8))
        .collect()
}

fn dump_engine_registers<C: RegisterChannel>(chan: &mut C) -> Result<()> {
    for reg in [
        DmaReg::SrcAddr,
        DmaReg::DstAddr,
        DmaReg::TxLen,
        DmaReg::Status,
    ] {
        let val = chan.read_reg(reg)?;
        info!("{reg:?} = {val:#x}");
    }
    Ok(())
}

fn hexdump(label: &str, bytes: &[u8]) {
    for (i, chunk) in bytes.chunks(16).enumerate() {
        warn!("{label} {:04x}: {}", i * 16, hex::encode(chunk));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_fill_pattern_differs_by_run() {
        let one = fill_pattern(1, 64);
        let two = fill_pattern(2, 64);
        assert_ne!(one, two);
        assert_eq!(one.len(), 64);
    }
}
