// Licensed under the Apache-2.0 license

//! Mailbox codec: applies the layout from `axidma_registers::mailbox` to a
//! region. These three functions are the only code that stages or reads
//! mailbox bytes; the channel decides when to ring the doorbell.

use axidma_registers::mailbox::{
    ProxyRequest, READ_REQUEST_SPAN, REQUEST_OFFSET, RESPONSE_OFFSET,
};
use zerocopy::IntoBytes;

use crate::mem::DmaBuffer;

/// Stages a register read request. The write-data field is deliberately not
/// touched; the shim ignores it for reads and the hardware contract keeps
/// the request image minimal.
pub fn encode_read_request(region: &mut impl DmaBuffer, reg_addr: u64) {
    let req = ProxyRequest::read(reg_addr);
    region.write_bytes(REQUEST_OFFSET, &req.as_bytes()[..READ_REQUEST_SPAN]);
}

/// Stages a register write request carrying `value`.
pub fn encode_write_request(region: &mut impl DmaBuffer, reg_addr: u64, value: u64) {
    let req = ProxyRequest::write(reg_addr, value);
    region.write_bytes(REQUEST_OFFSET, req.as_bytes());
}

/// Reads the response field. Valid only after the read-completion status has
/// been observed set.
pub fn decode_response(region: &impl DmaBuffer) -> u64 {
    region.read_u64_le(RESPONSE_OFFSET)
}
