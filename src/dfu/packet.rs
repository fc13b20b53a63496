//! Control point request encoding for Secure DFU.
//!
//! Requests are `[opcode][params...]` with multi-byte parameters in
//! little-endian order. Object data itself goes unframed to the packet
//! characteristic and needs no builder.

use super::config::{DfuOpcode, ObjectType};

// ============================================================================
// DFU Command Builders
// ============================================================================

/// Build a Set PRN request.
///
/// Payload: [0x02, count(2)]
pub fn build_set_prn_request(count: u16) -> Vec<u8> {
    let mut request = Vec::with_capacity(3);
    request.push(DfuOpcode::SetPacketReceiptNotification as u8);
    request.extend_from_slice(&count.to_le_bytes());
    request
}

/// Build a Create request for an object of `size` bytes.
///
/// Payload: [0x01, object_type(1), size(4)]
pub fn build_create_request(object_type: ObjectType, size: u32) -> Vec<u8> {
    let mut request = Vec::with_capacity(6);
    request.push(DfuOpcode::Create as u8);
    request.push(object_type as u8);
    request.extend_from_slice(&size.to_le_bytes());
    request
}

/// Build a Calculate Checksum request.
pub fn build_checksum_request() -> Vec<u8> {
    vec![DfuOpcode::CalculateChecksum as u8]
}

/// Build an Execute request.
pub fn build_execute_request() -> Vec<u8> {
    vec![DfuOpcode::Execute as u8]
}

/// Build a Select Object request.
///
/// Selecting reports the offset and CRC of a previously sent object so a
/// transfer could resume. Sessions never send it: every run starts fresh.
pub fn build_select_request(object_type: ObjectType) -> Vec<u8> {
    vec![DfuOpcode::SelectObject as u8, object_type as u8]
}

// ============================================================================
// Tests
// ============================================================================
