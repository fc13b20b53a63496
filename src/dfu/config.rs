//! Constants for the Nordic Secure DFU protocol.

// ============================================================================
// GATT Identifiers
// ============================================================================

/// Nordic Secure DFU service UUID.
pub const SECURE_DFU_SERVICE_UUID: &str = "0000fe59-0000-1000-8000-00805f9b34fb";

/// DFU Control Point characteristic (requests and notified responses).
pub const CONTROL_POINT_CHAR_UUID: &str = "8ec90001-f315-4f60-9fb8-838830daea50";

/// DFU Packet characteristic (bulk object data).
pub const PACKET_CHAR_UUID: &str = "8ec90002-f315-4f60-9fb8-838830daea50";

// ============================================================================
// Transfer Geometry
// ============================================================================

/// Maximum size of one data object (flash erase granularity).
pub const FLASH_PAGE_SIZE: usize = 4096;

/// Bytes per packet-channel write. Conservative link-layer payload bound;
/// the real limit depends on the platform and the negotiated MTU.
pub const CHUNK_SIZE: usize = 244;

/// Packet receipt notification count. Zero disables per-packet notifications.
pub const PACKET_RECEIPT_NOTIFICATION_COUNT: u16 = 0;

// ============================================================================
// Response Layout
// ============================================================================

/// Bytes before the response value: prefix, echoed opcode, result code.
pub const RESPONSE_HEADER_LEN: usize = 3;

/// Value length of a CALCULATE_CHECKSUM response: offset + crc32.
pub const RESPONSE_LEN_CHECKSUM: usize = 8;

/// Value length of a SELECT_OBJECT response: max_size + offset + crc32.
pub const RESPONSE_LEN_SELECT: usize = 12;

// ============================================================================
// Control Point Opcodes
// ============================================================================

/// Secure DFU control point opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuOpcode {
    ProtocolVersion = 0x00,
    /// Create an object of the given type and size, replacing an old one
    Create = 0x01,
    /// Set the packet receipt notification interval
    SetPacketReceiptNotification = 0x02,
    /// Request offset and CRC-32 of the current object
    CalculateChecksum = 0x03,
    /// Execute (commit) the current object
    Execute = 0x04,
    /// Select the last object of a type (used for resuming)
    SelectObject = 0x06,
    MtuGet = 0x07,
    ObjectWrite = 0x08,
    Ping = 0x09,
    HardwareVersionGet = 0x0A,
    FirmwareVersionGet = 0x0B,
    Abort = 0x0C,
    /// Prefix of every notified response
    ResponseCode = 0x60,
}

impl DfuOpcode {
    /// Parse an opcode from a byte value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(DfuOpcode::ProtocolVersion),
            0x01 => Some(DfuOpcode::Create),
            0x02 => Some(DfuOpcode::SetPacketReceiptNotification),
            0x03 => Some(DfuOpcode::CalculateChecksum),
            0x04 => Some(DfuOpcode::Execute),
            0x06 => Some(DfuOpcode::SelectObject),
            0x07 => Some(DfuOpcode::MtuGet),
            0x08 => Some(DfuOpcode::ObjectWrite),
            0x09 => Some(DfuOpcode::Ping),
            0x0A => Some(DfuOpcode::HardwareVersionGet),
            0x0B => Some(DfuOpcode::FirmwareVersionGet),
            0x0C => Some(DfuOpcode::Abort),
            0x60 => Some(DfuOpcode::ResponseCode),
            _ => None,
        }
    }
}

/// Object types addressed by CREATE and SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    /// Init packet (firmware.dat)
    Command = 0x01,
    /// Firmware image (firmware.bin)
    Data = 0x02,
}

/// Result codes reported in control point responses.
///
/// Extended error payloads (`ExtendedError`) are not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
    Invalid = 0x00,
    Success = 0x01,
    OpcodeNotSupported = 0x02,
    InvalidParameter = 0x03,
    InsufficientResources = 0x04,
    InvalidObject = 0x05,
    UnsupportedType = 0x07,
    OperationNotPermitted = 0x08,
    OperationFailed = 0x0A,
    ExtendedError = 0x0B,
}

impl ResultCode {
    /// Parse a result code from a byte value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ResultCode::Invalid),
            0x01 => Some(ResultCode::Success),
            0x02 => Some(ResultCode::OpcodeNotSupported),
            0x03 => Some(ResultCode::InvalidParameter),
            0x04 => Some(ResultCode::InsufficientResources),
            0x05 => Some(ResultCode::InvalidObject),
            0x07 => Some(ResultCode::UnsupportedType),
            0x08 => Some(ResultCode::OperationNotPermitted),
            0x0A => Some(ResultCode::OperationFailed),
            0x0B => Some(ResultCode::ExtendedError),
            _ => None,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            ResultCode::Invalid => "Invalid opcode",
            ResultCode::Success => "Operation successful",
            ResultCode::OpcodeNotSupported => "Opcode not supported",
            ResultCode::InvalidParameter => "Missing or invalid parameter",
            ResultCode::InsufficientResources => "Not enough memory for the data object",
            ResultCode::InvalidObject => "Data object does not match the firmware requirements",
            ResultCode::UnsupportedType => "Not a valid object type for a Create request",
            ResultCode::OperationNotPermitted => "Operation not permitted in the current state",
            ResultCode::OperationFailed => "Operation failed",
            ResultCode::ExtendedError => "Extended error",
        }
    }
}

/// Describe a raw result byte, including codes this crate does not name.
pub fn describe_result(byte: u8) -> String {
    match ResultCode::from_byte(byte) {
        Some(code) => code.description().to_string(),
        None => format!("Unknown result code 0x{:02X}", byte),
    }
}
